use super::point::PointF32;

/// A detected blob: center, diameter and, when known, orientation in
/// degrees. `area` is the contour area the blob was measured from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub center: PointF32,
    pub size: f32,
    pub angle: Option<f32>,
    pub area: f32,
}

impl Keypoint {
    pub fn radius(&self) -> f32 {
        self.size / 2.
    }
}
