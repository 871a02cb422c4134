#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointF32 {
    pub x: f32,
    pub y: f32,
}

impl PointF32 {
    pub fn new(x: f32, y: f32) -> PointF32 {
        PointF32 { x, y }
    }

    pub fn dist(&self, other: &PointF32) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn round(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}
