use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing;
use std::path::Path;
use tracing::{debug, warn};

use crate::shapes::{Keypoint, Rect};

/// Colours and spacing for frame overlays. Defaults match the capture
/// program: dark blue labels and border, blue face boxes.
#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub label_color: Rgb<u8>,
    pub label_scale: f32,
    /// Baseline distance between label rows.
    pub label_spacing: u32,
    pub border_color: Rgb<u8>,
    pub border_margin: u32,
    pub face_color: Rgb<u8>,
    pub face_thickness: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            label_color: Rgb([0, 0, 100]),
            label_scale: 28.,
            label_spacing: 25,
            border_color: Rgb([0, 0, 100]),
            border_margin: 60,
            face_color: Rgb([0, 0, 255]),
            face_thickness: 2,
        }
    }
}

pub struct Overlay {
    style: OverlayStyle,
    font: Option<FontVec>,
}

impl Overlay {
    pub fn new(style: OverlayStyle) -> Overlay {
        Overlay { style, font: None }
    }

    pub fn with_font_file(mut self, path: &Path) -> Result<Overlay> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("{} is not a usable font", path.display()))?;
        debug!(path = %path.display(), "Loaded label font");
        self.font = Some(font);
        Ok(self)
    }

    /// Load the font at `path` when there is one; otherwise labels are
    /// skipped and everything else is still drawn.
    pub fn with_optional_font(self, path: Option<&Path>) -> Overlay {
        let Some(path) = path else {
            warn!("No label font found, frame labels will not be drawn");
            return self;
        };

        let style = self.style;
        match self.with_font_file(path) {
            Ok(overlay) => overlay,
            Err(e) => {
                warn!("{e:?}");
                Overlay::new(style)
            }
        }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Write `label` with its baseline at `row * label_spacing`.
    pub fn add_label(&self, img: &mut RgbImage, label: &str, row: u32) {
        let Some(font) = self.font.as_ref() else {
            return;
        };

        let scale = PxScale::from(self.style.label_scale);
        let ascent = font.as_scaled(scale).ascent();
        let baseline = (row * self.style.label_spacing) as f32;
        let top = (baseline - ascent).max(0.).round() as i32;

        drawing::draw_text_mut(img, self.style.label_color, 0, top, scale, font, label);
    }

    /// Hollow rectangle inset `border_margin` pixels from every edge.
    pub fn add_border(&self, img: &mut RgbImage) {
        let margin = self.style.border_margin;
        let (w, h) = img.dimensions();
        if w <= margin * 2 || h <= margin * 2 {
            return;
        }

        let border = Rect::from_corners(margin, margin, w - margin, h - margin);
        draw_box(img, border, self.style.border_color, 1);
    }

    pub fn add_boxes(&self, img: &mut RgbImage, boxes: &[Rect]) {
        for b in boxes {
            let outline = Rect::from_corners(b.x, b.y, b.right(), b.bottom());
            draw_box(img, outline, self.style.face_color, self.style.face_thickness);
        }
    }
}

/// Rich keypoint markers: a circle of the keypoint's size and, when it has
/// an orientation, a radius pointing along it.
pub fn draw_keypoints(img: &mut RgbImage, keypoints: &[Keypoint], color: Rgb<u8>) {
    for kp in keypoints {
        let center = kp.center.round();
        let radius = kp.radius().round().max(1.) as i32;
        drawing::draw_hollow_circle_mut(img, center, radius, color);

        if let Some(angle) = kp.angle {
            let theta = angle.to_radians();
            let end = (
                kp.center.x + kp.radius() * theta.cos(),
                kp.center.y + kp.radius() * theta.sin(),
            );
            drawing::draw_line_segment_mut(img, (kp.center.x, kp.center.y), end, color);
        }
    }
}

fn draw_box(img: &mut RgbImage, rect: Rect, color: Rgb<u8>, thickness: u32) {
    for i in 0..thickness.max(1) {
        let r = rect.inset(i);
        if r.is_empty() {
            break;
        }
        drawing::draw_hollow_rect_mut(img, r.into(), color);
    }
}
