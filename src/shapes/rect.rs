/// Axis-aligned box, anchored at its top-left corner.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Into<imageproc::rect::Rect> for Rect {
    fn into(self) -> imageproc::rect::Rect {
        imageproc::rect::Rect::at(self.x as i32, self.y as i32).of_size(self.w, self.h)
    }
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Rect {
        Rect { x, y, w, h }
    }

    /// Rect spanning two inclusive corners.
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Rect {
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        Rect {
            x: left,
            y: top,
            w: right - left + 1,
            h: bottom - top + 1,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Shrink by `by` pixels on every side. Collapses to an empty rect
    /// rather than underflowing.
    pub fn inset(&self, by: u32) -> Rect {
        Rect {
            x: self.x + by,
            y: self.y + by,
            w: self.w.saturating_sub(by * 2),
            h: self.h.saturating_sub(by * 2),
        }
    }

    pub fn scale(&mut self, factor: f32) -> Rect {
        self.x = (self.x as f32 * factor).round() as u32;
        self.y = (self.y as f32 * factor).round() as u32;
        self.w = (self.w as f32 * factor).round() as u32;
        self.h = (self.h as f32 * factor).round() as u32;

        *self
    }

    /// Does `self` sit inside `other` once `other` is grown by `dx`/`dy`?
    pub fn inside(&self, other: &Rect, dx: i64, dy: i64) -> bool {
        let (x, y, r, b) = self.edges();
        let (ox, oy, or, ob) = other.edges();
        x >= ox - dx && y >= oy - dy && r <= or + dx && b <= ob + dy
    }

    pub fn edges(&self) -> (i64, i64, i64, i64) {
        (
            self.x as i64,
            self.y as i64,
            self.right() as i64,
            self.bottom() as i64,
        )
    }
}
