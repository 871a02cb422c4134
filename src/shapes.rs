pub mod keypoint;
pub mod point;
pub mod rect;

pub use keypoint::Keypoint;
pub use point::PointF32;
pub use rect::Rect;
