use anyhow::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;

pub use blob::{BlobDetector, BlobParams};
pub use cascade::{CascadeClassifier, CascadeParams, FaceDetector};

pub mod blob;
pub mod cascade;
mod group;

/// Anything that can find regions of interest on a frame.
///
/// Detectors may cache per-frame buffers, hence `&mut self`.
pub trait Detector {
    type Region;

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Self::Region>>;
}

/// 8-bit luma with BT.601 weights in 14-bit fixed point, so that grey
/// `(v, v, v)` maps back to exactly `v`.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    map_colors(frame, |Rgb([r, g, b])| {
        let y = r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13);
        Luma([(y >> 14) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_uses_bt601() {
        let img = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 233, 255]),
            1 => Rgb([255, 0, 0]),
            _ => Rgb([77, 77, 77]),
        });
        let gray = to_gray(&img);

        assert_eq!(gray.get_pixel(0, 0)[0], 242);
        assert_eq!(gray.get_pixel(1, 0)[0], 76);
        assert_eq!(gray.get_pixel(2, 0)[0], 77);
    }
}
