use anyhow::{Context, Result, ensure};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use std::path::Path;
use tracing::{debug, info};

use super::{Detector, to_gray};
use super::group::group_rectangles;
use crate::Error;
use crate::shapes::Rect;
use model::Cascade;

mod model;

/// Relative tolerance when clustering overlapping detections.
const GROUP_EPS: f32 = 0.2;
/// Windows whose intensity standard deviation is at or below this are
/// rejected before any stage runs.
const MIN_WINDOW_STDDEV: f64 = 10.;

#[derive(Debug, Clone, Copy)]
pub struct CascadeParams {
    pub scale_factor: f32,
    pub min_neighbors: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 4,
        }
    }
}

pub struct CascadeClassifier {
    cascade: Cascade,
}

struct Integrals {
    sum: Image<Luma<u64>>,
    squares: Image<Luma<u64>>,
}

impl Integrals {
    fn new(img: &GrayImage) -> Integrals {
        Integrals {
            sum: integral_image::<_, u64>(img),
            squares: integral_squared_image::<_, u64>(img),
        }
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        rect_sum(&self.sum, x, y, w, h)
    }

    fn squares(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        rect_sum(&self.squares, x, y, w, h)
    }
}

fn rect_sum(ii: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let at = |x: u32, y: u32| ii.get_pixel(x, y)[0];
    at(x + w, y + h) + at(x, y) - at(x + w, y) - at(x, y + h)
}

impl CascadeClassifier {
    pub fn load(path: impl AsRef<Path>) -> Result<CascadeClassifier> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::ModelMissing(path.to_path_buf()).into());
        }

        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cascade {}", path.display()))?;
        let classifier = Self::from_xml(&xml)?;

        info!(
            path = %path.display(),
            stages = classifier.cascade.stages.len(),
            features = classifier.cascade.features.len(),
            "Loaded cascade"
        );
        Ok(classifier)
    }

    pub fn from_xml(xml: &str) -> Result<CascadeClassifier> {
        Ok(CascadeClassifier {
            cascade: model::parse(xml)?,
        })
    }

    /// Detection window size at scale 1.
    pub fn window(&self) -> (u32, u32) {
        (self.cascade.width, self.cascade.height)
    }

    /*
    Shrink the image by `scale_factor` per level until it no longer fits
    the detection window. On every level slide the window (2px steps, 1px
    once the image is under half size), run it through the stages, and
    map accepted windows back to full-size coordinates. Overlapping hits
    are then clustered; `min_neighbors` is the number of hits a cluster
    needs to exceed to survive.
     */
    pub fn detect_multi_scale(
        &self,
        gray: &GrayImage,
        scale_factor: f32,
        min_neighbors: u32,
    ) -> Result<Vec<Rect>> {
        ensure!(
            scale_factor > 1.,
            "scale factor must be greater than 1, got {scale_factor}"
        );

        let (ww, wh) = self.window();
        let mut candidates = Vec::new();
        let mut factor = 1f32;

        loop {
            let sw = (gray.width() as f32 / factor).round() as u32;
            let sh = (gray.height() as f32 / factor).round() as u32;
            if sw < ww || sh < wh {
                break;
            }

            let resized;
            let scaled = if sw == gray.width() && sh == gray.height() {
                gray
            } else {
                resized = imageops::resize(gray, sw, sh, FilterType::Triangle);
                &resized
            };

            let integrals = Integrals::new(scaled);
            let step = if factor > 2. { 1 } else { 2 };
            for y in (0..=sh - wh).step_by(step) {
                for x in (0..=sw - ww).step_by(step) {
                    if self.classify(&integrals, x, y) {
                        candidates.push(Rect::new(x, y, ww, wh).scale(factor));
                    }
                }
            }

            factor *= scale_factor;
        }

        debug!(candidates = candidates.len(), "cascade windows accepted");
        Ok(group_rectangles(candidates, min_neighbors, GROUP_EPS))
    }

    fn classify(&self, ii: &Integrals, x: u32, y: u32) -> bool {
        let (nw, nh) = (self.cascade.width - 2, self.cascade.height - 2);
        let area = (nw * nh) as f64;
        let sum = ii.sum(x + 1, y + 1, nw, nh) as f64;
        let squares = ii.squares(x + 1, y + 1, nw, nh) as f64;

        // area * stddev
        let nf = area * squares - sum * sum;
        if nf <= 0. {
            return false;
        }
        let nf = nf.sqrt();
        if nf <= area * MIN_WINDOW_STDDEV {
            return false;
        }
        let norm = (1. / nf) as f32;

        for stage in &self.cascade.stages {
            let total: f32 = stage
                .classifiers
                .iter()
                .map(|weak| weak.evaluate(|f| self.feature_value(ii, f, x, y) * norm))
                .sum();
            if total < stage.threshold {
                return false;
            }
        }

        true
    }

    fn feature_value(&self, ii: &Integrals, feature: usize, x: u32, y: u32) -> f32 {
        self.cascade.features[feature]
            .rects
            .iter()
            .map(|r| r.weight * ii.sum(x + r.x, y + r.y, r.w, r.h) as f32)
            .sum()
    }
}

/// Face detection backed by a Haar cascade.
pub struct FaceDetector {
    classifier: CascadeClassifier,
    params: CascadeParams,
}

impl FaceDetector {
    pub fn new(classifier: CascadeClassifier, params: CascadeParams) -> FaceDetector {
        FaceDetector { classifier, params }
    }
}

impl Detector for FaceDetector {
    type Region = Rect;

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Rect>> {
        let gray = to_gray(frame);
        self.classifier
            .detect_multi_scale(&gray, self.params.scale_factor, self.params.min_neighbors)
    }
}
