use anyhow::Result;
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{Contour, find_contours};
use imageproc::map::map_colors;
use imageproc::point::Point;
use tracing::{debug, trace};

use super::{Detector, to_gray};
use crate::shapes::{Keypoint, PointF32};

/// Blob detector configuration. The defaults are the settings the still
/// image annotator runs with: a full intensity sweep, area filtering down
/// to a single pixel, and no shape filters.
#[derive(Debug, Clone, Copy)]
pub struct BlobParams {
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub threshold_step: u8,
    pub min_repeatability: usize,
    pub min_dist_between_blobs: f32,
    pub filter_by_color: bool,
    pub blob_color: u8,
    pub filter_by_area: bool,
    pub min_area: f32,
    pub max_area: f32,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            min_threshold: 1,
            max_threshold: 255,
            threshold_step: 10,
            min_repeatability: 2,
            min_dist_between_blobs: 10.,
            filter_by_color: true,
            blob_color: 0,
            filter_by_area: true,
            min_area: 1.,
            max_area: 5000.,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Center {
    location: PointF32,
    radius: f32,
    area: f32,
}

pub struct BlobDetector {
    params: BlobParams,
}

impl BlobDetector {
    pub fn new(params: BlobParams) -> BlobDetector {
        BlobDetector { params }
    }

    /*
    Sweep a binarisation threshold across the intensity range. Every
    threshold yields a set of contour centers; centers that line up across
    thresholds are merged into one group, and groups seen often enough
    become keypoints.
     */
    pub fn detect_gray(&self, gray: &GrayImage) -> Vec<Keypoint> {
        let mut groups: Vec<Vec<Center>> = Vec::new();
        let step = self.params.threshold_step.max(1) as u32;

        let mut threshold = self.params.min_threshold as u32;
        while threshold < self.params.max_threshold as u32 {
            let binary = map_colors(gray, |p: Luma<u8>| {
                if p[0] as u32 > threshold {
                    Luma([255u8])
                } else {
                    Luma([0u8])
                }
            });

            let centers = self.find_centers(&binary);
            trace!(threshold, found = centers.len(), "blob centers");
            merge_centers(&mut groups, centers, self.params.min_dist_between_blobs);

            threshold += step;
        }

        let keypoints: Vec<Keypoint> = groups
            .into_iter()
            .filter(|g| g.len() >= self.params.min_repeatability)
            .map(|g| {
                let n = g.len() as f32;
                let (sx, sy) = g
                    .iter()
                    .fold((0., 0.), |(x, y), c| (x + c.location.x, y + c.location.y));
                let median = g[g.len() / 2];

                Keypoint {
                    center: PointF32::new(sx / n, sy / n),
                    size: median.radius * 2.,
                    angle: None,
                    area: median.area,
                }
            })
            .collect();

        debug!("Found {} blobs", keypoints.len());
        keypoints
    }

    fn find_centers(&self, binary: &GrayImage) -> Vec<Center> {
        find_contours::<i32>(binary)
            .iter()
            .filter_map(|contour| self.measure(contour, binary))
            .collect()
    }

    fn measure(&self, contour: &Contour<i32>, binary: &GrayImage) -> Option<Center> {
        let moments = Moments::of(&contour.points);
        if moments.m00 == 0. {
            return None;
        }

        let area = moments.m00 as f32;
        if self.params.filter_by_area && (area < self.params.min_area || area >= self.params.max_area)
        {
            return None;
        }

        let location = PointF32::new(
            (moments.m10 / moments.m00) as f32,
            (moments.m01 / moments.m00) as f32,
        );

        if self.params.filter_by_color {
            let (x, y) = location.round();
            if x < 0 || y < 0 || x as u32 >= binary.width() || y as u32 >= binary.height() {
                return None;
            }
            if binary.get_pixel(x as u32, y as u32)[0] != self.params.blob_color {
                return None;
            }
        }

        let mut dists: Vec<f32> = contour
            .points
            .iter()
            .map(|p| location.dist(&PointF32::new(p.x as f32, p.y as f32)))
            .collect();
        dists.sort_by(f32::total_cmp);
        let n = dists.len();
        let radius = (dists[(n - 1) / 2] + dists[n / 2]) / 2.;

        Some(Center {
            location,
            radius,
            area,
        })
    }
}

impl Detector for BlobDetector {
    type Region = Keypoint;

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Keypoint>> {
        Ok(self.detect_gray(&to_gray(frame)))
    }
}

// Only compared against groups from earlier thresholds, so two blobs found
// at the same threshold never merge with each other.
fn merge_centers(groups: &mut Vec<Vec<Center>>, centers: Vec<Center>, min_dist: f32) {
    let existing = groups.len();
    let mut fresh = Vec::new();

    for center in centers {
        let mut is_new = true;
        for group in groups[..existing].iter_mut() {
            let median = group[group.len() / 2];
            let dist = median.location.dist(&center.location);
            is_new = dist >= min_dist && dist >= median.radius && dist >= center.radius;
            if !is_new {
                // groups stay sorted by radius so the middle entry is the median
                let pos = group.partition_point(|c| c.radius <= center.radius);
                group.insert(pos, center);
                break;
            }
        }

        if is_new {
            fresh.push(vec![center]);
        }
    }

    groups.extend(fresh);
}

/// Spatial moments of a closed polygon (Green's theorem), orientation
/// independent.
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
}

impl Moments {
    fn of(points: &[Point<i32>]) -> Moments {
        let n = points.len();
        if n < 3 {
            return Moments {
                m00: 0.,
                m10: 0.,
                m01: 0.,
            };
        }

        let (mut a00, mut a10, mut a01) = (0f64, 0f64, 0f64);
        for i in 0..n {
            let p = points[i];
            let q = points[(i + 1) % n];
            let (xi, yi, xj, yj) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
            let cross = xi * yj - xj * yi;
            a00 += cross;
            a10 += cross * (xi + xj);
            a01 += cross * (yi + yj);
        }

        if a00 < 0. {
            a00 = -a00;
            a10 = -a10;
            a01 = -a01;
        }

        Moments {
            m00: a00 / 2.,
            m10: a10 / 6.,
            m01: a01 / 6.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_circle_mut;

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255u8, 255u8, 255u8]))
    }

    #[test]
    fn test_square_moments() {
        let square = [
            Point::new(0, 0),
            Point::new(0, 10),
            Point::new(10, 10),
            Point::new(10, 0),
        ];
        let m = Moments::of(&square);
        assert_eq!(m.m00, 100.);
        assert_eq!(m.m10 / m.m00, 5.);
        assert_eq!(m.m01 / m.m00, 5.);
    }

    #[test]
    fn test_uniform_image_has_no_blobs() -> Result<()> {
        let mut detector = BlobDetector::new(BlobParams::default());
        let img = RgbImage::from_pixel(120, 80, Rgb([128u8, 128u8, 128u8]));
        assert!(detector.detect(&img)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_finds_dark_disc() -> Result<()> {
        let mut img = white(200, 200);
        draw_filled_circle_mut(&mut img, (100, 100), 20, Rgb([0u8, 0u8, 0u8]));

        let mut detector = BlobDetector::new(BlobParams::default());
        let blobs = detector.detect(&img)?;

        assert_eq!(blobs.len(), 1);
        let blob = blobs[0];
        assert!((blob.center.x - 100.).abs() < 1.5, "{blob:?}");
        assert!((blob.center.y - 100.).abs() < 1.5, "{blob:?}");
        assert!(blob.size > 36. && blob.size < 48., "{blob:?}");
        assert_eq!(blob.angle, None);
        Ok(())
    }

    #[test]
    fn test_min_area_bounds_every_blob() -> Result<()> {
        let mut img = white(200, 200);
        draw_filled_circle_mut(&mut img, (130, 130), 20, Rgb([0u8, 0u8, 0u8]));
        draw_filled_circle_mut(&mut img, (40, 40), 4, Rgb([0u8, 0u8, 0u8]));

        let mut everything = BlobDetector::new(BlobParams::default());
        assert_eq!(everything.detect(&img)?.len(), 2);

        for min_area in [1., 50., 200., 1000.] {
            let mut detector = BlobDetector::new(BlobParams {
                min_area,
                ..BlobParams::default()
            });
            let blobs = detector.detect(&img)?;
            assert!(blobs.iter().all(|b| b.area >= min_area), "{blobs:?}");
        }

        let mut large_only = BlobDetector::new(BlobParams {
            min_area: 200.,
            ..BlobParams::default()
        });
        let blobs = large_only.detect(&img)?;
        assert_eq!(blobs.len(), 1);
        assert!((blobs[0].center.x - 130.).abs() < 1.5);
        Ok(())
    }

    #[test]
    fn test_colour_disc_seen_at_one_threshold_only() -> Result<()> {
        // luma 242: only the 251 threshold separates it from the background
        let mut img = white(120, 120);
        draw_filled_circle_mut(&mut img, (60, 60), 15, Rgb([255u8, 233u8, 255u8]));

        let mut detector = BlobDetector::new(BlobParams::default());
        assert!(detector.detect(&img)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_single_threshold_is_not_repeatable() -> Result<()> {
        let mut img = white(100, 100);
        draw_filled_circle_mut(&mut img, (50, 50), 10, Rgb([0u8, 0u8, 0u8]));

        // one threshold means every group has exactly one member
        let mut detector = BlobDetector::new(BlobParams {
            min_threshold: 100,
            max_threshold: 101,
            ..BlobParams::default()
        });
        assert!(detector.detect(&img)?.is_empty());
        Ok(())
    }
}
