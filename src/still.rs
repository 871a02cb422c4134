use anyhow::Result;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::Error;
use crate::capture::Display;
use crate::config::OUTPUT_SUFFIX;
use crate::detect::{BlobDetector, BlobParams, Detector};
use crate::overlay::draw_keypoints;
use crate::shapes::Keypoint;

/// Blob marker colour.
pub const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// `<dir>/<stem>_grayscale.<ext>` next to `input`.
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };
    input.with_file_name(name)
}

/// Detect blobs on `img` and draw them in place.
pub fn annotate(img: &mut RgbImage, detector: &mut BlobDetector) -> Result<Vec<Keypoint>> {
    let keypoints = detector.detect(img)?;
    draw_keypoints(img, &keypoints, KEYPOINT_COLOR);
    Ok(keypoints)
}

/// Load `input`, mark its blobs, optionally preview the result until a key
/// is pressed, then write it to `output`. Nothing is written when `input`
/// does not decode.
pub fn annotate_file(
    input: &Path,
    output: &Path,
    params: BlobParams,
    preview: Option<&mut dyn Display>,
) -> Result<Vec<Keypoint>> {
    let mut img = image::open(input)
        .map_err(|source| Error::Decode {
            path: input.to_path_buf(),
            source,
        })?
        .into_rgb8();
    debug!(
        width = img.width(),
        height = img.height(),
        "Decoded {}",
        input.display()
    );

    let mut detector = BlobDetector::new(params);
    let keypoints = annotate(&mut img, &mut detector)?;
    info!("Marked {} blobs on {}", keypoints.len(), input.display());

    if let Some(display) = preview {
        display.show(&img)?;
        let key = display.poll_key(None)?;
        debug!("Preview dismissed with {key:?}");
        display.close();
    }

    img.save(output).map_err(|source| Error::Encode {
        path: output.to_path_buf(),
        source,
    })?;
    info!("Result at {:?}", output);

    Ok(keypoints)
}
