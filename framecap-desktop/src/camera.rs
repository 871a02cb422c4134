use anyhow::Result;
use framecap::Error;
use framecap::capture::{FrameSource, StreamProperties};
use image::RgbImage;
use tracing::{debug, error, warn};

use nokhwa::{
    Camera, nokhwa_initialize,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
};

/// Used when a driver reports a frame rate of 0.
const FALLBACK_FPS: u32 = 30;

pub struct CameraSource {
    camera: Camera,
    properties: StreamProperties,
    released: bool,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<CameraSource> {
        nokhwa_initialize(|granted| {
            debug!("User said {}", granted);
        });

        match query(ApiBackend::Auto) {
            Ok(cameras) => cameras
                .iter()
                .for_each(|cam| debug!("Found camera: {:?}", cam)),
            Err(e) => warn!("Could not list cameras: {e}"),
        }

        let mut camera = Camera::new(
            CameraIndex::Index(index),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        )
        .map_err(|e| Error::SourceOpen(format!("camera {index}: {e}")))?;
        camera
            .open_stream()
            .map_err(|e| Error::SourceOpen(format!("camera {index}: {e}")))?;

        let resolution = camera.resolution();
        let fps = match camera.frame_rate() {
            0 => {
                warn!("Camera {index} reports 0 fps, assuming {FALLBACK_FPS}");
                FALLBACK_FPS
            }
            fps => fps,
        };

        Ok(CameraSource {
            camera,
            properties: StreamProperties {
                width: resolution.width(),
                height: resolution.height(),
                fps,
            },
            released: false,
        })
    }
}

impl FrameSource for CameraSource {
    fn properties(&self) -> StreamProperties {
        self.properties
    }

    fn read(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame()?;
        let img: RgbImage = frame.decode_image::<RgbFormat>()?;
        Ok(img)
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.camera.stop_stream()?;
        Ok(())
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("Failed to stop camera stream {e:?}");
        }
    }
}
