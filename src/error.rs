use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not decode image at {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("could not write image to {path:?}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cascade model not found at {0:?}")]
    ModelMissing(PathBuf),

    #[error("invalid cascade model: {0}")]
    Model(String),

    #[error("could not open capture source: {0}")]
    SourceOpen(String),

    #[error("frame is {actual_w}x{actual_h} but the sink was opened for {expected_w}x{expected_h}")]
    FrameSize {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    #[error("video sink failed")]
    Sink(#[from] std::io::Error),
}
