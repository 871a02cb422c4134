use anyhow::{Context, Result};
use clap::Parser;
use framecap::capture::{CaptureLoop, FrameSource, SinkConfig};
use framecap::config::{CASCADE_FILE, DEFAULT_RECORDING, RECORDING_CODEC};
use framecap::detect::{CascadeClassifier, CascadeParams, FaceDetector};
use framecap_desktop::camera::CameraSource;
use framecap_desktop::video::FfmpegSink;
use framecap_desktop::window::WindowDisplay;
use framecap_desktop::{init_tracing, overlay};
use std::path::PathBuf;
use tracing::{error, info};

/// Show the camera with faces boxed; press 'r' to toggle recording, 'q' to quit.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Camera index
    #[arg(short, long, default_value = "0")]
    camera: u32,

    /// Recording destination
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_RECORDING)]
    output: PathBuf,

    /// Haar cascade used for face detection
    #[arg(long, value_name = "FILE", default_value = CASCADE_FILE)]
    cascade: PathBuf,

    /// TrueType font for the labels
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = CmdArgs::parse();

    let source = match CameraSource::open(args.camera) {
        Ok(source) => source,
        Err(e) => {
            error!("Error opening video: {e:?}");
            std::process::exit(1);
        }
    };

    let properties = source.properties();
    info!("Frame size: {} x {}", properties.width, properties.height);
    info!("Frame rate: {}", properties.fps);
    info!("Frame interval: {} ms", properties.frame_interval_ms());

    let classifier = CascadeClassifier::load(&args.cascade)
        .with_context(|| format!("loading face model {}", args.cascade.display()))?;
    let detector = FaceDetector::new(classifier, CascadeParams::default());

    let sink = FfmpegSink::open(SinkConfig {
        path: args.output.clone(),
        codec: RECORDING_CODEC,
        properties,
    })?;

    let summary = CaptureLoop::new(
        source,
        detector,
        sink,
        WindowDisplay::new("frame"),
        overlay(args.font.as_deref()),
        args.output,
    )
    .run()?;
    info!("{} frames shown, {} recorded", summary.frames, summary.recorded);

    Ok(())
}
