use anyhow::{Context, Result, bail};
use framecap::Error;
use framecap::capture::{FourCc, FrameSink, SinkConfig};
use image::RgbImage;
use tracing::{debug, error, warn};

use std::io::Write;
use std::process::{Child, Command, Stdio};

/// ffmpeg encoder behind a codec tag.
fn encoder_for(codec: FourCc) -> Result<&'static str> {
    Ok(match &codec.0 {
        b"MJPG" => "mjpeg",
        b"XVID" | b"MP4V" | b"FMP4" => "mpeg4",
        b"H264" | b"X264" | b"AVC1" => "libx264",
        _ => bail!("no encoder known for codec {codec}"),
    })
}

fn ffmpeg_args(config: &SinkConfig) -> Result<Vec<String>> {
    let encoder = encoder_for(config.codec)?;
    let props = config.properties;

    let mut args: Vec<String> = [
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
        &format!("{}x{}", props.width, props.height),
        "-r",
        &props.fps.to_string(),
        "-i",
        "-",
        "-an",
        "-c:v",
        encoder,
        "-vtag",
        config.codec.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(config.path.to_string_lossy().into_owned());

    Ok(args)
}

/// Video file sink: raw RGB frames piped into an `ffmpeg` child process.
pub struct FfmpegSink {
    config: SinkConfig,
    output_proc: Option<Child>,
    frames: u64,
}

impl FfmpegSink {
    pub fn open(config: SinkConfig) -> Result<FfmpegSink> {
        let args = ffmpeg_args(&config)?;
        debug!("ffmpeg {}", args.join(" "));

        let output_proc = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to start ffmpeg for recording")?;

        Ok(FfmpegSink {
            config,
            output_proc: Some(output_proc),
            frames: 0,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let props = self.config.properties;
        if frame.dimensions() != (props.width, props.height) {
            return Err(Error::FrameSize {
                expected_w: props.width,
                expected_h: props.height,
                actual_w: frame.width(),
                actual_h: frame.height(),
            }
            .into());
        }

        let Some(stdin) = self
            .output_proc
            .as_mut()
            .and_then(|proc| proc.stdin.as_mut())
        else {
            bail!("video sink already released");
        };
        stdin.write_all(frame.as_raw()).map_err(Error::Sink)?;
        self.frames += 1;

        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let Some(mut output_proc) = self.output_proc.take() else {
            return Ok(());
        };

        drop(output_proc.stdin.take());
        let status = output_proc.wait().map_err(Error::Sink)?;
        if !status.success() {
            // ffmpeg refuses to finalise a file that never received a frame
            warn!(
                "ffmpeg exited with {status} after {} frames for {}",
                self.frames,
                self.config.path.display()
            );
        }
        debug!(frames = self.frames, "Video sink released");

        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Some(mut output_proc) = self.output_proc.take() {
            match output_proc.kill() {
                Err(e) => error!("Failed to stop output process {e:?}"),
                Ok(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecap::capture::StreamProperties;
    use std::path::PathBuf;

    fn config(codec: FourCc) -> SinkConfig {
        SinkConfig {
            path: PathBuf::from("/tmp/recording.avi"),
            codec,
            properties: StreamProperties {
                width: 640,
                height: 480,
                fps: 30,
            },
        }
    }

    #[test]
    fn test_mjpg_args() -> Result<()> {
        let args = ffmpeg_args(&config(FourCc::MJPG))?;
        let joined = args.join(" ");

        assert!(joined.contains("-s 640x480"));
        assert!(joined.contains("-r 30"));
        assert!(joined.contains("-c:v mjpeg"));
        assert!(joined.contains("-vtag MJPG"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/recording.avi"));
        Ok(())
    }

    #[test]
    fn test_wrong_frame_size_rejected() {
        let mut sink = FfmpegSink {
            config: config(FourCc::MJPG),
            output_proc: None,
            frames: 0,
        };

        let err = sink.write(&RgbImage::new(320, 240)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::FrameSize {
                expected_w: 640,
                expected_h: 480,
                actual_w: 320,
                actual_h: 240,
            })
        ));
        assert_eq!(sink.frames, 0);
    }

    #[test]
    fn test_unknown_codec() {
        assert!(ffmpeg_args(&config(FourCc(*b"ZZZZ"))).is_err());
    }
}
