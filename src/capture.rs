use anyhow::Result;
use image::RgbImage;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, debug, info, span, warn};

use crate::config::KEY_POLL;
use crate::detect::Detector;
use crate::overlay::Overlay;
use crate::session::{KeyAction, Session};
use crate::shapes::Rect;

/// Read-only properties of a capture stream, queried once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProperties {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamProperties {
    pub fn frame_interval_ms(&self) -> u64 {
        match self.fps {
            0 => 0,
            fps => 1000 / fps as u64,
        }
    }
}

/// Four-character codec tag, e.g. `MJPG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const MJPG: FourCc = FourCc(*b"MJPG");

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a video sink is bound to for its whole lifetime.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub path: PathBuf,
    pub codec: FourCc,
    pub properties: StreamProperties,
}

pub trait FrameSource {
    fn properties(&self) -> StreamProperties;

    /// Next frame. An error means the source can no longer deliver.
    fn read(&mut self) -> Result<RgbImage>;

    fn release(&mut self) -> Result<()>;
}

pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    fn release(&mut self) -> Result<()>;
}

pub trait Display {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Wait for a single key press, at most `timeout` (forever on `None`).
    fn poll_key(&mut self, timeout: Option<Duration>) -> Result<Option<char>>;

    fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Frames acquired from the source.
    pub frames: u64,
    /// Frames handed to the sink.
    pub recorded: u64,
}

/// Face boxes, then the metadata and counter labels, then the border.
/// Later draws win where they overlap.
pub fn annotate_frame(
    overlay: &Overlay,
    frame: &mut RgbImage,
    metadata: &str,
    cur: u64,
    faces: &[Rect],
) {
    overlay.add_boxes(frame, faces);
    overlay.add_label(frame, metadata, 1);
    overlay.add_label(frame, &format!("cur: {cur} faces: {}", faces.len()), 2);
    overlay.add_border(frame);
}

pub struct CaptureLoop<S, D, W, V>
where
    S: FrameSource,
    D: Detector<Region = Rect>,
    W: FrameSink,
    V: Display,
{
    source: S,
    detector: D,
    sink: W,
    display: V,
    overlay: Overlay,
    output: PathBuf,
}

impl<S, D, W, V> CaptureLoop<S, D, W, V>
where
    S: FrameSource,
    D: Detector<Region = Rect>,
    W: FrameSink,
    V: Display,
{
    pub fn new(
        source: S,
        detector: D,
        sink: W,
        display: V,
        overlay: Overlay,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            detector,
            sink,
            display,
            overlay,
            output: output.into(),
        }
    }

    /// Run until the source dries up or the operator quits. Source and sink
    /// are released on every exit path, errors included.
    pub fn run(mut self) -> Result<CaptureSummary> {
        let result = self.run_frames();

        self.display.close();
        let source_released = self.source.release();
        let sink_released = self.sink.release();

        let summary = result?;
        source_released?;
        sink_released?;

        info!(
            frames = summary.frames,
            recorded = summary.recorded,
            "Capture finished"
        );
        Ok(summary)
    }

    fn run_frames(&mut self) -> Result<CaptureSummary> {
        let props = self.source.properties();
        let metadata = format!("{} x {} {} fps", props.width, props.height, props.fps);

        let mut session = Session::new();
        let mut recorded = 0u64;

        while !session.is_stopped() {
            let span = span!(Level::DEBUG, "frame_loop_iter", cur = session.cur());
            let _guard = span.enter();

            let mut frame = match self.source.read() {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Capture source ended: {e:?}");
                    session.stop();
                    break;
                }
            };

            let faces = match self.detector.detect(&frame) {
                Ok(faces) => faces,
                Err(e) => {
                    warn!("Face detection failed: {e:?}");
                    Vec::new()
                }
            };

            annotate_frame(&self.overlay, &mut frame, &metadata, session.cur(), &faces);

            if session.is_recording() {
                self.sink.write(&frame)?;
                recorded += 1;
            }
            session.advance();

            self.display.show(&frame)?;
            if let Some(key) = self.display.poll_key(Some(KEY_POLL))? {
                match session.handle_key(key) {
                    KeyAction::Toggled(recording) => {
                        info!("Recording: {} [ {} ]", recording, self.output.display())
                    }
                    KeyAction::Quit => debug!("Quit requested"),
                    KeyAction::Ignored => {}
                }
            }
        }

        Ok(CaptureSummary {
            frames: session.cur(),
            recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayStyle;
    use anyhow::{Error, bail};
    use image::Rgb;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    const SIZE: u32 = 200;

    #[derive(Default)]
    struct Log {
        written: Vec<u8>,
        source_released: u32,
        sink_released: u32,
        polls: u64,
    }

    type SharedLog = Rc<RefCell<Log>>;

    /// Yields `total` frames tagged 1..=total in the bottom-right pixel.
    struct ScriptedSource {
        total: u8,
        next: u8,
        log: SharedLog,
    }

    impl FrameSource for ScriptedSource {
        fn properties(&self) -> StreamProperties {
            StreamProperties {
                width: SIZE,
                height: SIZE,
                fps: 30,
            }
        }

        fn read(&mut self) -> Result<RgbImage> {
            if self.next >= self.total {
                bail!("end of stream");
            }
            self.next += 1;
            let mut frame = RgbImage::from_pixel(SIZE, SIZE, Rgb([255, 255, 255]));
            frame.put_pixel(SIZE - 1, SIZE - 1, Rgb([self.next, 0, 0]));
            Ok(frame)
        }

        fn release(&mut self) -> Result<()> {
            self.log.borrow_mut().source_released += 1;
            Ok(())
        }
    }

    struct TaggingSink {
        log: SharedLog,
        fail: bool,
    }

    impl FrameSink for TaggingSink {
        fn write(&mut self, frame: &RgbImage) -> Result<()> {
            if self.fail {
                bail!("disk full");
            }
            let tag = frame.get_pixel(SIZE - 1, SIZE - 1)[0];
            self.log.borrow_mut().written.push(tag);
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.log.borrow_mut().sink_released += 1;
            Ok(())
        }
    }

    /// Presses `keys[n]` on the n-th poll (1-based, one poll per frame).
    struct ScriptedDisplay {
        keys: HashMap<u64, char>,
        log: SharedLog,
    }

    impl Display for ScriptedDisplay {
        fn show(&mut self, _frame: &RgbImage) -> Result<()> {
            Ok(())
        }

        fn poll_key(&mut self, timeout: Option<Duration>) -> Result<Option<char>> {
            assert_eq!(timeout, Some(KEY_POLL));
            let mut log = self.log.borrow_mut();
            log.polls += 1;
            Ok(self.keys.get(&log.polls).copied())
        }
    }

    struct FixedFaces(Vec<Rect>);

    impl Detector for FixedFaces {
        type Region = Rect;

        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Rect>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl Detector for BrokenDetector {
        type Region = Rect;

        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Rect>> {
            Err(Error::msg("model exploded"))
        }
    }

    fn run_script<D: Detector<Region = Rect>>(
        frames: u8,
        keys: &[(u64, char)],
        detector: D,
        fail_sink: bool,
    ) -> (Result<CaptureSummary>, SharedLog) {
        let log = SharedLog::default();
        let capture = CaptureLoop::new(
            ScriptedSource {
                total: frames,
                next: 0,
                log: log.clone(),
            },
            detector,
            TaggingSink {
                log: log.clone(),
                fail: fail_sink,
            },
            ScriptedDisplay {
                keys: keys.iter().copied().collect(),
                log: log.clone(),
            },
            Overlay::new(OverlayStyle::default()),
            "/tmp/recording.avi",
        );
        (capture.run(), log)
    }

    #[test]
    fn test_records_only_while_recording() -> Result<()> {
        // 'r' after frame 2 arms recording for frame 3, 'r' after frame 7
        // disarms it before frame 8
        let (result, log) = run_script(10, &[(2, 'r'), (7, 'r')], FixedFaces(vec![]), false);
        let summary = result?;
        let log = log.borrow();

        assert_eq!(log.written, vec![3, 4, 5, 6, 7]);
        assert_eq!(
            summary,
            CaptureSummary {
                frames: 10,
                recorded: 5
            }
        );
        assert_eq!(log.source_released, 1);
        assert_eq!(log.sink_released, 1);
        Ok(())
    }

    #[test]
    fn test_idle_session_writes_nothing() -> Result<()> {
        let (result, log) = run_script(6, &[(3, 'x'), (4, 'R')], FixedFaces(vec![]), false);
        let summary = result?;

        assert_eq!(summary.frames, 6);
        assert_eq!(summary.recorded, 0);
        assert!(log.borrow().written.is_empty());
        Ok(())
    }

    #[test]
    fn test_quit_stops_early() -> Result<()> {
        let (result, log) = run_script(10, &[(1, 'r'), (4, 'q')], FixedFaces(vec![]), false);
        let summary = result?;
        let log = log.borrow();

        assert_eq!(summary.frames, 4);
        assert_eq!(log.written, vec![2, 3, 4]);
        assert_eq!(log.polls, 4);
        assert_eq!(log.source_released, 1);
        assert_eq!(log.sink_released, 1);
        Ok(())
    }

    #[test]
    fn test_empty_source_ends_cleanly() -> Result<()> {
        let (result, log) = run_script(0, &[], FixedFaces(vec![]), false);
        assert_eq!(result?.frames, 0);
        assert_eq!(log.borrow().polls, 0);
        assert_eq!(log.borrow().sink_released, 1);
        Ok(())
    }

    #[test]
    fn test_sink_failure_still_releases() {
        let (result, log) = run_script(5, &[(1, 'r')], FixedFaces(vec![]), true);
        assert!(result.is_err());

        let log = log.borrow();
        assert_eq!(log.source_released, 1);
        assert_eq!(log.sink_released, 1);
    }

    #[test]
    fn test_detection_failure_keeps_running() -> Result<()> {
        let (result, _log) = run_script(3, &[], BrokenDetector, false);
        assert_eq!(result?.frames, 3);
        Ok(())
    }

    #[test]
    fn test_face_boxes_drawn_under_border() {
        let overlay = Overlay::new(OverlayStyle::default());
        let style = *overlay.style();
        let mut frame = RgbImage::from_pixel(SIZE, SIZE, Rgb([255, 255, 255]));

        // straddles the vertical border line at x = 60
        let face = Rect::new(50, 50, 20, 20);
        annotate_frame(&overlay, &mut frame, "200 x 200 30 fps", 0, &[face]);

        assert_eq!(*frame.get_pixel(60, 69), style.border_color);
        assert_eq!(*frame.get_pixel(50, 55), style.face_color);
        assert_eq!(*frame.get_pixel(100, 60), style.border_color);
    }

    #[test]
    fn test_frame_interval() {
        let props = StreamProperties {
            width: 640,
            height: 480,
            fps: 30,
        };
        assert_eq!(props.frame_interval_ms(), 33);
        assert_eq!(StreamProperties { fps: 0, ..props }.frame_interval_ms(), 0);
    }

    #[test]
    fn test_fourcc_display() {
        assert_eq!(FourCc::MJPG.to_string(), "MJPG");
    }
}
