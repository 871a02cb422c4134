use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::FourCc;

/// Haar cascade expected in the working directory.
pub const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

/// Still image annotated when no path is given.
pub const DEFAULT_IMAGE: &str = "image1.jpg";
pub const OUTPUT_SUFFIX: &str = "_grayscale";

pub const DEFAULT_RECORDING: &str = "/tmp/recording.avi";
pub const RECORDING_CODEC: FourCc = FourCc::MJPG;

/// Upper bound on the per-frame key poll.
pub const KEY_POLL: Duration = Duration::from_millis(1);

pub const QUIT_KEY: char = 'q';
pub const RECORD_KEY: char = 'r';

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Locate a font for frame labels. An explicit path wins when it exists,
/// otherwise the first installed system font from a short list is used.
pub fn find_font(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "font file does not exist; trying system fonts");
    }

    FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn explicit_font_wins() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let font = dir.path().join("label.ttf");
        std::fs::write(&font, b"not really a font")?;

        assert_eq!(find_font(Some(&font)), Some(font));
        Ok(())
    }

    #[test]
    fn missing_explicit_font_falls_back() {
        let found = find_font(Some(Path::new("/definitely/not/here.ttf")));
        assert_ne!(found, Some(PathBuf::from("/definitely/not/here.ttf")));
    }
}
