use anyhow::{Context, Result};
use framecap::capture::Display;
use framecap::config::QUIT_KEY;
use image::RgbImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use tracing::debug;

use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(1);

/// Preview window. Created on the first frame, sized to it.
pub struct WindowDisplay {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
}

impl WindowDisplay {
    pub fn new(title: &str) -> WindowDisplay {
        WindowDisplay {
            title: title.to_string(),
            window: None,
            buffer: vec![],
        }
    }

    fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window> {
        let reuse = matches!(&self.window, Some(w) if w.get_size() == (width, height));
        if !reuse {
            debug!("Opening {width}x{height} window");
            let mut window = Window::new(&self.title, width, height, WindowOptions::default())
                .context("failed to create preview window")?;
            window.limit_update_rate(None);
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .context("preview window missing after creation")
    }

    fn pressed(window: &Window) -> Option<char> {
        window
            .get_keys_pressed(KeyRepeat::No)
            .into_iter()
            .find_map(key_char)
    }
}

impl Display for WindowDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        buffer.extend(
            frame
                .pixels()
                .map(|p| (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32),
        );

        let window = self.window_for(width, height)?;
        let result = window
            .update_with_buffer(&buffer, width, height)
            .context("failed to draw frame to window");
        self.buffer = buffer;
        result
    }

    fn poll_key(&mut self, timeout: Option<Duration>) -> Result<Option<char>> {
        let Some(window) = self.window.as_mut() else {
            return Ok(None);
        };
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // A closed window can't deliver keys any more; treat it as quit
            if !window.is_open() {
                return Ok(Some(QUIT_KEY));
            }
            if let Some(c) = Self::pressed(window) {
                return Ok(Some(c));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            std::thread::sleep(IDLE_POLL);
            window.update();
        }
    }

    fn close(&mut self) {
        if self.window.take().is_some() {
            debug!("Closed window {}", self.title);
        }
    }
}

fn key_char(key: Key) -> Option<char> {
    let c = match key {
        Key::A => 'a',
        Key::B => 'b',
        Key::C => 'c',
        Key::D => 'd',
        Key::E => 'e',
        Key::F => 'f',
        Key::G => 'g',
        Key::H => 'h',
        Key::I => 'i',
        Key::J => 'j',
        Key::K => 'k',
        Key::L => 'l',
        Key::M => 'm',
        Key::N => 'n',
        Key::O => 'o',
        Key::P => 'p',
        Key::Q => 'q',
        Key::R => 'r',
        Key::S => 's',
        Key::T => 't',
        Key::U => 'u',
        Key::V => 'v',
        Key::W => 'w',
        Key::X => 'x',
        Key::Y => 'y',
        Key::Z => 'z',
        Key::Key0 => '0',
        Key::Key1 => '1',
        Key::Key2 => '2',
        Key::Key3 => '3',
        Key::Key4 => '4',
        Key::Key5 => '5',
        Key::Key6 => '6',
        Key::Key7 => '7',
        Key::Key8 => '8',
        Key::Key9 => '9',
        Key::Space => ' ',
        Key::Enter => '\n',
        Key::Escape => '\u{1b}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecap::config::RECORD_KEY;

    #[test]
    fn test_key_mapping() {
        assert_eq!(key_char(Key::Q), Some(QUIT_KEY));
        assert_eq!(key_char(Key::R), Some(RECORD_KEY));
        assert_eq!(key_char(Key::Key7), Some('7'));
        assert_eq!(key_char(Key::LeftShift), None);
    }

    #[test]
    fn test_poll_without_window() -> Result<()> {
        let mut display = WindowDisplay::new("test");
        assert_eq!(display.poll_key(Some(Duration::from_millis(1)))?, None);
        display.close();
        Ok(())
    }
}
