use crate::config::{QUIT_KEY, RECORD_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopped,
}

/// What a key press did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    /// Recording switched; carries the new recording flag.
    Toggled(bool),
    Ignored,
}

/// Mutable state of one capture run: the recording mode and the number of
/// frames acquired so far.
#[derive(Debug, Clone)]
pub struct Session {
    state: CaptureState,
    cur: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Session {
        Session {
            state: CaptureState::Idle,
            cur: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn cur(&self) -> u64 {
        self.cur
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn is_stopped(&self) -> bool {
        self.state == CaptureState::Stopped
    }

    /// Count one acquired frame, whatever the recording mode.
    pub fn advance(&mut self) {
        self.cur += 1;
    }

    pub fn stop(&mut self) {
        self.state = CaptureState::Stopped;
    }

    /// Flip between idle and recording. A stopped session stays stopped.
    pub fn toggle_recording(&mut self) -> bool {
        self.state = match self.state {
            CaptureState::Idle => CaptureState::Recording,
            CaptureState::Recording => CaptureState::Idle,
            CaptureState::Stopped => CaptureState::Stopped,
        };
        self.is_recording()
    }

    pub fn handle_key(&mut self, key: char) -> KeyAction {
        if self.is_stopped() {
            return KeyAction::Ignored;
        }

        match key {
            QUIT_KEY => {
                self.stop();
                KeyAction::Quit
            }
            RECORD_KEY => KeyAction::Toggled(self.toggle_recording()),
            _ => KeyAction::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_parity() {
        for presses in 0..7 {
            let mut session = Session::new();
            for _ in 0..presses {
                session.handle_key('r');
            }
            let expected = if presses % 2 == 0 {
                CaptureState::Idle
            } else {
                CaptureState::Recording
            };
            assert_eq!(session.state(), expected, "{presses} presses");
        }
    }

    #[test]
    fn test_quit_is_terminal() {
        let mut session = Session::new();
        assert_eq!(session.handle_key('r'), KeyAction::Toggled(true));
        assert_eq!(session.handle_key('q'), KeyAction::Quit);
        assert!(session.is_stopped());
        assert_eq!(session.handle_key('r'), KeyAction::Ignored);
        assert!(session.is_stopped());
    }

    #[test]
    fn test_other_keys_ignored() {
        let mut session = Session::new();
        for key in ['a', 'R', 'Q', ' ', '\u{1b}'] {
            assert_eq!(session.handle_key(key), KeyAction::Ignored);
        }
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn test_counter_ignores_recording() {
        let mut session = Session::new();
        session.advance();
        session.toggle_recording();
        session.advance();
        session.toggle_recording();
        session.advance();
        assert_eq!(session.cur(), 3);
    }
}
