// Display - Lagged mirror of the last scheduled step
// The engine publishes it; user interfaces only observe it

use super::section::Section;
use super::transport::{Mode, TransportState};
use serde::Serialize;
use std::fmt;

/// What the user should see: the step that was last handed to the emitter
///
/// Never the pending playhead position, which can run ahead of the audio by
/// the whole lookahead window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DisplayState {
    pub mode: Mode,
    pub transport: TransportState,
    /// Classic beat (zero-indexed)
    pub beat: Option<usize>,
    /// Classic subdivision within the beat (zero-indexed)
    pub subdivision: Option<usize>,
    /// Clave slot (zero-indexed)
    pub clave_index: Option<usize>,
    /// TimeMap section being played
    pub active_section: Option<usize>,
    /// TimeMap measure within the section as (one-based measure, total)
    pub section_progress: Option<(u32, u32)>,
}

impl DisplayState {
    /// Blank state for a mode, as shown right after Stop
    pub fn idle(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.transport == TransportState::Running
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.transport, self.mode)?;
        if let (Some(beat), Some(sub)) = (self.beat, self.subdivision) {
            write!(f, " | beat {}.{}", beat + 1, sub + 1)?;
        }
        if let Some(index) = self.clave_index {
            write!(f, " | slot {}", index + 1)?;
        }
        if let Some(section) = self.active_section {
            write!(f, " | section {}", section + 1)?;
        }
        if let Some((measure, total)) = self.section_progress {
            write!(f, " | measure {}/{}", measure, total)?;
        }
        Ok(())
    }
}

/// Receiver of engine display updates
///
/// Callbacks run on the scheduler thread between ticks and must not block.
pub trait DisplayObserver: Send {
    /// Display state after a tick that scheduled at least one step, or after
    /// a start/stop reset
    fn display_changed(&mut self, state: &DisplayState);

    /// A TimeMap section's parameters were just applied to the live controls
    fn section_applied(&mut self, _index: usize, _section: &Section) {}

    fn transport_changed(&mut self, _state: TransportState) {}

    /// The time map played its last measure; `end_time` is when its last
    /// measure and last click are over, on the engine clock. Called before
    /// the engine stops itself.
    fn time_map_finished(&mut self, _end_time: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_state_is_blank() {
        let state = DisplayState::idle(Mode::Clave);
        assert_eq!(state.mode, Mode::Clave);
        assert!(!state.is_running());
        assert_eq!(state.clave_index, None);
        assert_eq!(state.to_string(), "[Idle] Clave");
    }

    #[test]
    fn test_status_line() {
        let state = DisplayState {
            mode: Mode::Classic,
            transport: TransportState::Running,
            beat: Some(2),
            subdivision: Some(0),
            ..DisplayState::default()
        };
        assert_eq!(state.to_string(), "[Running] Classic | beat 3.1");

        let state = DisplayState {
            mode: Mode::TimeMap,
            transport: TransportState::Running,
            active_section: Some(1),
            section_progress: Some((2, 3)),
            ..DisplayState::default()
        };
        assert_eq!(
            state.to_string(),
            "[Running] TimeMap | section 2 | measure 2/3"
        );
    }

    #[test]
    fn test_serializes_to_json() {
        let state = DisplayState {
            mode: Mode::Clave,
            transport: TransportState::Running,
            clave_index: Some(7),
            ..DisplayState::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"mode\":\"Clave\""));
        assert!(json.contains("\"clave_index\":7"));
    }
}
