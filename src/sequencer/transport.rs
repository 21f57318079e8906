// Transport - Run state, active mode and the cross-thread display mirror

use super::display::{DisplayObserver, DisplayState};
use crate::error::ValidationError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Transport state (Idle or Running)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TransportState {
    #[default]
    Idle,
    Running,
}

impl TransportState {
    pub fn is_running(&self) -> bool {
        matches!(self, TransportState::Running)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "Idle"),
            TransportState::Running => write!(f, "Running"),
        }
    }
}

/// Timing generator driving the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Mode {
    #[default]
    Classic,
    Clave,
    TimeMap,
}

impl Mode {
    fn as_u8(self) -> u8 {
        match self {
            Mode::Classic => 0,
            Mode::Clave => 1,
            Mode::TimeMap => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Mode::Clave,
            2 => Mode::TimeMap,
            _ => Mode::Classic,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Classic => write!(f, "Classic"),
            Mode::Clave => write!(f, "Clave"),
            Mode::TimeMap => write!(f, "TimeMap"),
        }
    }
}

impl FromStr for Mode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(Mode::Classic),
            "clave" => Ok(Mode::Clave),
            "timemap" | "time-map" => Ok(Mode::TimeMap),
            other => Err(ValidationError::Mode(other.to_string())),
        }
    }
}

const NONE: usize = usize::MAX;
/// Not the bit pattern of any finite time
const NO_END: u64 = u64::MAX;

fn store_opt(slot: &AtomicUsize, value: Option<usize>) {
    slot.store(value.unwrap_or(NONE), Ordering::Relaxed);
}

fn load_opt(slot: &AtomicUsize) -> Option<usize> {
    match slot.load(Ordering::Relaxed) {
        NONE => None,
        value => Some(value),
    }
}

/// Shared display state
/// Thread-safe via atomics so a UI thread can poll what the scheduler published
#[derive(Debug)]
pub struct SharedTransportState {
    running: AtomicBool,
    mode: AtomicU8,
    beat: AtomicUsize,
    subdivision: AtomicUsize,
    clave_index: AtomicUsize,
    active_section: AtomicUsize,
    section_measure: AtomicU32,
    section_measures: AtomicU32,
    /// Bumped on every publish, lets pollers skip unchanged frames
    generation: AtomicU32,
    /// f64 bits of the last finished time map's end, NO_END until then
    finished_at: AtomicU64,
}

impl SharedTransportState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get current transport state
    pub fn state(&self) -> TransportState {
        if self.running.load(Ordering::Relaxed) {
            TransportState::Running
        } else {
            TransportState::Idle
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publish a new display state
    pub fn publish(&self, state: &DisplayState) {
        self.running
            .store(state.transport.is_running(), Ordering::Relaxed);
        self.mode.store(state.mode.as_u8(), Ordering::Relaxed);
        store_opt(&self.beat, state.beat);
        store_opt(&self.subdivision, state.subdivision);
        store_opt(&self.clave_index, state.clave_index);
        store_opt(&self.active_section, state.active_section);
        let (measure, total) = state.section_progress.unwrap_or((0, 0));
        self.section_measure.store(measure, Ordering::Relaxed);
        self.section_measures.store(total, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// When the last started time map ran out, on the engine clock
    ///
    /// Cleared by the next start. A manual stop never sets it.
    pub fn finished_at(&self) -> Option<f64> {
        match self.finished_at.load(Ordering::Acquire) {
            NO_END => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    /// Read back the last published state
    pub fn snapshot(&self) -> DisplayState {
        let total = self.section_measures.load(Ordering::Relaxed);
        DisplayState {
            mode: Mode::from_u8(self.mode.load(Ordering::Relaxed)),
            transport: self.state(),
            beat: load_opt(&self.beat),
            subdivision: load_opt(&self.subdivision),
            clave_index: load_opt(&self.clave_index),
            active_section: load_opt(&self.active_section),
            section_progress: (total > 0)
                .then(|| (self.section_measure.load(Ordering::Relaxed), total)),
        }
    }
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            mode: AtomicU8::new(Mode::Classic.as_u8()),
            beat: AtomicUsize::new(NONE),
            subdivision: AtomicUsize::new(NONE),
            clave_index: AtomicUsize::new(NONE),
            active_section: AtomicUsize::new(NONE),
            section_measure: AtomicU32::new(0),
            section_measures: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            finished_at: AtomicU64::new(NO_END),
        }
    }
}

impl DisplayObserver for Arc<SharedTransportState> {
    fn display_changed(&mut self, state: &DisplayState) {
        self.publish(state);
    }

    fn transport_changed(&mut self, state: TransportState) {
        if state.is_running() {
            self.finished_at.store(NO_END, Ordering::Release);
        }
    }

    fn time_map_finished(&mut self, end_time: f64) {
        self.finished_at.store(end_time.to_bits(), Ordering::Release);
    }
}
