// Clock sources - Monotonic time reference for the scheduler
//
// The scheduler never looks at wall-clock time. Every decision is keyed to a
// Clock, which for live playback is the number of frames the audio callback
// has rendered so far. The clock never rewinds.

use crate::audio::status::{AtomicDeviceStatus, DeviceStatus};
use crate::error::AudioError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic time source in seconds
pub trait Clock: Send {
    /// Current time in seconds. Never decreases.
    fn now(&self) -> f64;

    /// Make sure the clock is advancing before playback starts
    fn resume(&self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Clock driven by the audio callback frame counter
#[derive(Clone)]
pub struct AudioClock {
    /// Frames rendered since the stream started (incremented by audio callback)
    frames: Arc<AtomicU64>,
    sample_rate: f64,
    status: AtomicDeviceStatus,
}

impl AudioClock {
    pub fn new(sample_rate: f64, status: AtomicDeviceStatus) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
            status,
        }
    }

    /// Advance frame position (called from audio callback)
    pub fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Frames rendered so far
    pub fn current_frame(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Absolute frame index for a clock time. Times in the past map to frame 0.
    pub fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl Clock for AudioClock {
    fn now(&self) -> f64 {
        self.current_frame() as f64 / self.sample_rate
    }

    fn resume(&self) -> Result<(), AudioError> {
        match self.status.get() {
            DeviceStatus::Connected => Ok(()),
            other => Err(AudioError::ClockUnavailable(format!(
                "audio device is {}",
                other
            ))),
        }
    }
}

/// Host-driven clock, stored as f64 bits so clones share the same time
///
/// Used for tests, offline scheduling, and hosts that own their own timer.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.max(0.0).to_bits())),
        }
    }

    /// Move the clock forward. Negative or NaN deltas are ignored.
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.set(self.now() + seconds);
        }
    }

    /// Jump to an absolute time. Earlier times are ignored (the clock never rewinds).
    pub fn set(&self, seconds: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (seconds > f64::from_bits(current)).then(|| seconds.to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_clock_advance() {
        let status = AtomicDeviceStatus::new(DeviceStatus::Connected);
        let clock = AudioClock::new(48000.0, status);
        assert_eq!(clock.now(), 0.0);

        clock.advance(24000);
        assert_eq!(clock.current_frame(), 24000);
        assert_eq!(clock.now(), 0.5);

        clock.advance(24000);
        assert_eq!(clock.now(), 1.0);
    }

    #[test]
    fn test_audio_clock_frame_conversion() {
        let clock = AudioClock::new(48000.0, AtomicDeviceStatus::default());
        assert_eq!(clock.seconds_to_frame(0.5), 24000);
        assert_eq!(clock.seconds_to_frame(-1.0), 0);
    }

    #[test]
    fn test_audio_clock_resume_requires_connected_device() {
        let status = AtomicDeviceStatus::new(DeviceStatus::Error);
        let clock = AudioClock::new(44100.0, status.clone());
        assert!(clock.resume().is_err());

        status.set(DeviceStatus::Connected);
        assert!(clock.resume().is_ok());
    }

    #[test]
    fn test_manual_clock_never_rewinds() {
        let clock = ManualClock::new(1.0);
        clock.advance(0.25);
        assert_eq!(clock.now(), 1.25);

        clock.set(0.5);
        assert_eq!(clock.now(), 1.25);

        clock.advance(-1.0);
        clock.advance(f64::NAN);
        assert_eq!(clock.now(), 1.25);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0.0);
        let handle = clock.clone();
        handle.advance(2.0);
        assert_eq!(clock.now(), 2.0);
    }
}
