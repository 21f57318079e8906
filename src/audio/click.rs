// Click renderer - Decaying sine voices started at exact frames
//
// Runs inside the audio callback: the pending list and the voice pool are
// allocated up front and never grow, so queueing and rendering never allocate.
// Queued clicks wait in the pending list and only take a voice once their
// start frame is reached.

use crate::audio::emitter::ClickEvent;
use crate::sequencer::timeline::MAX_BEATS_PER_MEASURE;
use cpal::{FromSample, Sample};
use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Clicks that can ring at the same time
pub const MAX_VOICES: usize = 32;

/// Clicks that can wait for their start frame: two of the densest measures
/// (16 beats of sixteenths), so a whole measure plus the next one fit
pub const MAX_PENDING_CLICKS: usize = MAX_BEATS_PER_MEASURE as usize * 4 * 2;

/// Envelope reaches exp(-DECAY_RATE) (about -43 dB) at the end of the click
const DECAY_RATE: f32 = 5.0;

struct ClickVoice {
    start_frame: u64,
    length: u64,
    volume: f32,
    phase: f32,
    phase_increment: f32,
    decay_per_frame: f32,
    envelope: f32,
}

impl ClickVoice {
    fn next_sample(&mut self) -> f32 {
        let sample = self.phase.sin() * self.envelope * self.volume;
        self.phase = (self.phase + self.phase_increment) % TAU;
        self.envelope *= self.decay_per_frame;
        sample
    }
}

pub struct ClickRenderer {
    sample_rate: f32,
    pending: Vec<ClickVoice>,
    voices: Vec<ClickVoice>,
    /// Earliest start frame in `pending`
    next_start: u64,
    dropped: u64,
}

impl ClickRenderer {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            pending: Vec::with_capacity(MAX_PENDING_CLICKS),
            voices: Vec::with_capacity(MAX_VOICES),
            next_start: u64::MAX,
            dropped: 0,
        }
    }

    /// Hold a click until its start frame. Returns false (and counts a drop)
    /// when the pending list is full.
    pub fn queue(&mut self, event: &ClickEvent) -> bool {
        if self.pending.len() >= MAX_PENDING_CLICKS {
            self.dropped += 1;
            return false;
        }
        let length = (event.duration.max(0.0) * self.sample_rate).round().max(1.0);
        let start_frame = (event.time.max(0.0) * self.sample_rate as f64).round() as u64;
        self.pending.push(ClickVoice {
            start_frame,
            length: length as u64,
            volume: event.volume.clamp(0.0, 1.0),
            phase: 0.0,
            phase_increment: TAU * event.frequency / self.sample_rate,
            decay_per_frame: (-DECAY_RATE / length).exp(),
            envelope: 1.0,
        });
        self.next_start = self.next_start.min(start_frame);
        true
    }

    /// Move every click due at `frame` from the pending list into the pool
    fn start_due(&mut self, frame: u64) {
        let mut next_start = u64::MAX;
        let mut i = 0;
        while i < self.pending.len() {
            let start = self.pending[i].start_frame;
            if start > frame {
                next_start = next_start.min(start);
                i += 1;
                continue;
            }
            let voice = self.pending.swap_remove(i);
            if self.voices.len() < MAX_VOICES {
                self.voices.push(voice);
            } else {
                self.dropped += 1;
            }
        }
        self.next_start = next_start;
    }

    /// Mix every voice sounding at `frame`, retiring the finished ones
    ///
    /// Frames must be rendered in increasing order. A click whose start frame
    /// has already passed starts immediately.
    pub fn next_sample(&mut self, frame: u64) -> f32 {
        if frame >= self.next_start {
            self.start_due(frame);
        }

        let mut mixed = 0.0;
        let mut i = 0;
        while i < self.voices.len() {
            let voice = &mut self.voices[i];
            mixed += voice.next_sample();
            voice.length -= 1;
            if voice.length == 0 {
                self.voices.swap_remove(i);
            } else {
                i += 1;
            }
        }
        mixed
    }

    /// Render interleaved frames starting at `first_frame`
    pub fn render<T>(&mut self, data: &mut [T], channels: usize, first_frame: u64, gain: f32)
    where
        T: Sample + FromSample<f32>,
    {
        for (offset, frame) in data.chunks_mut(channels.max(1)).enumerate() {
            let sample = soft_clip(self.next_sample(first_frame + offset as u64) * gain);
            write_mono_to_interleaved_frame(sample, frame);
        }
    }

    /// Voices currently sounding
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Clicks waiting for their start frame
    pub fn pending_clicks(&self) -> usize {
        self.pending.len()
    }

    /// Clicks lost to a full pending list or a full voice pool
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Output gain shared between the host and the audio callback
#[derive(Clone)]
pub struct SharedGain {
    bits: Arc<AtomicU32>,
}

impl SharedGain {
    pub fn new(gain: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(gain.clamp(0.0, 1.0).to_bits())),
        }
    }

    pub fn set(&self, gain: f32) {
        self.bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// tanh saturation, keeps overlapping clicks inside [-1, 1]
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Copy one mono sample to every channel of an interleaved frame
#[inline]
pub fn write_mono_to_interleaved_frame<T>(sample: f32, frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for channel_sample in frame.iter_mut() {
        *channel_sample = T::from_sample(sample);
    }
}
