// Metronome - Classic click generator
// Fixed time signature with subdivisions and user accents, scheduled against the clock

use super::timeline::{AccentSet, Subdivision, Tempo, TimeSignature};
use crate::audio::emitter::{ClickEvent, SoundEmitter};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Metronome click tier, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTier {
    /// First beat of the measure
    Downbeat,
    /// Beat chosen by the user
    Accent,
    /// Any other main beat
    Beat,
    /// Off-beat subdivision click
    Subdivision,
}

impl ClickTier {
    /// Classify a position in the measure. Downbeat wins over an accent.
    pub fn classify(beat: usize, subdivision: usize, accents: &AccentSet) -> Self {
        match (beat, subdivision) {
            (0, 0) => ClickTier::Downbeat,
            (b, 0) if accents.contains(b) => ClickTier::Accent,
            (_, 0) => ClickTier::Beat,
            _ => ClickTier::Subdivision,
        }
    }
}

/// Tone parameters for one kind of click
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickSound {
    pub frequency: f32,
    pub volume: f32,
    pub duration: f32,
}

impl ClickSound {
    pub const fn new(frequency: f32, volume: f32, duration: f32) -> Self {
        Self {
            frequency,
            volume,
            duration,
        }
    }

    /// Click event for this sound starting at `time`
    pub fn event_at(&self, time: f64) -> ClickEvent {
        ClickEvent {
            frequency: self.frequency,
            volume: self.volume,
            duration: self.duration,
            time,
        }
    }
}

/// Sound table for every click tier and clave step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickSounds {
    pub downbeat: ClickSound,
    pub accent: ClickSound,
    pub beat: ClickSound,
    pub subdivision: ClickSound,
    pub clave_strong: ClickSound,
    pub clave_medium: ClickSound,
}

impl ClickSounds {
    pub fn for_tier(&self, tier: ClickTier) -> &ClickSound {
        match tier {
            ClickTier::Downbeat => &self.downbeat,
            ClickTier::Accent => &self.accent,
            ClickTier::Beat => &self.beat,
            ClickTier::Subdivision => &self.subdivision,
        }
    }

    /// Tiers must stay audibly distinct: strictly decreasing pitch and volume
    pub fn is_strictly_ordered(&self) -> bool {
        let tiers = [&self.downbeat, &self.accent, &self.beat, &self.subdivision];
        let classic = tiers.windows(2).all(|pair| {
            pair[0].frequency > pair[1].frequency && pair[0].volume > pair[1].volume
        });
        let clave = self.clave_strong.frequency > self.clave_medium.frequency
            && self.clave_strong.volume > self.clave_medium.volume;
        classic && clave
    }
}

impl Default for ClickSounds {
    fn default() -> Self {
        Self {
            downbeat: ClickSound::new(1760.0, 1.0, 0.06),
            accent: ClickSound::new(1320.0, 0.8, 0.05),
            beat: ClickSound::new(880.0, 0.6, 0.04),
            subdivision: ClickSound::new(660.0, 0.35, 0.03),
            clave_strong: ClickSound::new(2093.0, 0.9, 0.05),
            clave_medium: ClickSound::new(1568.0, 0.55, 0.04),
        }
    }
}

/// Live parameters of the Classic click
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassicSettings {
    time_signature: TimeSignature,
    pub subdivision: Subdivision,
    pub accents: AccentSet,
}

impl ClassicSettings {
    pub fn new(
        time_signature: TimeSignature,
        subdivision: Subdivision,
        mut accents: AccentSet,
    ) -> Self {
        accents.retain_within(time_signature.numerator);
        Self {
            time_signature,
            subdivision,
            accents,
        }
    }

    pub fn time_signature(&self) -> &TimeSignature {
        &self.time_signature
    }

    /// Change the signature, dropping accents past the new last beat
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.accents.retain_within(time_signature.numerator);
    }

    /// Toggle an accent on a zero-indexed beat
    pub fn toggle_accent(&mut self, beat: u8) -> Result<bool, ValidationError> {
        if beat >= self.time_signature.numerator {
            return Err(ValidationError::AccentOutOfRange {
                beat: beat as u32 + 1,
                numerator: self.time_signature.numerator as u32,
            });
        }
        Ok(self.accents.toggle(beat))
    }

    pub fn clicks_per_measure(&self) -> usize {
        self.time_signature.beats_per_measure() * self.subdivision.factor()
    }
}

/// Continuous Classic playhead: the next beat/subdivision to schedule
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassicPlayhead {
    next_event_time: f64,
    beat: usize,
    subdivision: usize,
}

impl ClassicPlayhead {
    pub fn new(start_time: f64) -> Self {
        Self {
            next_event_time: start_time,
            beat: 0,
            subdivision: 0,
        }
    }

    pub fn reset(&mut self, start_time: f64) {
        *self = Self::new(start_time);
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    pub fn beat(&self) -> usize {
        self.beat
    }

    pub fn subdivision(&self) -> usize {
        self.subdivision
    }

    /// Schedule the click under the playhead, then advance it
    ///
    /// Returns the (beat, subdivision) that was scheduled.
    pub fn step<E: SoundEmitter + ?Sized>(
        &mut self,
        tempo: &Tempo,
        settings: &ClassicSettings,
        sounds: &ClickSounds,
        emitter: &mut E,
    ) -> (usize, usize) {
        let beats = settings.time_signature.beats_per_measure();
        let factor = settings.subdivision.factor();

        // Settings may have shrunk since the last click
        if self.subdivision >= factor {
            self.subdivision = 0;
            self.beat += 1;
        }
        if self.beat >= beats {
            self.beat = 0;
        }

        let tier = ClickTier::classify(self.beat, self.subdivision, &settings.accents);
        emitter.schedule(sounds.for_tier(tier).event_at(self.next_event_time));
        let scheduled = (self.beat, self.subdivision);

        self.next_event_time += tempo.beat_duration_seconds() / factor as f64;
        self.subdivision += 1;
        if self.subdivision == factor {
            self.subdivision = 0;
            self.beat += 1;
            if self.beat == beats {
                self.beat = 0;
            }
        }

        scheduled
    }
}

/// Schedule every click of one measure starting at `start`
///
/// Pure inputs only: no playhead is read or written. Returns the measure length.
pub fn schedule_measure<E: SoundEmitter + ?Sized>(
    start: f64,
    tempo: &Tempo,
    settings: &ClassicSettings,
    sounds: &ClickSounds,
    emitter: &mut E,
) -> f64 {
    let seconds_per_beat = tempo.beat_duration_seconds();
    let factor = settings.subdivision.factor();
    let seconds_per_subdivision = seconds_per_beat / factor as f64;

    for beat in 0..settings.time_signature.beats_per_measure() {
        for subdivision in 0..factor {
            let tier = ClickTier::classify(beat, subdivision, &settings.accents);
            let time = start
                + beat as f64 * seconds_per_beat
                + subdivision as f64 * seconds_per_subdivision;
            emitter.schedule(sounds.for_tier(tier).event_at(time));
        }
    }

    tempo.measure_duration_seconds(&settings.time_signature)
}
