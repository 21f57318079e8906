// Clave - 16-slot cyclic pattern designer
// Each slot is a sixteenth note; only the first `cycle_length` slots are live

use super::metronome::ClickSounds;
use super::timeline::Tempo;
use crate::audio::emitter::SoundEmitter;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of slots in a clave pattern
pub const CLAVE_SLOTS: usize = 16;

/// State of one clave slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClaveStep {
    #[default]
    Off,
    Strong,
    Medium,
}

impl ClaveStep {
    /// Grid cell toggle order: Off -> Strong -> Medium -> Off
    pub fn cycled(self) -> Self {
        match self {
            ClaveStep::Off => ClaveStep::Strong,
            ClaveStep::Strong => ClaveStep::Medium,
            ClaveStep::Medium => ClaveStep::Off,
        }
    }

    /// `x` strong, `o` medium, `.` or `-` off
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'x' | 'X' => Some(ClaveStep::Strong),
            'o' | 'O' => Some(ClaveStep::Medium),
            '.' | '-' => Some(ClaveStep::Off),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            ClaveStep::Off => '.',
            ClaveStep::Strong => 'x',
            ClaveStep::Medium => 'o',
        }
    }
}

/// Built-in patterns for the designer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClavePreset {
    Son32,
    Son23,
    Rumba32,
    BossaNova,
}

impl ClavePreset {
    pub const ALL: [ClavePreset; 4] = [
        ClavePreset::Son32,
        ClavePreset::Son23,
        ClavePreset::Rumba32,
        ClavePreset::BossaNova,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClavePreset::Son32 => "son-3-2",
            ClavePreset::Son23 => "son-2-3",
            ClavePreset::Rumba32 => "rumba-3-2",
            ClavePreset::BossaNova => "bossa-nova",
        }
    }

    fn grid(&self) -> &'static str {
        match self {
            ClavePreset::Son32 => "x..x..x...o.o...",
            ClavePreset::Son23 => "..o.o...x..x..x.",
            ClavePreset::Rumba32 => "x..x...x..o.o...",
            ClavePreset::BossaNova => "x..x..x...o..o..",
        }
    }

    pub fn pattern(&self) -> ClavePattern {
        // Preset grids are compile-time constants of the right shape
        ClavePattern::parse_grid(self.grid()).unwrap_or_default()
    }
}

impl FromStr for ClavePreset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| ValidationError::Preset(s.to_string()))
    }
}

/// Fixed 16-slot pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClavePattern {
    steps: [ClaveStep; CLAVE_SLOTS],
}

impl ClavePattern {
    pub fn new(steps: [ClaveStep; CLAVE_SLOTS]) -> Self {
        Self { steps }
    }

    /// Parse a 16-character grid: `x` strong, `o` medium, `.` or `-` off
    pub fn parse_grid(grid: &str) -> Result<Self, ValidationError> {
        let grid = grid.trim();
        let len = grid.chars().count();
        if len != CLAVE_SLOTS {
            return Err(ValidationError::PatternLength(len));
        }
        let mut steps = [ClaveStep::Off; CLAVE_SLOTS];
        for (position, (slot, ch)) in steps.iter_mut().zip(grid.chars()).enumerate() {
            *slot = ClaveStep::from_char(ch)
                .ok_or(ValidationError::PatternChar { ch, position })?;
        }
        Ok(Self { steps })
    }

    pub fn step(&self, index: usize) -> ClaveStep {
        self.steps.get(index).copied().unwrap_or_default()
    }

    pub fn set_step(&mut self, index: usize, step: ClaveStep) -> Result<(), ValidationError> {
        let slot = self
            .steps
            .get_mut(index)
            .ok_or(ValidationError::OutOfRange {
                field: "clave slot",
                value: index as f64,
                min: 0.0,
                max: (CLAVE_SLOTS - 1) as f64,
            })?;
        *slot = step;
        Ok(())
    }

    /// Advance a cell through Off -> Strong -> Medium, returning its new state
    pub fn cycle_step(&mut self, index: usize) -> Result<ClaveStep, ValidationError> {
        let next = self.step(index).cycled();
        self.set_step(index, next)?;
        Ok(next)
    }

    pub fn steps(&self) -> &[ClaveStep; CLAVE_SLOTS] {
        &self.steps
    }
}

impl fmt::Display for ClavePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.steps
            .iter()
            .try_for_each(|step| write!(f, "{}", step.as_char()))
    }
}

impl FromStr for ClavePattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_grid(s)
    }
}

/// Pattern plus the number of live slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaveSettings {
    pub pattern: ClavePattern,
    cycle_length: usize,
}

impl ClaveSettings {
    pub fn new(pattern: ClavePattern, cycle_length: usize) -> Result<Self, ValidationError> {
        let mut settings = Self {
            pattern,
            cycle_length: CLAVE_SLOTS,
        };
        settings.set_cycle_length(cycle_length)?;
        Ok(settings)
    }

    pub fn cycle_length(&self) -> usize {
        self.cycle_length
    }

    pub fn set_cycle_length(&mut self, cycle_length: usize) -> Result<(), ValidationError> {
        if !(1..=CLAVE_SLOTS).contains(&cycle_length) {
            return Err(ValidationError::OutOfRange {
                field: "cycle length",
                value: cycle_length as f64,
                min: 1.0,
                max: CLAVE_SLOTS as f64,
            });
        }
        self.cycle_length = cycle_length;
        Ok(())
    }
}

impl Default for ClaveSettings {
    fn default() -> Self {
        Self {
            pattern: ClavePreset::Son32.pattern(),
            cycle_length: CLAVE_SLOTS,
        }
    }
}

/// Continuous Clave playhead: the next slot to schedule
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClavePlayhead {
    next_event_time: f64,
    index: usize,
}

impl ClavePlayhead {
    pub fn new(start_time: f64) -> Self {
        Self {
            next_event_time: start_time,
            index: 0,
        }
    }

    pub fn reset(&mut self, start_time: f64) {
        *self = Self::new(start_time);
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Schedule the slot under the playhead (Off slots stay silent), then advance
    ///
    /// Returns the slot index that was processed.
    pub fn step<E: SoundEmitter + ?Sized>(
        &mut self,
        tempo: &Tempo,
        settings: &ClaveSettings,
        sounds: &ClickSounds,
        emitter: &mut E,
    ) -> usize {
        let cycle_length = settings.cycle_length();
        // Cycle may have been shortened while playing: restart the cycle
        if self.index >= cycle_length {
            self.index = 0;
        }

        let processed = self.index;
        let sound = match settings.pattern.step(processed) {
            ClaveStep::Strong => Some(&sounds.clave_strong),
            ClaveStep::Medium => Some(&sounds.clave_medium),
            ClaveStep::Off => None,
        };
        if let Some(sound) = sound {
            emitter.schedule(sound.event_at(self.next_event_time));
        }

        self.next_event_time += tempo.sixteenth_duration_seconds();
        self.index = (self.index + 1) % cycle_length;
        processed
    }
}

/// Schedule one clave measure (16 sixteenth positions) starting at `start`
///
/// Slots at or past `cycle_length` stay silent. Returns the measure length.
pub fn schedule_measure<E: SoundEmitter + ?Sized>(
    start: f64,
    tempo: &Tempo,
    settings: &ClaveSettings,
    sounds: &ClickSounds,
    emitter: &mut E,
) -> f64 {
    let seconds_per_slot = tempo.sixteenth_duration_seconds();

    for (slot, step) in settings
        .pattern
        .steps()
        .iter()
        .enumerate()
        .take(settings.cycle_length())
    {
        let sound = match step {
            ClaveStep::Strong => &sounds.clave_strong,
            ClaveStep::Medium => &sounds.clave_medium,
            ClaveStep::Off => continue,
        };
        emitter.schedule(sound.event_at(start + slot as f64 * seconds_per_slot));
    }

    seconds_per_slot * CLAVE_SLOTS as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo(bpm: f64) -> Tempo {
        Tempo::new(bpm).unwrap()
    }

    #[test]
    fn test_parse_and_format_grid() {
        let pattern: ClavePattern = "x..X..o.-.......".parse().unwrap();
        assert_eq!(pattern.step(0), ClaveStep::Strong);
        assert_eq!(pattern.step(3), ClaveStep::Strong);
        assert_eq!(pattern.step(6), ClaveStep::Medium);
        assert_eq!(pattern.step(8), ClaveStep::Off);
        assert_eq!(pattern.to_string(), "x..x..o.........");
    }

    #[test]
    fn test_malformed_grids_are_rejected() {
        assert_eq!(
            ClavePattern::parse_grid("x..x"),
            Err(ValidationError::PatternLength(4))
        );
        assert_eq!(
            ClavePattern::parse_grid("x..x..x..?......"),
            Err(ValidationError::PatternChar {
                ch: '?',
                position: 9
            })
        );
    }

    #[test]
    fn test_cell_cycles_through_states() {
        let mut pattern = ClavePattern::default();
        assert_eq!(pattern.cycle_step(5), Ok(ClaveStep::Strong));
        assert_eq!(pattern.cycle_step(5), Ok(ClaveStep::Medium));
        assert_eq!(pattern.cycle_step(5), Ok(ClaveStep::Off));
        assert!(pattern.cycle_step(16).is_err());
    }

    #[test]
    fn test_presets() {
        for preset in ClavePreset::ALL {
            let parsed: ClavePreset = preset.name().parse().unwrap();
            assert_eq!(parsed, preset);
            assert_ne!(preset.pattern(), ClavePattern::default());
        }
        assert!("mambo".parse::<ClavePreset>().is_err());
    }

    #[test]
    fn test_cycle_length_bounds() {
        let mut settings = ClaveSettings::default();
        assert!(settings.set_cycle_length(0).is_err());
        assert!(settings.set_cycle_length(17).is_err());
        assert!(settings.set_cycle_length(12).is_ok());
        assert_eq!(settings.cycle_length(), 12);
    }

    #[test]
    fn test_off_slots_advance_silently() {
        let settings = ClaveSettings::new("x.o.............".parse().unwrap(), 4).unwrap();
        let sounds = ClickSounds::default();
        let mut playhead = ClavePlayhead::new(0.0);
        let mut events = Vec::new();

        let indices: Vec<_> = (0..6)
            .map(|_| playhead.step(&tempo(120.0), &settings, &sounds, &mut events))
            .collect();

        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1]);
        let times: Vec<_> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5]);
        assert_eq!(events[1].frequency, sounds.clave_medium.frequency);
    }

    #[test]
    fn test_shrinking_cycle_restarts_pattern() {
        let mut settings = ClaveSettings::default();
        let sounds = ClickSounds::default();
        let mut playhead = ClavePlayhead::new(0.0);
        let mut events = Vec::new();

        for _ in 0..10 {
            playhead.step(&tempo(90.0), &settings, &sounds, &mut events);
        }
        assert_eq!(playhead.index(), 10);

        settings.set_cycle_length(6).unwrap();
        let processed = playhead.step(&tempo(90.0), &settings, &sounds, &mut events);
        assert_eq!(processed, 0);
        assert_eq!(playhead.index(), 1);
    }

    #[test]
    fn test_one_shot_measure_skips_dead_slots() {
        let settings = ClaveSettings::new("x...x...x...x...".parse().unwrap(), 8).unwrap();
        let mut events = Vec::new();

        let duration = schedule_measure(
            2.0,
            &tempo(120.0),
            &settings,
            &ClickSounds::default(),
            &mut events,
        );

        assert_eq!(duration, 2.0);
        let times: Vec<_> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![2.0, 2.5]);
    }
}
