// Timeline - Musical time representation
// Tempo, time signature, subdivision and accent set for the Classic click

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Largest supported numerator (beats per measure)
pub const MAX_BEATS_PER_MEASURE: u8 = 16;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
///
/// Only the numerator drives timing: every beat lasts `60 / bpm` seconds.
/// The denominator is carried for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per measure
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, ValidationError> {
        if numerator == 0 || numerator > MAX_BEATS_PER_MEASURE {
            return Err(ValidationError::OutOfRange {
                field: "beats per measure",
                value: numerator as f64,
                min: 1.0,
                max: MAX_BEATS_PER_MEASURE as f64,
            });
        }
        if !denominator.is_power_of_two() || denominator > 32 {
            return Err(ValidationError::Denominator(denominator as u32));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self {
            numerator: 3,
            denominator: 4,
        }
    }

    /// Number of beats per measure
    pub fn beats_per_measure(&self) -> usize {
        self.numerator as usize
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo
    /// BPM must be in range [20.0, 999.0]
    pub fn new(bpm: f64) -> Result<Self, ValidationError> {
        if bpm.is_nan() {
            return Err(ValidationError::NotANumber { field: "bpm" });
        }
        if !(Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm) {
            return Err(ValidationError::OutOfRange {
                field: "bpm",
                value: bpm,
                min: Self::MIN_BPM,
                max: Self::MAX_BPM,
            });
        }
        Ok(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one sixteenth note (a clave slot) in seconds
    pub fn sixteenth_duration_seconds(&self) -> f64 {
        self.beat_duration_seconds() / 4.0
    }

    /// Duration of one measure in seconds at given time signature
    pub fn measure_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        self.beat_duration_seconds() * time_signature.numerator as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Number of equal parts each beat is divided into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Subdivision {
    #[default]
    Quarter,
    Eighth,
    Triplet,
    Sixteenth,
}

impl Subdivision {
    pub fn from_factor(factor: u8) -> Result<Self, ValidationError> {
        match factor {
            1 => Ok(Subdivision::Quarter),
            2 => Ok(Subdivision::Eighth),
            3 => Ok(Subdivision::Triplet),
            4 => Ok(Subdivision::Sixteenth),
            other => Err(ValidationError::OutOfRange {
                field: "subdivision",
                value: other as f64,
                min: 1.0,
                max: 4.0,
            }),
        }
    }

    /// Clicks per beat
    pub fn factor(&self) -> usize {
        match self {
            Subdivision::Quarter => 1,
            Subdivision::Eighth => 2,
            Subdivision::Triplet => 3,
            Subdivision::Sixteenth => 4,
        }
    }
}

/// User-accented beats (zero-indexed)
///
/// Beat 0 is never stored: the downbeat always sounds strongest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccentSet {
    beats: BTreeSet<u8>,
}

impl AccentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from zero-indexed beats, rejecting beats outside the measure
    pub fn from_beats(
        beats: impl IntoIterator<Item = u8>,
        time_signature: &TimeSignature,
    ) -> Result<Self, ValidationError> {
        let mut set = Self::new();
        for beat in beats {
            if beat >= time_signature.numerator {
                return Err(ValidationError::AccentOutOfRange {
                    beat: beat as u32 + 1,
                    numerator: time_signature.numerator as u32,
                });
            }
            set.insert(beat);
        }
        Ok(set)
    }

    /// Parse a list of one-based beat numbers ("2, 4" or "2+4")
    ///
    /// Beat 1 is accepted and ignored. An empty string is an empty set.
    pub fn parse(spec: &str, time_signature: &TimeSignature) -> Result<Self, ValidationError> {
        let mut beats = Vec::new();
        for part in spec.split([',', ' ', '+']).filter(|p| !p.trim().is_empty()) {
            let beat: u32 = part
                .trim()
                .parse()
                .map_err(|_| ValidationError::AccentSpec(part.trim().to_string()))?;
            if beat == 0 || beat > time_signature.numerator as u32 {
                return Err(ValidationError::AccentOutOfRange {
                    beat,
                    numerator: time_signature.numerator as u32,
                });
            }
            beats.push((beat - 1) as u8);
        }
        Self::from_beats(beats, time_signature)
    }

    pub fn insert(&mut self, beat: u8) {
        if beat != 0 {
            self.beats.insert(beat);
        }
    }

    pub fn remove(&mut self, beat: u8) {
        self.beats.remove(&beat);
    }

    /// Toggle a beat, returns true if it is now accented
    pub fn toggle(&mut self, beat: u8) -> bool {
        if beat == 0 {
            return false;
        }
        if self.beats.remove(&beat) {
            false
        } else {
            self.beats.insert(beat);
            true
        }
    }

    pub fn contains(&self, beat: usize) -> bool {
        u8::try_from(beat).is_ok_and(|b| self.beats.contains(&b))
    }

    /// Drop accents that no longer fit in the measure
    pub fn retain_within(&mut self, numerator: u8) {
        self.beats.retain(|&b| b < numerator);
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.beats.iter().copied()
    }
}

impl fmt::Display for AccentSet {
    /// One-based beat numbers, the same format `parse` accepts
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for beat in &self.beats {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", beat + 1)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::four_four();
        assert_eq!(ts.numerator, 4);
        assert_eq!(ts.denominator, 4);
        assert_eq!(ts.beats_per_measure(), 4);
        assert_eq!(ts.to_string(), "4/4");
    }

    #[test]
    fn test_time_signature_validation() {
        assert!(TimeSignature::new(7, 8).is_ok());
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(17, 4).is_err());
        assert_eq!(
            TimeSignature::new(4, 6),
            Err(ValidationError::Denominator(6))
        );
    }

    #[test]
    fn test_tempo() {
        let tempo = Tempo::new(120.0).unwrap();
        assert_eq!(tempo.bpm(), 120.0);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);
        assert_eq!(tempo.sixteenth_duration_seconds(), 0.125);
        assert_eq!(
            tempo.measure_duration_seconds(&TimeSignature::three_four()),
            1.5
        );
    }

    #[test]
    fn test_tempo_rejects_invalid() {
        assert_eq!(
            Tempo::new(f64::NAN),
            Err(ValidationError::NotANumber { field: "bpm" })
        );
        assert!(Tempo::new(0.0).is_err());
        assert!(Tempo::new(-120.0).is_err());
        assert!(Tempo::new(1000.0).is_err());
    }

    #[test]
    fn test_subdivision_factor() {
        for factor in 1..=4u8 {
            assert_eq!(
                Subdivision::from_factor(factor).unwrap().factor(),
                factor as usize
            );
        }
        assert!(Subdivision::from_factor(0).is_err());
        assert!(Subdivision::from_factor(5).is_err());
    }

    #[test]
    fn test_accent_set_never_holds_downbeat() {
        let mut accents = AccentSet::new();
        accents.insert(0);
        assert!(accents.is_empty());
        assert!(!accents.toggle(0));

        assert!(accents.toggle(2));
        assert!(accents.contains(2));
        assert!(!accents.toggle(2));
        assert!(!accents.contains(2));
    }

    #[test]
    fn test_accent_set_parse() {
        let ts = TimeSignature::four_four();
        let accents = AccentSet::parse("1, 2+4", &ts).unwrap();
        assert_eq!(accents.iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(accents.to_string(), "2,4");

        assert!(AccentSet::parse("", &ts).unwrap().is_empty());
        assert!(matches!(
            AccentSet::parse("2,x", &ts),
            Err(ValidationError::AccentSpec(_))
        ));
        assert!(matches!(
            AccentSet::parse("5", &ts),
            Err(ValidationError::AccentOutOfRange { beat: 5, numerator: 4 })
        ));
    }

    #[test]
    fn test_accent_set_retain_within() {
        let ts = TimeSignature::new(7, 8).unwrap();
        let mut accents = AccentSet::from_beats([2, 4, 6], &ts).unwrap();
        accents.retain_within(5);
        assert_eq!(accents.iter().collect::<Vec<_>>(), vec![2, 4]);
    }
}
