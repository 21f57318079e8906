// Section - One step of a time map
// Typed sections plus the raw drafts they are validated from

use super::clave::{ClavePattern, ClaveSettings, CLAVE_SLOTS};
use super::metronome::ClassicSettings;
use super::timeline::{AccentSet, Subdivision, Tempo, TimeSignature};
use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;

/// Upper bound for a section's length in measures
pub const MAX_SECTION_MEASURES: u32 = 9999;

/// What a section plays
#[derive(Debug, Clone, PartialEq)]
pub enum SectionKind {
    Classic {
        tempo: Tempo,
        settings: ClassicSettings,
    },
    Clave {
        tempo: Tempo,
        settings: ClaveSettings,
    },
    /// Silence, timed as 4/4 measures at the active tempo
    Pause,
}

/// One program step: parameters plus a length in measures (always >= 1)
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    measures: u32,
}

impl Section {
    fn with_measures(kind: SectionKind, measures: u32) -> Result<Self, ValidationError> {
        if measures == 0 || measures > MAX_SECTION_MEASURES {
            return Err(ValidationError::OutOfRange {
                field: "measures",
                value: measures as f64,
                min: 1.0,
                max: MAX_SECTION_MEASURES as f64,
            });
        }
        Ok(Self { kind, measures })
    }

    pub fn classic(
        tempo: Tempo,
        settings: ClassicSettings,
        measures: u32,
    ) -> Result<Self, ValidationError> {
        Self::with_measures(SectionKind::Classic { tempo, settings }, measures)
    }

    pub fn clave(
        tempo: Tempo,
        settings: ClaveSettings,
        measures: u32,
    ) -> Result<Self, ValidationError> {
        Self::with_measures(SectionKind::Clave { tempo, settings }, measures)
    }

    pub fn pause(duration_measures: u32) -> Result<Self, ValidationError> {
        Self::with_measures(SectionKind::Pause, duration_measures)
    }

    pub fn measures(&self) -> u32 {
        self.measures
    }

    /// Pause length; the same value as `measures`
    pub fn duration_measures(&self) -> u32 {
        self.measures
    }

    /// The section's own tempo. Pauses keep whatever tempo is active.
    pub fn tempo(&self) -> Option<&Tempo> {
        match &self.kind {
            SectionKind::Classic { tempo, .. } | SectionKind::Clave { tempo, .. } => Some(tempo),
            SectionKind::Pause => None,
        }
    }

    /// Length of one measure of this section in seconds
    pub fn measure_duration(&self, active_tempo: &Tempo) -> f64 {
        match &self.kind {
            SectionKind::Classic { tempo, settings } => {
                tempo.measure_duration_seconds(settings.time_signature())
            }
            SectionKind::Clave { tempo, .. } => {
                tempo.sixteenth_duration_seconds() * CLAVE_SLOTS as f64
            }
            SectionKind::Pause => active_tempo.beat_duration_seconds() * 4.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            SectionKind::Classic { .. } => "Classic",
            SectionKind::Clave { .. } => "Clave",
            SectionKind::Pause => "Pause",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.measures == 1 { "" } else { "s" };
        match &self.kind {
            SectionKind::Classic { tempo, settings } => {
                write!(
                    f,
                    "Classic | {} | {} | x{}",
                    tempo,
                    settings.time_signature(),
                    settings.subdivision.factor()
                )?;
                if !settings.accents.is_empty() {
                    write!(f, " | accents {}", settings.accents)?;
                }
            }
            SectionKind::Clave { tempo, settings } => {
                write!(
                    f,
                    "Clave | {} | {} | length {}",
                    tempo,
                    settings.pattern,
                    settings.cycle_length()
                )?;
            }
            SectionKind::Pause => write!(f, "Pause")?,
        }
        write!(f, " | {} measure{}", self.measures, plural)
    }
}

/// Unvalidated section input, as typed into the section form
///
/// Numeric fields are `None` when left blank.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionDraft {
    Classic {
        bpm: Option<f64>,
        numerator: Option<f64>,
        denominator: Option<f64>,
        subdivision: Option<f64>,
        accents: String,
        measures: Option<f64>,
    },
    Clave {
        bpm: Option<f64>,
        pattern: String,
        cycle_length: Option<f64>,
        measures: Option<f64>,
    },
    Pause {
        duration: Option<f64>,
    },
}

impl SectionDraft {
    pub fn classic() -> Self {
        SectionDraft::Classic {
            bpm: None,
            numerator: None,
            denominator: None,
            subdivision: None,
            accents: String::new(),
            measures: None,
        }
    }

    pub fn clave() -> Self {
        SectionDraft::Clave {
            bpm: None,
            pattern: String::new(),
            cycle_length: None,
            measures: None,
        }
    }

    pub fn pause() -> Self {
        SectionDraft::Pause { duration: None }
    }

    /// Check every field and build the section
    ///
    /// Blank denominator defaults to 4, blank subdivision to 1 and blank
    /// cycle length to 16. Everything else is required.
    pub fn validate(&self) -> Result<Section, ValidationError> {
        match self {
            SectionDraft::Classic {
                bpm,
                numerator,
                denominator,
                subdivision,
                accents,
                measures,
            } => {
                let tempo = Tempo::new(require_positive("bpm", *bpm)?)?;
                let numerator = require_whole("beats per measure", *numerator, 255)?;
                let denominator = match denominator {
                    Some(_) => require_whole("denominator", *denominator, 255)?,
                    None => 4,
                };
                let time_signature = TimeSignature::new(numerator as u8, denominator as u8)?;
                let subdivision = match subdivision {
                    Some(_) => Subdivision::from_factor(
                        require_whole("subdivision", *subdivision, 255)? as u8,
                    )?,
                    None => Subdivision::Quarter,
                };
                let accents = AccentSet::parse(accents, &time_signature)?;
                let measures = require_whole("measures", *measures, MAX_SECTION_MEASURES)?;
                Section::classic(
                    tempo,
                    ClassicSettings::new(time_signature, subdivision, accents),
                    measures,
                )
            }
            SectionDraft::Clave {
                bpm,
                pattern,
                cycle_length,
                measures,
            } => {
                let tempo = Tempo::new(require_positive("bpm", *bpm)?)?;
                if pattern.trim().is_empty() {
                    return Err(ValidationError::Missing { field: "pattern" });
                }
                let pattern = ClavePattern::parse_grid(pattern)?;
                let cycle_length = match cycle_length {
                    Some(_) => require_whole("cycle length", *cycle_length, 255)? as usize,
                    None => CLAVE_SLOTS,
                };
                let settings = ClaveSettings::new(pattern, cycle_length)?;
                let measures = require_whole("measures", *measures, MAX_SECTION_MEASURES)?;
                Section::clave(tempo, settings, measures)
            }
            SectionDraft::Pause { duration } => {
                Section::pause(require_whole("duration", *duration, MAX_SECTION_MEASURES)?)
            }
        }
    }

    fn set_field(&mut self, key: &str, value: &str) -> Result<(), ValidationError> {
        let bad_field = || ValidationError::SectionField(format!("{}={}", key, value));
        let number = |v: &str| v.trim().parse::<f64>().map_err(|_| bad_field());

        match (self, key) {
            (
                SectionDraft::Classic { bpm, .. } | SectionDraft::Clave { bpm, .. },
                "bpm",
            ) => *bpm = Some(number(value)?),
            (
                SectionDraft::Classic { measures, .. } | SectionDraft::Clave { measures, .. },
                "measures",
            ) => *measures = Some(number(value)?),
            (SectionDraft::Pause { duration }, "measures" | "duration") => {
                *duration = Some(number(value)?)
            }
            (
                SectionDraft::Classic {
                    numerator,
                    denominator,
                    ..
                },
                "sig",
            ) => {
                let (num, den) = value.split_once('/').ok_or_else(bad_field)?;
                *numerator = Some(number(num)?);
                *denominator = Some(number(den)?);
            }
            (SectionDraft::Classic { numerator, .. }, "num") => *numerator = Some(number(value)?),
            (SectionDraft::Classic { denominator, .. }, "den") => {
                *denominator = Some(number(value)?)
            }
            (SectionDraft::Classic { subdivision, .. }, "sub") => {
                *subdivision = Some(number(value)?)
            }
            (SectionDraft::Classic { accents, .. }, "accents") => *accents = value.to_string(),
            (SectionDraft::Clave { pattern, .. }, "pattern") => *pattern = value.to_string(),
            (SectionDraft::Clave { cycle_length, .. }, "length") => {
                *cycle_length = Some(number(value)?)
            }
            _ => return Err(bad_field()),
        }
        Ok(())
    }
}

/// Parse `type:key=value,key=value`
///
/// ```text
/// classic:bpm=120,sig=4/4,sub=2,accents=2+4,measures=2
/// clave:bpm=100,pattern=x..x..x...o.o...,length=16,measures=4
/// pause:measures=1
/// ```
impl FromStr for SectionDraft {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, fields) = s.split_once(':').unwrap_or((s, ""));
        let mut draft = match kind.trim().to_ascii_lowercase().as_str() {
            "classic" => SectionDraft::classic(),
            "clave" => SectionDraft::clave(),
            "pause" => SectionDraft::pause(),
            other => return Err(ValidationError::SectionType(other.to_string())),
        };

        for field in fields.split(',').filter(|f| !f.trim().is_empty()) {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| ValidationError::SectionField(field.to_string()))?;
            draft.set_field(&key.trim().to_ascii_lowercase(), value.trim())?;
        }
        Ok(draft)
    }
}

fn require_positive(field: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field })?;
    if value.is_nan() {
        return Err(ValidationError::NotANumber { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(value)
}

fn require_whole(
    field: &'static str,
    value: Option<f64>,
    max: u32,
) -> Result<u32, ValidationError> {
    let value = require_positive(field, value)?;
    if value.fract() != 0.0 {
        return Err(ValidationError::NotWhole { field, value });
    }
    if value > max as f64 {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: 1.0,
            max: max as f64,
        });
    }
    Ok(value as u32)
}
