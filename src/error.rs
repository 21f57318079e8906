// Error types - Validation, engine, audio and configuration failures
// Every message is meant to be shown to the user as-is

use thiserror::Error;

/// Rejected user input. State is never modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be a number (got NaN)")]
    NotANumber { field: &'static str },

    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be a whole number (got {value})")]
    NotWhole { field: &'static str, value: f64 },

    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Time signature denominator must be a power of two (got {0})")]
    Denominator(u32),

    #[error("Clave pattern must be exactly 16 characters (got {0})")]
    PatternLength(usize),

    #[error("Invalid character '{ch}' at position {position} in clave pattern (use x, o or .)")]
    PatternChar { ch: char, position: usize },

    #[error("Invalid accent '{0}': expected beat numbers separated by commas")]
    AccentSpec(String),

    #[error("Accent on beat {beat} does not exist in a {numerator}-beat measure")]
    AccentOutOfRange { beat: u32, numerator: u32 },

    #[error("Unknown section type '{0}' (expected classic, clave or pause)")]
    SectionType(String),

    #[error("Invalid section field '{0}'")]
    SectionField(String),

    #[error("Unknown clave preset '{0}'")]
    Preset(String),

    #[error("Unknown mode '{0}' (expected classic, clave or timemap)")]
    Mode(String),

    #[error("Unknown or malformed command '{0}'")]
    Command(String),
}

/// Failures of the audio subsystem (device, stream or clock)
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Audio device configuration failed: {0}")]
    DeviceConfig(String),

    #[error("Unsupported sample format: {0}. Supported formats: F32, I16, U16")]
    UnsupportedFormat(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),

    #[error("Audio clock unavailable: {0}")]
    ClockUnavailable(String),
}

/// Errors returned by transport and section-list operations
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Add at least one section before starting the time map")]
    EmptyTimeMap,

    #[error("Section {index} does not exist (time map has {len} sections)")]
    SectionOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Errors while loading or saving the engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_user_facing() {
        let err = ValidationError::NotPositive {
            field: "measures",
            value: 0.0,
        };
        assert_eq!(err.to_string(), "measures must be greater than zero (got 0)");

        let err = ValidationError::PatternChar {
            ch: '?',
            position: 3,
        };
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_engine_error_wraps_validation() {
        let err: EngineError = ValidationError::Missing { field: "bpm" }.into();
        assert_eq!(err.to_string(), "bpm is required");
    }
}
