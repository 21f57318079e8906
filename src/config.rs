// Engine configuration - Scheduler timing, click sounds and logging
// Stored as RON (or JSON when the file ends in .json)

use crate::error::ConfigError;
use crate::sequencer::metronome::ClickSounds;
use crate::sequencer::timeline::Tempo;
use log::LevelFilter;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "practice_metronome";
const CONFIG_FILE_NAME: &str = "config.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far ahead of the clock events are queued (seconds)
    pub lookahead_secs: f64,
    /// Scheduler tick cadence (milliseconds)
    pub tick_interval_ms: u64,
    /// Gap between Start and the first click (seconds)
    pub start_delay_secs: f64,
    pub default_bpm: f64,
    /// Output gain applied after mixing (0.0 to 1.0)
    pub master_volume: f32,
    /// Clicks that can wait between the scheduler and the audio callback
    pub click_queue_capacity: usize,
    /// off, error, warn, info, debug or trace
    pub log_level: String,
    pub sounds: ClickSounds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.1,
            tick_interval_ms: 25,
            start_delay_secs: 0.05,
            default_bpm: 120.0,
            master_volume: 0.8,
            click_queue_capacity: 256,
            log_level: "info".to_string(),
            sounds: ClickSounds::default(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn default_tempo(&self) -> Tempo {
        Tempo::new(self.default_bpm).unwrap_or_default()
    }

    /// Parsed `log_level`, `Info` when unrecognized
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lookahead_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "lookahead_secs must be positive (got {})",
                self.lookahead_secs
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        // A tick slower than the lookahead would let clicks arrive late
        if self.tick_interval().as_secs_f64() >= self.lookahead_secs {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_ms ({}) must be shorter than the lookahead ({}s)",
                self.tick_interval_ms, self.lookahead_secs
            )));
        }
        if !(self.start_delay_secs >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "start_delay_secs must not be negative (got {})",
                self.start_delay_secs
            )));
        }
        Tempo::new(self.default_bpm)
            .map_err(|e| ConfigError::Invalid(format!("default_bpm: {}", e)))?;
        if !(0.0..=1.0).contains(&self.master_volume) {
            return Err(ConfigError::Invalid(format!(
                "master_volume must be between 0 and 1 (got {})",
                self.master_volume
            )));
        }
        if self.click_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "click_queue_capacity must be at least 1".to_string(),
            ));
        }
        if LevelFilter::from_str(&self.log_level).is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        if !self.sounds.is_strictly_ordered() {
            return Err(ConfigError::Invalid(
                "click sounds must get strictly quieter and lower from downbeat to subdivision"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Default location: `<config dir>/practice_metronome/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = if is_json(path) {
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            ron::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let text = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            ron::ser::to_string_pretty(self, PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    /// Load from `path` (or the default location), falling back to defaults
    ///
    /// A missing default file is silent; any other failure is logged.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let explicit = path.is_some();
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        if !explicit && !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                log::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(
                    "Using default config, could not load {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
