// Practice metronome - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod driver;
pub mod error;
pub mod messaging;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::clock::{AudioClock, Clock, ManualClock};
pub use audio::emitter::{ClickEvent, ClickProducer, SoundEmitter};
pub use audio::engine::AudioEngine;
pub use config::EngineConfig;
pub use driver::SchedulerDriver;
pub use error::{AudioError, ConfigError, EngineError, ValidationError};
pub use messaging::channels::{create_command_channel, create_notification_channel};
pub use messaging::command::Command;
pub use sequencer::{
    ClavePattern, ClavePreset, ClaveSettings, ClaveStep, DisplayObserver, DisplayState,
    MetronomeEngine, Mode, Section, SectionDraft, SharedTransportState, Tempo, TimeMap,
    TimeSignature, TransportState,
};
