// Sequencer module
// Musical time, the three click generators and the lookahead scheduler

pub mod clave;
pub mod display;
pub mod metronome;
pub mod scheduler;
pub mod section;
pub mod timeline;
pub mod timemap;
pub mod transport;

pub use clave::{ClavePattern, ClavePreset, ClaveSettings, ClaveStep};
pub use display::{DisplayObserver, DisplayState};
pub use metronome::{ClassicSettings, ClickSound, ClickSounds, ClickTier};
pub use scheduler::MetronomeEngine;
pub use section::{Section, SectionDraft, SectionKind};
pub use timeline::{AccentSet, Subdivision, Tempo, TimeSignature};
pub use timemap::TimeMap;
pub use transport::{Mode, SharedTransportState, TransportState};
