// Sound emitter - Fire-and-forget hand-off of scheduled clicks

use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use serde::Serialize;

/// One audio trigger produced by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClickEvent {
    /// Tone frequency in Hz
    pub frequency: f32,
    /// Peak amplitude (0.0 to 1.0)
    pub volume: f32,
    /// Decay length in seconds
    pub duration: f32,
    /// Absolute clock time (seconds) at which the click starts
    pub time: f64,
}

/// Accepts clicks with an absolute start time and plays them on its own
///
/// The scheduler never waits on, cancels, or reschedules an emitted click.
pub trait SoundEmitter {
    fn schedule(&mut self, event: ClickEvent);
}

/// Recording emitter, used for tests and offline rendering
impl SoundEmitter for Vec<ClickEvent> {
    fn schedule(&mut self, event: ClickEvent) {
        self.push(event);
    }
}

impl<E: SoundEmitter + ?Sized> SoundEmitter for &mut E {
    fn schedule(&mut self, event: ClickEvent) {
        (**self).schedule(event);
    }
}

impl<E: SoundEmitter + ?Sized> SoundEmitter for Box<E> {
    fn schedule(&mut self, event: ClickEvent) {
        (**self).schedule(event);
    }
}

pub type ClickConsumer = HeapCons<ClickEvent>;

/// Lock-free producer side feeding the audio callback
pub struct ClickProducer {
    inner: HeapProd<ClickEvent>,
    dropped: u64,
}

impl ClickProducer {
    /// Clicks lost because the audio side was not draining fast enough
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SoundEmitter for ClickProducer {
    fn schedule(&mut self, event: ClickEvent) {
        if self.inner.try_push(event).is_err() {
            self.dropped += 1;
            log::warn!(
                "Click queue full, dropped click at {:.3}s ({} dropped so far)",
                event.time,
                self.dropped
            );
        }
    }
}

/// Create the click channel between the scheduler and the audio callback
pub fn create_click_channel(capacity: usize) -> (ClickProducer, ClickConsumer) {
    let rb = HeapRb::<ClickEvent>::new(capacity);
    let (inner, consumer) = rb.split();
    (ClickProducer { inner, dropped: 0 }, consumer)
}
