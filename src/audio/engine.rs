// Audio engine - CPAL output stream that plays scheduled clicks
//
// # Format Support
//
// The device's preferred sample format is detected with `sample_format()`:
// - **F32**: native floating point, no conversion
// - **I16**: signed 16-bit (common on Windows/WASAPI)
// - **U16**: unsigned 16-bit (rare)
//
// Mixing happens in f32; conversion to the device format happens when the
// frame is written, through CPAL's `FromSample<f32>`.
//
// # Timing
//
// The callback is the clock: after rendering a buffer it advances the frame
// counter behind `AudioClock`. A click queued for time `t` starts on frame
// `round(t * sample_rate)`.
//
// # Stream Limitations
//
// On macOS (CoreAudio) the Stream is neither Send nor Sync, so the engine must
// stay on the thread that created it. Stream errors set the device status and
// push a notification; reconnection is left to the host.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::click::{ClickRenderer, SharedGain};
use crate::audio::clock::AudioClock;
use crate::audio::emitter::{ClickConsumer, ClickProducer, create_click_channel};
use crate::audio::status::{AtomicDeviceStatus, DeviceStatus};
use crate::config::EngineConfig;
use crate::error::AudioError;
use crate::messaging::channels::NotificationProducer;
use crate::messaging::notification::{Notification, NotificationCategory};

pub struct AudioEngine {
    _device: Device,
    _stream: Stream,
    sample_rate: u32,
    clock: AudioClock,
    dropped_clicks: Arc<AtomicU64>,
    pub volume: SharedGain,
    pub status: AtomicDeviceStatus,
}

impl AudioEngine {
    /// Open the default output device and start streaming silence
    ///
    /// Returns the engine and the producer side of its click queue.
    pub fn new(
        config: &EngineConfig,
        notification_tx: Arc<Mutex<NotificationProducer>>,
    ) -> Result<(Self, ClickProducer), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;
        let sample_format = supported_config.sample_format();
        log::debug!("Audio config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;
        let stream_config: StreamConfig = supported_config.into();

        let status = AtomicDeviceStatus::new(DeviceStatus::Connecting);
        let clock = AudioClock::new(sample_rate as f64, status.clone());
        let volume = SharedGain::new(config.master_volume);
        let (click_tx, click_rx) = create_click_channel(config.click_queue_capacity);
        let dropped_clicks = Arc::new(AtomicU64::new(0));

        let parts = StreamParts {
            channels,
            clock: clock.clone(),
            clicks: click_rx,
            renderer: ClickRenderer::new(sample_rate as f32),
            dropped_clicks: Arc::clone(&dropped_clicks),
            volume: volume.clone(),
            status: status.clone(),
            notification_tx: notification_tx.clone(),
        };

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &stream_config, parts),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &stream_config, parts),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &stream_config, parts),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        status.set(DeviceStatus::Connected);

        log::info!("Audio engine started: {} Hz, {} channels", sample_rate, channels);
        if let Ok(mut tx) = notification_tx.try_lock() {
            let _ = tx.try_push(Notification::info(
                NotificationCategory::Audio,
                format!("Audio connected: {} Hz", sample_rate),
            ));
        }

        let engine = Self {
            _device: device,
            _stream: stream,
            sample_rate,
            clock,
            dropped_clicks,
            volume,
            status,
        };
        Ok((engine, click_tx))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clock driven by this stream's callback
    pub fn clock(&self) -> AudioClock {
        self.clock.clone()
    }

    /// Clicks the renderer could not hold since the stream started
    pub fn dropped_clicks(&self) -> u64 {
        self.dropped_clicks.load(Ordering::Relaxed)
    }

    /// Build an output stream for any supported sample type
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        parts: StreamParts,
    ) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let StreamParts {
            channels,
            clock,
            mut clicks,
            mut renderer,
            dropped_clicks,
            volume,
            status,
            notification_tx,
        } = parts;

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // ========== SACRED ZONE ==========
                    // No allocations, No I/O, No blocking locks
                    drain_clicks(&mut clicks, &mut renderer);

                    let first_frame = clock.current_frame();
                    renderer.render(data, channels, first_frame, volume.get());
                    clock.advance(data.len() / channels.max(1));
                    dropped_clicks.store(renderer.dropped(), Ordering::Relaxed);
                    // ========== SACRED ZONE END ==========
                },
                move |err| {
                    // Runs outside the audio callback, I/O is fine here
                    log::error!("Audio stream error: {}", err);
                    status.set(DeviceStatus::Error);

                    if let Ok(mut tx) = notification_tx.try_lock() {
                        let _ = tx.try_push(Notification::error(
                            NotificationCategory::Audio,
                            format!("Audio stream error: {}", err),
                        ));
                    }
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))
    }
}

/// Everything the callback owns
struct StreamParts {
    channels: usize,
    clock: AudioClock,
    clicks: ClickConsumer,
    renderer: ClickRenderer,
    dropped_clicks: Arc<AtomicU64>,
    volume: SharedGain,
    status: AtomicDeviceStatus,
    notification_tx: Arc<Mutex<NotificationProducer>>,
}

/// Hand queued clicks to the renderer, which counts the ones it cannot hold
fn drain_clicks(clicks: &mut ClickConsumer, renderer: &mut ClickRenderer) {
    while let Some(event) = clicks.try_pop() {
        renderer.queue(&event);
    }
}
