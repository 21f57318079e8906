// Scheduler driver - Timer thread that owns the engine
//
// Each iteration drains pending commands, ticks the engine once and sleeps
// for the configured cadence. Tick timing only needs to be roughly regular:
// every click carries its own clock time.

use crate::audio::clock::Clock;
use crate::audio::emitter::SoundEmitter;
use crate::error::EngineError;
use crate::messaging::channels::{CommandConsumer, NotificationProducer};
use crate::messaging::command::Command;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::sequencer::scheduler::MetronomeEngine;
use ringbuf::traits::{Consumer, Producer};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct SchedulerDriver<C: Clock, E: SoundEmitter> {
    engine: MetronomeEngine<C, E>,
    commands: CommandConsumer,
    notifications: Arc<Mutex<NotificationProducer>>,
    tick_interval: Duration,
}

impl<C: Clock, E: SoundEmitter> SchedulerDriver<C, E> {
    pub fn new(
        engine: MetronomeEngine<C, E>,
        commands: CommandConsumer,
        notifications: Arc<Mutex<NotificationProducer>>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            engine,
            commands,
            notifications,
            tick_interval,
        }
    }

    pub fn engine(&self) -> &MetronomeEngine<C, E> {
        &self.engine
    }

    pub fn into_engine(self) -> MetronomeEngine<C, E> {
        self.engine
    }

    /// Apply one command. Failures become notifications, never panics.
    pub fn apply_command(&mut self, command: Command) -> ControlFlow<()> {
        log::debug!("Command: {:?}", command);
        let engine = &mut self.engine;
        let result: Result<(), EngineError> = match command {
            Command::Start(mode) => {
                let mode = mode.unwrap_or(engine.mode());
                engine.start(mode)
            }
            Command::Stop => {
                engine.stop();
                Ok(())
            }
            Command::SetMode(mode) => {
                engine.set_mode(mode);
                Ok(())
            }
            Command::SetBpm(bpm) => engine.set_bpm(bpm).map_err(Into::into),
            Command::SetTimeSignature {
                numerator,
                denominator,
            } => engine
                .set_time_signature(numerator, denominator)
                .map_err(Into::into),
            Command::ToggleAccent(beat) => engine.toggle_accent(beat).map(drop).map_err(Into::into),
            Command::SetAccents(spec) => engine.set_accents(&spec).map_err(Into::into),
            Command::SetSubdivision(factor) => engine.set_subdivision(factor).map_err(Into::into),
            Command::SetClaveCell { index, step } => {
                engine.set_clave_cell(index, step).map_err(Into::into)
            }
            Command::CycleClaveCell(index) => {
                engine.cycle_clave_cell(index).map(drop).map_err(Into::into)
            }
            Command::SetClavePattern(grid) => engine.set_clave_pattern(&grid).map_err(Into::into),
            Command::ApplyPreset(preset) => {
                engine.apply_preset(preset);
                Ok(())
            }
            Command::SetClaveCycleLength(length) => {
                engine.set_clave_cycle_length(length).map_err(Into::into)
            }
            Command::AddSection(draft) => engine.add_section(&draft).map(drop).map_err(Into::into),
            Command::RemoveSection(index) => engine.remove_section(index).map(drop),
            Command::Quit => {
                engine.stop();
                return ControlFlow::Break(());
            }
        };

        if let Err(e) = result {
            self.report(&e);
        }
        ControlFlow::Continue(())
    }

    /// Apply every queued command
    pub fn drain_commands(&mut self) -> ControlFlow<()> {
        while let Some(command) = self.commands.try_pop() {
            self.apply_command(command)?;
        }
        ControlFlow::Continue(())
    }

    /// One driver iteration without the sleep
    pub fn run_once(&mut self) -> ControlFlow<()> {
        self.drain_commands()?;
        self.engine.tick();
        ControlFlow::Continue(())
    }

    /// Loop until `Command::Quit`, then hand the engine back
    pub fn run(mut self) -> MetronomeEngine<C, E> {
        log::debug!("Scheduler running every {:?}", self.tick_interval);
        while self.run_once().is_continue() {
            thread::sleep(self.tick_interval);
        }
        log::debug!("Scheduler thread exiting");
        self.engine
    }

    fn report(&self, error: &EngineError) {
        log::warn!("{}", error);
        let category = match error {
            EngineError::Validation(_) => NotificationCategory::Validation,
            EngineError::Audio(_) => NotificationCategory::Audio,
            EngineError::EmptyTimeMap | EngineError::SectionOutOfRange { .. } => {
                NotificationCategory::Transport
            }
        };
        if let Ok(mut tx) = self.notifications.lock() {
            let _ = tx.try_push(Notification::error(category, error.to_string()));
        }
    }
}

impl<C, E> SchedulerDriver<C, E>
where
    C: Clock + 'static,
    E: SoundEmitter + Send + 'static,
{
    /// Move the driver onto its own thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<MetronomeEngine<C, E>>> {
        thread::Builder::new()
            .name("metronome-scheduler".to_string())
            .spawn(move || self.run())
    }
}
