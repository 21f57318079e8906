// Scheduler - Lookahead metronome engine
//
// One context owns every mode, playhead and the section list. `tick()` is
// called on a fixed cadence by whatever timer the host has; each call queues
// all events due before `clock.now() + lookahead` with their absolute times,
// so a late or jittery tick never shifts a click.

use super::clave::{self, ClavePlayhead, ClavePreset, ClaveSettings, ClaveStep};
use super::display::{DisplayObserver, DisplayState};
use super::metronome::{self, ClassicPlayhead, ClassicSettings, ClickSounds};
use super::section::{Section, SectionDraft, SectionKind};
use super::timemap::TimeMap;
use super::timeline::{AccentSet, Subdivision, Tempo, TimeSignature};
use super::transport::{Mode, TransportState};
use crate::audio::clock::Clock;
use crate::audio::emitter::{ClickEvent, SoundEmitter};
use crate::config::EngineConfig;
use crate::error::{EngineError, ValidationError};

/// Forwards clicks and counts them
struct CountingEmitter<'a, E: SoundEmitter> {
    inner: &'a mut E,
    count: usize,
    /// Latest time at which a passed click stops sounding
    tail: f64,
}

impl<'a, E: SoundEmitter> CountingEmitter<'a, E> {
    fn new(inner: &'a mut E) -> Self {
        Self {
            inner,
            count: 0,
            tail: f64::NEG_INFINITY,
        }
    }
}

impl<E: SoundEmitter> SoundEmitter for CountingEmitter<'_, E> {
    fn schedule(&mut self, event: ClickEvent) {
        self.count += 1;
        self.tail = self.tail.max(event.time + event.duration as f64);
        self.inner.schedule(event);
    }
}

/// Outcome of one mode's scheduling pass
struct Pass {
    emitted: usize,
    stepped: bool,
    /// Set when the time map ran out: the time its last measure and click end
    finished: Option<f64>,
}

/// Metronome engine: Classic, Clave and TimeMap generators behind one transport
pub struct MetronomeEngine<C: Clock, E: SoundEmitter> {
    clock: C,
    emitter: E,
    lookahead: f64,
    start_delay: f64,
    sounds: ClickSounds,
    observers: Vec<Box<dyn DisplayObserver>>,

    transport: TransportState,
    mode: Mode,
    tempo: Tempo,
    classic: ClassicSettings,
    clave: ClaveSettings,

    classic_playhead: ClassicPlayhead,
    clave_playhead: ClavePlayhead,
    time_map: TimeMap,
    /// End of the last click the time map has scheduled since the start
    sounding_until: f64,
    display: DisplayState,
}

impl<C: Clock, E: SoundEmitter> MetronomeEngine<C, E> {
    pub fn new(clock: C, emitter: E) -> Self {
        Self::with_config(clock, emitter, &EngineConfig::default())
    }

    pub fn with_config(clock: C, emitter: E, config: &EngineConfig) -> Self {
        Self {
            clock,
            emitter,
            lookahead: config.lookahead_secs,
            start_delay: config.start_delay_secs.max(0.0),
            sounds: config.sounds.clone(),
            observers: Vec::new(),
            transport: TransportState::Idle,
            mode: Mode::Classic,
            tempo: config.default_tempo(),
            classic: ClassicSettings::default(),
            clave: ClaveSettings::default(),
            classic_playhead: ClassicPlayhead::default(),
            clave_playhead: ClavePlayhead::default(),
            time_map: TimeMap::new(),
            sounding_until: 0.0,
            display: DisplayState::idle(Mode::Classic),
        }
    }

    /// Register an observer; it receives the current display state right away
    pub fn add_observer(&mut self, mut observer: Box<dyn DisplayObserver>) {
        observer.display_changed(&self.display);
        self.observers.push(observer);
    }

    // ========== TRANSPORT ==========

    /// Arm the scheduler in `mode`
    ///
    /// Rejects an empty time map and clock failures before touching any state.
    /// Starting while already running restarts from the top.
    pub fn start(&mut self, mode: Mode) -> Result<(), EngineError> {
        if mode == Mode::TimeMap && self.time_map.is_empty() {
            log::warn!("Refusing to start an empty time map");
            return Err(EngineError::EmptyTimeMap);
        }
        self.clock.resume()?;

        if self.transport.is_running() {
            self.stop();
        }

        let start_time = self.clock.now() + self.start_delay;
        self.mode = mode;
        self.classic_playhead.reset(start_time);
        self.clave_playhead.reset(start_time);
        self.time_map.rewind(start_time);
        self.sounding_until = start_time;
        self.transport = TransportState::Running;
        self.display = DisplayState {
            transport: TransportState::Running,
            ..DisplayState::idle(mode)
        };

        match mode {
            Mode::TimeMap => log::info!(
                "Started {} ({} sections) at {:.3}s",
                mode,
                self.time_map.len(),
                start_time
            ),
            _ => log::info!("Started {} at {} from {:.3}s", mode, self.tempo, start_time),
        }
        self.notify_transport();
        self.publish_display();
        Ok(())
    }

    /// Disarm and zero every playhead and the display. Always succeeds.
    pub fn stop(&mut self) {
        let was_running = self.transport.is_running();
        self.transport = TransportState::Idle;
        self.classic_playhead.reset(0.0);
        self.clave_playhead.reset(0.0);
        self.time_map.rewind(0.0);
        self.display = DisplayState::idle(self.mode);

        if was_running {
            log::info!("Stopped {}", self.mode);
            self.notify_transport();
        }
        self.publish_display();
    }

    /// Select the mode for the next start. Always stops first.
    pub fn set_mode(&mut self, mode: Mode) {
        self.stop();
        if self.mode != mode {
            self.mode = mode;
            self.display = DisplayState::idle(mode);
            self.publish_display();
        }
    }

    /// Queue every event due before `clock.now() + lookahead`
    ///
    /// Returns the number of clicks handed to the emitter. No-op while idle.
    pub fn tick(&mut self) -> usize {
        if !self.transport.is_running() {
            return 0;
        }
        let deadline = self.clock.now() + self.lookahead;

        let pass = match self.mode {
            Mode::Classic => self.schedule_classic(deadline),
            Mode::Clave => self.schedule_clave(deadline),
            Mode::TimeMap => self.schedule_time_map(deadline),
        };

        if let Some(end) = pass.finished {
            log::info!("Time map finished, sounding until {:.3}s", end);
            for observer in self.observers.iter_mut() {
                observer.time_map_finished(end);
            }
            self.stop();
        } else if pass.stepped {
            self.publish_display();
        }
        pass.emitted
    }

    fn schedule_classic(&mut self, deadline: f64) -> Pass {
        let mut emitter = CountingEmitter::new(&mut self.emitter);
        let mut last = None;
        while self.classic_playhead.next_event_time() < deadline {
            last = Some(self.classic_playhead.step(
                &self.tempo,
                &self.classic,
                &self.sounds,
                &mut emitter,
            ));
        }
        let emitted = emitter.count;

        if let Some((beat, subdivision)) = last {
            self.display.beat = Some(beat);
            self.display.subdivision = Some(subdivision);
        }
        Pass {
            emitted,
            stepped: last.is_some(),
            finished: None,
        }
    }

    fn schedule_clave(&mut self, deadline: f64) -> Pass {
        let mut emitter = CountingEmitter::new(&mut self.emitter);
        let mut last = None;
        while self.clave_playhead.next_event_time() < deadline {
            last = Some(self.clave_playhead.step(
                &self.tempo,
                &self.clave,
                &self.sounds,
                &mut emitter,
            ));
        }
        let emitted = emitter.count;

        if let Some(index) = last {
            self.display.clave_index = Some(index);
        }
        Pass {
            emitted,
            stepped: last.is_some(),
            finished: None,
        }
    }

    fn schedule_time_map(&mut self, deadline: f64) -> Pass {
        let mut emitter = CountingEmitter::new(&mut self.emitter);
        let mut stepped = false;
        let mut finished = None;

        while self.time_map.playhead().next_measure_time() < deadline {
            let playhead = *self.time_map.playhead();
            let index = playhead.section_index();
            let Some(section) = self.time_map.current_section().cloned() else {
                let clicks_end = self.sounding_until.max(emitter.tail);
                finished = Some(playhead.next_measure_time().max(clicks_end));
                break;
            };

            // All live parameters switch together before the measure is generated
            match &section.kind {
                SectionKind::Classic { tempo, settings } => {
                    self.tempo = *tempo;
                    self.classic = settings.clone();
                }
                SectionKind::Clave { tempo, settings } => {
                    self.tempo = *tempo;
                    self.clave = *settings;
                }
                SectionKind::Pause => {}
            }
            if playhead.measures_played() == 0 {
                log::debug!("Section {}: {}", index + 1, section);
                for observer in self.observers.iter_mut() {
                    observer.section_applied(index, &section);
                }
            }

            let start = playhead.next_measure_time();
            let duration = match &section.kind {
                SectionKind::Classic { tempo, settings } => {
                    metronome::schedule_measure(start, tempo, settings, &self.sounds, &mut emitter)
                }
                SectionKind::Clave { tempo, settings } => {
                    clave::schedule_measure(start, tempo, settings, &self.sounds, &mut emitter)
                }
                SectionKind::Pause => section.measure_duration(&self.tempo),
            };

            self.display.active_section = Some(index);
            self.display.section_progress =
                Some((playhead.measures_played() + 1, section.measures()));
            stepped = true;

            if self.time_map.advance(duration) {
                // The one-shot path never reads these, but a later switch back
                // to a continuous mode must not inherit stale positions
                self.classic_playhead.reset(0.0);
                self.clave_playhead.reset(0.0);
            }
        }

        self.sounding_until = self.sounding_until.max(emitter.tail);
        Pass {
            emitted: emitter.count,
            stepped,
            finished,
        }
    }

    fn publish_display(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.display_changed(&self.display);
        }
    }

    fn notify_transport(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.transport_changed(self.transport);
        }
    }

    // ========== LIVE PARAMETERS ==========
    // Each setter only affects events computed after it returns.

    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), ValidationError> {
        self.tempo = Tempo::new(bpm)?;
        log::debug!("Tempo set to {}", self.tempo);
        Ok(())
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
    }

    pub fn set_time_signature(
        &mut self,
        numerator: u8,
        denominator: u8,
    ) -> Result<(), ValidationError> {
        let time_signature = TimeSignature::new(numerator, denominator)?;
        self.classic.set_time_signature(time_signature);
        log::debug!("Time signature set to {}", time_signature);
        Ok(())
    }

    /// Toggle the accent on a zero-indexed beat, returns true if now accented
    pub fn toggle_accent(&mut self, beat: u8) -> Result<bool, ValidationError> {
        self.classic.toggle_accent(beat)
    }

    /// Replace the accent set from one-based beat numbers ("2,4")
    pub fn set_accents(&mut self, spec: &str) -> Result<(), ValidationError> {
        let accents = AccentSet::parse(spec, self.classic.time_signature())?;
        self.classic.accents = accents;
        Ok(())
    }

    pub fn set_subdivision(&mut self, factor: u8) -> Result<(), ValidationError> {
        self.classic.subdivision = Subdivision::from_factor(factor)?;
        Ok(())
    }

    pub fn set_classic_settings(&mut self, settings: ClassicSettings) {
        self.classic = settings;
    }

    pub fn set_clave_cell(&mut self, index: usize, step: ClaveStep) -> Result<(), ValidationError> {
        self.clave.pattern.set_step(index, step)
    }

    /// Advance one grid cell Off -> Strong -> Medium -> Off
    pub fn cycle_clave_cell(&mut self, index: usize) -> Result<ClaveStep, ValidationError> {
        self.clave.pattern.cycle_step(index)
    }

    pub fn set_clave_pattern(&mut self, grid: &str) -> Result<(), ValidationError> {
        self.clave.pattern = grid.parse()?;
        Ok(())
    }

    pub fn apply_preset(&mut self, preset: ClavePreset) {
        self.clave.pattern = preset.pattern();
        log::debug!("Clave preset {} applied", preset.name());
    }

    /// Shrinking the cycle mid-playback restarts the cycle on the next slot
    pub fn set_clave_cycle_length(&mut self, length: usize) -> Result<(), ValidationError> {
        self.clave.set_cycle_length(length)
    }

    pub fn set_sounds(&mut self, sounds: ClickSounds) {
        self.sounds = sounds;
    }

    // ========== SECTION LIST ==========

    /// Validate and append a section. Nothing changes on error.
    pub fn add_section(&mut self, draft: &SectionDraft) -> Result<usize, ValidationError> {
        let index = self.time_map.add_section(draft).inspect_err(|e| {
            log::warn!("Rejected section: {}", e);
        })?;
        log::debug!("Added section {}: {}", index + 1, self.time_map.sections()[index]);
        Ok(index)
    }

    pub fn push_section(&mut self, section: Section) -> usize {
        self.time_map.push(section)
    }

    /// Remove a section
    ///
    /// During TimeMap playback the active section is the one whose measure was
    /// scheduled last, even when the playhead already points past it. Removing
    /// it stops playback; removing an earlier one keeps the same section
    /// playing and removing a later one only edits what comes next.
    pub fn remove_section(&mut self, index: usize) -> Result<Section, EngineError> {
        let active = self
            .display
            .active_section
            .unwrap_or(self.time_map.playhead().section_index());
        let removed = self.time_map.remove(index)?;
        log::debug!("Removed section {}: {}", index + 1, removed);

        if self.mode == Mode::TimeMap && self.transport.is_running() {
            if index == active {
                log::info!("Active section removed, stopping playback");
                self.stop();
            } else if index < active {
                if let Some(current) = self.display.active_section.as_mut() {
                    *current -= 1;
                }
                self.publish_display();
            }
        }
        Ok(removed)
    }

    // ========== ACCESSORS ==========

    pub fn state(&self) -> TransportState {
        self.transport
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn tempo(&self) -> &Tempo {
        &self.tempo
    }

    pub fn classic(&self) -> &ClassicSettings {
        &self.classic
    }

    pub fn clave(&self) -> &ClaveSettings {
        &self.clave
    }

    pub fn sounds(&self) -> &ClickSounds {
        &self.sounds
    }

    pub fn time_map(&self) -> &TimeMap {
        &self.time_map
    }

    pub fn sections(&self) -> &[Section] {
        self.time_map.sections()
    }

    pub fn classic_playhead(&self) -> &ClassicPlayhead {
        &self.classic_playhead
    }

    pub fn clave_playhead(&self) -> &ClavePlayhead {
        &self.clave_playhead
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut E {
        &mut self.emitter
    }
}
