// Scheduling tests - Lookahead timing, playhead cycling and display lag
//
// Every test drives the engine with a ManualClock and records clicks into a Vec,
// so timing is fully deterministic.

use practice_metronome::error::{AudioError, EngineError};
use practice_metronome::sequencer::metronome::ClickSounds;
use practice_metronome::{
    ClickEvent, Clock, DisplayObserver, DisplayState, EngineConfig, ManualClock, MetronomeEngine,
    Mode, TransportState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

const CADENCE: f64 = 0.025;

type TestEngine = MetronomeEngine<ManualClock, Vec<ClickEvent>>;

fn engine() -> (TestEngine, ManualClock) {
    let clock = ManualClock::new(0.0);
    let config = EngineConfig {
        start_delay_secs: 0.0,
        ..EngineConfig::default()
    };
    let engine = MetronomeEngine::with_config(clock.clone(), Vec::new(), &config);
    (engine, clock)
}

struct DisplayLog(Arc<Mutex<Vec<DisplayState>>>);

impl DisplayObserver for DisplayLog {
    fn display_changed(&mut self, state: &DisplayState) {
        self.0.lock().unwrap().push(*state);
    }
}

fn display_log(engine: &mut TestEngine) -> Arc<Mutex<Vec<DisplayState>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    engine.add_observer(Box::new(DisplayLog(Arc::clone(&log))));
    log
}

/// Tick on a steady cadence until `count` clicks were emitted
fn run_until(engine: &mut TestEngine, clock: &ManualClock, count: usize) {
    for _ in 0..10_000 {
        if engine.emitter().len() >= count {
            return;
        }
        engine.tick();
        clock.advance(CADENCE);
    }
    panic!("engine never reached {} clicks", count);
}

fn times(events: &[ClickEvent]) -> Vec<f64> {
    events.iter().map(|e| e.time).collect()
}

// ============================================================================
// Classic
// ============================================================================

#[test]
fn test_classic_120_bpm_four_four() {
    let (mut engine, clock) = engine();
    let displays = display_log(&mut engine);
    engine.set_bpm(120.0).unwrap();
    engine.set_time_signature(4, 4).unwrap();
    engine.set_subdivision(1).unwrap();

    engine.start(Mode::Classic).unwrap();
    run_until(&mut engine, &clock, 8);

    let events = &engine.emitter()[..8];
    for pair in events.windows(2) {
        assert_eq!(pair[1].time - pair[0].time, 0.5);
    }

    let sounds = ClickSounds::default();
    for (i, event) in events.iter().enumerate() {
        let expected = if i % 4 == 0 {
            sounds.downbeat.frequency
        } else {
            sounds.beat.frequency
        };
        assert_eq!(event.frequency, expected, "click {}", i);
    }

    let beats: Vec<usize> = displays
        .lock()
        .unwrap()
        .iter()
        .filter_map(|d| d.beat)
        .take(8)
        .collect();
    assert_eq!(beats, vec![0, 1, 2, 3, 0, 1, 2, 3]);
}

#[test]
fn test_downbeat_wins_over_accent() {
    let (mut engine, clock) = engine();
    // Beat 1 is accepted but never stored as an accent
    engine.set_accents("1, 3").unwrap();
    assert_eq!(engine.toggle_accent(0), Ok(false));

    engine.start(Mode::Classic).unwrap();
    run_until(&mut engine, &clock, 4);

    let sounds = ClickSounds::default();
    let events = engine.emitter();
    assert_eq!(events[0].frequency, sounds.downbeat.frequency);
    assert_eq!(events[0].volume, sounds.downbeat.volume);
    assert_eq!(events[2].frequency, sounds.accent.frequency);
    assert_eq!(events[1].frequency, sounds.beat.frequency);
}

#[test]
fn test_display_never_shows_unscheduled_click() {
    let (mut engine, clock) = engine();
    let displays = display_log(&mut engine);
    engine.set_subdivision(4).unwrap();
    engine.start(Mode::Classic).unwrap();

    for _ in 0..200 {
        let before = engine.emitter().len();
        engine.tick();
        if engine.emitter().len() > before {
            let display = *displays.lock().unwrap().last().unwrap();
            let last = engine.emitter().last().unwrap();
            // The display points at the last queued click, the playhead is past it
            assert!(engine.classic_playhead().next_event_time() > last.time);
            let shown = (display.beat.unwrap(), display.subdivision.unwrap());
            let index = engine.emitter().len() - 1;
            assert_eq!(shown, ((index / 4) % 4, index % 4));
        }
        clock.advance(CADENCE);
    }
}

// ============================================================================
// Clave
// ============================================================================

#[test]
fn test_clave_cycle_length_bounds_index() {
    let (mut engine, clock) = engine();
    let displays = display_log(&mut engine);
    engine.set_clave_pattern("xxxxxxxxoooooooo").unwrap();
    engine.set_clave_cycle_length(8).unwrap();

    engine.start(Mode::Clave).unwrap();
    run_until(&mut engine, &clock, 40);

    let indices: Vec<usize> = displays
        .lock()
        .unwrap()
        .iter()
        .filter_map(|d| d.clave_index)
        .collect();
    assert!(indices.len() >= 40);
    assert!(indices.iter().all(|&i| i < 8));
    for pair in indices.windows(2) {
        assert_eq!(pair[1], (pair[0] + 1) % 8);
    }
    assert!(indices.windows(2).any(|pair| pair == [7, 0]));

    // Slots 8..16 hold medium steps that must never sound
    let sounds = ClickSounds::default();
    assert!(engine
        .emitter()
        .iter()
        .all(|e| e.frequency == sounds.clave_strong.frequency));
}

#[test]
fn test_clave_rests_advance_time() {
    let (mut engine, clock) = engine();
    engine.set_clave_pattern("x...o...........").unwrap();
    engine.set_bpm(60.0).unwrap();
    engine.start(Mode::Clave).unwrap();

    clock.set(4.5);
    engine.tick();

    // 60 BPM sixteenths are 0.25s: one full cycle is 4s
    assert_eq!(times(engine.emitter()), vec![0.0, 1.0, 4.0]);
    assert_eq!(engine.display().clave_index, Some(2));
}

// ============================================================================
// Lookahead and drift
// ============================================================================

#[test]
fn test_stalled_tick_emits_every_due_click() {
    let (mut smooth, smooth_clock) = engine();
    let (mut stalled, stalled_clock) = engine();
    for engine in [&mut smooth, &mut stalled] {
        engine.set_bpm(480.0).unwrap();
        engine.set_subdivision(4).unwrap();
        engine.start(Mode::Classic).unwrap();
    }

    // Reference: a tick every 25ms up to 0.5s
    for _ in 0..20 {
        smooth.tick();
        smooth_clock.advance(CADENCE);
    }
    smooth.tick();

    // Same span, but the driver freezes for three cadences in the middle
    for _ in 0..10 {
        stalled.tick();
        stalled_clock.advance(CADENCE);
    }
    stalled_clock.advance(CADENCE * 3.0);
    let burst = stalled.tick();
    assert!(burst >= 2, "stalled tick only emitted {}", burst);
    for _ in 0..7 {
        stalled_clock.advance(CADENCE);
        stalled.tick();
    }

    assert_eq!(times(stalled.emitter()), times(smooth.emitter()));
    for (i, event) in stalled.emitter().iter().enumerate() {
        assert_eq!(event.time, i as f64 * 0.03125);
    }
}

#[test]
fn test_jittered_cadence_never_drifts() {
    let (mut engine, clock) = engine();
    engine.set_subdivision(2).unwrap();
    engine.start(Mode::Classic).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..400 {
        let now = clock.now();
        let before = engine.emitter().len();
        engine.tick();
        // Every new click is queued ahead of the clock
        assert!(engine.emitter()[before..].iter().all(|e| e.time >= now));
        clock.advance(rng.gen_range(0.005..0.06));
    }

    let events = engine.emitter();
    assert!(events.len() > 40);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.time, i as f64 * 0.25);
    }
}

#[test]
fn test_late_start_tick_catches_up() {
    let clock = ManualClock::new(10.0);
    let mut engine = MetronomeEngine::new(clock.clone(), Vec::<ClickEvent>::new());
    engine.start(Mode::Classic).unwrap();

    clock.advance(1.0);
    let emitted = engine.tick();
    // Clicks at 10.05, 10.55 and 11.05 are all before 11.1
    assert_eq!(emitted, 3);
    let events = engine.emitter();
    assert!((events[2].time - events[0].time - 1.0).abs() < 1e-9);
}

// ============================================================================
// Transport
// ============================================================================

#[test]
fn test_empty_time_map_is_rejected() {
    let (mut engine, clock) = engine();
    let result = engine.start(Mode::TimeMap);
    assert!(matches!(result, Err(EngineError::EmptyTimeMap)));
    assert_eq!(engine.state(), TransportState::Idle);

    clock.advance(1.0);
    assert_eq!(engine.tick(), 0);
    assert!(engine.emitter().is_empty());
}

#[test]
fn test_rejected_start_keeps_current_playback() {
    let (mut engine, clock) = engine();
    engine.start(Mode::Clave).unwrap();
    engine.tick();

    assert!(engine.start(Mode::TimeMap).is_err());
    assert_eq!(engine.state(), TransportState::Running);
    assert_eq!(engine.mode(), Mode::Clave);

    clock.advance(0.125);
    engine.tick();
    assert_eq!(engine.display().clave_index, Some(1));
}

struct DeadClock;

impl Clock for DeadClock {
    fn now(&self) -> f64 {
        0.0
    }

    fn resume(&self) -> Result<(), AudioError> {
        Err(AudioError::ClockUnavailable("device lost".to_string()))
    }
}

#[test]
fn test_clock_failure_leaves_engine_idle() {
    let mut engine = MetronomeEngine::new(DeadClock, Vec::<ClickEvent>::new());
    let result = engine.start(Mode::Classic);
    assert!(matches!(result, Err(EngineError::Audio(_))));
    assert_eq!(engine.state(), TransportState::Idle);
    assert_eq!(engine.tick(), 0);
}

#[test]
fn test_stop_resets_everything() {
    let (mut engine, clock) = engine();
    engine.start(Mode::Classic).unwrap();
    run_until(&mut engine, &clock, 3);

    engine.stop();
    assert_eq!(engine.state(), TransportState::Idle);
    assert_eq!(engine.classic_playhead().beat(), 0);
    assert_eq!(engine.classic_playhead().next_event_time(), 0.0);
    assert_eq!(*engine.display(), DisplayState::idle(Mode::Classic));

    // Restarting begins a fresh measure relative to the current clock
    let now = clock.now();
    engine.start(Mode::Classic).unwrap();
    engine.tick();
    let last = engine.emitter().last().unwrap();
    assert_eq!(last.time, now);
    assert_eq!(last.frequency, ClickSounds::default().downbeat.frequency);
}
