// practice-metronome - Headless metronome player
//
// Usage:
//   practice-metronome [classic|clave|timemap] [options]
//
// While playing, type commands on stdin (`bpm 96`, `sig 7/8`, `cell 5`,
// `stop`, `start clave`, `quit`, ...).

use practice_metronome::audio::engine::AudioEngine;
use practice_metronome::messaging::channels::CommandProducer;
use practice_metronome::sequencer::display::DisplayObserver;
use practice_metronome::{
    ClavePreset, Clock, Command, DisplayState, EngineConfig, MetronomeEngine, Mode, Section,
    SectionDraft, SharedTransportState, SchedulerDriver, create_command_channel,
    create_notification_channel,
};
use ringbuf::traits::{Consumer, Producer};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use std::{env, io, process, thread};

const COMMAND_RINGBUFFER_CAPACITY: usize = 64;
const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 64;
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Rendered frames still sit in the device buffer before they are heard
const OUTPUT_DRAIN_SECS: f64 = 0.1;

const USAGE: &str = "\
Usage: practice-metronome [classic|clave|timemap] [options]

Options:
  --bpm N            tempo (20-999)
  --sig N/D          time signature, e.g. 7/8
  --sub N            clicks per beat (1-4)
  --accents 2,4      accented beats (one-based)
  --preset NAME      clave preset: son-3-2, son-2-3, rumba-3-2, bossa-nova
  --pattern GRID     16-character clave grid (x strong, o medium, . off)
  --length N         clave cycle length (1-16)
  --section SPEC     add a time map section (repeatable), e.g.
                     classic:bpm=120,sig=4/4,sub=2,accents=3,measures=2
                     clave:bpm=100,pattern=x..x..x...o.o...,length=16,measures=4
                     pause:measures=1
  --seconds N        stop after N seconds
  --config PATH      RON or JSON config file
  --json             print display updates as JSON lines";

#[derive(Debug, Default)]
struct CliArgs {
    mode: Mode,
    bpm: Option<f64>,
    time_signature: Option<(u8, u8)>,
    subdivision: Option<u8>,
    accents: Option<String>,
    preset: Option<ClavePreset>,
    pattern: Option<String>,
    cycle_length: Option<usize>,
    sections: Vec<SectionDraft>,
    seconds: Option<f64>,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--bpm" => cli.bpm = Some(parse_number("--bpm", &value("--bpm")?)?),
            "--sig" => {
                let sig = value("--sig")?;
                let (num, den) = sig
                    .split_once('/')
                    .ok_or_else(|| format!("--sig expects N/D, got '{}'", sig))?;
                cli.time_signature = Some((parse_number("--sig", num)?, parse_number("--sig", den)?));
            }
            "--sub" => cli.subdivision = Some(parse_number("--sub", &value("--sub")?)?),
            "--accents" => cli.accents = Some(value("--accents")?),
            "--preset" => {
                cli.preset = Some(value("--preset")?.parse().map_err(|e| format!("{}", e))?)
            }
            "--pattern" => cli.pattern = Some(value("--pattern")?),
            "--length" => cli.cycle_length = Some(parse_number("--length", &value("--length")?)?),
            "--section" => {
                let spec = value("--section")?;
                cli.sections
                    .push(spec.parse().map_err(|e| format!("--section {}: {}", spec, e))?);
            }
            "--seconds" => cli.seconds = Some(parse_number("--seconds", &value("--seconds")?)?),
            "--config" => cli.config = Some(PathBuf::from(value("--config")?)),
            "--json" => cli.json = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            mode if !mode.starts_with('-') => {
                cli.mode = mode.parse().map_err(|e| format!("{}", e))?;
            }
            other => return Err(format!("Unknown option '{}'\n\n{}", other, USAGE)),
        }
    }
    Ok(cli)
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", name, value))
}

/// Prints each time map section as it starts
struct SectionAnnouncer;

impl DisplayObserver for SectionAnnouncer {
    fn display_changed(&mut self, _state: &DisplayState) {}

    fn section_applied(&mut self, index: usize, section: &Section) {
        println!("\n> Section {}: {}", index + 1, section);
    }
}

/// Apply command-line parameters before playback starts
fn configure<C, E>(engine: &mut MetronomeEngine<C, E>, cli: &CliArgs) -> Result<(), String>
where
    C: practice_metronome::Clock,
    E: practice_metronome::SoundEmitter,
{
    if let Some(bpm) = cli.bpm {
        engine.set_bpm(bpm).map_err(|e| e.to_string())?;
    }
    if let Some((numerator, denominator)) = cli.time_signature {
        engine
            .set_time_signature(numerator, denominator)
            .map_err(|e| e.to_string())?;
    }
    if let Some(factor) = cli.subdivision {
        engine.set_subdivision(factor).map_err(|e| e.to_string())?;
    }
    if let Some(accents) = &cli.accents {
        engine.set_accents(accents).map_err(|e| e.to_string())?;
    }
    if let Some(preset) = cli.preset {
        engine.apply_preset(preset);
    }
    if let Some(pattern) = &cli.pattern {
        engine.set_clave_pattern(pattern).map_err(|e| e.to_string())?;
    }
    if let Some(length) = cli.cycle_length {
        engine
            .set_clave_cycle_length(length)
            .map_err(|e| e.to_string())?;
    }
    for draft in &cli.sections {
        engine.add_section(draft).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Forward console lines to the main loop
///
/// If the reader thread cannot start, the returned receiver is simply empty.
fn spawn_line_reader<R>(input: R) -> Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in input.lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Could not start the stdin reader, console commands are off: {}", e);
    }
    rx
}

/// Keep offering Quit until the scheduler takes it
///
/// Returns false when the scheduler went away first.
fn send_quit(command_tx: &mut CommandProducer, scheduler_alive: impl Fn() -> bool) -> bool {
    let mut quit = Command::Quit;
    loop {
        match command_tx.try_push(quit) {
            Ok(()) => return true,
            Err(returned) if scheduler_alive() => {
                quit = returned;
                thread::sleep(STATUS_POLL_INTERVAL);
            }
            Err(_) => return false,
        }
    }
}

/// Returns false once the user asked to quit
fn forward_line(line: &str, command_tx: &mut CommandProducer) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    match line.parse::<Command>() {
        Ok(Command::Quit) => false,
        Ok(command) => {
            if command_tx.try_push(command).is_err() {
                eprintln!("\nCommand queue full, try again");
            }
            true
        }
        Err(e) => {
            eprintln!("\n{}", e);
            true
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args).unwrap_or_else(|message| {
        eprintln!("{}", message);
        process::exit(1);
    });

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path).unwrap_or_else(|e| {
            eprintln!("Failed to load {}: {}", path.display(), e);
            process::exit(1);
        }),
        None => EngineConfig::load_or_default(None),
    };

    let _ = TermLogger::init(
        config.level_filter(),
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let (mut command_tx, command_rx) = create_command_channel(COMMAND_RINGBUFFER_CAPACITY);
    let (notification_tx, mut notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);
    let notification_tx = Arc::new(Mutex::new(notification_tx));

    let (audio, clicks) = AudioEngine::new(&config, notification_tx.clone()).unwrap_or_else(|e| {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    });

    let mut engine = MetronomeEngine::with_config(audio.clock(), clicks, &config);
    if let Err(message) = configure(&mut engine, &cli) {
        eprintln!("{}", message);
        process::exit(1);
    }

    let shared = SharedTransportState::new();
    engine.add_observer(Box::new(Arc::clone(&shared)));
    engine.add_observer(Box::new(SectionAnnouncer));

    let driver = SchedulerDriver::new(
        engine,
        command_rx,
        notification_tx,
        config.tick_interval(),
    );
    let scheduler = driver.spawn().unwrap_or_else(|e| {
        eprintln!("Failed to start scheduler thread: {}", e);
        process::exit(1);
    });

    let _ = command_tx.try_push(Command::Start(Some(cli.mode)));
    let lines = spawn_line_reader(io::BufReader::new(io::stdin()));

    let audio_clock = audio.clock();
    let started = Instant::now();
    let mut last_generation = shared.generation();

    'main: loop {
        while let Ok(line) = lines.try_recv() {
            if !forward_line(&line, &mut command_tx) {
                break 'main;
            }
        }

        while let Some(notification) = notification_rx.try_pop() {
            eprintln!("\n{}", notification);
        }

        let generation = shared.generation();
        if generation != last_generation {
            last_generation = generation;
            let state = shared.snapshot();
            if cli.json {
                match serde_json::to_string(&state) {
                    Ok(json) => println!("{}", json),
                    Err(e) => log::warn!("Could not encode display state: {}", e),
                }
            } else {
                print!("\r{:<60}", state.to_string());
                let _ = io::stdout().flush();
            }
        }

        // A finished time map exits once its tail has been heard; a manual
        // stop keeps the console open
        if shared
            .finished_at()
            .is_some_and(|end| audio_clock.now() >= end + OUTPUT_DRAIN_SECS)
        {
            break;
        }

        if cli
            .seconds
            .is_some_and(|limit| started.elapsed().as_secs_f64() >= limit)
        {
            break;
        }
        thread::sleep(STATUS_POLL_INTERVAL);
    }

    if !send_quit(&mut command_tx, || !scheduler.is_finished()) {
        log::warn!("Scheduler thread exited before the quit command");
    }
    if audio.dropped_clicks() > 0 {
        log::warn!("{} clicks were dropped by the renderer", audio.dropped_clicks());
    }
    if scheduler.join().is_err() {
        log::error!("Scheduler thread panicked");
    }
    drop(audio);
    println!("\rDone.{:<60}", "");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_args() {
        let cli = parse_args(&args(
            "clave --bpm 96 --preset son-2-3 --length 12 --seconds 30 --json",
        ))
        .unwrap();
        assert_eq!(cli.mode, Mode::Clave);
        assert_eq!(cli.bpm, Some(96.0));
        assert_eq!(cli.preset, Some(ClavePreset::Son23));
        assert_eq!(cli.cycle_length, Some(12));
        assert_eq!(cli.seconds, Some(30.0));
        assert!(cli.json);
    }

    #[test]
    fn test_parse_sections() {
        let cli = parse_args(&args(
            "timemap --section classic:bpm=120,sig=3/4,measures=2 --section pause:measures=1",
        ))
        .unwrap();
        assert_eq!(cli.mode, Mode::TimeMap);
        assert_eq!(cli.sections.len(), 2);
        assert_eq!(cli.time_signature, None);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args("--bpm")).is_err());
        assert!(parse_args(&args("--sig 4")).is_err());
        assert!(parse_args(&args("--frobnicate")).is_err());
        assert!(parse_args(&args("polka")).is_err());
        assert!(parse_args(&args("--section waltz:bpm=90")).is_err());
    }

    #[test]
    fn test_line_reader_forwards_every_line() {
        let lines = spawn_line_reader(io::Cursor::new("bpm 96\nstop\n"));
        let received: Vec<String> = lines.iter().collect();
        assert_eq!(received, vec!["bpm 96", "stop"]);
    }

    #[test]
    fn test_send_quit_waits_for_room() {
        let (mut tx, mut rx) = create_command_channel(1);
        tx.try_push(Command::Stop).unwrap();

        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut received = Vec::new();
            while received.len() < 2 {
                match rx.try_pop() {
                    Some(command) => received.push(command),
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            received
        });

        assert!(send_quit(&mut tx, || true));
        assert_eq!(reader.join().unwrap(), vec![Command::Stop, Command::Quit]);
    }

    #[test]
    fn test_send_quit_gives_up_without_scheduler() {
        let (mut tx, _rx) = create_command_channel(1);
        tx.try_push(Command::Stop).unwrap();
        assert!(!send_quit(&mut tx, || false));
    }
}
