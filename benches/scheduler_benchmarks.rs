use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use practice_metronome::audio::click::ClickRenderer;
use practice_metronome::{ClickEvent, ManualClock, MetronomeEngine, Mode, SectionDraft};

const CADENCE: f64 = 0.025;

fn engine_for(mode: Mode) -> (MetronomeEngine<ManualClock, Vec<ClickEvent>>, ManualClock) {
    let clock = ManualClock::new(0.0);
    let mut engine = MetronomeEngine::new(clock.clone(), Vec::with_capacity(64));
    engine.set_subdivision(4).unwrap();
    for spec in [
        "classic:bpm=140,sig=7/8,sub=2,accents=3+5,measures=9999",
        "clave:bpm=100,pattern=x..x..x...o.o...,measures=9999",
    ] {
        let draft: SectionDraft = spec.parse().unwrap();
        engine.add_section(&draft).unwrap();
    }
    engine.start(mode).unwrap();
    (engine, clock)
}

/// Benchmark one scheduler tick per mode (runs every 25ms on the timer thread)
fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for mode in [Mode::Classic, Mode::Clave, Mode::TimeMap] {
        let (mut engine, clock) = engine_for(mode);
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            b.iter(|| {
                clock.advance(CADENCE);
                black_box(engine.tick());
                engine.emitter_mut().clear();
                if !engine.is_running() {
                    engine.start(mode).unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark a catch-up tick after the driver stalled for a full second
fn bench_stalled_tick(c: &mut Criterion) {
    c.bench_function("tick_after_stall", |b| {
        let (mut engine, clock) = engine_for(Mode::Classic);
        b.iter(|| {
            clock.advance(1.0);
            black_box(engine.tick());
            engine.emitter_mut().clear();
        });
    });
}

/// Benchmark click rendering (critical for real-time performance)
fn bench_click_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("click_render");
    let sample_rate = 48000.0;

    for buffer_size in [128usize, 512, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(buffer_size),
            &buffer_size,
            |b, &size| {
                let mut renderer = ClickRenderer::new(sample_rate);
                let mut data = vec![0.0f32; size * 2];
                let mut frame = 0u64;
                b.iter(|| {
                    if renderer.active_voices() == 0 && renderer.pending_clicks() == 0 {
                        renderer.queue(&ClickEvent {
                            frequency: 1500.0,
                            volume: 1.0,
                            duration: 0.05,
                            time: frame as f64 / sample_rate as f64,
                        });
                    }
                    renderer.render(&mut data, 2, frame, 0.8);
                    frame += size as u64;
                    black_box(&data);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_tick, bench_stalled_tick, bench_click_render);
criterion_main!(benches);
