//! Render-path benchmark: one device buffer across a spread of active
//! channel counts.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use stagemix::{
    AudioEngine, EngineConfig, MediaBackend, MediaInput, MediaSource, PlayParams, Result,
};
use std::sync::Arc;

/// Endless tone source; the decoder cost is constant so the measurement
/// tracks the mixer itself.
struct ToneSource {
    value: i16,
    started: bool,
}

impl MediaSource for ToneSource {
    fn set_range(&mut self, _start_s: f64, _end_s: f64) {}

    fn start(&mut self) {
        self.started = true;
    }

    fn pause(&mut self, _paused: bool) {}

    fn is_ready(&self) -> bool {
        self.started
    }

    fn read_audio(&mut self, dest: &mut [i16]) -> usize {
        for sample in dest.iter_mut() {
            *sample = self.value;
        }
        dest.len() / 2
    }

    fn duration(&self) -> f64 {
        0.0
    }
}

struct ToneBackend;

impl MediaBackend for ToneBackend {
    fn init(&self, _rate: u32, _status: bool, _equal_mono: bool) {}

    fn open(&self, _input: MediaInput, _ext: &str) -> Result<Box<dyn MediaSource>> {
        Ok(Box::new(ToneSource {
            value: 8192,
            started: false,
        }))
    }
}

fn dummy_input() -> MediaInput {
    MediaInput::Reader(Box::new(std::io::Cursor::new(Vec::new())))
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_1024_frames");

    for channels in [1usize, 8, 32] {
        let engine = AudioEngine::offline(EngineConfig::default(), Arc::new(ToneBackend))
            .expect("offline engine");
        for ch in 0..channels {
            engine
                .play(
                    ch as i64,
                    dummy_input(),
                    "tone",
                    PlayParams {
                        name: format!("tone-{}", ch),
                        ..Default::default()
                    },
                )
                .expect("play");
            engine.set_pan(ch as i64, -0.5, 0.0).expect("pan");
        }

        let mut out = vec![0i16; 1024 * 2];
        group.bench_with_input(
            BenchmarkId::from_parameter(channels),
            &channels,
            |b, _| {
                b.iter(|| {
                    engine.render(&mut out);
                    out[0]
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
