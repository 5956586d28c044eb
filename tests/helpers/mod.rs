//! Shared test helpers: a scripted media backend and render utilities.
//!
//! The mock backend keys source plans by the `ext` argument, so tests
//! "open" sources by name ("A", "B", ...) without touching real files.
#![allow(dead_code)]

use stagemix::{
    AudioEngine, EngineConfig, Error, MediaBackend, MediaInput, MediaSource, PlayParams, Result,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const RATE: u32 = 48000;
pub const BUFFER: u32 = 1024;

/// What a scripted source produces: `frames` stereo frames of a constant
/// sample value, then EOF.
#[derive(Clone)]
pub struct SourcePlan {
    pub frames: u64,
    pub value: i16,
    pub duration: f64,
    pub fail_open: bool,
    /// Cap frames per `read_audio` call; 0 = unlimited.
    pub max_chunk: usize,
    /// When set, `is_ready` follows this flag instead of `start`.
    pub ready_flag: Option<Arc<AtomicBool>>,
}

impl SourcePlan {
    pub fn tone(frames: u64, value: i16) -> Self {
        Self {
            frames,
            value,
            duration: frames as f64 / RATE as f64,
            fail_open: false,
            max_chunk: 0,
            ready_flag: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::tone(0, 0)
        }
    }
}

pub struct MockBackend {
    plans: Mutex<HashMap<String, SourcePlan>>,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub rate: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(HashMap::new()),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            rate: AtomicU32::new(0),
        })
    }

    pub fn script(&self, name: &str, plan: SourcePlan) {
        self.plans.lock().unwrap().insert(name.to_string(), plan);
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }
}

impl MediaBackend for MockBackend {
    fn init(&self, rate: u32, _status: bool, _equal_mono: bool) {
        self.rate.store(rate, Ordering::Relaxed);
    }

    fn open(&self, _input: MediaInput, ext: &str) -> Result<Box<dyn MediaSource>> {
        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(ext)
            .cloned()
            .ok_or_else(|| Error::Sound(format!("no plan scripted for '{}'", ext)))?;
        if plan.fail_open {
            return Err(Error::Sound(format!("scripted open failure for '{}'", ext)));
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockSource {
            remaining: plan.frames,
            value: plan.value,
            duration: plan.duration,
            max_chunk: plan.max_chunk,
            ready_flag: plan.ready_flag,
            started: false,
            closed: Arc::clone(&self.closed),
        }))
    }
}

pub struct MockSource {
    remaining: u64,
    value: i16,
    duration: f64,
    max_chunk: usize,
    ready_flag: Option<Arc<AtomicBool>>,
    started: bool,
    closed: Arc<AtomicUsize>,
}

impl MediaSource for MockSource {
    fn set_range(&mut self, _start_s: f64, _end_s: f64) {}

    fn start(&mut self) {
        self.started = true;
    }

    fn pause(&mut self, _paused: bool) {}

    fn is_ready(&self) -> bool {
        match &self.ready_flag {
            Some(flag) => flag.load(Ordering::Relaxed),
            None => self.started,
        }
    }

    fn read_audio(&mut self, dest: &mut [i16]) -> usize {
        let want = dest.len() / 2;
        let mut n = want.min(self.remaining as usize);
        if self.max_chunk > 0 {
            n = n.min(self.max_chunk);
        }
        for frame in 0..n {
            dest[frame * 2] = self.value;
            dest[frame * 2 + 1] = self.value;
        }
        self.remaining -= n as u64;
        n
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}

/// An engine with no device, at the standard test rate and buffer size.
pub fn offline_engine(backend: Arc<MockBackend>) -> AudioEngine {
    let config = EngineConfig {
        freq: RATE,
        samples: BUFFER,
        ..Default::default()
    };
    AudioEngine::offline(config, backend).expect("offline engine")
}

/// Render `frames` stereo frames in one call.
pub fn render_frames(engine: &AudioEngine, frames: usize) -> Vec<i16> {
    let mut out = vec![0i16; frames * 2];
    engine.render(&mut out);
    out
}

/// Default play parameters with a name.
pub fn params(name: &str) -> PlayParams {
    PlayParams {
        name: name.to_string(),
        ..Default::default()
    }
}

/// A throwaway byte source; the mock backend never reads it.
pub fn dummy_input() -> MediaInput {
    MediaInput::Reader(Box::new(Cursor::new(Vec::new())))
}

/// The expected i16 output for a full-gain input sample.
pub fn expected_output(value: i16) -> i16 {
    ((value as f32 / 32768.0) * 32767.0) as i16
}
