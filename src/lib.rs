//! # stagemix
//!
//! Multi-channel real-time audio mixing engine for game and visual-novel
//! playback.
//!
//! **Purpose:** Own a fixed-rate stereo output stream and an indexed set of
//! logical playback channels. Each channel carries at most one playing and
//! one queued source; every device callback decodes, applies per-channel
//! volume/pan/fade envelopes, sums, and clips into a single interleaved
//! stereo buffer.
//!
//! **Architecture:** Synchronous core with two locks (a coarse audio lock
//! around the render, a fine name lock for identity reads and deferred
//! teardown), a cpal output stream, and a pluggable media backend; the
//! bundled backend decodes with symphonia on background threads.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod media;
pub mod mixer;
pub mod timing;

pub use config::EngineConfig;
pub use engine::{AudioEngine, PlayParams};
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use events::EndEvent;
pub use media::{
    MediaBackend, MediaInput, MediaRead, MediaSource, SymphoniaBackend, VideoFrame, VideoMode,
};
pub use mixer::Envelope;
