//! Media decoder contract.
//!
//! The engine does not decode anything itself; it consumes sources through
//! the narrow [`MediaSource`] interface and opens them through a
//! [`MediaBackend`]. The bundled [`SymphoniaBackend`] covers audio files;
//! video-capable backends plug in through the same traits.
//!
//! # Contract highlights
//!
//! - Sources deliver interleaved stereo signed-16 host-endian PCM **at the
//!   engine's configured sample rate**. The mixer never resamples; a backend
//!   that decodes at another rate must convert before handing frames over.
//! - `read_audio` returns 0 only at end of stream. A source that is merely
//!   behind (decode thread not keeping up) pads the request with silence
//!   instead, so the mixer cannot mistake an underrun for EOF.
//! - `read_video` never blocks; it returns `None` until a frame is due.

mod decoder;
mod pcm_buffer;

pub use decoder::SymphoniaBackend;
pub(crate) use pcm_buffer::{PcmConsumer, PcmFrame, PcmProducer, pcm_ring};

use crate::error::Result;
use std::io::{Read, Seek};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Byte source a backend can open: everything Ren-style asset pipelines
/// hand out is either a path or an in-memory/archive reader.
pub enum MediaInput {
    /// A file on disk.
    Path(PathBuf),

    /// Any seekable reader (archive member, memory buffer, ...).
    Reader(Box<dyn MediaRead>),
}

impl std::fmt::Debug for MediaInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaInput::Path(p) => f.debug_tuple("Path").field(p).finish(),
            MediaInput::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Blanket trait for readers a backend can decode from.
pub trait MediaRead: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> MediaRead for T {}

/// Video production mode for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoMode {
    /// Audio-only channel.
    #[default]
    None,

    /// Video channel; late frames are dropped to stay on the clock.
    Drop,

    /// Video channel; every frame is delivered even if late.
    NoDrop,
}

impl VideoMode {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => VideoMode::Drop,
            2 => VideoMode::NoDrop,
            _ => VideoMode::None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            VideoMode::None => 0,
            VideoMode::Drop => 1,
            VideoMode::NoDrop => 2,
        }
    }
}

/// A decoded video frame in RGBA8.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,

    /// Tightly packed RGBA8, `width * height * 4` bytes.
    pub data: Vec<u8>,

    /// Presentation time in seconds from media start.
    pub pts: f64,
}

/// An open, decodable media stream.
///
/// Handles are owned exclusively by the channel slot holding them and are
/// released by dropping the box; `Drop` must stop any background decode
/// work. Release always happens off the audio thread (via the engine's
/// deferred-teardown sweep), so `Drop` may join threads.
pub trait MediaSource: Send {
    /// Confine playback to `[start_s, end_s]` seconds. An `end_s` of zero
    /// or less means "play to end of media". Must be called before
    /// [`start`](MediaSource::start).
    fn set_range(&mut self, start_s: f64, end_s: f64);

    /// Enable video frame production. Must be called before `start`.
    fn want_video(&mut self, _mode: VideoMode) {}

    /// Begin background decoding.
    fn start(&mut self);

    /// Pause or resume background decoding.
    fn pause(&mut self, paused: bool);

    /// True once the first output is available (or the stream turned out
    /// to be empty).
    fn is_ready(&self) -> bool;

    /// Block until the first output is available. Callers must not hold
    /// engine locks across this. The default implementation polls
    /// [`is_ready`](MediaSource::is_ready).
    fn wait_ready(&self) {
        while !self.is_ready() {
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Fill `dest` (interleaved stereo i16, even length) and return the
    /// number of *frames* written. Returns 0 only at end of stream.
    fn read_audio(&mut self, dest: &mut [i16]) -> usize;

    /// Duration of the full media in seconds, 0.0 when unknown.
    fn duration(&self) -> f64;

    /// True when a video frame is due (or the source has no video).
    fn video_ready(&self) -> bool {
        true
    }

    /// The next due video frame, if any. Never blocks.
    fn read_video(&mut self) -> Option<VideoFrame> {
        None
    }
}

/// Factory and engine-wide side channels for a decoder implementation.
pub trait MediaBackend: Send + Sync {
    /// Called once from `AudioEngine::init` with the realized output rate
    /// and the passthrough flags from [`EngineConfig`](crate::EngineConfig).
    fn init(&self, rate: u32, status: bool, equal_mono: bool);

    /// Open a source. Failure maps to a Sound error on the control
    /// operation that requested the open.
    fn open(&self, input: MediaInput, ext: &str) -> Result<Box<dyn MediaSource>>;

    /// Advance the backend's frame clock. Audio-only backends ignore this.
    fn advance_time(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_mode_u8_roundtrip() {
        for mode in [VideoMode::None, VideoMode::Drop, VideoMode::NoDrop] {
            assert_eq!(VideoMode::from_u8(mode.as_u8()), mode);
        }
        // Unknown values degrade to audio-only.
        assert_eq!(VideoMode::from_u8(17), VideoMode::None);
    }

    #[test]
    fn test_media_input_debug_does_not_expose_reader() {
        let input = MediaInput::Reader(Box::new(std::io::Cursor::new(vec![0u8; 4])));
        assert_eq!(format!("{:?}", input), "Reader(..)");
    }
}
