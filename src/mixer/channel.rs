//! Channel state.
//!
//! A channel carries at most one playing and one queued source. The fields
//! the render loop touches every frame live here, guarded by the audio
//! lock; single-word state that control threads read and write without a
//! lock (mixer volume, end-event tag, video mode, position) sits in an
//! `Arc<ChannelShared>` of relaxed atomics shared with the name table.

use crate::media::{MediaSource, VideoMode};
use crate::mixer::envelope::Envelope;
use crate::timing::ms_to_samples;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// A source occupying the playing or queued slot of a channel.
pub(crate) struct SourceSlot {
    /// The decoder handle; exclusively owned by this slot.
    pub source: Box<dyn MediaSource>,

    /// Fade-in applied when this source starts a non-tight stream.
    pub fadein_ms: i64,

    /// A tight source hands off to its successor without a restart fade.
    pub tight: bool,

    /// Per-source gain, multiplied into the channel gain each frame.
    pub relative_volume: f32,
}

/// Lock-free per-channel state, shared between the mixer and name tables.
///
/// All loads and stores are relaxed: each field is an independent
/// single-word value with no ordering relationship to any other state.
#[derive(Debug)]
pub(crate) struct ChannelShared {
    /// User-set mixer volume (f32 bits).
    mixer_volume: AtomicU32,

    /// End-event tag posted on playing-source termination; 0 = none.
    event: AtomicU32,

    /// Video mode applied to subsequent opens on this channel.
    video: AtomicU8,

    /// Frames consumed from the currently-playing source.
    pos: AtomicU64,
}

impl ChannelShared {
    pub(crate) fn new() -> Self {
        Self {
            mixer_volume: AtomicU32::new(1.0f32.to_bits()),
            event: AtomicU32::new(0),
            video: AtomicU8::new(VideoMode::None.as_u8()),
            pos: AtomicU64::new(0),
        }
    }

    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.mixer_volume.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.mixer_volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn event_code(&self) -> u32 {
        self.event.load(Ordering::Relaxed)
    }

    pub(crate) fn set_event_code(&self, code: u32) {
        self.event.store(code, Ordering::Relaxed);
    }

    pub(crate) fn video_mode(&self) -> VideoMode {
        VideoMode::from_u8(self.video.load(Ordering::Relaxed))
    }

    pub(crate) fn set_video_mode(&self, mode: VideoMode) {
        self.video.store(mode.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn pos(&self) -> u64 {
        self.pos.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_pos(&self) {
        self.pos.store(0, Ordering::Relaxed);
    }

    pub(crate) fn add_pos(&self, frames: u64) {
        self.pos.fetch_add(frames, Ordering::Relaxed);
    }
}

/// One mixer strip. Everything here is guarded by the audio lock.
pub(crate) struct Channel {
    pub playing: Option<SourceSlot>,
    pub queued: Option<SourceSlot>,

    /// Paused channels are skipped by the render loop entirely.
    pub paused: bool,

    /// Restart/fade-out gain ramp, 0..=1.
    pub fade: Envelope,

    /// Stereo balance, -1 full left .. +1 full right.
    pub pan: Envelope,

    /// Channel-specific gain ramp layered under the mixer volume.
    pub secondary_volume: Envelope,

    /// Frames until a scheduled hard stop; -1 when none is scheduled.
    /// Reaching 0 ends the playing source as if the decoder hit EOF.
    pub stop_samples: i64,

    pub shared: Arc<ChannelShared>,
}

impl Channel {
    /// A freshly referenced channel: silent, paused, unity gain, centered.
    pub(crate) fn new(shared: Arc<ChannelShared>) -> Self {
        Self {
            playing: None,
            queued: None,
            paused: true,
            fade: Envelope::constant(1.0),
            pan: Envelope::constant(0.0),
            secondary_volume: Envelope::constant(1.0),
            stop_samples: -1,
            shared,
        }
    }

    /// Reset stream-start state for whatever now occupies the playing slot.
    ///
    /// Always rewinds the position counter. When `reset_fade` is set (every
    /// start except a tight handoff) the fade envelope ramps 0 to 1 over the
    /// slot's fade-in and any scheduled stop is cancelled.
    pub(crate) fn start_stream(&mut self, reset_fade: bool, rate: u32) {
        self.shared.reset_pos();

        if reset_fade {
            let fadein_ms = self.playing.as_ref().map_or(0, |slot| slot.fadein_ms);
            self.fade = Envelope::constant(0.0);
            self.fade
                .retarget(1.0, ms_to_samples(fadein_ms, rate).max(0) as u64);
            self.stop_samples = -1;
        }
    }
}
