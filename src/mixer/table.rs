//! Channel tables.
//!
//! Channel state is split across the engine's two locks:
//!
//! - [`MixerTable`] (audio lock): the slots, envelopes, and flags the render
//!   loop reads every callback, plus its scratch buffers.
//! - [`NameTable`] (name lock): slot identity a host may query while the
//!   callback runs (display name, start offset, cached duration), and the
//!   dying list of retired decoder handles.
//!
//! Both tables grow in lockstep, under the audio lock, to the highest
//! channel index ever referenced.

use crate::media::MediaSource;
use crate::mixer::channel::{Channel, ChannelShared};
use std::sync::Arc;

/// Identity of a source as reported to hosts.
#[derive(Debug, Clone)]
pub(crate) struct TrackInfo {
    /// Display name supplied by the host at play/queue time.
    pub name: String,

    /// Offset (ms) into the media where playback began; added to the
    /// mixed-sample position when reporting absolute time.
    pub start_ms: i64,

    /// Media duration in seconds, captured at open.
    pub duration: f64,
}

/// Name-lock side of one channel.
pub(crate) struct ChannelInfo {
    pub playing: Option<TrackInfo>,
    pub queued: Option<TrackInfo>,

    /// Same shared block as the mixer-side channel.
    pub shared: Arc<ChannelShared>,
}

/// Audio-lock side of the channel table.
pub(crate) struct MixerTable {
    pub channels: Vec<Channel>,

    /// Per-callback decode scratch, interleaved stereo i16.
    pub scratch: Vec<i16>,

    /// Per-callback float accumulator, interleaved stereo.
    pub accum: Vec<f32>,
}

impl MixerTable {
    pub(crate) fn new(device_frames: usize) -> Self {
        Self {
            channels: Vec::new(),
            scratch: vec![0; device_frames * 2],
            accum: vec![0.0; device_frames * 2],
        }
    }
}

/// Name-lock side of the channel table, plus the dying list.
pub(crate) struct NameTable {
    pub channels: Vec<ChannelInfo>,

    /// Retired decoder handles awaiting off-thread teardown. The render
    /// loop and control operations push; `periodic` detaches the whole
    /// list and drops the handles outside the lock.
    pub dying: Vec<Box<dyn MediaSource>>,
}

impl NameTable {
    pub(crate) fn new() -> Self {
        Self {
            channels: Vec::new(),
            // Pre-size so routine retirements do not reallocate on the
            // audio thread between sweeps.
            dying: Vec::with_capacity(16),
        }
    }
}

/// Grow both tables to admit `index`, default-initializing new strips.
///
/// Caller must hold the audio lock and pass the name table locked after it.
pub(crate) fn grow_to(mixer: &mut MixerTable, names: &mut NameTable, index: usize) {
    while mixer.channels.len() <= index {
        let shared = Arc::new(ChannelShared::new());
        mixer.channels.push(Channel::new(Arc::clone(&shared)));
        names.channels.push(ChannelInfo {
            playing: None,
            queued: None,
            shared,
        });
    }
}
