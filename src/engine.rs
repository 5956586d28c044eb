//! Engine lifecycle and control API.
//!
//! `AudioEngine` owns the output device and the channel tables. It is
//! intended as a process singleton: construct one via [`AudioEngine::init`]
//! (or [`AudioEngine::offline`] for device-less operation), drive channels
//! through the control methods, and call [`periodic`](AudioEngine::periodic)
//! on a regular cadence to reclaim retired decoder handles.
//!
//! # Locking
//!
//! Two mutexes separate callback/control contention:
//!
//! - The **audio lock** (`EngineShared::mixer`) is held by the device
//!   callback for the whole render and by every control operation that
//!   mutates state the callback reads. It is never held across a decoder
//!   open or a readiness wait.
//! - The **name lock** (`EngineShared::names`) guards slot identity and the
//!   dying list. Identity reads (`playing_name`, `get_pos`, `queue_depth`,
//!   `get_duration`) take only this lock, so they do not stall behind a
//!   full render.
//!
//! Lock order is mixer before names, never the reverse.

use crate::audio::output::AudioOutput;
use crate::config::EngineConfig;
use crate::error::{Error, ErrorReport, Result};
use crate::events::{EndEvent, EventQueue};
use crate::media::{MediaBackend, MediaInput, MediaSource, VideoFrame, VideoMode};
use crate::mixer::channel::SourceSlot;
use crate::mixer::table::{grow_to, MixerTable, NameTable, TrackInfo};
use crate::timing::{ms_to_samples, samples_to_ms, seconds_to_ms};
use crossbeam_channel::Receiver;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// State shared between the control thread and the device callback.
pub(crate) struct EngineShared {
    /// Audio lock: channel strips plus render scratch.
    pub(crate) mixer: Mutex<MixerTable>,

    /// Name lock: slot identity and the dying list.
    pub(crate) names: Mutex<NameTable>,

    /// Realized output sample rate.
    pub(crate) rate: AtomicU32,

    /// End-event queue toward the host.
    pub(crate) events: EventQueue,

    /// Last-error slot for polling hosts.
    pub(crate) last_error: Mutex<ErrorReport>,
}

impl EngineShared {
    fn new(rate: u32, device_frames: usize) -> Self {
        Self {
            mixer: Mutex::new(MixerTable::new(device_frames)),
            names: Mutex::new(NameTable::new()),
            rate: AtomicU32::new(rate),
            events: EventQueue::new(),
            last_error: Mutex::new(ErrorReport::ok()),
        }
    }
}

/// Per-source parameters for [`AudioEngine::play`] and
/// [`AudioEngine::queue`].
#[derive(Debug, Clone)]
pub struct PlayParams {
    /// Display name reported by `playing_name`.
    pub name: String,

    /// Fade-in applied when the source starts a non-tight stream, in ms.
    pub fadein_ms: i64,

    /// Hand off to the queued successor without a restart fade.
    pub tight: bool,

    /// Start the channel paused. Ignored by `queue`.
    pub paused: bool,

    /// Seek-window start in seconds.
    pub start: f64,

    /// Seek-window end in seconds; zero or less plays to end of media.
    pub end: f64,

    /// Per-source gain multiplied into the channel gain stack.
    pub relative_volume: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            fadein_ms: 0,
            tight: false,
            paused: false,
            start: 0.0,
            end: 0.0,
            relative_volume: 1.0,
        }
    }
}

/// The multi-channel mixing engine.
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    backend: Arc<dyn MediaBackend>,
    output: Option<AudioOutput>,
}

impl AudioEngine {
    /// Open the output device, start the callback, and initialize the
    /// media backend with the realized sample rate.
    pub fn init(config: EngineConfig, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate()?;

        let mut output = AudioOutput::open(&config)?;
        let rate = output.sample_rate();
        let shared = Arc::new(EngineShared::new(rate, config.samples as usize));

        backend.init(rate, config.status, config.equal_mono);
        output.start(Arc::clone(&shared))?;

        info!(
            "audio engine initialized: {} Hz, {} frame buffer, device '{}'",
            rate,
            config.samples,
            output.device_name()
        );

        Ok(Self {
            shared,
            backend,
            output: Some(output),
        })
    }

    /// Construct an engine with no device attached. The embedder (or a
    /// test) drives mixing by calling [`render`](AudioEngine::render) with
    /// its own buffers; everything else behaves identically.
    pub fn offline(config: EngineConfig, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(EngineShared::new(config.freq, config.samples as usize));
        backend.init(config.freq, config.status, config.equal_mono);

        Ok(Self {
            shared,
            backend,
            output: None,
        })
    }

    /// The realized output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.shared.rate.load(Ordering::Relaxed)
    }

    /// A receiver for end events. Clones share one queue.
    pub fn events(&self) -> Receiver<EndEvent> {
        self.shared.events.receiver()
    }

    /// Snapshot of the last-error slot. Never blocks on audio work.
    pub fn last_error(&self) -> ErrorReport {
        self.shared.last_error.lock().unwrap().clone()
    }

    /// Produce one device buffer of interleaved stereo i16. This is the
    /// body of the device callback, exposed for device-less engines.
    pub fn render(&self, out: &mut [i16]) {
        self.shared.render(out);
    }

    /// Pass the frame clock tick through to the media backend.
    pub fn advance_time(&self) {
        self.backend.advance_time();
    }

    // ========================================
    // Channel control
    // ========================================

    /// Replace whatever the channel holds with a new playing source.
    pub fn play(
        &self,
        channel: i64,
        input: MediaInput,
        ext: &str,
        params: PlayParams,
    ) -> Result<()> {
        let result = self.play_inner(channel, input, ext, params);
        self.record(result)
    }

    fn play_inner(
        &self,
        channel: i64,
        input: MediaInput,
        ext: &str,
        params: PlayParams,
    ) -> Result<()> {
        let index = self.ensure(channel)?;
        let rate = self.sample_rate();
        let video = self.channel_video_mode(index);

        // Open outside the audio lock; the prepared slot is swapped in
        // under it.
        let source = match self.open_source(input, ext, &params, video) {
            Ok(source) => source,
            Err(err) => {
                // The replacement already began as far as the host is
                // concerned: the failed open leaves the channel empty.
                self.clear_channel(index, false);
                return Err(err);
            }
        };
        let duration = source.duration();

        let mut mixer = self.shared.mixer.lock().unwrap();
        let strip = &mut mixer.channels[index];
        {
            let mut names = self.shared.names.lock().unwrap();
            if let Some(slot) = strip.playing.take() {
                names.dying.push(slot.source);
            }
            if let Some(slot) = strip.queued.take() {
                names.dying.push(slot.source);
            }

            let info = &mut names.channels[index];
            info.playing = Some(TrackInfo {
                name: params.name,
                start_ms: seconds_to_ms(params.start),
                duration,
            });
            info.queued = None;
        }

        strip.playing = Some(SourceSlot {
            source,
            fadein_ms: params.fadein_ms,
            tight: params.tight,
            relative_volume: params.relative_volume,
        });
        strip.paused = params.paused;
        strip.start_stream(true, rate);

        debug!(
            "play on channel {}: tight {}, fadein {} ms",
            index, params.tight, params.fadein_ms
        );
        Ok(())
    }

    /// Queue a follow-up source behind the playing one. On an idle channel
    /// this is a `play` with `paused` forced off.
    pub fn queue(
        &self,
        channel: i64,
        input: MediaInput,
        ext: &str,
        params: PlayParams,
    ) -> Result<()> {
        let result = self.queue_inner(channel, input, ext, params);
        self.record(result)
    }

    fn queue_inner(
        &self,
        channel: i64,
        input: MediaInput,
        ext: &str,
        mut params: PlayParams,
    ) -> Result<()> {
        let index = self.ensure(channel)?;

        let is_playing = {
            let mixer = self.shared.mixer.lock().unwrap();
            mixer.channels[index].playing.is_some()
        };
        if !is_playing {
            params.paused = false;
            return self.play_inner(channel, input, ext, params);
        }

        let video = self.channel_video_mode(index);
        let source = match self.open_source(input, ext, &params, video) {
            Ok(source) => source,
            Err(err) => {
                self.clear_channel(index, true);
                return Err(err);
            }
        };
        let duration = source.duration();

        let mut mixer = self.shared.mixer.lock().unwrap();
        let strip = &mut mixer.channels[index];
        {
            let mut names = self.shared.names.lock().unwrap();
            if let Some(slot) = strip.queued.take() {
                names.dying.push(slot.source);
            }
            names.channels[index].queued = Some(TrackInfo {
                name: params.name,
                start_ms: seconds_to_ms(params.start),
                duration,
            });
        }

        strip.queued = Some(SourceSlot {
            source,
            fadein_ms: params.fadein_ms,
            tight: params.tight,
            relative_volume: params.relative_volume,
        });
        Ok(())
    }

    /// Stop the channel, posting its end event if something was playing.
    /// Both slots are released.
    pub fn stop(&self, channel: i64) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let mut mixer = self.shared.mixer.lock().unwrap();
            let strip = &mut mixer.channels[index];

            if strip.playing.is_some() {
                self.shared.events.post(index, strip.shared.event_code());
            }

            let mut names = self.shared.names.lock().unwrap();
            if let Some(slot) = strip.playing.take() {
                names.dying.push(slot.source);
            }
            if let Some(slot) = strip.queued.take() {
                names.dying.push(slot.source);
            }
            let info = &mut names.channels[index];
            info.playing = None;
            info.queued = None;
            Ok(())
        })();
        self.record(result)
    }

    /// Drop the queued source. A tight playing source protects its
    /// follow-up unless `even_tight` is set; a declined dequeue still
    /// clears the follow-up's tight flag.
    pub fn dequeue(&self, channel: i64, even_tight: bool) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let mut mixer = self.shared.mixer.lock().unwrap();
            let strip = &mut mixer.channels[index];

            let playing_tight = strip.playing.as_ref().map_or(false, |slot| slot.tight);
            let mut names = self.shared.names.lock().unwrap();

            if strip.queued.is_some() && (!playing_tight || even_tight) {
                if let Some(slot) = strip.queued.take() {
                    names.dying.push(slot.source);
                }
                names.channels[index].queued = None;
            } else {
                if let Some(slot) = strip.queued.as_mut() {
                    slot.tight = false;
                }
                if let Some(info) = names.channels[index].queued.as_mut() {
                    info.start_ms = 0;
                }
            }
            Ok(())
        })();
        self.record(result)
    }

    /// Fade the playing source out over `ms` milliseconds and stop it when
    /// the ramp lands. `ms == 0` stops at the next rendered sample.
    pub fn fadeout(&self, channel: i64, ms: i64) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let rate = self.sample_rate();
            let mut mixer = self.shared.mixer.lock().unwrap();
            let strip = &mut mixer.channels[index];

            if ms == 0 {
                strip.stop_samples = 0;
                return Ok(());
            }

            let samples = ms_to_samples(ms, rate);
            strip.fade.retarget(0.0, samples.max(0) as u64);
            strip.stop_samples = samples;

            if let Some(slot) = strip.queued.as_mut() {
                slot.tight = false;
            }
            if strip.queued.is_none() {
                if let Some(slot) = strip.playing.as_mut() {
                    slot.tight = false;
                }
            }
            Ok(())
        })();
        self.record(result)
    }

    /// Pause or resume the channel, forwarding the flag to the decoder.
    pub fn pause(&self, channel: i64, paused: bool) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let mut mixer = self.shared.mixer.lock().unwrap();
            let strip = &mut mixer.channels[index];
            strip.paused = paused;
            if let Some(slot) = strip.playing.as_mut() {
                slot.source.pause(paused);
            }
            Ok(())
        })();
        self.record(result)
    }

    /// Release every channel that was started paused and has not produced
    /// a sample yet, once its decoder is ready. Blocks until the waiting
    /// decoders are ready; neither engine lock is held across the wait.
    pub fn unpause_all_at_start(&self) -> Result<()> {
        let result = (|| {
            loop {
                let pending = {
                    let mixer = self.shared.mixer.lock().unwrap();
                    mixer.channels.iter().any(|strip| match &strip.playing {
                        Some(slot) => {
                            strip.paused
                                && strip.shared.pos() == 0
                                && !slot.source.is_ready()
                        }
                        None => false,
                    })
                };
                if !pending {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }

            let mut mixer = self.shared.mixer.lock().unwrap();
            for strip in mixer.channels.iter_mut() {
                if strip.playing.is_some() && strip.shared.pos() == 0 {
                    strip.paused = false;
                    if let Some(slot) = strip.playing.as_mut() {
                        slot.source.pause(false);
                    }
                }
            }
            Ok(())
        })();
        self.record(result)
    }

    // ========================================
    // Channel queries
    // ========================================

    /// 0 when idle, 1 when playing, 2 when playing with a queued follow-up.
    pub fn queue_depth(&self, channel: i64) -> Result<usize> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let names = self.shared.names.lock().unwrap();
            let info = &names.channels[index];
            Ok(info.playing.is_some() as usize + info.queued.is_some() as usize)
        })();
        self.record(result)
    }

    /// Display name of the playing source, if any.
    pub fn playing_name(&self, channel: i64) -> Result<Option<String>> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let names = self.shared.names.lock().unwrap();
            Ok(names.channels[index]
                .playing
                .as_ref()
                .map(|info| info.name.clone()))
        })();
        self.record(result)
    }

    /// Absolute position of the playing source in ms, or -1 when idle.
    pub fn get_pos(&self, channel: i64) -> Result<i64> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let names = self.shared.names.lock().unwrap();
            let info = &names.channels[index];
            Ok(match &info.playing {
                Some(track) => {
                    samples_to_ms(info.shared.pos() as i64, self.sample_rate()) + track.start_ms
                }
                None => -1,
            })
        })();
        self.record(result)
    }

    /// Duration of the playing media in seconds, or 0.0 when idle.
    pub fn get_duration(&self, channel: i64) -> Result<f64> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let names = self.shared.names.lock().unwrap();
            Ok(names.channels[index]
                .playing
                .as_ref()
                .map_or(0.0, |track| track.duration))
        })();
        self.record(result)
    }

    /// Set the tag posted when the playing source terminates; 0 disables.
    pub fn set_endevent(&self, channel: i64, code: u32) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            self.channel_shared(index).set_event_code(code);
            Ok(())
        })();
        self.record(result)
    }

    /// Set the user mixer volume. Single-word write; the render loop picks
    /// it up on its next frame.
    pub fn set_volume(&self, channel: i64, volume: f32) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            self.channel_shared(index).set_volume(volume);
            Ok(())
        })();
        self.record(result)
    }

    /// The user mixer volume.
    pub fn get_volume(&self, channel: i64) -> Result<f32> {
        let result = (|| {
            let index = self.ensure(channel)?;
            Ok(self.channel_shared(index).volume())
        })();
        self.record(result)
    }

    /// Ramp the pan (-1 full left .. +1 full right) over `delay_s` seconds.
    pub fn set_pan(&self, channel: i64, pan: f32, delay_s: f64) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let samples = ms_to_samples(seconds_to_ms(delay_s), self.sample_rate());
            let mut mixer = self.shared.mixer.lock().unwrap();
            mixer.channels[index].pan.retarget(pan, samples.max(0) as u64);
            Ok(())
        })();
        self.record(result)
    }

    /// Ramp the channel's secondary volume over `delay_s` seconds.
    pub fn set_secondary_volume(&self, channel: i64, volume: f32, delay_s: f64) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let samples = ms_to_samples(seconds_to_ms(delay_s), self.sample_rate());
            let mut mixer = self.shared.mixer.lock().unwrap();
            mixer.channels[index]
                .secondary_volume
                .retarget(volume, samples.max(0) as u64);
            Ok(())
        })();
        self.record(result)
    }

    /// Mark the channel as a video channel; applies to subsequent opens.
    pub fn set_video(&self, channel: i64, mode: VideoMode) -> Result<()> {
        let result = (|| {
            let index = self.ensure(channel)?;
            self.channel_shared(index).set_video_mode(mode);
            Ok(())
        })();
        self.record(result)
    }

    /// True when the playing source has a frame due (or the channel is
    /// idle / audio-only).
    pub fn video_ready(&self, channel: i64) -> Result<bool> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let mixer = self.shared.mixer.lock().unwrap();
            Ok(mixer.channels[index]
                .playing
                .as_ref()
                .map_or(true, |slot| slot.source.video_ready()))
        })();
        self.record(result)
    }

    /// The next due video frame from the playing source, if any.
    pub fn read_video(&self, channel: i64) -> Result<Option<VideoFrame>> {
        let result = (|| {
            let index = self.ensure(channel)?;
            let mut mixer = self.shared.mixer.lock().unwrap();
            Ok(mixer.channels[index]
                .playing
                .as_mut()
                .and_then(|slot| slot.source.read_video()))
        })();
        self.record(result)
    }

    // ========================================
    // Maintenance
    // ========================================

    /// Reclaim decoder handles retired by the render loop and control
    /// operations. Call on a regular cadence from the control thread; the
    /// handles are closed outside both engine locks.
    pub fn periodic(&self) {
        let dead = {
            let mut names = self.shared.names.lock().unwrap();
            mem::take(&mut names.dying)
        };
        if !dead.is_empty() {
            debug!("closing {} retired decoder handle(s)", dead.len());
        }
        drop(dead);
    }

    /// Stop the device, stop every channel (posting end events), release
    /// all sources, and reset the channel count. The engine can be dropped
    /// or re-created afterwards; `quit` is idempotent.
    pub fn quit(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop();
        }

        let count = {
            let mixer = self.shared.mixer.lock().unwrap();
            mixer.channels.len()
        };
        for index in 0..count {
            let _ = self.stop(index as i64);
        }

        {
            let mut mixer = self.shared.mixer.lock().unwrap();
            let mut names = self.shared.names.lock().unwrap();
            mixer.channels.clear();
            names.channels.clear();
        }

        self.periodic();
        *self.shared.last_error.lock().unwrap() = ErrorReport::ok();
    }

    // ========================================
    // Internals
    // ========================================

    /// Record the operation outcome in the last-error slot.
    fn record<T>(&self, result: Result<T>) -> Result<T> {
        let mut slot = self.shared.last_error.lock().unwrap();
        *slot = match &result {
            Ok(_) => ErrorReport::ok(),
            Err(err) => ErrorReport::from_error(err),
        };
        result
    }

    /// Validate the channel index and grow both tables to admit it.
    fn ensure(&self, channel: i64) -> Result<usize> {
        if channel < 0 {
            return Err(Error::Range(format!(
                "channel number {} out of range",
                channel
            )));
        }
        let index = channel as usize;

        {
            let names = self.shared.names.lock().unwrap();
            if index < names.channels.len() {
                return Ok(index);
            }
        }

        let mut mixer = self.shared.mixer.lock().unwrap();
        let mut names = self.shared.names.lock().unwrap();
        grow_to(&mut mixer, &mut names, index);
        Ok(index)
    }

    /// The lock-free shared block for a channel known to exist.
    fn channel_shared(&self, index: usize) -> Arc<crate::mixer::channel::ChannelShared> {
        let names = self.shared.names.lock().unwrap();
        Arc::clone(&names.channels[index].shared)
    }

    fn channel_video_mode(&self, index: usize) -> VideoMode {
        self.channel_shared(index).video_mode()
    }

    /// Open, window, and start a source; never called with a lock held.
    fn open_source(
        &self,
        input: MediaInput,
        ext: &str,
        params: &PlayParams,
        video: VideoMode,
    ) -> Result<Box<dyn MediaSource>> {
        let mut source = self.backend.open(input, ext)?;
        source.set_range(params.start, params.end);
        if video != VideoMode::None {
            source.want_video(video);
        }
        source.start();
        Ok(source)
    }

    /// Release one channel's sources without posting events. Used when a
    /// failed open must still leave the affected slots empty.
    fn clear_channel(&self, index: usize, queued_only: bool) {
        let mut mixer = self.shared.mixer.lock().unwrap();
        let strip = &mut mixer.channels[index];
        let mut names = self.shared.names.lock().unwrap();

        if let Some(slot) = strip.queued.take() {
            names.dying.push(slot.source);
        }
        names.channels[index].queued = None;

        if !queued_only {
            if let Some(slot) = strip.playing.take() {
                names.dying.push(slot.source);
            }
            names.channels[index].playing = None;
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.quit();
    }
}
