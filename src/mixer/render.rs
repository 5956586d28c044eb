//! The device render path.
//!
//! One call produces one device buffer of interleaved stereo i16: decode
//! each channel until the buffer is full, apply the channel gain stack and
//! pan law per frame, handle end-of-source handoffs, sum into a float
//! accumulator, then clip to the output format.
//!
//! The whole render runs under the audio lock, so control operations that
//! hold it are totally ordered against the callback. End-of-source
//! transitions additionally take the name lock for the slot move and the
//! dying-list push, which is the only part of the render a name-lock reader
//! can ever contend with.

use crate::engine::EngineShared;
use crate::mixer::channel::Channel;
use crate::mixer::table::MixerTable;
use std::sync::atomic::Ordering;

/// Scale for converting decoder i16 samples into the float accumulator.
const INT16_IN_SCALE: f32 = 1.0 / 32768.0;

/// Scale for converting the accumulator back to i16 output.
const INT16_OUT_SCALE: f32 = 32767.0;

impl EngineShared {
    /// Produce one device buffer. `out` is interleaved stereo; an odd
    /// trailing sample (which a conforming device never passes) is left
    /// untouched.
    pub(crate) fn render(&self, out: &mut [i16]) {
        let frames = out.len() / 2;
        let rate = self.rate.load(Ordering::Relaxed);

        let mut table = self.mixer.lock().unwrap();
        let MixerTable {
            channels,
            scratch,
            accum,
        } = &mut *table;

        if scratch.len() < frames * 2 {
            scratch.resize(frames * 2, 0);
        }
        if accum.len() < frames * 2 {
            accum.resize(frames * 2, 0.0);
        }
        let accum = &mut accum[..frames * 2];
        accum.fill(0.0);

        for index in 0..channels.len() {
            let channel = &mut channels[index];
            if channel.playing.is_none() || channel.paused {
                continue;
            }
            self.mix_channel(index, channel, scratch, accum, frames, rate);
        }

        for (dst, &sum) in out[..frames * 2].iter_mut().zip(accum.iter()) {
            *dst = (sum * INT16_OUT_SCALE).clamp(-32768.0, 32767.0) as i16;
        }
    }

    /// Mix one channel into the accumulator until the buffer is full or the
    /// channel runs out of sources.
    fn mix_channel(
        &self,
        index: usize,
        channel: &mut Channel,
        scratch: &mut [i16],
        accum: &mut [f32],
        frames: usize,
        rate: u32,
    ) {
        let mut mixed = 0usize;

        while mixed < frames {
            let want = frames - mixed;

            let (read, relative_volume) = match channel.playing.as_mut() {
                Some(slot) => (
                    slot.source.read_audio(&mut scratch[..want * 2]),
                    slot.relative_volume,
                ),
                None => break,
            };

            // A scheduled stop reaching zero ends the source exactly as
            // decoder EOF would.
            if channel.stop_samples == 0 || read == 0 {
                self.advance_to_queued(index, channel, rate);
                continue;
            }

            let mut consumed = 0usize;
            for frame in 0..read {
                if channel.stop_samples == 0 {
                    break;
                }

                let gain = channel.shared.volume()
                    * relative_volume
                    * channel.fade.value()
                    * channel.secondary_volume.value();
                let pan = channel.pan.value();
                let left_gain = gain * (1.0 - pan).min(1.0);
                let right_gain = gain * (1.0 + pan).min(1.0);

                accum[mixed * 2] += scratch[frame * 2] as f32 * INT16_IN_SCALE * left_gain;
                accum[mixed * 2 + 1] +=
                    scratch[frame * 2 + 1] as f32 * INT16_IN_SCALE * right_gain;

                channel.fade.step();
                channel.secondary_volume.step();
                channel.pan.step();

                if channel.stop_samples > 0 {
                    channel.stop_samples -= 1;
                }
                mixed += 1;
                consumed += 1;
            }
            channel.shared.add_pos(consumed as u64);
        }
    }

    /// End-of-source handoff: post the end event, retire the finished
    /// decoder to the dying list, promote the queued source, and restart
    /// the stream. Tight sources skip the restart fade unless the incoming
    /// source asked for its own fade-in.
    fn advance_to_queued(&self, index: usize, channel: &mut Channel, rate: u32) {
        let mut old_tight = channel.playing.as_ref().map_or(false, |slot| slot.tight);

        self.events.post(index, channel.shared.event_code());

        {
            let mut names = self.names.lock().unwrap();

            if let Some(slot) = channel.playing.take() {
                names.dying.push(slot.source);
            }
            channel.playing = channel.queued.take();

            let info = &mut names.channels[index];
            info.playing = info.queued.take();

            if channel.playing.as_ref().map_or(false, |slot| slot.fadein_ms != 0) {
                old_tight = false;
            }
        }

        channel.start_stream(!old_tight, rate);
    }
}
