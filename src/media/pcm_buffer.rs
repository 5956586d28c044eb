//! Lock-free PCM frame queue between a decode thread and `read_audio`.
//!
//! Single-producer single-consumer: the background decode thread pushes
//! frames, the audio callback (via the owning source's `read_audio`) pops
//! them. Both sides are wait-free; overruns park the decoder, underruns are
//! counted and surface as silence.

use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// One interleaved stereo frame of signed-16 PCM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PcmFrame {
    pub left: i16,
    pub right: i16,
}

/// Create a frame queue holding `capacity` frames.
pub(crate) fn pcm_ring(capacity: usize) -> (PcmProducer, PcmConsumer) {
    let (prod, cons) = HeapRb::<PcmFrame>::new(capacity).split();
    (
        PcmProducer { producer: prod },
        PcmConsumer {
            consumer: cons,
            underruns: AtomicU64::new(0),
        },
    )
}

/// Decode-thread half.
pub(crate) struct PcmProducer {
    producer: ringbuf::HeapProd<PcmFrame>,
}

impl PcmProducer {
    /// Push one frame; false when the queue is full.
    pub(crate) fn push(&mut self, frame: PcmFrame) -> bool {
        self.producer.try_push(frame).is_ok()
    }

    pub(crate) fn free_len(&self) -> usize {
        self.producer.vacant_len()
    }
}

/// `read_audio` half.
pub(crate) struct PcmConsumer {
    consumer: ringbuf::HeapCons<PcmFrame>,
    underruns: AtomicU64,
}

impl PcmConsumer {
    /// Pop one frame, None when the queue is empty.
    pub(crate) fn pop(&mut self) -> Option<PcmFrame> {
        self.consumer.try_pop()
    }

    pub(crate) fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Record an underrun (caller substitutes silence).
    pub(crate) fn note_underrun(&self, frames: usize) {
        let total = self.underruns.fetch_add(frames as u64, Ordering::Relaxed) + frames as u64;
        if total % 4096 < frames as u64 {
            trace!("PCM queue underrun, {} silent frames so far", total);
        }
    }
}
