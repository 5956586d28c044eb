//! Host event queue.
//!
//! When a playing source terminates (decoder EOF, a scheduled stop reaching
//! zero, or an explicit `stop`), the channel's end-event tag is appended to
//! this queue for the host's event loop to drain. A tag of 0 means "post
//! nothing" and is filtered at the send site.
//!
//! The queue is an unbounded crossbeam channel: the audio thread never
//! blocks on a send, and the host reads at its own pace.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Event posted when a channel's playing source terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndEvent {
    /// Channel the source terminated on.
    pub channel: usize,

    /// The tag set via `set_endevent`; never 0.
    pub code: u32,
}

/// Sender/receiver pair for end events.
pub(crate) struct EventQueue {
    tx: Sender<EndEvent>,
    rx: Receiver<EndEvent>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Post the channel's end event, if one is set.
    pub(crate) fn post(&self, channel: usize, code: u32) {
        if code == 0 {
            return;
        }
        // An unbounded channel only fails when every receiver is gone,
        // which means nobody is listening anyway.
        let _ = self.tx.send(EndEvent { channel, code });
    }

    /// A receiver the host can hold on to; clones share the same queue.
    pub(crate) fn receiver(&self) -> Receiver<EndEvent> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_code_is_not_posted() {
        let queue = EventQueue::new();
        let rx = queue.receiver();
        queue.post(3, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_arrive_in_order() {
        let queue = EventQueue::new();
        let rx = queue.receiver();
        queue.post(0, 7);
        queue.post(1, 9);

        assert_eq!(rx.try_recv().unwrap(), EndEvent { channel: 0, code: 7 });
        assert_eq!(rx.try_recv().unwrap(), EndEvent { channel: 1, code: 9 });
        assert!(rx.try_recv().is_err());
    }
}
