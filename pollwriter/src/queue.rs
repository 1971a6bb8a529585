use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};

/// Bounded multi-producer/single-consumer queue of outgoing messages.
///
/// `pending` counts messages that have been reserved or pushed but not yet
/// popped. Producers reserve before pushing, so `pending` is never below
/// the number of messages in the channel; a non-zero `pending` with an empty
/// channel means a producer is between [`reserve`](MessageQueue::reserve)
/// and [`push`](MessageQueue::push) or [`cancel`](MessageQueue::cancel).
pub struct MessageQueue {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    pending: AtomicUsize,
}

impl MessageQueue {
    /// `capacity` must be non-zero (a zero-capacity channel is a rendezvous
    /// channel and would reject every `try_send`).
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        MessageQueue {
            tx,
            rx,
            pending: AtomicUsize::new(0),
        }
    }

    /// Announce an upcoming push. Every reservation must be followed by
    /// exactly one `push` or `cancel`.
    pub fn reserve(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Withdraw a reservation. Returns true if nothing is pending anymore.
    pub fn cancel(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Push a reserved message without blocking. On failure the message is
    /// handed back and the reservation is still held.
    pub fn push(&self, message: Bytes) -> Result<(), Bytes> {
        self.tx.try_send(message).map_err(|e| e.into_inner())
    }

    /// Pop the oldest message. Consumer only.
    pub fn pop(&self) -> Option<Bytes> {
        let message = self.rx.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(message)
    }

    /// Messages reserved or queued but not yet popped.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Pop everything, including messages whose producers are still between
    /// `reserve` and `push`. Only terminates once producers stop reserving,
    /// so callers must first publish a state that makes new reservations
    /// back off.
    pub fn drain_into(&self, out: &mut Vec<Bytes>) {
        loop {
            while let Some(message) = self.pop() {
                out.push(message);
            }
            if self.pending() == 0 {
                return;
            }
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueue(queue: &MessageQueue, data: &'static [u8]) -> Result<(), Bytes> {
        queue.reserve();
        queue.push(Bytes::from_static(data)).inspect_err(|_| {
            queue.cancel();
        })
    }

    #[test]
    fn bounded_capacity() {
        let queue = MessageQueue::new(2);
        enqueue(&queue, b"a").unwrap();
        enqueue(&queue, b"b").unwrap();
        assert_eq!(enqueue(&queue, b"c"), Err(Bytes::from_static(b"c")));
        assert_eq!(queue.pending(), 2);

        assert_eq!(queue.pop(), Some(Bytes::from_static(b"a")));
        enqueue(&queue, b"c").unwrap();
        assert_eq!(queue.pop(), Some(Bytes::from_static(b"b")));
        assert_eq!(queue.pop(), Some(Bytes::from_static(b"c")));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn cancel_reports_empty() {
        let queue = MessageQueue::new(4);
        queue.reserve();
        queue.reserve();
        assert!(!queue.cancel());
        assert!(queue.cancel());
    }

    #[test]
    fn drain_waits_for_reserved_push() {
        let queue = std::sync::Arc::new(MessageQueue::new(4));
        enqueue(&queue, b"first").unwrap();
        queue.reserve();

        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.push(Bytes::from_static(b"late")).unwrap();
        });

        let mut out = Vec::new();
        queue.drain_into(&mut out);
        handle.join().unwrap();
        assert_eq!(
            out,
            vec![Bytes::from_static(b"first"), Bytes::from_static(b"late")]
        );
        assert_eq!(queue.pending(), 0);
    }
}
