//! Bounded relay queue between the UDP ingress and the SCTP egress.
//!
//! A fixed ring of pre-allocated slots, single producer and single consumer.
//! The producer never blocks: when the ring is full the datagram is dropped
//! and counted, which is the backpressure policy for time-sensitive video
//! traffic (a stale duplicate is worth less than nothing). The consumer
//! parks on a [`Notify`] until a slot is readable or the queue is closed.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::error::QueueError;

pub struct RelayQueue {
    state: Mutex<Ring>,
    readable: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

struct Ring {
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
}

struct Slot {
    buf: Box<[u8]>,
    len: usize,
}

impl RelayQueue {
    /// Pre-allocates `capacity` slots of `slot_size` bytes each. One slot is
    /// sacrificed to keep the empty/full test unambiguous, so at most
    /// `capacity - 1` payloads can be queued at once.
    pub fn new(capacity: usize, slot_size: usize) -> Self {
        assert!(capacity >= 2, "queue needs at least two slots");
        let slots = (0..capacity)
            .map(|_| Slot {
                buf: vec![0u8; slot_size].into_boxed_slice(),
                len: 0,
            })
            .collect();
        Self {
            state: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
            }),
            readable: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Copies `payload` into the next free slot. Never blocks; a full ring or
    /// an oversized payload increments the drop counter and returns
    /// [`QueueError::Full`].
    pub fn enqueue(&self, payload: &[u8]) -> Result<(), QueueError> {
        {
            let mut ring = self.state.lock().unwrap();
            let next = (ring.head + 1) % ring.slots.len();
            let head = ring.head;
            if next == ring.tail || payload.len() > ring.slots[head].buf.len() {
                drop(ring);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(QueueError::Full);
            }
            let slot = &mut ring.slots[head];
            slot.buf[..payload.len()].copy_from_slice(payload);
            slot.len = payload.len();
            ring.head = next;
        }
        self.readable.notify_one();
        Ok(())
    }

    /// Waits for the oldest queued payload, copies it into `out` and frees the
    /// slot. Returns the payload length, or [`QueueError::Shutdown`] once the
    /// queue has been closed and drained.
    ///
    /// `out` must be at least one slot large. Single consumer only.
    pub async fn dequeue(&self, out: &mut [u8]) -> Result<usize, QueueError> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut ring = self.state.lock().unwrap();
                if ring.tail != ring.head {
                    let tail = ring.tail;
                    let len = ring.slots[tail].len;
                    out[..len].copy_from_slice(&ring.slots[tail].buf[..len]);
                    ring.tail = (tail + 1) % ring.slots.len();
                    return Ok(len);
                }
                if self.closed.load(Ordering::Acquire) {
                    return Err(QueueError::Shutdown);
                }
            }
            notified.await;
        }
    }

    /// Closes the queue and wakes a blocked consumer. Queued payloads remain
    /// readable; only an empty closed queue reports `Shutdown`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.readable.notify_waiters();
    }

    /// Datagrams refused because the ring was full. Monotonic for the life of
    /// the queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        let ring = self.state.lock().unwrap();
        let cap = ring.slots.len();
        (ring.head + cap - ring.tail) % cap
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
