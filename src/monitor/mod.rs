//! Receiver-side link accounting.
//!
//! [`LinkMonitor`] binds the sequence tracker and the event ring behind one
//! mutex so loss state and statistics update atomically for each received
//! chunk. The lock is held only for the constant-time bookkeeping (plus the
//! tracker's bounded sweep), never across I/O. Process-lifetime totals sit
//! outside the mutex in atomics so reporting reads never serialize the
//! receive path.

pub mod events;
pub mod snmp;
pub mod tracker;

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::rtp::RtpHeader;
use events::{EventKind, EventRing, WindowStats};
use tracker::SeqTracker;

pub struct LinkMonitor {
    inner: Mutex<MonitorState>,
    total_packets: AtomicU64,
    total_bytes: AtomicU64,
}

struct MonitorState {
    tracker: SeqTracker,
    ring: EventRing,
    last_arrival: Option<Instant>,
}

impl LinkMonitor {
    pub fn new(pr_ttl: Duration, event_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MonitorState {
                tracker: SeqTracker::new(pr_ttl),
                ring: EventRing::new(event_capacity),
                last_arrival: None,
            }),
            total_packets: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    /// Accounts for one received chunk: totals, the arrival event with its
    /// inter-arrival gap, and — when the payload carries an RTP header — the
    /// loss bookkeeping derived from its sequence number.
    pub fn on_chunk(&self, payload: &[u8], now: Instant) {
        self.total_packets.fetch_add(1, Ordering::Relaxed);
        self.total_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        let mut state = self.inner.lock().unwrap();
        let state = &mut *state;

        let gap = match state.last_arrival {
            Some(previous) => now.duration_since(previous),
            None => Duration::ZERO,
        };
        state.last_arrival = Some(now);
        state.ring.record(
            EventKind::Arrival {
                bytes: payload.len(),
                inter_arrival: gap,
            },
            now,
        );

        if let Some(header) = RtpHeader::parse(payload) {
            let outcome = state.tracker.observe(header.sequence_number, now);
            for latency in outcome.recovered {
                state.ring.record(EventKind::Recovered { latency }, now);
            }
            for _ in 0..outcome.expired {
                state.ring.record(EventKind::Irretrievable, now);
            }
        }
    }

    /// A new association was accepted: sequence state and the inter-arrival
    /// baseline start over. Windowed events and process totals are kept.
    pub fn reset_association(&self) {
        let mut state = self.inner.lock().unwrap();
        state.tracker.reset();
        state.last_arrival = None;
    }

    pub fn snapshot(&self, window: Duration, now: Instant) -> WindowStats {
        self.inner.lock().unwrap().ring.snapshot(window, now)
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::RTP_HEADER_LEN;

    fn rtp_packet(seq: u16, len: usize) -> Vec<u8> {
        assert!(len >= RTP_HEADER_LEN);
        let mut buf = vec![0u8; len];
        buf[0] = 0x80; // version 2
        buf[2..4].copy_from_slice(&seq.to_be_bytes());
        buf
    }

    #[test]
    fn loss_and_recovery_flow_into_the_window() {
        let monitor = LinkMonitor::new(Duration::from_millis(50), 1024);
        let now = Instant::now();
        for seq in [0u16, 1, 2, 5, 3, 4, 6] {
            monitor.on_chunk(&rtp_packet(seq, 100), now);
        }
        let stats = monitor.snapshot(Duration::from_secs(10), now);
        assert_eq!(stats.arrivals, 7);
        assert_eq!(stats.recovered, 2);
        assert_eq!(stats.irretrievable, 0);
        assert_eq!(monitor.total_packets(), 7);
        assert_eq!(monitor.total_bytes(), 700);
    }

    #[test]
    fn non_rtp_chunks_still_count_as_arrivals() {
        let monitor = LinkMonitor::new(Duration::from_millis(50), 1024);
        let now = Instant::now();
        monitor.on_chunk(b"short", now);
        let stats = monitor.snapshot(Duration::from_secs(10), now);
        assert_eq!(stats.arrivals, 1);
        assert_eq!(stats.recovered, 0);
        assert_eq!(monitor.total_bytes(), 5);
    }

    #[test]
    fn association_reset_keeps_totals_but_drops_gap_state() {
        let monitor = LinkMonitor::new(Duration::from_millis(50), 1024);
        let now = Instant::now();
        monitor.on_chunk(&rtp_packet(0, 100), now);
        monitor.on_chunk(&rtp_packet(10, 100), now); // opens a gap
        monitor.reset_association();
        // After a reconnect the stream restarts; old gaps must not register
        // as recoveries.
        monitor.on_chunk(&rtp_packet(3, 100), now);
        monitor.on_chunk(&rtp_packet(4, 100), now);
        let stats = monitor.snapshot(Duration::from_secs(10), now);
        assert_eq!(stats.recovered, 0);
        assert_eq!(monitor.total_packets(), 4);
    }
}
