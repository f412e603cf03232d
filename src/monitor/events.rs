//! Rolling window of link events and the statistics derived from it.
//!
//! Every arrival, recovery and confirmed loss lands in a bounded ring;
//! capacity pressure evicts the oldest entry and each snapshot prunes
//! everything older than the window before aggregating. The engine does no
//! I/O — a reporting collaborator polls [`EventRing::snapshot`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Upper edges of the inter-arrival histogram, milliseconds. The last bucket
/// is open-ended.
pub const INTER_ARRIVAL_EDGES_MS: [u64; 7] = [1, 2, 5, 10, 20, 50, 100];

/// Upper edges of the packet-size histogram, bytes. The last bucket is
/// open-ended.
pub const SIZE_EDGES: [usize; 7] = [256, 512, 1024, 1500, 3000, 5000, 10_000];

pub const HISTOGRAM_BUCKETS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A packet arrived: its size and the gap since the previous arrival
    /// (zero for the first arrival of an association).
    Arrival {
        bytes: usize,
        inter_arrival: Duration,
    },
    /// A missing packet showed up late; `latency` is detection-to-arrival.
    Recovered { latency: Duration },
    /// A missing packet outlived the time-to-live and is permanently lost.
    Irretrievable,
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub at: Instant,
    pub kind: EventKind,
}

pub struct EventRing {
    events: VecDeque<Event>,
    capacity: usize,
}

/// Aggregates over one pruned window. Throughput figures are normalized over
/// the full window length, matching a rate display that is polled steadily.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStats {
    pub window: Duration,
    pub arrivals: u64,
    pub bytes: u64,
    pub recovered: u64,
    pub irretrievable: u64,
    /// Mean detection-to-arrival latency; zero when nothing was recovered.
    pub mean_recovery: Duration,
    pub packets_per_sec: f64,
    pub mbits_per_sec: f64,
    pub inter_arrival_hist: [u64; HISTOGRAM_BUCKETS],
    pub size_hist: [u64; HISTOGRAM_BUCKETS],
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event ring needs capacity");
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an event, evicting the oldest entry when the ring is full.
    pub fn record(&mut self, kind: EventKind, at: Instant) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event { at, kind });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(oldest) = self.events.front() {
            if now.duration_since(oldest.at) > window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Drops entries older than `window`, then aggregates what remains.
    /// Pruning is the only mutation; the counts themselves are read-only.
    pub fn snapshot(&mut self, window: Duration, now: Instant) -> WindowStats {
        self.prune(window, now);

        let mut stats = WindowStats {
            window,
            ..Default::default()
        };
        let mut recovery_total = Duration::ZERO;

        for event in &self.events {
            match event.kind {
                EventKind::Arrival {
                    bytes,
                    inter_arrival,
                } => {
                    stats.arrivals += 1;
                    stats.bytes += bytes as u64;
                    let gap_ms = inter_arrival.as_secs_f64() * 1000.0;
                    stats.inter_arrival_hist[gap_bucket(gap_ms)] += 1;
                    stats.size_hist[size_bucket(bytes)] += 1;
                }
                EventKind::Recovered { latency } => {
                    stats.recovered += 1;
                    recovery_total += latency;
                }
                EventKind::Irretrievable => stats.irretrievable += 1,
            }
        }

        if stats.recovered > 0 {
            stats.mean_recovery = recovery_total / stats.recovered as u32;
        }
        let secs = window.as_secs_f64();
        if secs > 0.0 {
            stats.packets_per_sec = stats.arrivals as f64 / secs;
            stats.mbits_per_sec = stats.bytes as f64 * 8.0 / 1e6 / secs;
        }
        stats
    }
}

fn gap_bucket(gap_ms: f64) -> usize {
    INTER_ARRIVAL_EDGES_MS
        .iter()
        .position(|&edge| gap_ms < edge as f64)
        .unwrap_or(HISTOGRAM_BUCKETS - 1)
}

fn size_bucket(bytes: usize) -> usize {
    SIZE_EDGES
        .iter()
        .position(|&edge| bytes < edge)
        .unwrap_or(HISTOGRAM_BUCKETS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(bytes: usize, gap_ms: u64) -> EventKind {
        EventKind::Arrival {
            bytes,
            inter_arrival: Duration::from_micros(gap_ms * 1000),
        }
    }

    #[test]
    fn snapshot_prunes_entries_older_than_the_window() {
        let mut ring = EventRing::new(64);
        let t0 = Instant::now();
        ring.record(arrival(100, 0), t0); // 15 s old at snapshot time
        ring.record(arrival(200, 1), t0 + Duration::from_secs(6)); // 9 s old
        ring.record(arrival(300, 1), t0 + Duration::from_secs(14)); // 1 s old

        let stats = ring.snapshot(Duration::from_secs(10), t0 + Duration::from_secs(15));
        assert_eq!(stats.arrivals, 2);
        assert_eq!(stats.bytes, 500);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn histogram_counts_sum_to_arrivals() {
        let mut ring = EventRing::new(64);
        let now = Instant::now();
        for gap in [
            Duration::from_micros(500),
            Duration::from_micros(1500),
            Duration::from_millis(150),
        ] {
            ring.record(
                EventKind::Arrival {
                    bytes: 1000,
                    inter_arrival: gap,
                },
                now,
            );
        }
        ring.record(EventKind::Irretrievable, now);

        let stats = ring.snapshot(Duration::from_secs(10), now);
        assert_eq!(stats.inter_arrival_hist[0], 1); // 0.5 ms
        assert_eq!(stats.inter_arrival_hist[1], 1); // 1.5 ms
        assert_eq!(stats.inter_arrival_hist[7], 1); // 150 ms, open-ended
        assert_eq!(
            stats.inter_arrival_hist.iter().sum::<u64>(),
            stats.arrivals,
            "every arrival lands in exactly one gap bucket"
        );
        assert_eq!(stats.size_hist.iter().sum::<u64>(), stats.arrivals);
    }

    #[test]
    fn size_buckets_split_on_the_documented_edges() {
        let mut ring = EventRing::new(64);
        let now = Instant::now();
        for bytes in [255, 256, 1499, 1500, 64_000] {
            ring.record(arrival(bytes, 1), now);
        }
        let stats = ring.snapshot(Duration::from_secs(10), now);
        assert_eq!(stats.size_hist[0], 1); // 255
        assert_eq!(stats.size_hist[1], 1); // 256
        assert_eq!(stats.size_hist[3], 1); // 1499
        assert_eq!(stats.size_hist[4], 1); // 1500
        assert_eq!(stats.size_hist[7], 1); // 64000
    }

    #[test]
    fn capacity_pressure_evicts_oldest_first() {
        let mut ring = EventRing::new(3);
        let t0 = Instant::now();
        for i in 0..5u64 {
            ring.record(arrival(100 * (i as usize + 1), 1), t0 + Duration::from_millis(i));
        }
        assert_eq!(ring.len(), 3);
        let stats = ring.snapshot(Duration::from_secs(10), t0 + Duration::from_millis(5));
        // The two oldest arrivals (100 and 200 bytes) were overwritten.
        assert_eq!(stats.bytes, 300 + 400 + 500);
    }

    #[test]
    fn throughput_normalizes_over_the_window() {
        let mut ring = EventRing::new(64);
        let now = Instant::now();
        for _ in 0..20 {
            ring.record(arrival(1250, 1), now);
        }
        let stats = ring.snapshot(Duration::from_secs(10), now);
        assert!((stats.packets_per_sec - 2.0).abs() < 1e-9);
        // 20 * 1250 B = 200 kbit over 10 s
        assert!((stats.mbits_per_sec - 0.02).abs() < 1e-9);
    }

    #[test]
    fn mean_recovery_averages_latencies() {
        let mut ring = EventRing::new(64);
        let now = Instant::now();
        ring.record(
            EventKind::Recovered {
                latency: Duration::from_millis(4),
            },
            now,
        );
        ring.record(
            EventKind::Recovered {
                latency: Duration::from_millis(8),
            },
            now,
        );
        let stats = ring.snapshot(Duration::from_secs(10), now);
        assert_eq!(stats.recovered, 2);
        assert_eq!(stats.mean_recovery, Duration::from_millis(6));
    }
}
