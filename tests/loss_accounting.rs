//! End-to-end loss accounting through the monitor: synthetic RTP chunks in,
//! windowed statistics out.

use std::time::{Duration, Instant};

use wfb_bridge::LinkMonitor;

fn rtp_chunk(seq: u16, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    buf[0] = 0x80; // RTP version 2
    buf[1] = 96; // dynamic payload type
    buf[2..4].copy_from_slice(&seq.to_be_bytes());
    buf
}

#[test]
fn clean_stream_reports_only_arrivals() {
    let monitor = LinkMonitor::new(Duration::from_millis(50), 4096);
    let now = Instant::now();
    for seq in 0..100u16 {
        monitor.on_chunk(&rtp_chunk(seq, 1200), now);
    }
    let stats = monitor.snapshot(Duration::from_secs(10), now);
    assert_eq!(stats.arrivals, 100);
    assert_eq!(stats.bytes, 120_000);
    assert_eq!(stats.recovered, 0);
    assert_eq!(stats.irretrievable, 0);
    assert_eq!(stats.inter_arrival_hist.iter().sum::<u64>(), 100);
    assert_eq!(stats.size_hist.iter().sum::<u64>(), 100);
}

#[test]
fn reordered_burst_recovers_and_expired_gap_is_lost() {
    let monitor = LinkMonitor::new(Duration::from_millis(5), 4096);
    let t0 = Instant::now();

    // 0,1,2 arrive; 3 and 4 go missing when 5 arrives; 3 recovers quickly.
    for seq in [0u16, 1, 2, 5] {
        monitor.on_chunk(&rtp_chunk(seq, 300), t0);
    }
    monitor.on_chunk(&rtp_chunk(3, 300), t0 + Duration::from_millis(2));

    // 4 never shows up. The next in-order chunk arrives after the TTL, and
    // its sweep declares 4 irretrievable.
    monitor.on_chunk(&rtp_chunk(6, 300), t0 + Duration::from_millis(20));

    let stats = monitor.snapshot(Duration::from_secs(10), t0 + Duration::from_millis(20));
    assert_eq!(stats.arrivals, 6);
    assert_eq!(stats.recovered, 1);
    assert_eq!(stats.irretrievable, 1);
    assert_eq!(stats.mean_recovery, Duration::from_millis(2));
}

#[test]
fn totals_survive_reconnects_and_window_pruning() {
    let monitor = LinkMonitor::new(Duration::from_millis(50), 4096);
    let t0 = Instant::now();

    for seq in 0..10u16 {
        monitor.on_chunk(&rtp_chunk(seq, 500), t0);
    }
    monitor.reset_association();
    for seq in 0..10u16 {
        monitor.on_chunk(&rtp_chunk(seq, 500), t0 + Duration::from_secs(30));
    }

    // The first association's events have aged out of the window...
    let stats = monitor.snapshot(Duration::from_secs(10), t0 + Duration::from_secs(30));
    assert_eq!(stats.arrivals, 10);
    // ...but the process-lifetime totals keep counting.
    assert_eq!(monitor.total_packets(), 20);
    assert_eq!(monitor.total_bytes(), 10_000);
}
