//! Receiver-side bridge: accept one SCTP association at a time, account for
//! every chunk, re-emit the payload as local UDP.
//!
//! The listening socket is bound exactly once. The accept loop serves each
//! association to completion before accepting the next, resetting the
//! sequence tracker so no loss state leaks across a reconnect. A reporter
//! task polls the monitor on a fixed interval and logs the windowed
//! statistics; it keeps running between associations.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::monitor::LinkMonitor;
use crate::monitor::snmp::SctpMib;
use crate::shutdown::Shutdown;
use crate::transport::sctp::{SctpListener, SctpStream};

/// Largest SCTP message the receive loop accepts in one read.
const MAX_CHUNK: usize = 65_536;

/// Delay before retrying after a transient accept failure.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct Listener {
    cfg: ListenerConfig,
    monitor: Arc<LinkMonitor>,
    serving: Arc<AtomicBool>,
    shutdown: Shutdown,
}

impl Listener {
    pub fn new(cfg: ListenerConfig, shutdown: Shutdown) -> Result<Self> {
        cfg.validate().context("invalid listener configuration")?;
        let monitor = Arc::new(LinkMonitor::new(
            Duration::from_millis(cfg.tuning.pr_ttl_ms as u64),
            cfg.event_capacity,
        ));
        Ok(Self {
            cfg,
            monitor,
            serving: Arc::new(AtomicBool::new(false)),
            shutdown,
        })
    }

    pub fn monitor(&self) -> Arc<LinkMonitor> {
        self.monitor.clone()
    }

    /// Runs until shutdown. Only socket setup failures are fatal; everything
    /// an established peer can do to us ends its association, not the
    /// process.
    pub async fn run(&self) -> Result<()> {
        let listen_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.cfg.sctp_port);
        let listener = SctpListener::bind(
            listen_addr,
            &self.cfg.tuning,
            self.cfg.buffer_kb as usize * 1024,
        )
        .with_context(|| format!("binding SCTP listener on {listen_addr}"))?;
        info!("listening on SCTP port {}", self.cfg.sctp_port);

        let udp = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .context("binding UDP re-emit socket")?;
        udp.connect((Ipv4Addr::LOCALHOST, self.cfg.udp_port))
            .await
            .with_context(|| format!("connecting UDP re-emitter to port {}", self.cfg.udp_port))?;

        let reporter = {
            let monitor = self.monitor.clone();
            let serving = self.serving.clone();
            let shutdown = self.shutdown.clone();
            let window = Duration::from_secs(self.cfg.stats_window_secs);
            let interval = Duration::from_secs(self.cfg.report_interval_secs);
            tokio::spawn(async move { report_loop(monitor, serving, shutdown, window, interval).await })
        };

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    info!("accepted SCTP association from {peer}");
                    self.monitor.reset_association();
                    self.serving.store(true, Ordering::Release);
                    self.serve(stream, &udp).await;
                    self.serving.store(false, Ordering::Release);
                    info!("association from {peer} closed, listening again");
                }
                Err(e) => {
                    if self.shutdown.is_triggered() {
                        break;
                    }
                    warn!("accept failed: {e}, retrying in {ACCEPT_RETRY_DELAY:?}");
                    tokio::select! {
                        _ = self.shutdown.wait() => break,
                        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                    }
                }
            }
        }

        let _ = reporter.await;
        Ok(())
    }

    /// Receive loop for one association: runs until the peer closes, a read
    /// fails, or shutdown. The monitor lock is released before the UDP send
    /// so accounting never blocks on I/O.
    async fn serve(&self, mut stream: SctpStream, udp: &UdpSocket) {
        let mut buf = BytesMut::with_capacity(MAX_CHUNK);
        loop {
            buf.clear();
            let received = tokio::select! {
                _ = self.shutdown.wait() => return,
                received = stream.recv(&mut buf) => received,
            };
            let len = match received {
                Ok(0) => return, // peer closed
                Ok(len) => len,
                Err(e) => {
                    warn!("SCTP receive failed: {e}");
                    return;
                }
            };

            self.monitor.on_chunk(&buf[..len], Instant::now());

            if let Err(e) = udp.send(&buf[..len]).await {
                warn!("UDP forward failed: {e}");
            }
        }
    }
}

async fn report_loop(
    monitor: Arc<LinkMonitor>,
    serving: Arc<AtomicBool>,
    shutdown: Shutdown,
    window: Duration,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first report covers a
    // real interval.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.wait() => return,
            _ = ticker.tick() => {}
        }

        let stats = monitor.snapshot(window, Instant::now());
        debug!(
            arrivals = stats.arrivals,
            bytes = stats.bytes,
            recovered = stats.recovered,
            irretrievable = stats.irretrievable,
            mean_recovery_ms = stats.mean_recovery.as_secs_f64() * 1000.0,
            packets_per_sec = stats.packets_per_sec,
            mbits_per_sec = stats.mbits_per_sec,
            serving = serving.load(Ordering::Acquire),
            "window stats"
        );
        debug!(
            inter_arrival = ?stats.inter_arrival_hist,
            size = ?stats.size_hist,
            "window histograms"
        );

        match SctpMib::read() {
            Ok(mib) => debug!(
                established = mib.current_established,
                aborted = mib.aborted,
                out_of_blue = mib.out_of_blues,
                packet_discards = mib.packet_discards,
                data_chunk_discards = mib.data_chunk_discards,
                "kernel SCTP counters"
            ),
            // Table not exposed on this system; skip the section.
            Err(e) => debug!("kernel SCTP counters unavailable: {e}"),
        }
    }
}
