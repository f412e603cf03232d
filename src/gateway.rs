//! Sender-side bridge: UDP ingress → relay queue → outbound SCTP association.
//!
//! Two concurrent loops share the queue. The ingress task reads one datagram
//! at a time and enqueues it, dropping on overflow. The egress loop drains
//! the queue into the current association and owns the connection state
//! machine: `Disconnected → Connecting → Connected`, back to `Connecting` on
//! a peer-initiated failure, with exponential backoff between attempts. At
//! most one association exists per gateway; the superseded stream is dropped
//! (descriptor closed) before a replacement connect is attempted.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, error, warn};

use crate::config::GatewayConfig;
use crate::error::QueueError;
use crate::queue::RelayQueue;
use crate::shutdown::Shutdown;
use crate::transport::sctp::{Backoff, SctpStream};
use crate::transport::sockopt;

pub const RECONNECT_DELAY_INITIAL: Duration = Duration::from_millis(100);
pub const RECONNECT_DELAY_CEILING: Duration = Duration::from_secs(10);

/// Monotonic process-lifetime counters, readable while the bridge runs.
#[derive(Debug, Default)]
pub struct GatewayCounters {
    /// Datagrams read off the UDP socket.
    pub received: AtomicU64,
    /// Messages actually transmitted over an association.
    pub forwarded: AtomicU64,
    /// Times the association was lost and re-established.
    pub reconnects: AtomicU64,
}

pub struct Gateway {
    cfg: GatewayConfig,
    queue: Arc<RelayQueue>,
    counters: Arc<GatewayCounters>,
    shutdown: Shutdown,
}

impl Gateway {
    pub fn new(cfg: GatewayConfig, shutdown: Shutdown) -> Result<Self> {
        cfg.validate().context("invalid gateway configuration")?;
        let queue = Arc::new(RelayQueue::new(cfg.queue_capacity, cfg.mtu));
        Ok(Self {
            cfg,
            queue,
            counters: Arc::new(GatewayCounters::default()),
            shutdown,
        })
    }

    pub fn counters(&self) -> Arc<GatewayCounters> {
        self.counters.clone()
    }

    pub fn queue(&self) -> Arc<RelayQueue> {
        self.queue.clone()
    }

    /// Runs the bridge until shutdown or a fatal error. Transient connect
    /// failures and peer-initiated disconnects are absorbed here; anything
    /// else is fatal and stops both halves.
    pub async fn run(&self) -> Result<()> {
        let udp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.cfg.udp_port))
            .await
            .with_context(|| format!("binding UDP ingress on port {}", self.cfg.udp_port))?;
        if let Err(e) =
            sockopt::set_recv_buffer(udp.as_raw_fd(), self.cfg.udp_buffer_kb as usize * 1024)
        {
            debug!("UDP SO_RCVBUF not applied: {e}");
        }
        debug!("listening for UDP datagrams on port {}", self.cfg.udp_port);

        // A signal must also unblock an egress loop parked in dequeue.
        let closer = {
            let queue = self.queue.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                shutdown.wait().await;
                queue.close();
            })
        };

        let ingress = {
            let queue = self.queue.clone();
            let counters = self.counters.clone();
            let shutdown = self.shutdown.clone();
            let mtu = self.cfg.mtu;
            tokio::spawn(async move { ingress_loop(udp, queue, counters, shutdown, mtu).await })
        };

        let result = self.egress_loop().await;
        if result.is_err() {
            error!("egress failed, stopping bridge");
        }

        // Fatal egress errors take the ingress half down too.
        self.shutdown.trigger();
        self.queue.close();
        let _ = ingress.await;
        let _ = closer.await;
        result
    }

    async fn egress_loop(&self) -> Result<()> {
        let mut buf = vec![0u8; self.cfg.mtu];
        let mut backoff = Backoff::new(RECONNECT_DELAY_INITIAL, RECONNECT_DELAY_CEILING);

        'associations: loop {
            let Some(mut stream) = self.establish(&mut backoff).await else {
                return Ok(()); // shutdown while connecting
            };
            backoff.reset();

            loop {
                let len = match self.queue.dequeue(&mut buf).await {
                    Ok(len) => len,
                    // Only Shutdown ever comes out of dequeue.
                    Err(_) => return Ok(()),
                };
                if let Err(e) = stream.send(&buf[..len]).await {
                    if is_peer_disconnect(&e) {
                        debug!("association lost ({e}), reconnecting");
                        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                        // Close the old descriptor before any new attempt.
                        drop(stream);
                        continue 'associations;
                    }
                    return Err(e).context("SCTP send failed");
                }
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Connects with exponential backoff until success or shutdown.
    async fn establish(&self, backoff: &mut Backoff) -> Option<SctpStream> {
        let addr = SocketAddrV4::new(self.cfg.sctp_address, self.cfg.sctp_port);
        let send_buffer = self.cfg.sctp_buffer_kb as usize * 1024;
        loop {
            if self.shutdown.is_triggered() {
                return None;
            }
            debug!("connecting to SCTP receiver at {addr}");
            let attempt = tokio::select! {
                _ = self.shutdown.wait() => return None,
                attempt = SctpStream::connect(addr, &self.cfg.tuning, send_buffer) => attempt,
            };
            match attempt {
                Ok(stream) => {
                    debug!("connected to SCTP receiver at {addr}");
                    return Some(stream);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    debug!("SCTP connect failed ({e}), retrying in {delay:?}");
                    tokio::select! {
                        _ = self.shutdown.wait() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

async fn ingress_loop(
    udp: UdpSocket,
    queue: Arc<RelayQueue>,
    counters: Arc<GatewayCounters>,
    shutdown: Shutdown,
    mtu: usize,
) {
    let mut buf = vec![0u8; mtu];
    loop {
        let received = tokio::select! {
            _ = shutdown.wait() => break,
            received = udp.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, _from)) => {
                counters.received.fetch_add(1, Ordering::Relaxed);
                if queue.enqueue(&buf[..len]) == Err(QueueError::Full) {
                    debug!("UDP datagram dropped, relay queue full");
                }
            }
            Err(e) => warn!("UDP receive failed: {e}"),
        }
    }
}

/// Send failures that mean the peer went away: reconnect instead of dying.
fn is_peer_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}
