//! One-to-one kernel SCTP sockets driven by the tokio reactor.
//!
//! SOCK_STREAM-style SCTP shares the TCP call surface (connect, accept, read,
//! write) while preserving message boundaries, so an established descriptor
//! can be registered with the reactor through the standard stream types.
//! Each [`SctpStream::send`] transmits exactly one SCTP message and each
//! successful [`SctpStream::recv`] yields one.

use std::io;
use std::mem;
use std::net::{SocketAddr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::config::SctpTuning;
use crate::transport::sockopt;

fn new_sctp_socket() -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_INET,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            libc::IPPROTO_SCTP,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn to_raw_v4(addr: SocketAddrV4) -> libc::sockaddr_in {
    libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.ip().octets()),
        },
        sin_zero: [0; 8],
    }
}

/// An established SCTP association. Dropping it closes the descriptor, so a
/// superseded association is fully torn down before its replacement exists.
#[derive(Debug)]
pub struct SctpStream {
    inner: TcpStream,
}

impl SctpStream {
    /// Opens a new association to `addr` with the latency profile applied.
    /// One attempt only; the caller owns the retry policy.
    pub async fn connect(
        addr: SocketAddrV4,
        tuning: &SctpTuning,
        send_buffer: usize,
    ) -> io::Result<Self> {
        let fd = new_sctp_socket()?;
        sockopt::apply_latency_profile(fd.as_raw_fd(), tuning);
        if let Err(e) = sockopt::set_send_buffer(fd.as_raw_fd(), send_buffer) {
            debug!("SO_SNDBUF not applied: {e}");
        }

        let raw = to_raw_v4(addr);
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                &raw as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(err);
            }
        }

        let inner = TcpStream::from_std(std::net::TcpStream::from(fd))?;
        // Nonblocking connect: the first writability event signals completion,
        // SO_ERROR carries the verdict.
        inner.writable().await?;
        if let Some(err) = inner.take_error()? {
            return Err(err);
        }
        Ok(Self { inner })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Sends one message over the association.
    pub async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.inner.write_all(payload).await
    }

    /// Receives one message into the spare capacity of `buf`. Returns the
    /// message length, or 0 once the peer has closed the association.
    pub async fn recv(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        self.inner.read_buf(buf).await
    }
}

/// The receiver-side listening socket. Bound and listening exactly once for
/// the life of the process; associations are accepted one at a time.
#[derive(Debug)]
pub struct SctpListener {
    inner: TcpListener,
}

impl SctpListener {
    pub fn bind(addr: SocketAddrV4, tuning: &SctpTuning, buffer: usize) -> io::Result<Self> {
        let fd = new_sctp_socket()?;
        sockopt::set_reuse(fd.as_raw_fd())?;
        if let Err(e) = sockopt::set_send_buffer(fd.as_raw_fd(), buffer) {
            debug!("SO_SNDBUF not applied: {e}");
        }
        if let Err(e) = sockopt::set_recv_buffer(fd.as_raw_fd(), buffer) {
            debug!("SO_RCVBUF not applied: {e}");
        }
        sockopt::apply_latency_profile(fd.as_raw_fd(), tuning);

        let raw = to_raw_v4(addr);
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &raw as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // Backlog of one: a single association is served at a time.
        let rc = unsafe { libc::listen(fd.as_raw_fd(), 1) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            inner: TcpListener::from_std(std::net::TcpListener::from(fd))?,
        })
    }

    pub async fn accept(&self) -> io::Result<(SctpStream, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;
        Ok((SctpStream { inner: stream }, peer))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Reconnect schedule for the outbound association: exponential from
/// `initial` up to `ceiling`, reset after a successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    ceiling: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            initial,
            ceiling,
            next: initial,
        }
    }

    /// Returns the delay to sleep before the next attempt and advances the
    /// schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        let mut previous = Duration::ZERO;
        let mut seen = Vec::new();
        for _ in 0..12 {
            let delay = backoff.next_delay();
            assert!(delay >= previous, "backoff must be non-decreasing");
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
            seen.push(delay);
        }
        assert_eq!(seen[0], Duration::from_millis(100));
        assert_eq!(seen[1], Duration::from_millis(200));
        assert_eq!(*seen.last().unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn backoff_resets_to_initial() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}
