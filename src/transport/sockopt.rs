//! Socket-option plumbing for kernel SCTP sockets.
//!
//! The latency profile trades reliability headroom for delay: retransmission
//! timeouts in the low milliseconds, a PR-SCTP time-to-live so the transport
//! abandons chunks that can no longer make their playout deadline, send
//! coalescing off and short delayed ACKs. Options a kernel does not support
//! are skipped with a debug log; an old kernel without PR-SCTP still bridges,
//! just without transport-level expiry.

use std::io;
use std::mem;
use std::os::fd::RawFd;

use tracing::debug;

use crate::config::SctpTuning;

pub const SOL_SCTP: libc::c_int = 132;

// Option names from the kernel SCTP API (linux/sctp.h).
const SCTP_RTOINFO: libc::c_int = 0;
const SCTP_INITMSG: libc::c_int = 2;
const SCTP_NODELAY: libc::c_int = 3;
const SCTP_PEER_ADDR_PARAMS: libc::c_int = 9;
const SCTP_DELAYED_ACK_TIME: libc::c_int = 16;
const SCTP_PR_SUPPORTED: libc::c_int = 113;
const SCTP_DEFAULT_PRINFO: libc::c_int = 114;

const SCTP_PR_SCTP_TTL: u16 = 0x0010;
const SPP_HB_ENABLE: u32 = 1;

#[repr(C)]
struct RtoInfo {
    assoc_id: i32,
    initial: u32,
    max: u32,
    min: u32,
}

#[repr(C)]
struct AssocValue {
    assoc_id: i32,
    value: u32,
}

#[repr(C)]
struct InitMsg {
    num_ostreams: u16,
    max_instreams: u16,
    max_attempts: u16,
    max_init_timeo: u16,
}

#[repr(C)]
struct DefaultPrInfo {
    policy: u16,
    value: u32,
    assoc_id: i32,
}

#[repr(C, packed(4))]
struct PeerAddrParams {
    assoc_id: i32,
    address: libc::sockaddr_storage,
    hbinterval: u32,
    pathmaxrxt: u16,
    pathmtu: u32,
    sackdelay: u32,
    flags: u32,
    ipv6_flowlabel: u32,
    dscp: u8,
}

fn set_opt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn best_effort(name: &str, result: io::Result<()>) {
    if let Err(e) = result {
        debug!("setsockopt {name} not applied: {e}");
    }
}

/// Applies the latency-oriented association profile to a new SCTP socket.
/// On a listening socket the settings are inherited by accepted associations.
pub fn apply_latency_profile(fd: RawFd, tuning: &SctpTuning) {
    let rto = RtoInfo {
        assoc_id: 0,
        initial: tuning.rto_initial_ms,
        max: tuning.rto_max_ms,
        min: tuning.rto_min_ms,
    };
    best_effort("SCTP_RTOINFO", set_opt(fd, SOL_SCTP, SCTP_RTOINFO, &rto));

    best_effort(
        "SCTP_NODELAY",
        set_opt(fd, SOL_SCTP, SCTP_NODELAY, &(1 as libc::c_int)),
    );

    let ack = AssocValue {
        assoc_id: 0,
        value: tuning.delayed_ack_ms,
    };
    best_effort(
        "SCTP_DELAYED_ACK_TIME",
        set_opt(fd, SOL_SCTP, SCTP_DELAYED_ACK_TIME, &ack),
    );

    best_effort(
        "SCTP_PR_SUPPORTED",
        set_opt(
            fd,
            SOL_SCTP,
            SCTP_PR_SUPPORTED,
            &AssocValue {
                assoc_id: 0,
                value: 1,
            },
        ),
    );
    let pr = DefaultPrInfo {
        policy: SCTP_PR_SCTP_TTL,
        value: tuning.pr_ttl_ms,
        assoc_id: 0,
    };
    best_effort(
        "SCTP_DEFAULT_PRINFO",
        set_opt(fd, SOL_SCTP, SCTP_DEFAULT_PRINFO, &pr),
    );

    if tuning.max_init_attempts > 0 {
        let init = InitMsg {
            num_ostreams: 1,
            max_instreams: 1,
            max_attempts: tuning.max_init_attempts,
            max_init_timeo: 0,
        };
        best_effort("SCTP_INITMSG", set_opt(fd, SOL_SCTP, SCTP_INITMSG, &init));
    }

    if tuning.heartbeat_interval_ms > 0 {
        let hb = PeerAddrParams {
            assoc_id: 0,
            // wildcard address: applies to all peer addresses of the assoc
            address: unsafe { mem::zeroed() },
            hbinterval: tuning.heartbeat_interval_ms,
            pathmaxrxt: 0,
            pathmtu: 0,
            sackdelay: 0,
            flags: SPP_HB_ENABLE,
            ipv6_flowlabel: 0,
            dscp: 0,
        };
        best_effort(
            "SCTP_PEER_ADDR_PARAMS",
            set_opt(fd, SOL_SCTP, SCTP_PEER_ADDR_PARAMS, &hb),
        );
    }
}

pub fn set_send_buffer(fd: RawFd, bytes: usize) -> io::Result<()> {
    set_opt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_SNDBUF,
        &(bytes as libc::c_int),
    )
}

pub fn set_recv_buffer(fd: RawFd, bytes: usize) -> io::Result<()> {
    set_opt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_RCVBUF,
        &(bytes as libc::c_int),
    )
}

pub fn set_reuse(fd: RawFd) -> io::Result<()> {
    let one: libc::c_int = 1;
    set_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &one)?;
    set_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, &one)
}
