//! UDP ⇄ SCTP partial-reliability bridge for a wireless FPV video link.
//!
//! Two halves, deployed on opposite ends of the radio link:
//!
//! - the **gateway** binds a UDP port, queues incoming datagrams in a bounded
//!   ring and forwards them over an outbound SCTP association tuned for low
//!   latency (aggressive RTOs, PR-SCTP time-to-live, no send coalescing),
//!   reconnecting with exponential backoff when the peer goes away;
//! - the **listener** accepts one SCTP association at a time, tracks the RTP
//!   sequence numbers embedded in the payload to account for lost, recovered
//!   and irretrievable packets, re-emits the payload as local UDP and keeps a
//!   rolling window of link statistics.
//!
//! Delivery is best effort: packets may be dropped under backpressure or
//! during a reconnect gap, and no ordering holds across a reconnect.

pub mod config;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod monitor;
pub mod queue;
pub mod rtp;
pub mod shutdown;
pub mod transport;

pub use config::{GatewayConfig, ListenerConfig, SctpTuning};
pub use error::QueueError;
pub use gateway::Gateway;
pub use listener::Listener;
pub use monitor::LinkMonitor;
pub use queue::RelayQueue;
pub use shutdown::Shutdown;
