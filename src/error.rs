use thiserror::Error;

/// Errors surfaced by the bounded relay queue.
///
/// `Full` is normal backpressure, not a failure: the producer counts the drop
/// and moves on. `Shutdown` tells a blocked consumer the bridge is going away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("relay queue full, packet dropped")]
    Full,
    #[error("bridge is shutting down")]
    Shutdown,
}
