pub mod sctp;
pub mod sockopt;

pub use sctp::{Backoff, SctpListener, SctpStream};
