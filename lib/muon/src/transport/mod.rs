//! The SRT reliable transport: a connection-oriented, unidirectional
//! byte transport with Go-Back-N retransmission and cumulative
//! acknowledgements, running over a framed segment link.

pub mod client;
pub mod link;
pub mod server;

pub use client::SrtClient;
pub use link::{segment_link, SegmentRx, SegmentTx};
pub use server::SrtServer;

use argon::shared::{FatalKind, NetError};
use std::io;

pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by the SRT socket API. Transient wire trouble (loss,
/// corruption, reordering) never appears here; the protocol absorbs it.
#[derive(Debug, Eq, PartialEq)]
pub enum TransportError {
    /// The call does not fit the TCB's current state.
    ProtocolState,
    /// No such socket, or the socket table is exhausted.
    SockHandle,
    /// SYN or FIN retries ran out; the TCB was forced to Closed.
    RetryExhausted,
    /// The segment link went down underneath the endpoint.
    LinkDown,
    Io(io::ErrorKind),
}

impl From<io::Error> for TransportError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        TransportError::Io(io_error.kind())
    }
}

impl From<NetError> for TransportError {
    #[inline]
    fn from(error: NetError) -> Self {
        match error {
            NetError::Fatal(FatalKind::Io(kind)) => TransportError::Io(kind),
            _ => TransportError::LinkDown,
        }
    }
}
