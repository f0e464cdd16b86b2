//! Transport Layer
//!
//! Responsibilities:
//! - Perform exactly one network exchange per dispatch (TCP or UDP)
//! - Own every timer and socket of that exchange until it terminates
//! - Fold every exit path into a single `DispatchOutcome`
//!
//! This layer knows nothing about validation, display or logging.

mod accumulator;
mod tcp;
mod udp;

pub use accumulator::ResponseAccumulator;
pub use tcp::{StreamDispatcher, StreamOptions, TcpConnector};
pub use udp::{DatagramDispatcher, DatagramOptions};

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::common::{Address, DispatchOutcome, DispatchRequest, TransportKind};

/// Transport trait for a single timed exchange
///
/// Implementations resolve exactly once; the returned value is the only
/// terminal state an exchange can reach.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which transport this dispatcher speaks
    fn kind(&self) -> TransportKind;

    /// Send the request payload and, if asked, collect a reply
    async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome;
}

/// Connector trait for establishing the raw stream of a TCP dispatch
///
/// Implementations should ONLY handle connection establishment; the
/// dispatcher owns the connect deadline.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to a remote address
    async fn connect(&self, addr: &Address) -> std::io::Result<TcpStream>;
}
