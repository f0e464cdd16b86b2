//! TCP Transport - StreamDispatcher
//!
//! One connection, one payload write, then optionally an idle-timed reply:
//!
//! ```text
//! connect ──► write ──► (half-close) ──► Silent ──first byte──► Receiving
//!    │          │                          │                      │  ▲
//!    └─ overall deadline ──────────────────┘                      │  └ chunk: reset idle
//!       fires: Timeout failure                                    └ idle fires / EOF: Success
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::common::{
    Address, Deadline, Delivery, DispatchOutcome, DispatchRequest, TextEncoding, TimerSet,
    TransportKind,
};
use crate::error::{Error, Result};

use super::{Connector, ResponseAccumulator, Transport};

/// Read buffer size (32KB)
const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Stream dispatch policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    /// Half-close the connection once the payload is written
    #[serde(default = "default_close_after_send")]
    pub close_after_send: bool,

    /// Text rendering for reply bytes
    #[serde(default)]
    pub encoding: TextEncoding,
}

fn default_close_after_send() -> bool {
    true
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            close_after_send: default_close_after_send(),
            encoding: TextEncoding::default(),
        }
    }
}

/// Reply collection state: the armed timer depends on whether a byte arrived
enum ReplyWait {
    /// Nothing received yet; the overall deadline from connect time is armed
    Silent(Deadline),
    /// Some bytes received; the idle deadline is re-armed on every chunk
    Receiving(Deadline),
}

impl ReplyWait {
    fn deadline(&mut self) -> &mut Deadline {
        match self {
            ReplyWait::Silent(deadline) | ReplyWait::Receiving(deadline) => deadline,
        }
    }
}

/// Plain TCP connect; host names are resolved at dispatch time
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &Address) -> std::io::Result<TcpStream> {
        match addr {
            Address::Socket(addr) => TcpStream::connect(*addr).await,
            Address::Domain(domain, port) => TcpStream::connect((domain.as_str(), *port)).await,
        }
    }
}

/// TCP dispatcher: exactly one connection per dispatch
pub struct StreamDispatcher {
    timers: TimerSet,
    options: StreamOptions,
    connector: Arc<dyn Connector>,
}

impl StreamDispatcher {
    pub fn new(timers: TimerSet, options: StreamOptions) -> Self {
        Self {
            timers,
            options,
            connector: Arc::new(TcpConnector),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    async fn exchange(&self, request: &DispatchRequest) -> Result<Delivery> {
        let destination = request.destination();
        let timeout_ms = request.timeout_ms();
        let mut overall = self.timers.deadline(request.timeout());

        let mut stream = tokio::select! {
            connected = self.connector.connect(destination) => connected.map_err(tcp_error)?,
            _ = &mut overall => {
                return Err(Error::Timeout(format!(
                    "Failed to connect to {} within {} ms. Connection timed out",
                    destination, timeout_ms
                )));
            }
        };
        stream.set_nodelay(true).map_err(tcp_error)?;
        debug!("[tcp] connected to {}", destination);

        let payload = request.payload();
        tokio::select! {
            written = stream.write_all(payload) => written.map_err(tcp_error)?,
            _ = &mut overall => return Err(silence_timeout(timeout_ms)),
        }
        let bytes_sent = payload.len();
        debug!("[tcp] wrote {} bytes to {}", bytes_sent, destination);

        if !request.expect_reply() {
            if !self.options.close_after_send {
                return Ok(Delivery::new(
                    "TCP payload sent (connection left open)",
                    bytes_sent,
                ));
            }
            tokio::select! {
                closed = stream.shutdown() => closed.map_err(tcp_error)?,
                _ = &mut overall => return Err(silence_timeout(timeout_ms)),
            }
            return Ok(Delivery::new("TCP payload sent", bytes_sent));
        }

        if self.options.close_after_send {
            // Peers that answer on EOF need the half-close; a failure here is not terminal
            if let Err(e) = stream.shutdown().await {
                debug!("[tcp] half-close after write failed: {}", e);
            }
        }

        self.collect_reply(&mut stream, overall, request, bytes_sent)
            .await
    }

    /// Idle-wait mode: accumulate until silence, EOF, or error
    async fn collect_reply(
        &self,
        stream: &mut TcpStream,
        overall: Deadline,
        request: &DispatchRequest,
        bytes_sent: usize,
    ) -> Result<Delivery> {
        let timeout_ms = request.timeout_ms();
        let encoding = self.options.encoding;
        let mut acc = ResponseAccumulator::new();
        let mut wait = ReplyWait::Silent(overall);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                read = stream.read(&mut buf) => {
                    let n = read.map_err(tcp_error)?;
                    if n == 0 {
                        debug!("[tcp] peer closed after {} reply bytes", acc.len());
                        return Ok(if acc.is_empty() {
                            Delivery::new("TCP connection closed without response", bytes_sent)
                        } else {
                            Delivery::new("TCP response received", bytes_sent)
                                .with_reply(acc.into_bytes(), encoding)
                        });
                    }

                    acc.append(&buf[..n]);
                    if let ReplyWait::Receiving(idle) = &mut wait {
                        idle.reset();
                    } else {
                        // Replacing Silent drops, and so cancels, the overall deadline
                        wait = ReplyWait::Receiving(self.timers.deadline(request.timeout()));
                    }
                }
                _ = wait.deadline() => {
                    return match wait {
                        ReplyWait::Silent(_) => Err(silence_timeout(timeout_ms)),
                        ReplyWait::Receiving(_) => Ok(Delivery::new(
                            format!("TCP idle timeout after {}ms", timeout_ms),
                            bytes_sent,
                        )
                        .with_reply(acc.into_bytes(), encoding)),
                    };
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StreamDispatcher {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        // The stream is dropped, and so closed, on every return from exchange()
        self.exchange(request).await.into()
    }
}

fn tcp_error(e: std::io::Error) -> Error {
    Error::Transport(format!("TCP error: {}", e))
}

fn silence_timeout(timeout_ms: u128) -> Error {
    Error::Timeout(format!(
        "TCP timeout after {}ms - no response received",
        timeout_ms
    ))
}
