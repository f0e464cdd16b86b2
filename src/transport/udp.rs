//! UDP Transport - DatagramDispatcher
//!
//! Note: UDP has no delivery guarantee, so a missing reply is reported as a
//! successful send with an informational message, never as a failure.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::common::{
    Delivery, DispatchOutcome, DispatchRequest, TextEncoding, TimerSet, TransportKind,
};
use crate::error::{Error, Result};

use super::Transport;

/// Largest datagram we accept as a reply
const MAX_DATAGRAM_SIZE: usize = 65535;

/// Datagram dispatch policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatagramOptions {
    /// Local port to bind when waiting for a reply; ephemeral when unset
    #[serde(default)]
    pub local_port: Option<u16>,

    /// Text rendering for reply bytes
    #[serde(default)]
    pub encoding: TextEncoding,
}

/// UDP dispatcher: one packet out, at most one packet back
pub struct DatagramDispatcher {
    timers: TimerSet,
    options: DatagramOptions,
}

impl DatagramDispatcher {
    pub fn new(timers: TimerSet, options: DatagramOptions) -> Self {
        Self { timers, options }
    }

    async fn exchange(&self, request: &DispatchRequest) -> Result<Delivery> {
        let destination = request.destination();
        let target = destination.resolve().await.map_err(udp_error)?;

        let local_port = if request.expect_reply() {
            self.options.local_port.unwrap_or(0)
        } else {
            0
        };
        // Bound before sending so an early reply is queued, not lost
        let socket = UdpSocket::bind(local_addr_for(&target, local_port))
            .await
            .map_err(|e| udp_error(e.into()))?;

        let bytes_sent = socket
            .send_to(request.payload(), target)
            .await
            .map_err(|e| udp_error(e.into()))?;
        debug!("[udp] sent {} bytes to {}", bytes_sent, target);

        if !request.expect_reply() {
            return Ok(Delivery::new(
                format!("UDP packet sent to {}", destination),
                bytes_sent,
            ));
        }

        let mut deadline = self.timers.deadline(request.timeout());
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((n, from)) => {
                        debug!("[udp] {} bytes from {}", n, from);
                        return Ok(Delivery::new(
                            format!("UDP response from {}:{}", from.ip(), from.port()),
                            bytes_sent,
                        )
                        .with_reply(Bytes::copy_from_slice(&buf[..n]), self.options.encoding)
                        .with_remote(from));
                    }
                    // ICMP unreachable surfaces here on some platforms; it is not a reply
                    Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                        debug!("[udp] ignoring {} while waiting for reply", e);
                    }
                    Err(e) => return Err(udp_error(e.into())),
                },
                _ = &mut deadline => {
                    return Ok(Delivery::new(
                        format!("UDP no response within {}ms", request.timeout_ms()),
                        bytes_sent,
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl Transport for DatagramDispatcher {
    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        // The socket is dropped, and so released, on every return from exchange()
        self.exchange(request).await.into()
    }
}

fn local_addr_for(target: &SocketAddr, port: u16) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port),
        SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port),
    }
}

fn udp_error(e: Error) -> Error {
    match e {
        Error::Io(io) => Error::Transport(format!("UDP error: {}", io)),
        Error::Transport(message) => Error::Transport(format!("UDP error: {}", message)),
        other => other,
    }
}
