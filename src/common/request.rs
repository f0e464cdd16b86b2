//! DispatchRequest - one immutable exchange description

use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;

use super::Address;

/// Transport used for a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Connection-oriented byte stream (TCP)
    Stream,
    /// Single packet exchange (UDP)
    Datagram,
}

impl TransportKind {
    /// Label used in user-facing messages and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::Stream => "TCP",
            TransportKind::Datagram => "UDP",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(TransportKind::Stream),
            "UDP" => Ok(TransportKind::Datagram),
            _ => Err(format!("Invalid type '{}' (must be TCP or UDP)", s)),
        }
    }
}

/// A fully validated request for exactly one network exchange
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    destination: Address,
    transport: TransportKind,
    payload: Bytes,
    timeout: Duration,
    expect_reply: bool,
}

impl DispatchRequest {
    /// Create a request that waits for a reply
    pub fn new(
        destination: Address,
        transport: TransportKind,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Self {
        Self {
            destination,
            transport,
            payload: payload.into(),
            timeout,
            expect_reply: true,
        }
    }

    /// Builder: set whether a reply is awaited
    pub fn with_expect_reply(mut self, expect_reply: bool) -> Self {
        self.expect_reply = expect_reply;
        self
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout in whole milliseconds, as shown in messages
    pub fn timeout_ms(&self) -> u128 {
        self.timeout.as_millis()
    }

    pub fn expect_reply(&self) -> bool {
        self.expect_reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("tcp".parse::<TransportKind>(), Ok(TransportKind::Stream));
        assert_eq!(" UDP ".parse::<TransportKind>(), Ok(TransportKind::Datagram));
        assert_eq!(
            "XML".parse::<TransportKind>(),
            Err("Invalid type 'XML' (must be TCP or UDP)".to_string())
        );
    }

    #[test]
    fn test_request_defaults_to_expect_reply() {
        let request = DispatchRequest::new(
            Address::new("127.0.0.1", 9),
            TransportKind::Stream,
            &b"ping"[..],
            Duration::from_millis(2000),
        );
        assert!(request.expect_reply());
        assert_eq!(request.timeout_ms(), 2000);
        assert_eq!(request.payload().len(), 4);
        assert!(!request.with_expect_reply(false).expect_reply());
    }
}
