//! DispatchOutcome - the single terminal result of a dispatch

use std::net::SocketAddr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How reply bytes are rendered as text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
    Hex,
    Base64,
}

impl TextEncoding {
    /// Render bytes as text. Invalid UTF-8 is replaced, never rejected.
    pub fn decode(&self, data: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(data).into_owned(),
            TextEncoding::Latin1 => data.iter().map(|&b| b as char).collect(),
            TextEncoding::Hex => data.iter().map(|b| format!("{:02x}", b)).collect(),
            TextEncoding::Base64 => STANDARD.encode(data),
        }
    }
}

/// Successful exchange details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    message: String,
    bytes_sent: usize,
    reply: Option<Bytes>,
    remote: Option<SocketAddr>,
    encoding: TextEncoding,
}

impl Delivery {
    pub fn new(message: impl Into<String>, bytes_sent: usize) -> Self {
        Self {
            message: message.into(),
            bytes_sent,
            reply: None,
            remote: None,
            encoding: TextEncoding::default(),
        }
    }

    /// Builder: attach reply data
    pub fn with_reply(mut self, reply: Bytes, encoding: TextEncoding) -> Self {
        self.reply = Some(reply);
        self.encoding = encoding;
        self
    }

    /// Builder: attach the endpoint the reply came from
    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn reply(&self) -> Option<&Bytes> {
        self.reply.as_ref()
    }

    /// Reply rendered with the exchange's text encoding
    pub fn reply_text(&self) -> Option<String> {
        self.reply.as_ref().map(|data| self.encoding.decode(data))
    }

    pub fn remote_host(&self) -> Option<String> {
        self.remote.map(|addr| addr.ip().to_string())
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.remote.map(|addr| addr.port())
    }
}

/// Why a dispatch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect, write, send or read error
    Transport,
    /// Stream deadline elapsed before any reply byte arrived
    Timeout,
    /// The dispatcher itself broke (panic or unexpected error)
    Internal,
}

/// Terminal result of one dispatch: success xor failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success(Delivery),
    Failure { kind: FailureKind, message: String },
}

impl DispatchOutcome {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        DispatchOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    pub fn message(&self) -> &str {
        match self {
            DispatchOutcome::Success(delivery) => delivery.message(),
            DispatchOutcome::Failure { message, .. } => message,
        }
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        match self {
            DispatchOutcome::Success(delivery) => Some(delivery),
            DispatchOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DispatchOutcome::Success(_) => None,
            DispatchOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<Result<Delivery>> for DispatchOutcome {
    fn from(result: Result<Delivery>) -> Self {
        match result {
            Ok(delivery) => DispatchOutcome::Success(delivery),
            Err(Error::Timeout(message)) => DispatchOutcome::failure(FailureKind::Timeout, message),
            Err(Error::Transport(message)) => {
                DispatchOutcome::failure(FailureKind::Transport, message)
            }
            Err(Error::Io(e)) => DispatchOutcome::failure(FailureKind::Transport, e.to_string()),
            Err(other) => DispatchOutcome::failure(FailureKind::Internal, other.to_string()),
        }
    }
}
