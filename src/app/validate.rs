//! Request validation and payload resolution
//!
//! `check` turns raw settings into typed fields, collecting every violation
//! instead of stopping at the first. `resolve_payload` then reads file-shaped
//! payloads from disk.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

use crate::common::{Address, DispatchRequest, TransportKind};
use crate::config::DispatchSettings;
use crate::error::{Error, Result};

/// Settings that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedFields {
    pub destination: Address,
    pub transport: TransportKind,
    pub payload: String,
    pub timeout: Duration,
    pub expect_reply: bool,
}

/// Payload bytes plus where they came from
#[derive(Debug, Clone)]
pub struct ResolvedPayload {
    pub data: Bytes,
    /// Set when the payload was read from a file
    pub source: Option<PathBuf>,
}

impl ResolvedPayload {
    pub fn file_name(&self) -> Option<String> {
        self.source
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// Validate raw settings, reporting every violation at once
pub fn check(settings: &DispatchSettings) -> Result<CheckedFields> {
    let ip = settings.ip.as_deref().map(str::trim).unwrap_or("");
    let payload = settings.payload.as_deref().unwrap_or("");
    let kind = settings.kind.as_deref().map(str::trim).unwrap_or("");

    let mut missing = Vec::new();
    if ip.is_empty() {
        missing.push("IP address");
    }
    if settings.port.is_none() {
        missing.push("Port");
    }
    if payload.trim().is_empty() {
        missing.push("Payload");
    }
    if kind.is_empty() {
        missing.push("Type");
    }

    let mut violations = Vec::new();
    if !missing.is_empty() {
        violations.push(format!("Missing: {}", missing.join(", ")));
    }

    let port = match settings.port {
        Some(p) if (1..=65535).contains(&p) => Some(p as u16),
        Some(p) => {
            violations.push(format!("Invalid port '{}' (must be 1-65535)", p));
            None
        }
        None => None,
    };

    let transport = if kind.is_empty() {
        None
    } else {
        match kind.parse::<TransportKind>() {
            Ok(t) => Some(t),
            Err(e) => {
                violations.push(e);
                None
            }
        }
    };

    match (port, transport) {
        (Some(port), Some(transport)) if violations.is_empty() => Ok(CheckedFields {
            destination: Address::new(ip, port),
            transport,
            payload: payload.to_string(),
            timeout: Duration::from_millis(settings.timeout_ms()),
            expect_reply: settings.expect_reply(),
        }),
        _ => Err(Error::Validation(violations)),
    }
}

/// Whether a payload names a file rather than literal text
pub fn looks_like_path(payload: &str) -> bool {
    const PREFIXES: [&str; 6] = ["/", "./", "../", "~/", ".\\", "..\\"];
    if PREFIXES.iter().any(|p| payload.starts_with(p)) {
        return true;
    }
    let bytes = payload.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Expand a leading `~/` against the home directory
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| Error::PayloadFile("home directory unknown".into())),
        None => Ok(PathBuf::from(path)),
    }
}

/// Literal text as UTF-8 bytes, or the contents of the named file
pub async fn resolve_payload(payload: &str) -> Result<ResolvedPayload> {
    if !looks_like_path(payload) {
        return Ok(ResolvedPayload {
            data: Bytes::copy_from_slice(payload.as_bytes()),
            source: None,
        });
    }

    let path = expand_home(payload)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| Error::PayloadFile(e.to_string()))?;
    Ok(ResolvedPayload {
        data: Bytes::from(data),
        source: Some(path),
    })
}

/// Build the dispatch request from checked fields and resolved bytes
pub fn build_request(fields: &CheckedFields, payload: &ResolvedPayload) -> DispatchRequest {
    DispatchRequest::new(
        fields.destination.clone(),
        fields.transport,
        payload.data.clone(),
        fields.timeout,
    )
    .with_expect_reply(fields.expect_reply)
}
