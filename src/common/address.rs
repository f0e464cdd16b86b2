//! Destination address for a dispatch

use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;

use crate::error::{Error, Result};

/// Destination of a dispatch: either a literal IP endpoint or a host name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IP socket address (IP + port)
    Socket(SocketAddr),
    /// Host name with port, resolved at dispatch time
    Domain(String, u16),
}

impl Address {
    /// Build from a host string, keeping IP literals unresolved
    pub fn new(host: &str, port: u16) -> Self {
        let host = host.trim();
        // Bracketed IPv6 literals are accepted as typed in a URL
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        match bare.parse::<IpAddr>() {
            Ok(ip) => Address::Socket(SocketAddr::new(ip, port)),
            Err(_) => Address::Domain(host.to_string(), port),
        }
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        match self {
            Address::Socket(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    /// Resolve to the first socket address
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            Address::Socket(addr) => Ok(*addr),
            Address::Domain(domain, port) => lookup_host((domain.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| Error::Transport(format!("no address found for {}", domain))),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Socket(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}
