//! Session state: one authenticated client pinned to its origin IP.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid request origin: {0}")]
    InvalidOrigin(String),
    #[error("origin IP and request IP mismatch")]
    OriginMismatch,
}

/// Represents one authenticated client binding.
///
/// The origin is fixed at creation. The id may only be re-rolled by the
/// registry before the session is published.
#[derive(Debug)]
pub struct Session {
    /// Opaque session token handed to the client
    id: String,
    /// Bare IP of the client that created the session
    origin_ip: IpAddr,
    /// When the session was created
    created_at: Instant,
}

impl Session {
    /// Create a session bound to the IP part of `origin_address`.
    pub fn create(origin_address: &str) -> Result<Self, SessionError> {
        let origin_ip = parse_origin(origin_address)?;
        Ok(Self {
            id: new_session_id(),
            origin_ip,
            created_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin_ip(&self) -> IpAddr {
        self.origin_ip
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Check that `candidate_address` resolves to the bound origin IP.
    pub fn validate_origin(&self, candidate_address: &str) -> Result<(), SessionError> {
        let candidate = parse_origin(candidate_address)?;
        if candidate != self.origin_ip {
            return Err(SessionError::OriginMismatch);
        }
        Ok(())
    }

    pub(crate) fn reroll_id(&mut self) {
        self.id = new_session_id();
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reduce a transport address (`ip:port`, `[v6]:port` or a bare IP) to its IP.
///
/// IPv4-mapped IPv6 addresses are folded to plain IPv4 so a dual-stack
/// listener reports the same origin either way.
pub fn parse_origin(address: &str) -> Result<IpAddr, SessionError> {
    let trimmed = address.trim();
    let ip = if let Ok(socket) = trimmed.parse::<SocketAddr>() {
        socket.ip()
    } else if let Ok(ip) = trimmed.parse::<IpAddr>() {
        ip
    } else {
        return Err(SessionError::InvalidOrigin(address.to_string()));
    };
    Ok(ip.to_canonical())
}
