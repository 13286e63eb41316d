// ── Error types ──
//
// Everything a caller of the stove client can observe. Malformed reply
// content is not an error: the frame codec reads it as zero.

use std::time::Duration;

use thiserror::Error;

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Command,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Connect => "connect",
            Phase::Command => "command",
        })
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// DNS failure, refused connection, failed handshake or a socket error
    /// mid-session.
    #[error("connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("{phase} timed out after {}ms", .after.as_millis())]
    Timeout { phase: Phase, after: Duration },

    #[error("write to relay failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("client disconnected")]
    Disconnected,

    #[error("command queue full ({capacity} pending)")]
    QueueFull { capacity: usize },
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
