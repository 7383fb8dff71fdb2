//! Error types for HTTP exchanges performed by a session agent.

use std::fmt::{Display, Formatter};

/// Why a request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The per-request timeout elapsed.
    Timeout,
    /// DNS, TCP or TLS failure before a response arrived.
    Connection,
    /// The connection broke while the body was being read.
    Io,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Timeout => "timeout",
            TransportKind::Connection => "connection",
            TransportKind::Io => "io",
        }
    }
}

/// Errors raised by the session layer.
///
/// The agent never retries; both variants surface to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Connection, timeout or abort at the HTTP layer.
    Transport { kind: TransportKind, message: String },
    /// A response arrived but is not one the caller can use.
    Protocol { status: Option<u16>, message: String },
}

impl SessionError {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the request failed because the timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            }
        )
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { kind, message } => {
                write!(f, "transport error ({}): {}", kind.as_str(), message)
            }
            Self::Protocol {
                status: Some(status),
                message,
            } => write!(f, "protocol error (status {}): {}", status, message),
            Self::Protocol {
                status: None,
                message,
            } => write!(f, "protocol error: {}", message),
        }
    }
}

impl std::error::Error for SessionError {}
