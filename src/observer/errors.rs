//! Error types for authentication and polling.

use crate::session::errors::{SessionError, TransportKind};
use std::fmt::{Display, Formatter};

/// A piece of page markup the login ceremony depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMarker {
    /// `window.__PRELOADED_STATE__` blob carrying the site id.
    PreloadedState,
    /// `<meta name="_csrf">` tag on the login form.
    CsrfToken,
    /// `error-text` div on a failed login page.
    ErrorText,
}

impl PageMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageMarker::PreloadedState => "preloaded state",
            PageMarker::CsrfToken => "csrf token",
            PageMarker::ErrorText => "error text",
        }
    }
}

/// Errors raised inside a worker's authentication or polling path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The request never produced a response.
    Transport { kind: TransportKind, message: String },
    /// Non-200 xhr response or an unusable redirect.
    Protocol { status: Option<u16>, message: String },
    /// Expected markup absent from an HTML page.
    Extraction(PageMarker),
    /// The login ceremony did not end on the success URL.
    Auth { message: String },
    /// The API envelope reported `status: "ERROR"`.
    Remote { message: String },
    /// The API body was not the expected JSON.
    Decode { message: String },
    /// The worker actor panicked or could not be spawned.
    Crashed { message: String },
}

impl ObserverError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Short label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Protocol { .. } => "protocol",
            Self::Extraction(_) => "extraction",
            Self::Auth { .. } => "auth",
            Self::Remote { .. } => "remote",
            Self::Decode { .. } => "decode",
            Self::Crashed { .. } => "crashed",
        }
    }
}

impl Display for ObserverError {
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
            Self::Extraction(marker) => write!(f, "no {} found in page", marker.as_str()),
            Self::Auth { message } => write!(f, "login failed: {}", message),
            Self::Remote { message } => write!(f, "remote error: {}", message),
            Self::Decode { message } => write!(f, "malformed response: {}", message),
            Self::Crashed { message } => write!(f, "worker crashed: {}", message),
        }
    }
}

impl std::error::Error for ObserverError {}

impl From<SessionError> for ObserverError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Transport { kind, message } => Self::Transport { kind, message },
            SessionError::Protocol { status, message } => Self::Protocol { status, message },
        }
    }
}
