//! Browser-like HTTP sessions.
//!
//! This module provides the stateful client used to talk to the remote site:
//! - A cookie jar keyed by cookie name
//! - A session agent that tracks referer and host across navigations
//! - A transport seam so exchanges can be scripted in tests

pub mod agent;
pub mod cookies;
pub mod errors;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use agent::SessionAgent;
pub use transport::{Transport, UreqTransport};
