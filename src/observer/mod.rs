//! Per-account observers and their supervisor.
//!
//! Each configured account gets a polling worker that logs in through the
//! site's SSO form and then watches connected services and paid
//! subscriptions. The supervisor restarts failed workers with linear backoff
//! and abandons accounts that keep failing.

pub mod auth;
pub mod checks;
pub mod envelope;
pub mod errors;
pub mod extract;
pub mod failure;
pub mod supervisor;
pub mod types;
pub mod worker;

#[cfg(test)]
pub mod testing;

pub use extract::SiteMarkup;
pub use supervisor::{SupervisorArgs, SupervisorHandle};
