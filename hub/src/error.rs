//! Errors surfaced by the hub handle

use thiserror::Error;

/// The only failure a caller of [`crate::HubHandle`] can observe.
///
/// Transport and protocol problems never surface here; they are logged and
/// show up as state changes (a device disappearing from the registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Hub has shut down")]
    Closed,
}
