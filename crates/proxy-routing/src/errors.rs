//! Error types for the proxy-routing library
//!
//! Only administrative and configuration paths produce errors. Running out of
//! next hops while routing is a normal outcome and is reported as `None` by
//! [`SelectionContext::next`](crate::context::SelectionContext::next).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Server group not found: {0}")]
    ServerGroupNotFound(String),

    #[error("Server group {0} already exists")]
    DuplicateServerGroup(String),

    #[error("Element {element} already exists in server group {group}")]
    DuplicateElement { group: String, element: String },

    #[error("Circular reference: {0}")]
    CircularReference(String),

    #[error("Invalid element: {0}")]
    InvalidElement(String),

    #[error("Unknown load balancing policy: {0}")]
    UnknownPolicy(String),

    #[error("Invalid failover code: {0}")]
    InvalidFailoverCode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for RoutingError {
    fn from(err: toml::de::Error) -> Self {
        RoutingError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Failure reported by an [`AvailabilityProvider`](crate::availability::AvailabilityProvider).
///
/// The selection engine never propagates this; it treats the element as
/// unavailable and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("availability lookup failed for {element}: {reason}")]
pub struct AvailabilityError {
    pub element: String,
    pub reason: String,
}

impl AvailabilityError {
    pub fn new(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            reason: reason.into(),
        }
    }
}
