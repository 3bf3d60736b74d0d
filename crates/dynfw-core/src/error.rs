//! Error types for dynfw
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for dynfw operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which component an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Public IP resolution
    Resolution,
    /// Firewall rule fetch/update
    Firewall,
    /// State file read/write
    Storage,
    /// Startup and configuration
    Startup,
}

/// Core error type for dynfw
#[derive(Error, Debug)]
pub enum Error {
    /// The IP-echo service could not be reached or answered with a non-success status
    #[error("IP provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The IP-echo service answered with a body we could not use
    #[error("Malformed IP provider response: {0}")]
    MalformedResponse(String),

    /// The named firewall rule does not exist
    #[error("Firewall rule not found: {0}")]
    RuleNotFound(String),

    /// Authentication or authorization against the firewall API failed
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The firewall API refused or failed the update
    #[error("Update rejected: {0}")]
    UpdateRejected(String),

    /// State file read/write/parse faults
    #[error("State store error: {0}")]
    StateStore(String),

    /// Credential loading or token exchange failed
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a provider-unavailable error
    pub fn provider_unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    /// Create a malformed-response error
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a rule-not-found error
    pub fn rule_not_found(msg: impl Into<String>) -> Self {
        Self::RuleNotFound(msg.into())
    }

    /// Create a permission-denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an update-rejected error
    pub fn update_rejected(msg: impl Into<String>) -> Self {
        Self::UpdateRejected(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a credentials error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The component family this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable(_) | Self::MalformedResponse(_) => ErrorKind::Resolution,
            Self::RuleNotFound(_) | Self::PermissionDenied(_) | Self::UpdateRejected(_) => {
                ErrorKind::Firewall
            }
            Self::StateStore(_) => ErrorKind::Storage,
            Self::Credentials(_) | Self::Config(_) => ErrorKind::Startup,
        }
    }
}
