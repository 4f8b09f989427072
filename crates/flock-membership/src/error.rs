//! Error types for the membership coordinator.
//!
//! Membership operations themselves never fail: unknown members, stale
//! timers and absent delegates are ordinary outcomes. Errors only arise
//! while loading configuration and managing the coalescer's lifecycle.

use thiserror::Error;

/// Result type alias for membership setup and lifecycle operations.
pub type MembershipResult<T> = Result<T, MembershipError>;

/// Errors that can occur while configuring or running the coordinator.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no tokio runtime available to run the coalescer")]
    NoRuntime,

    #[error("coalescer task failed: {0}")]
    Join(String),
}
