//! Error types for flagpole.
//!
//! Every error a refresh cycle can produce is "soft": the scheduler logs it,
//! abandons the cycle, and leaves the installed snapshot untouched. Nothing
//! here ever reaches the read path, which cannot fail.

use thiserror::Error;

/// Result type alias using `FlagError`.
pub type Result<T> = std::result::Result<T, FlagError>;

/// Main error type for flagpole operations.
#[derive(Debug, Error)]
pub enum FlagError {
    // ═══════════════════════════════════════════════════════════════════════════
    // NETWORK ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transport-level failure (connection refused, timeout, TLS error).
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("Unexpected status {status} from feature-flag endpoint")]
    UnexpectedStatus {
        /// The HTTP status code received.
        status: u16,
    },

    /// The authenticator collaborator could not produce request headers.
    #[error("Authentication failed: {0}")]
    Auth(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // DECODE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The response body did not match the expected payload shape.
    #[error("Malformed feature-flag payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FlagError {
    /// Returns true if this error may clear on a later cycle without any
    /// configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FlagError::Transport(_) | FlagError::UnexpectedStatus { .. } | FlagError::Auth(_)
        )
    }
}
