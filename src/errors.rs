//! Keygate error types.

use thiserror::Error;

/// How an IP mismatch on a pending link is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchSeverity {
    /// Seen on the provider callback. The pending link is kept so a retry
    /// from the requesting IP can still complete it.
    Retryable,

    /// Seen on redemption. The pending link has been deleted and the client
    /// must restart the whole flow.
    Destructive,
}

/// Errors produced by the issuance flow, the validation engine and the stores.
#[derive(Debug, Error)]
pub enum KeygateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No pending link exists for the given id (never created, redeemed, or swept).
    #[error("Pending link not found")]
    NotFound,

    /// Pending link is older than the pending TTL.
    #[error("Pending link expired")]
    Expired,

    /// Redemption attempted before the provider callback completed the link.
    #[error("Pending link not completed")]
    NotCompleted,

    /// Caller IP differs from the IP that requested the pending link.
    #[error("IP mismatch ({severity:?})")]
    IpMismatch {
        /// Whether the link survived the mismatch.
        severity: MismatchSeverity,
    },

    /// Submitted license key does not exist.
    #[error("Invalid key")]
    InvalidKey,

    /// License key is past its expiry.
    #[error("Key has expired")]
    KeyExpired,

    /// License key has been revoked.
    #[error("Key has been revoked")]
    KeyRevoked,

    /// License key is locked to another IP address.
    #[error("Key is locked to a different IP address")]
    IpLockMismatch,

    /// License key is locked to another hardware id.
    #[error("Key is locked to a different hardware ID")]
    HwidLockMismatch,

    /// Secure random source unavailable. Never recovered from.
    #[error("Token generator failure: {0}")]
    GeneratorFailure(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed or out-of-range request input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl KeygateError {
    /// Whether redemption treated this as a bypass attempt.
    pub fn is_bypass_attempt(&self) -> bool {
        matches!(
            self,
            KeygateError::IpMismatch {
                severity: MismatchSeverity::Destructive
            }
        )
    }

    /// Whether this is a key validation rejection (as opposed to a system failure).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            KeygateError::InvalidKey
                | KeygateError::KeyExpired
                | KeygateError::KeyRevoked
                | KeygateError::IpLockMismatch
                | KeygateError::HwidLockMismatch
        )
    }

    /// Machine-readable code carried by the callback error redirect.
    pub fn callback_code(&self) -> &'static str {
        match self {
            KeygateError::NotFound | KeygateError::Expired => "expired_link",
            KeygateError::IpMismatch { .. } => "ip_mismatch",
            KeygateError::InvalidRequest(_) => "invalid_callback",
            _ => "callback_failed",
        }
    }

    /// Low-detail message shown to clients.
    ///
    /// Lock mismatches share one message so a prober cannot tell which lock failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            KeygateError::NotFound => {
                "Invalid or expired link. Please start over to avoid bypass attempts."
            }
            KeygateError::Expired => "Link expired. Please generate a new one.",
            KeygateError::NotCompleted => {
                "Task not completed. Please complete the task first."
            }
            KeygateError::IpMismatch {
                severity: MismatchSeverity::Destructive,
            } => "IP mismatch detected. Bypass attempt prevented. Please start over.",
            KeygateError::IpMismatch {
                severity: MismatchSeverity::Retryable,
            } => "IP mismatch. Please complete the task from the same network.",
            KeygateError::InvalidKey => "Invalid key",
            KeygateError::KeyExpired => "Key has expired",
            KeygateError::KeyRevoked => "Key has been revoked",
            KeygateError::IpLockMismatch | KeygateError::HwidLockMismatch => {
                "Key is locked to a different device"
            }
            KeygateError::InvalidRequest(_) => "Invalid request",
            KeygateError::ConfigError(_)
            | KeygateError::GeneratorFailure(_)
            | KeygateError::Storage(_) => "Internal error",
        }
    }
}

/// Result type for keygate operations.
pub type KeygateResult<T> = Result<T, KeygateError>;
