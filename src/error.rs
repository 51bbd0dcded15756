//! Error types for the push send path.
//!
//! Each stage has its own error so callers can tell local input problems
//! (never worth retrying) from delivery outcomes (sometimes worth retrying).

use std::fmt;

use thiserror::Error;

/// Malformed base64url input.
#[derive(Error, Debug)]
#[error("invalid base64url input: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// VAPID key, claim or token failures.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid VAPID key: {0}")]
    InvalidKey(String),
    #[error("VAPID public key does not match private key")]
    KeyMismatch,
    #[error("Invalid VAPID subject (expected mailto: or https: URI): {0}")]
    InvalidSubject(String),
    #[error("Cannot derive VAPID audience from endpoint: {0}")]
    InvalidAudience(String),
    #[error("VAPID expiry must be between 1 and {max} seconds, got {got}")]
    InvalidExpiry { got: u32, max: u32 },
    #[error("Malformed VAPID token: {0}")]
    MalformedToken(String),
    #[error("VAPID token signature does not verify")]
    BadSignature,
    #[error("VAPID token expired at {exp}")]
    Expired { exp: i64 },
    #[error("Failed to serialize VAPID token: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Payload encryption or decryption failures.
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Invalid subscriber p256dh key: {0}")]
    InvalidPublicKey(String),
    #[error("Subscriber auth secret must be 16 bytes, got {0}")]
    InvalidAuthSecret(usize),
    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Encryption failed: {0}")]
    Cipher(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// How a failed delivery should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 404/410: the subscription no longer exists. Discard it.
    Gone,
    /// 429: the push service is rate limiting. Retry with backoff.
    Throttled,
    /// 5xx, timeouts and connection failures. Retry with backoff.
    Transient,
    /// Any other non-2xx, e.g. 400 or 403 for a bad VAPID audience.
    Rejected,
}

impl FailureKind {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => Self::Gone,
            429 => Self::Throttled,
            500..=599 => Self::Transient,
            _ => Self::Rejected,
        }
    }

    /// Whether retrying the same message later can succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Throttled | Self::Transient)
    }

    /// Whether the caller should drop the subscription.
    pub fn discards_subscription(self) -> bool {
        self == Self::Gone
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gone => write!(f, "gone"),
            Self::Throttled => write!(f, "throttled"),
            Self::Transient => write!(f, "transient"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A delivery that did not succeed.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    /// Classification of the failure.
    pub kind: FailureKind,
    /// Push service status, absent for transport failures.
    pub status_code: Option<u16>,
    /// Push service response body or transport error description.
    pub message: String,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Web push delivery {}", self.kind)?;
        if let Some(status) = self.status_code {
            write!(f, " (HTTP {status})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for DeliveryError {}

/// Any failure on the send path.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Invalid push subscription: {0}")]
    InvalidSubscription(String),
    #[error("Invalid push message: {0}")]
    InvalidMessage(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
