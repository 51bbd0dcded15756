//! Application-wide constants for webpush-relay.
//!
//! This module centralizes protocol sizes, timeouts and defaults so the
//! crypto, delivery and relay layers agree on them.
//!
//! # Categories
//!
//! - **Keys**: P-256 and auth secret sizes
//! - **Encryption**: record framing limits
//! - **VAPID**: token lifetime bounds
//! - **Delivery**: HTTP timeouts and retry backoff
//! - **Relay**: server defaults

use std::time::Duration;

// ============================================================================
// Keys
// ============================================================================

/// Length of an uncompressed SEC1 P-256 point (`0x04 || x || y`).
pub const UNCOMPRESSED_POINT_LEN: usize = 65;

/// Length of a raw P-256 private scalar.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length of the subscription auth secret.
pub const AUTH_SECRET_LEN: usize = 16;

// ============================================================================
// Encryption
// ============================================================================

/// Length of the per-message HKDF salt.
pub const SALT_LEN: usize = 16;

/// Record size used for both content encodings.
///
/// Push services accept at most 4096 bytes of encrypted body, so every
/// message fits in a single record of this size.
pub const RECORD_SIZE: usize = 4096;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Largest encrypted body a push service is required to accept.
pub const MAX_ENCRYPTED_PAYLOAD: usize = 4096;

// ============================================================================
// VAPID
// ============================================================================

/// Default VAPID token lifetime and push message TTL (1 hour).
pub const DEFAULT_TTL_SECS: u32 = 60 * 60;

/// Upper bound on VAPID token lifetime (24 hours, RFC 8292 §2).
pub const MAX_VAPID_EXPIRY_SECS: u32 = 24 * 60 * 60;

/// Subject claim used when none is configured.
pub const DEFAULT_VAPID_SUBJECT: &str = "https://developers.google.com/web/fundamentals/";

// ============================================================================
// Delivery
// ============================================================================

/// Per-attempt timeout for requests to a push service.
///
/// 10 seconds keeps a stalled push service from holding a relay request
/// open while still allowing for slow TLS handshakes.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// First delay between retries of a transient or throttled delivery.
pub const RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for the exponential retry backoff.
pub const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Longest push service response body written to the log.
pub const MAX_RESPONSE_BODY_LEN: usize = 2048;

// ============================================================================
// Relay
// ============================================================================

/// Default listen address for the relay server.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Route the browser page posts to.
pub const SEND_PUSH_ROUTE: &str = "/api/send-push-msg";
