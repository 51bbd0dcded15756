//! HTTP delivery to push services.
//!
//! One attempt per call. The client classifies the outcome and reports any
//! `Retry-After` hint; retrying is up to the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::RETRY_AFTER;

use super::push::{endpoint_for_log, WebPushMessage};
use crate::constants::MAX_RESPONSE_BODY_LEN;
use crate::error::{DeliveryError, FailureKind, PushError};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Whether the push service accepted the message (any 2xx).
    pub success: bool,
    /// Push service status, absent when no response arrived.
    pub status_code: Option<u16>,
    /// Response body, or the transport error description.
    pub message: String,
    /// Failure classification; `None` on success.
    pub failure: Option<FailureKind>,
    /// Parsed `Retry-After` header (delta-seconds form only).
    pub retry_after: Option<Duration>,
}

impl DeliveryResult {
    /// A result with no response from the push service.
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            message: message.into(),
            failure: Some(FailureKind::Transient),
            retry_after: None,
        }
    }

    /// Convert a failed result into a [`DeliveryError`].
    pub fn into_result(self) -> Result<Self, DeliveryError> {
        match self.failure {
            None => Ok(self),
            Some(kind) => Err(DeliveryError {
                kind,
                status_code: self.status_code,
                message: self.message,
            }),
        }
    }
}

/// Map a push service response to a [`DeliveryResult`].
pub fn classify(status: u16, body: String, retry_after: Option<Duration>) -> DeliveryResult {
    let success = (200..300).contains(&status);
    DeliveryResult {
        success,
        status_code: Some(status),
        message: body,
        failure: (!success).then(|| FailureKind::from_status(status)),
        retry_after,
    }
}

/// Parse a `Retry-After` value given as delta-seconds.
///
/// HTTP-date values are ignored; the caller falls back to its own backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

type EndpointLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Sends prepared [`WebPushMessage`]s.
///
/// Cheap to clone; clones share the connection pool and the per-endpoint
/// ordering. Deliveries to the same endpoint run one at a time so a later
/// message never overtakes an earlier one on this client.
#[derive(Clone, Debug)]
pub struct DeliveryClient {
    client: reqwest::Client,
    timeout: Duration,
    endpoint_locks: EndpointLocks,
}

impl DeliveryClient {
    /// Create a client with its own connection pool.
    pub fn new(timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("webpush-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PushError::Client(e.to_string()))?;
        Ok(Self::with_client(client, timeout))
    }

    /// Create a client over an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            endpoint_locks: Arc::default(),
        }
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deliver one message. Never fails: every outcome is a [`DeliveryResult`].
    pub async fn deliver(&self, message: &WebPushMessage) -> DeliveryResult {
        let slot = EndpointSlot::acquire(&self.endpoint_locks, &message.endpoint);
        let _ordered = slot.lock.lock().await;

        let result = self.send(message).await;

        let target = endpoint_for_log(&message.endpoint);
        match (result.failure, result.status_code) {
            (None, Some(status)) => log::info!("[WebPush] Delivered to {} (HTTP {})", target, status),
            (Some(FailureKind::Gone), Some(status)) => {
                log::info!("[WebPush] Subscription gone (HTTP {}) for {}", status, target);
            }
            (Some(FailureKind::Throttled), _) => log::warn!(
                "[WebPush] Rate limited by {} (retry after {:?})",
                target,
                result.retry_after
            ),
            (Some(kind), Some(status)) => log::warn!(
                "[WebPush] Delivery {} for {} (HTTP {}): {}",
                kind,
                target,
                status,
                preview(&result.message)
            ),
            (Some(kind), None) => log::warn!("[WebPush] Delivery {} for {}: {}", kind, target, result.message),
            (None, None) => {}
        }
        result
    }

    async fn send(&self, message: &WebPushMessage) -> DeliveryResult {
        let mut request = self.client.post(&message.endpoint).timeout(self.timeout);
        for (name, value) in message.headers() {
            request = request.header(name, value);
        }
        let body = message
            .payload
            .as_ref()
            .map(|payload| payload.content.clone())
            .unwrap_or_default();
        request = request.body(body);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return DeliveryResult::transport_failure(format!(
                    "Request timed out after {}s",
                    self.timeout.as_secs_f32()
                ));
            }
            Err(e) => return DeliveryResult::transport_failure(format!("Request failed: {e}")),
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        classify(status, body, retry_after)
    }
}

/// Holds one endpoint's ordering lock and removes it from the shared map
/// once no other delivery is waiting on it.
struct EndpointSlot {
    locks: EndpointLocks,
    endpoint: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl EndpointSlot {
    fn acquire(locks: &EndpointLocks, endpoint: &str) -> Self {
        let lock = {
            let mut map = locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(endpoint.to_string()).or_default())
        };
        Self {
            locks: Arc::clone(locks),
            endpoint: endpoint.to_string(),
            lock,
        }
    }
}

impl Drop for EndpointSlot {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus this slot: nobody else is queued.
        if map
            .get(&self.endpoint)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            map.remove(&self.endpoint);
        }
    }
}

fn preview(body: &str) -> String {
    if body.len() <= MAX_RESPONSE_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_RESPONSE_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        for status in [200, 201, 202] {
            let result = classify(status, String::new(), None);
            assert!(result.success);
            assert_eq!(result.status_code, Some(status));
            assert_eq!(result.failure, None);
        }
    }

    #[test]
    fn test_classify_failures() {
        let gone = classify(410, "expired".to_string(), None);
        assert!(!gone.success);
        assert_eq!(gone.failure, Some(FailureKind::Gone));
        assert_eq!(gone.message, "expired");

        let throttled = classify(429, String::new(), Some(Duration::from_secs(30)));
        assert_eq!(throttled.failure, Some(FailureKind::Throttled));
        assert_eq!(throttled.retry_after, Some(Duration::from_secs(30)));

        assert_eq!(classify(502, String::new(), None).failure, Some(FailureKind::Transient));
        assert_eq!(classify(403, String::new(), None).failure, Some(FailureKind::Rejected));
    }

    #[test]
    fn test_into_result() {
        assert!(classify(201, String::new(), None).into_result().is_ok());

        let err = classify(400, "bad jwt".to_string(), None)
            .into_result()
            .expect_err("400 is a failure");
        assert_eq!(err.kind, FailureKind::Rejected);
        assert_eq!(err.status_code, Some(400));
        assert_eq!(err.message, "bad jwt");

        let err = DeliveryResult::transport_failure("connection refused")
            .into_result()
            .expect_err("transport failure");
        assert_eq!(err.kind, FailureKind::Transient);
        assert_eq!(err.status_code, None);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let short = "short body";
        assert_eq!(preview(short), short);

        let long = "é".repeat(MAX_RESPONSE_BODY_LEN);
        let cut = preview(&long);
        assert!(cut.ends_with('…'));
        assert!(cut.len() <= MAX_RESPONSE_BODY_LEN + '…'.len_utf8());
    }

    #[test]
    fn test_endpoint_slot_cleans_up() {
        let locks = EndpointLocks::default();
        {
            let first = EndpointSlot::acquire(&locks, "https://push.example.com/a");
            let second = EndpointSlot::acquire(&locks, "https://push.example.com/a");
            assert!(Arc::ptr_eq(&first.lock, &second.lock));
            drop(first);
            assert_eq!(locks.lock().expect("lock").len(), 1, "second slot still queued");
        }
        assert!(locks.lock().expect("lock").is_empty());
    }
}
