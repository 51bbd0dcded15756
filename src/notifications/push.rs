//! Web push messages and the send pipeline.
//!
//! Turns a browser subscription, a payload and the application server's
//! VAPID keys into an HTTP request for the push service (RFC 8030), then
//! hands it to the [`DeliveryClient`].

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::delivery::{DeliveryClient, DeliveryResult};
use super::encrypt::{self, ContentEncoding, SubscriberKeys};
use super::vapid::{VapidKeys, VapidToken};
use crate::constants::{DEFAULT_TTL_SECS, DEFAULT_VAPID_SUBJECT};
use crate::error::PushError;

/// Longest `Topic` header a push service accepts.
const MAX_TOPIC_LEN: usize = 32;

/// A browser's push subscription, as produced by `PushSubscription.toJSON()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Encryption keys for this subscription.
    pub keys: SubscriptionKeys,
}

/// The `keys` object of a browser subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

impl PushSubscription {
    /// Build a subscription from its three string parts.
    pub fn new(endpoint: impl Into<String>, p256dh: impl Into<String>, auth: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }

    /// Structural checks only: the endpoint must be present, an http(s) URL,
    /// and not truncated by a console copy (`…`).
    ///
    /// Key material is validated when the payload is encrypted.
    pub fn validate(&self) -> Result<(), PushError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(PushError::InvalidSubscription("The subscription MUST have an endpoint".to_string()));
        }
        if endpoint.contains('…') || endpoint.contains("...") {
            return Err(PushError::InvalidSubscription(
                "The subscription endpoint appears to be truncated (it contains '...')".to_string(),
            ));
        }
        let url = Url::parse(endpoint)
            .map_err(|e| PushError::InvalidSubscription(format!("endpoint is not a URL: {e}")))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(PushError::InvalidSubscription(format!(
                "endpoint scheme must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Decode and validate the subscriber keys.
    pub fn subscriber_keys(&self) -> Result<SubscriberKeys, PushError> {
        Ok(SubscriberKeys::from_base64url(&self.keys.p256dh, &self.keys.auth)?)
    }
}

/// Endpoint reduced to its origin for log lines.
///
/// The path of a push endpoint is a bearer capability, so it never goes
/// to the log.
pub fn endpoint_for_log(endpoint: &str) -> String {
    Url::parse(endpoint)
        .map(|url| format!("{}/…", url.origin().ascii_serialization()))
        .unwrap_or_else(|_| "<invalid endpoint>".to_string())
}

/// Delivery priority hint (RFC 8030 §5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    /// On power and Wi-Fi only.
    VeryLow,
    /// On power or Wi-Fi.
    Low,
    /// Whenever the device is not in low-power mode.
    Normal,
    /// Immediately.
    High,
}

impl Urgency {
    /// Value of the `Urgency` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "very-low" => Ok(Self::VeryLow),
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(format!("unknown urgency '{other}' (expected very-low, low, normal or high)")),
        }
    }
}

/// Encrypted body of a push message.
#[derive(Clone, Debug)]
pub struct WebPushPayload {
    /// Content coding of `content`.
    pub content_encoding: ContentEncoding,
    /// `Encryption` / `Crypto-Key` values the coding needs.
    pub crypto_headers: Vec<(&'static str, String)>,
    /// Ciphertext.
    pub content: Vec<u8>,
}

/// A fully prepared push request.
#[derive(Clone, Debug)]
pub struct WebPushMessage {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Seconds the push service should keep the message for an offline client.
    pub ttl: u32,
    /// Optional delivery priority.
    pub urgency: Option<Urgency>,
    /// Optional replacement key.
    pub topic: Option<String>,
    /// Encrypted payload; `None` sends a wake-up push with no data.
    pub payload: Option<WebPushPayload>,
    /// VAPID token for the endpoint's push service.
    pub vapid: Option<VapidToken>,
}

impl WebPushMessage {
    /// All request headers, with the encryption and VAPID `Crypto-Key`
    /// values merged into one header.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("TTL", self.ttl.to_string())];

        if let Some(urgency) = self.urgency {
            headers.push(("Urgency", urgency.to_string()));
        }
        if let Some(topic) = &self.topic {
            headers.push(("Topic", topic.clone()));
        }

        let mut crypto_key = Vec::new();
        if let Some(payload) = &self.payload {
            headers.push(("Content-Encoding", payload.content_encoding.as_str().to_string()));
            headers.push(("Content-Type", "application/octet-stream".to_string()));
            for (name, value) in &payload.crypto_headers {
                if *name == "Crypto-Key" {
                    crypto_key.push(value.clone());
                } else {
                    headers.push((*name, value.clone()));
                }
            }
        }

        if let Some(vapid) = &self.vapid {
            headers.push(("Authorization", vapid.authorization()));
            // aes128gcm has no Crypto-Key header; `k=` already carries the key.
            let legacy = self
                .payload
                .as_ref()
                .is_some_and(|p| p.content_encoding == ContentEncoding::AesGcm);
            if legacy {
                crypto_key.push(vapid.crypto_key());
            }
        }

        if !crypto_key.is_empty() {
            headers.push(("Crypto-Key", crypto_key.join(";")));
        }
        headers
    }
}

/// Builder for [`WebPushMessage`].
#[derive(Debug)]
pub struct WebPushMessageBuilder<'a> {
    subscription: &'a PushSubscription,
    payload: Option<(ContentEncoding, &'a [u8])>,
    ttl: u32,
    urgency: Option<Urgency>,
    topic: Option<String>,
    vapid: Option<(&'a VapidKeys, &'a str, u32)>,
}

impl<'a> WebPushMessageBuilder<'a> {
    /// Start a message for `subscription` with the default TTL and no payload.
    pub fn new(subscription: &'a PushSubscription) -> Self {
        Self {
            subscription,
            payload: None,
            ttl: DEFAULT_TTL_SECS,
            urgency: None,
            topic: None,
            vapid: None,
        }
    }

    /// Encrypt `payload` with the given coding. An empty slice still
    /// produces an encrypted body.
    pub fn set_payload(&mut self, encoding: ContentEncoding, payload: &'a [u8]) {
        self.payload = Some((encoding, payload));
    }

    /// Message TTL in seconds; `0` means deliver now or drop.
    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    /// Delivery priority.
    pub fn set_urgency(&mut self, urgency: Urgency) {
        self.urgency = Some(urgency);
    }

    /// Replacement key: a newer message with the same topic replaces an
    /// undelivered older one.
    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = Some(topic.into());
    }

    /// Sign the message with `keys` for `subject`, valid for `expiry_secs`.
    pub fn set_vapid_signature(&mut self, keys: &'a VapidKeys, subject: &'a str, expiry_secs: u32) {
        self.vapid = Some((keys, subject, expiry_secs));
    }

    /// Validate, encrypt and sign.
    pub fn build(self) -> Result<WebPushMessage, PushError> {
        self.subscription.validate()?;
        let endpoint = self.subscription.endpoint.trim().to_string();

        if let Some(topic) = &self.topic {
            let url_safe = topic.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
            if topic.is_empty() || topic.len() > MAX_TOPIC_LEN || !url_safe {
                return Err(PushError::InvalidMessage(format!(
                    "topic must be 1-{MAX_TOPIC_LEN} URL-safe base64 characters"
                )));
            }
        }

        let payload = match self.payload {
            Some((encoding, plaintext)) => {
                let keys = self.subscription.subscriber_keys()?;
                let encrypted = encrypt::encrypt(plaintext, &keys, encoding)?;
                Some(WebPushPayload {
                    content_encoding: encoding,
                    crypto_headers: encrypted.crypto_headers(),
                    content: encrypted.body,
                })
            }
            None => None,
        };

        let vapid = match self.vapid {
            Some((keys, subject, expiry)) => Some(keys.sign_for_endpoint(&endpoint, subject, expiry)?),
            None => None,
        };

        Ok(WebPushMessage {
            endpoint,
            ttl: self.ttl,
            urgency: self.urgency,
            topic: self.topic,
            payload,
            vapid,
        })
    }
}

/// Per-send settings that do not come from the subscription.
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// VAPID `sub` claim.
    pub subject: String,
    /// Message TTL in seconds.
    pub ttl: u32,
    /// VAPID token lifetime in seconds (at most 24 hours).
    pub vapid_expiry: u32,
    /// Payload content coding.
    pub encoding: ContentEncoding,
    /// Optional delivery priority.
    pub urgency: Option<Urgency>,
    /// Optional replacement key.
    pub topic: Option<String>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            subject: DEFAULT_VAPID_SUBJECT.to_string(),
            ttl: DEFAULT_TTL_SECS,
            vapid_expiry: DEFAULT_TTL_SECS,
            encoding: ContentEncoding::default(),
            urgency: None,
            topic: None,
        }
    }
}

/// Encrypt, sign and deliver one notification.
///
/// Local problems (bad subscription, keys or payload size) come back as
/// `Err` and are never worth retrying. Anything the push service or the
/// network decided comes back as `Ok(DeliveryResult)`; the caller owns the
/// retry policy.
pub async fn send_notification(
    client: &DeliveryClient,
    subscription: &PushSubscription,
    payload: Option<&[u8]>,
    keys: &VapidKeys,
    options: &SendOptions,
) -> Result<DeliveryResult, PushError> {
    let mut builder = WebPushMessageBuilder::new(subscription);
    if let Some(payload) = payload {
        builder.set_payload(options.encoding, payload);
    }
    builder.set_ttl(options.ttl);
    if let Some(urgency) = options.urgency {
        builder.set_urgency(urgency);
    }
    if let Some(topic) = &options.topic {
        builder.set_topic(topic.clone());
    }
    builder.set_vapid_signature(keys, &options.subject, options.vapid_expiry);

    let message = builder.build()?;
    Ok(client.deliver(&message).await)
}
