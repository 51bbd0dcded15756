//! Web push send path.
//!
//! Everything an application server needs to push a message to a browser
//! subscription: key handling, VAPID signing, payload encryption and
//! delivery to the push service.
//!
//! # Architecture
//!
//! ```text
//! PushSubscription + payload + VapidKeys
//!     ↓
//! encrypt: ECDH + HKDF + AES-128-GCM (aesgcm or aes128gcm)
//!     ↓
//! vapid: ES256 JWT for the endpoint's origin
//!     ↓
//! WebPushMessage (TTL, Encryption, Crypto-Key, Authorization, body)
//!     ↓
//! DeliveryClient POSTs to the push service and classifies the answer
//! ```
//!
//! # Keys
//!
//! Key material crosses every boundary as unpadded base64url ([`codec`]).
//! Application server keys are a raw 65-byte uncompressed P-256 point and
//! a raw 32-byte scalar. Subscriber keys come from the browser's
//! `PushSubscription.toJSON()`.
//!
//! # Retries
//!
//! Nothing in this module retries. [`DeliveryResult`] carries a
//! [`FailureKind`](crate::error::FailureKind) and any `Retry-After` hint so
//! the caller can decide.

pub mod codec;
pub mod delivery;
pub mod encrypt;
pub mod push;
pub mod vapid;

#[doc(inline)]
pub use delivery::{DeliveryClient, DeliveryResult};
#[doc(inline)]
pub use encrypt::{ContentEncoding, EncryptedPayload, ReceiverKeys, SubscriberKeys};
#[doc(inline)]
pub use push::{send_notification, PushSubscription, SendOptions, Urgency, WebPushMessage, WebPushMessageBuilder};
#[doc(inline)]
pub use vapid::{ApplicationKeys, VapidKeys, VapidToken};
