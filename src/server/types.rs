//! Request/Response types for the relay endpoint.

use serde::{Deserialize, Serialize};

use crate::notifications::{ApplicationKeys, PushSubscription};

/// Body of `POST /api/send-push-msg`.
#[derive(Debug, Deserialize)]
pub struct SendPushRequest {
    /// Browser subscription to push to.
    pub subscription: PushSubscription,
    /// Text payload; absent or empty sends a push without data.
    #[serde(default)]
    pub data: Option<String>,
    /// Application server key pair used for VAPID.
    #[serde(rename = "applicationKeys")]
    pub application_keys: ApplicationKeys,
}

/// Body returned when the push service accepted the message.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendPushResponse {
    /// Always `true`.
    pub success: bool,
}
