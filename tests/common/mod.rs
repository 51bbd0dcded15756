//! Shared helpers for integration tests.
//!
//! Each test binary uses a different subset.
#![allow(dead_code, reason = "each test binary uses a different subset")]

use webpush_relay::notifications::encrypt::{decrypt_aes128gcm, decrypt_aesgcm};
use webpush_relay::notifications::{codec, PushSubscription, ReceiverKeys};
use wiremock::Request;

/// A browser-side key pair and the subscription it would hand out.
pub fn subscriber(endpoint: &str) -> (ReceiverKeys, PushSubscription) {
    let receiver = ReceiverKeys::generate();
    let subscription = PushSubscription::new(endpoint, receiver.p256dh_base64url(), receiver.auth_base64url());
    (receiver, subscription)
}

/// Header value as a string.
pub fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Look up `key` in a `k1=v1;k2=v2` or `k1=v1, k2=v2` header value.
pub fn header_param(value: &str, key: &str) -> Option<String> {
    value
        .split([';', ','])
        .filter_map(|part| part.trim().split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

/// Decrypt the body of a captured push request the way a browser would.
pub fn open_payload(request: &Request, receiver: &ReceiverKeys) -> Vec<u8> {
    match header(request, "Content-Encoding").as_deref() {
        Some("aesgcm") => {
            let encryption = header(request, "Encryption").expect("Encryption header");
            let crypto_key = header(request, "Crypto-Key").expect("Crypto-Key header");
            let salt = codec::decode(&header_param(&encryption, "salt").expect("salt")).expect("salt b64");
            let dh = codec::decode(&header_param(&crypto_key, "dh").expect("dh")).expect("dh b64");
            decrypt_aesgcm(&request.body, &salt, &dh, receiver).expect("decrypt aesgcm")
        }
        Some("aes128gcm") => decrypt_aes128gcm(&request.body, receiver).expect("decrypt aes128gcm"),
        other => panic!("unexpected Content-Encoding {other:?}"),
    }
}

/// The JWT from a `vapid t=..., k=...` Authorization header.
pub fn vapid_token(request: &Request) -> String {
    let authorization = header(request, "Authorization").expect("Authorization header");
    assert!(authorization.starts_with("vapid "), "got {authorization}");
    header_param(authorization.trim_start_matches("vapid "), "t").expect("t=")
}
