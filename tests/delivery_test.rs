//! Integration tests for the send path against a stub push service.

mod common;

use std::time::{Duration, Instant};

use common::{header, header_param, open_payload, subscriber, vapid_token};
use webpush_relay::commands::send_with_retries;
use webpush_relay::notifications::{
    send_notification, vapid, ContentEncoding, DeliveryClient, PushSubscription, SendOptions, VapidKeys,
};
use webpush_relay::{FailureKind, PushError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUSH_PATH: &str = "/wpush/v2/subscription-token";

fn client() -> DeliveryClient {
    DeliveryClient::new(Duration::from_secs(5)).expect("client")
}

fn options() -> SendOptions {
    SendOptions {
        subject: "mailto:ops@example.com".to_string(),
        ..SendOptions::default()
    }
}

async fn stub(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_hello_is_delivered_encrypted_and_signed() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(201)).await;

    let (receiver, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let keys = VapidKeys::generate();

    let result = send_notification(&client(), &subscription, Some(b"hello"), &keys, &options())
        .await
        .expect("send");
    assert!(result.success);
    assert_eq!(result.status_code, Some(201));
    assert_eq!(result.failure, None);

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(header(request, "TTL").as_deref(), Some("3600"));
    assert_eq!(header(request, "Content-Encoding").as_deref(), Some("aesgcm"));

    let authorization = header(request, "Authorization").expect("Authorization");
    assert_eq!(
        header_param(authorization.trim_start_matches("vapid "), "k"),
        Some(keys.public_key_base64url())
    );
    let claims = vapid::verify(&vapid_token(request), keys.public_key_bytes()).expect("token verifies");
    assert_eq!(claims.aud, server.uri());
    assert_eq!(claims.sub, "mailto:ops@example.com");

    let crypto_key = header(request, "Crypto-Key").expect("Crypto-Key");
    assert_eq!(header_param(&crypto_key, "p256ecdsa"), Some(keys.public_key_base64url()));

    assert_eq!(open_payload(request, &receiver), b"hello");
}

#[tokio::test]
async fn test_aes128gcm_body_is_self_describing() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(201)).await;

    let (receiver, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let keys = VapidKeys::generate();
    let options = SendOptions {
        encoding: ContentEncoding::Aes128Gcm,
        ..options()
    };

    let result = send_notification(&client(), &subscription, Some(b"hello"), &keys, &options)
        .await
        .expect("send");
    assert!(result.success);

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    assert_eq!(header(request, "Content-Encoding").as_deref(), Some("aes128gcm"));
    assert_eq!(header(request, "Encryption"), None);
    assert_eq!(header(request, "Crypto-Key"), None);
    assert_eq!(open_payload(request, &receiver), b"hello");
}

#[tokio::test]
async fn test_push_without_payload_has_empty_body() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(201)).await;

    let subscription = PushSubscription::new(format!("{}{}", server.uri(), PUSH_PATH), "", "");
    let keys = VapidKeys::generate();

    let result = send_notification(&client(), &subscription, None, &keys, &options())
        .await
        .expect("send");
    assert!(result.success);

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    assert!(request.body.is_empty());
    assert_eq!(header(request, "Content-Encoding"), None);
    assert!(header(request, "Authorization").is_some());
}

#[tokio::test]
async fn test_gone_subscription() {
    for status in [404, 410] {
        let server = MockServer::start().await;
        stub(
            &server,
            ResponseTemplate::new(status).set_body_string("push subscription has unsubscribed or expired."),
        )
        .await;

        let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
        let result = send_notification(&client(), &subscription, Some(b"hi"), &VapidKeys::generate(), &options())
            .await
            .expect("send");

        assert!(!result.success);
        assert_eq!(result.status_code, Some(status));
        assert_eq!(result.failure, Some(FailureKind::Gone));
        assert_eq!(result.message, "push subscription has unsubscribed or expired.");
    }
}

#[tokio::test]
async fn test_throttled_reports_retry_after() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(429).insert_header("Retry-After", "120")).await;

    let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let result = send_notification(&client(), &subscription, Some(b"hi"), &VapidKeys::generate(), &options())
        .await
        .expect("send");

    assert_eq!(result.failure, Some(FailureKind::Throttled));
    assert_eq!(result.retry_after, Some(Duration::from_secs(120)));
}

#[tokio::test]
async fn test_server_error_is_transient_and_client_error_rejected() {
    for (status, expected) in [(500, FailureKind::Transient), (503, FailureKind::Transient), (403, FailureKind::Rejected)] {
        let server = MockServer::start().await;
        stub(&server, ResponseTemplate::new(status).set_body_string("nope")).await;

        let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
        let result = send_notification(&client(), &subscription, Some(b"hi"), &VapidKeys::generate(), &options())
            .await
            .expect("send");

        assert_eq!(result.failure, Some(expected), "HTTP {status}");
        assert_eq!(result.message, "nope");
    }
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(201).set_delay(Duration::from_secs(3))).await;

    let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let client = DeliveryClient::new(Duration::from_millis(200)).expect("client");
    let result = send_notification(&client, &subscription, Some(b"hi"), &VapidKeys::generate(), &options())
        .await
        .expect("send");

    assert!(!result.success);
    assert_eq!(result.status_code, None);
    assert_eq!(result.failure, Some(FailureKind::Transient));
    assert!(result.message.contains("timed out"), "got {}", result.message);
}

#[tokio::test]
async fn test_connection_failure_is_transient() {
    let (_, subscription) = subscriber("http://127.0.0.1:1/wpush/unreachable");
    let result = send_notification(&client(), &subscription, Some(b"hi"), &VapidKeys::generate(), &options())
        .await
        .expect("send");

    assert_eq!(result.status_code, None);
    assert_eq!(result.failure, Some(FailureKind::Transient));
}

#[tokio::test]
async fn test_local_errors_never_reach_the_push_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    let keys = VapidKeys::generate();

    let (_, truncated) = subscriber(&format!("{}/wpush/abc…", server.uri()));
    let err = send_notification(&client(), &truncated, Some(b"hi"), &keys, &options())
        .await
        .expect_err("truncated endpoint");
    assert!(matches!(err, PushError::InvalidSubscription(_)));

    let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let too_big = vec![b'x'; ContentEncoding::AesGcm.max_plaintext_len() + 1];
    let err = send_notification(&client(), &subscription, Some(&too_big), &keys, &options())
        .await
        .expect_err("oversized payload");
    assert!(matches!(err, PushError::Encryption(_)));

    let bad_subject = SendOptions {
        subject: "ops@example.com".to_string(),
        ..options()
    };
    let err = send_notification(&client(), &subscription, Some(b"hi"), &keys, &bad_subject)
        .await
        .expect_err("subject without scheme");
    assert!(matches!(err, PushError::Signing(_)));
}

#[tokio::test]
async fn test_same_endpoint_deliveries_are_serialized() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(201).set_delay(Duration::from_millis(300))).await;

    let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let keys = VapidKeys::generate();
    let client = client();
    let options = options();

    let started = Instant::now();
    let (first, second) = tokio::join!(
        send_notification(&client, &subscription, Some(b"one"), &keys, &options),
        send_notification(&client, &subscription, Some(b"two"), &keys, &options),
    );
    assert!(first.expect("first").success);
    assert!(second.expect("second").success);
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    stub(&server, ResponseTemplate::new(201)).await;

    let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let result = send_with_retries(&client(), &subscription, Some(b"hi"), &VapidKeys::generate(), &options(), 2)
        .await
        .expect("send");

    assert!(result.success);
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_rejected_is_not_retried() {
    let server = MockServer::start().await;
    stub(&server, ResponseTemplate::new(400).set_body_string("bad jwt")).await;

    let (_, subscription) = subscriber(&format!("{}{}", server.uri(), PUSH_PATH));
    let result = send_with_retries(&client(), &subscription, Some(b"hi"), &VapidKeys::generate(), &options(), 3)
        .await
        .expect("send");

    assert_eq!(result.failure, Some(FailureKind::Rejected));
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
}
