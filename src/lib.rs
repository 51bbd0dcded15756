//! webpush-relay - VAPID-authenticated Web Push from Rust.
//!
//! The library holds the send path (key codec, VAPID signing, payload
//! encryption, delivery) in [`notifications`] and the HTTP relay that lets
//! a browser page trigger a push in [`server`]. The binary in `main.rs`
//! wires both to a small CLI.
//!
//! ```ignore
//! use webpush_relay::notifications::{send_notification, DeliveryClient, PushSubscription, SendOptions, VapidKeys};
//!
//! let client = DeliveryClient::new(std::time::Duration::from_secs(10))?;
//! let result = send_notification(&client, &subscription, Some(b"hello"), &keys, &SendOptions::default()).await?;
//! ```

// Rust guideline compliant 2026-02

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod notifications;
pub mod server;

pub use config::Config;
pub use error::{DeliveryError, EncryptionError, FailureKind, PushError, SigningError};
