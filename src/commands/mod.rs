//! CLI subcommand implementations for webpush-relay.
//!
//! - [`keys`] - VAPID key pair generation and loading
//! - [`send`] - one-shot push with retries
//! - [`serve`] - the relay server
//!
//! # Usage
//!
//! Commands are invoked from the main CLI dispatcher:
//!
//! ```ignore
//! use webpush_relay::commands;
//!
//! commands::keys::generate(None)?;
//! commands::serve::run(config, None, None).await?;
//! ```

pub mod keys;
pub mod send;
pub mod serve;

#[doc(inline)]
pub use keys::{generate as generate_keys, load as load_keys};
#[doc(inline)]
pub use send::{run as send_push, send_with_retries, SendArgs};
#[doc(inline)]
pub use serve::run as serve_relay;
