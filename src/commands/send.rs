//! One-shot push from the command line, with retries.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::config::Config;
use crate::constants::{RETRY_INITIAL_BACKOFF, RETRY_MAX_BACKOFF};
use crate::error::{FailureKind, PushError};
use crate::notifications::push::endpoint_for_log;
use crate::notifications::{
    send_notification, ContentEncoding, DeliveryClient, DeliveryResult, PushSubscription, SendOptions, Urgency,
    VapidKeys,
};

/// Arguments for `send`.
#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Push service endpoint from the subscription
    #[arg(long)]
    pub endpoint: String,
    /// Subscription p256dh key (base64url)
    #[arg(long)]
    pub key: String,
    /// Subscription auth secret (base64url)
    #[arg(long)]
    pub auth: String,
    /// JSON file with {"public", "private"} application keys
    #[arg(long, conflicts_with_all = ["vapid_pubkey", "vapid_pvtkey"])]
    pub keys: Option<PathBuf>,
    /// Application server public key (base64url)
    #[arg(long, requires = "vapid_pvtkey")]
    pub vapid_pubkey: Option<String>,
    /// Application server private key (base64url)
    #[arg(long, requires = "vapid_pubkey")]
    pub vapid_pvtkey: Option<String>,
    /// VAPID subject (mailto: or https: contact)
    #[arg(long)]
    pub vapid_subject: Option<String>,
    /// Text payload; omit for a push without data
    #[arg(long)]
    pub data: Option<String>,
    /// Message TTL in seconds
    #[arg(long)]
    pub ttl: Option<u32>,
    /// Content encoding: aesgcm or aes128gcm
    #[arg(long)]
    pub encoding: Option<ContentEncoding>,
    /// Urgency: very-low, low, normal or high
    #[arg(long)]
    pub urgency: Option<Urgency>,
    /// Replacement topic (up to 32 URL-safe characters)
    #[arg(long)]
    pub topic: Option<String>,
    /// Retries for transient or throttled failures
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

impl SendArgs {
    fn vapid_keys(&self) -> Result<VapidKeys> {
        match (&self.keys, &self.vapid_pubkey, &self.vapid_pvtkey) {
            (Some(path), _, _) => super::keys::load(path),
            (None, Some(public), Some(private)) => {
                VapidKeys::from_base64url(public, private).context("Invalid VAPID key pair")
            }
            _ => bail!("Provide --keys FILE or both --vapid-pubkey and --vapid-pvtkey"),
        }
    }

    fn send_options(&self, config: &Config) -> SendOptions {
        SendOptions {
            subject: self.vapid_subject.clone().unwrap_or_else(|| config.vapid_subject.clone()),
            ttl: self.ttl.unwrap_or(config.ttl),
            encoding: self.encoding.unwrap_or(config.content_encoding),
            urgency: self.urgency,
            topic: self.topic.clone(),
            ..SendOptions::default()
        }
    }
}

/// Run `send`: deliver one message and report the outcome.
pub async fn run(args: SendArgs, config: &Config) -> Result<()> {
    let keys = args.vapid_keys()?;
    let options = args.send_options(config);
    let subscription = PushSubscription::new(&args.endpoint, &args.key, &args.auth);
    let client = DeliveryClient::new(config.request_timeout())?;

    let result = send_with_retries(
        &client,
        &subscription,
        args.data.as_deref().map(str::as_bytes),
        &keys,
        &options,
        args.retries,
    )
    .await?;

    match result.into_result() {
        Ok(result) => {
            println!(
                "Push accepted by {} (HTTP {})",
                endpoint_for_log(&subscription.endpoint),
                result.status_code.unwrap_or_default()
            );
            Ok(())
        }
        Err(err) if err.kind == FailureKind::Gone => bail!(
            "Subscription is gone (HTTP {}); remove it and ask the browser to subscribe again",
            err.status_code.unwrap_or_default()
        ),
        Err(err) => Err(err.into()),
    }
}

/// Send, retrying `Transient` and `Throttled` outcomes up to `retries`
/// times. `Gone` and `Rejected` are returned immediately.
pub async fn send_with_retries(
    client: &DeliveryClient,
    subscription: &PushSubscription,
    payload: Option<&[u8]>,
    keys: &VapidKeys,
    options: &SendOptions,
    retries: u32,
) -> Result<DeliveryResult, PushError> {
    let mut attempt = 0;
    loop {
        let result = send_notification(client, subscription, payload, keys, options).await?;
        let Some(kind) = result.failure else {
            return Ok(result);
        };
        if !kind.is_retryable() || attempt >= retries {
            return Ok(result);
        }

        let delay = retry_delay(attempt, result.retry_after);
        attempt += 1;
        log::warn!(
            "[WebPush] Delivery {}, retry {}/{} in {:?}",
            kind,
            attempt,
            retries,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}

/// Delay before retry number `attempt + 1`.
///
/// A `Retry-After` hint is used as given. Otherwise the delay doubles from
/// [`RETRY_INITIAL_BACKOFF`] up to [`RETRY_MAX_BACKOFF`].
pub fn retry_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(hint) = retry_after {
        return hint;
    }
    let factor = 2u32.saturating_pow(attempt);
    RETRY_INITIAL_BACKOFF.saturating_mul(factor).min(RETRY_MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        send: SendArgs,
    }

    fn parse(extra: &[&str]) -> Result<SendArgs, clap::Error> {
        let mut argv = vec!["test", "--endpoint", "https://push.example.com/x", "--key", "k", "--auth", "a"];
        argv.extend_from_slice(extra);
        TestCli::try_parse_from(argv).map(|cli| cli.send)
    }

    #[test]
    fn test_retry_delay_schedule() {
        assert_eq!(retry_delay(0, None), Duration::from_secs(1));
        assert_eq!(retry_delay(1, None), Duration::from_secs(2));
        assert_eq!(retry_delay(2, None), Duration::from_secs(4));
        assert_eq!(retry_delay(6, None), Duration::from_secs(60));
        assert_eq!(retry_delay(40, None), RETRY_MAX_BACKOFF);
    }

    #[test]
    fn test_retry_delay_honours_retry_after() {
        assert_eq!(retry_delay(3, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(retry_delay(0, Some(Duration::ZERO)), Duration::ZERO);
    }

    #[test]
    fn test_parse_flags() {
        let args = parse(&["--keys", "vapid.json", "--encoding", "aes128gcm", "--urgency", "high", "--retries", "3"])
            .expect("parse");
        assert_eq!(args.keys, Some(PathBuf::from("vapid.json")));
        assert_eq!(args.encoding, Some(ContentEncoding::Aes128Gcm));
        assert_eq!(args.urgency, Some(Urgency::High));
        assert_eq!(args.retries, 3);
    }

    #[test]
    fn test_keys_file_conflicts_with_inline_keys() {
        assert!(parse(&["--keys", "vapid.json", "--vapid-pubkey", "p", "--vapid-pvtkey", "q"]).is_err());
        assert!(parse(&["--vapid-pubkey", "p"]).is_err());
    }

    #[test]
    fn test_missing_keys_is_an_error() {
        let args = parse(&[]).expect("parse");
        assert!(args.vapid_keys().is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config::default();
        let args = parse(&["--ttl", "30", "--vapid-subject", "mailto:me@example.com"]).expect("parse");
        let options = args.send_options(&config);
        assert_eq!(options.ttl, 30);
        assert_eq!(options.subject, "mailto:me@example.com");
        assert_eq!(options.encoding, config.content_encoding);

        let defaults = parse(&[]).expect("parse").send_options(&config);
        assert_eq!(defaults.ttl, config.ttl);
        assert_eq!(defaults.subject, config.vapid_subject);
    }
}
