//! Run the relay server.

use std::path::PathBuf;

use anyhow::Result;

use crate::config::Config;
use crate::server;

/// Start the relay, with `bind` and `static_dir` taking precedence over
/// `config`.
pub async fn run(mut config: Config, bind: Option<String>, static_dir: Option<PathBuf>) -> Result<()> {
    if let Some(bind) = bind {
        config.bind_address = bind;
    }
    if static_dir.is_some() {
        config.static_dir = static_dir;
    }
    log::info!(
        "[Relay] Starting (subject {}, ttl {}s, encoding {})",
        config.vapid_subject,
        config.ttl,
        config.content_encoding
    );
    server::run(&config).await
}
