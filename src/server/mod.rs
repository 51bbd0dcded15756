//! HTTP relay for browser demo pages.
//!
//! A page that holds a subscription and an application key pair posts
//! them to [`SEND_PUSH_ROUTE`]; the relay does the encryption, signing and
//! delivery the browser cannot do for itself. Optionally serves the page's
//! static files from the same origin.

mod handlers;
mod types;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::constants::SEND_PUSH_ROUTE;
use crate::notifications::{DeliveryClient, SendOptions};

#[doc(inline)]
pub use handlers::send_push_msg;
#[doc(inline)]
pub use types::{SendPushRequest, SendPushResponse};

/// State shared across relay requests.
#[derive(Debug, Clone)]
pub struct RelayState {
    /// Shared delivery client.
    pub client: DeliveryClient,
    /// Subject, TTL and encoding applied to every relayed message.
    pub options: SendOptions,
}

impl RelayState {
    /// Build relay state from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = DeliveryClient::new(config.request_timeout()).context("Failed to create delivery client")?;
        let options = SendOptions {
            subject: config.vapid_subject.clone(),
            ttl: config.ttl,
            encoding: config.content_encoding,
            ..SendOptions::default()
        };
        Ok(Self { client, options })
    }
}

/// Build the relay router, with a static file fallback when `static_dir`
/// is set.
pub fn create_router(state: Arc<RelayState>, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route(SEND_PUSH_ROUTE, post(handlers::send_push_msg))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Bind `listener` and serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Relay server failed")
}

/// Run the relay with `config` until Ctrl+C or SIGTERM.
pub async fn run(config: &Config) -> Result<()> {
    let state = Arc::new(RelayState::from_config(config)?);
    if let Some(dir) = &config.static_dir {
        anyhow::ensure!(dir.is_dir(), "Static directory {} does not exist", dir.display());
        log::info!("[Relay] Serving static files from {}", dir.display());
    }
    let router = create_router(state, config.static_dir.clone());

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    let local_addr = listener.local_addr()?;
    log::info!("[Relay] Listening on {}", local_addr);
    println!("App listening on {local_addr}");
    println!("Press Ctrl+C to quit.");

    serve(listener, router, shutdown_signal()).await?;
    log::info!("[Relay] Shut down");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[Relay] Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("[Relay] Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    log::info!("[Relay] Shutdown signal received");
}
