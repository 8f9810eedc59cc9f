//! Server-side stock quote lookup for the research page.
//!
//! A logged-in caller asks for a ticker; this service fetches the quote from a
//! financial-data upstream on their behalf. Because the request is attacker
//! influenced, every lookup passes the same chain:
//!
//! 1. [`symbol`] normalizes and checks the ticker token.
//! 2. [`destination`] picks the upstream URL, either from a frozen endpoint
//!    table or from a caller URL that clears host and address allowlists.
//! 3. [`fetch`] issues one GET with no redirects, three timeouts and a body cap.
//! 4. [`sanitize`] wraps the payload as plain text.
//!
//! Configuration is read once at startup ([`config`]); nothing in a request
//! can change it.

use std::time::Duration;

use thiserror::Error;
use tokio::{net::TcpListener, signal};
use tracing::info;

pub mod address_policy;
pub mod config;
pub mod destination;
pub mod dns_resolver;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod logging;
pub mod observability;
pub mod render;
pub mod research;
pub mod routes;
pub mod sanitize;
pub mod symbol;

#[cfg(test)]
mod test_upstream;

use config::{ConfigError, ProxyConfig};
use routes::{router, AppState};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn start_server() -> Result<(), StartupError> {
    let (config, source) = ProxyConfig::load()?;
    logging::init(config.log_level);
    info!(%source, "Configuration loaded");

    info!(
        mode = ?config.addressing,
        endpoints = config.endpoints.len(),
        allowed_hosts = config.allowed_hosts.len(),
        "Initializing research proxy..."
    );
    let state = AppState::from_config(&config)?;

    let address = config.bind_target();
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!(
        worst_case = ?(config.fetch.worst_case() + Duration::from_millis(config.dns_timeout_ms)),
        "Server running on {address}"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
