//! codepair-relay: WebSocket pairing relay.
//!
//! Clients ask for a short code, share it out of band, and whoever redeems
//! it is placed in the same session. From then on the relay forwards events
//! between session members without looking at their payloads.

mod connection;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use codepair_common::{CodepairError, ConfigError};
use codepair_config::{CodepairConfig, LoggingConfig, StoreBackend};
use codepair_core::spawn_expiry_sweeper;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::server::ConnectionSettings;

#[derive(Parser)]
#[command(name = "codepair-relay", about = "Short-code pairing relay over WebSocket")]
struct Args {
    /// Config file. Defaults to $CODEPAIR_CONFIG, then the platform config
    /// dir, created on first run.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Default code lifetime in seconds.
    #[arg(long)]
    code_ttl: Option<u64>,

    /// URL of a Redis-compatible REST store. Switches the backend to `rest`.
    #[arg(long)]
    store_url: Option<String>,

    /// Bearer token for the REST store.
    #[arg(long, env = "CODEPAIR_STORE_TOKEN", hide_env_values = true)]
    store_token: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut CodepairConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(ttl) = self.code_ttl {
            config.pairing.ttl_secs = ttl;
        }
        if let Some(url) = &self.store_url {
            config.store.backend = StoreBackend::Rest;
            config.store.url = url.clone();
        }
        if let Some(token) = &self.store_token {
            config.store.token = token.clone();
        }
    }
}

/// Load the config file, layer CLI flags over it, validate once.
fn resolve_config(args: &Args) -> Result<CodepairConfig, ConfigError> {
    codepair_config::load_config(args.config.as_deref(), |config| args.apply(config))
}

fn init_tracing(logging: &LoggingConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| logging.filter.as_str().into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), CodepairError> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    init_tracing(&config.logging);

    let handler = server::build_handler(&config)?;
    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        backend = ?config.store.backend,
        max_members = config.pairing.max_members,
        group = config.pairing.is_group_mode(),
        "codepair-relay listening"
    );

    let cancel = CancellationToken::new();

    let sweeper = spawn_expiry_sweeper(
        handler.pairing().clone(),
        Duration::from_secs(config.sweep.interval_secs),
        cancel.clone(),
    );

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
        }
        shutdown.cancel();
    });

    server::run(
        listener,
        handler,
        ConnectionSettings::from_config(&config),
        cancel,
    )
    .await;

    sweeper
        .await
        .map_err(|e| CodepairError::Other(format!("sweeper task failed: {e}")))?;
    tracing::info!("codepair-relay stopped");
    Ok(())
}
