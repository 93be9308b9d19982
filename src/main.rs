//! Keygate server
//!
//! Serves link issuance, the provider callback, redemption and key
//! validation over HTTP, with in-memory stores.
//!
//! Usage:
//!   keygate --port 3000 --public-base-url https://keys.example.com \
//!     --provider-url https://linkvertise.com/123/abc

use anyhow::{Context, Result};
use clap::Parser;
use keygate::server::{build_core_router, build_router, spawn_sweeper};
use keygate::{Keygate, KeygateConfig, TrustPolicy};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(about = "Task-gated license key issuance and validation server")]
struct Args {
    /// Address to bind
    #[arg(long, env = "KEYGATE_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "KEYGATE_PORT", default_value = "3000")]
    port: u16,

    /// Public origin used for callback URLs and redirects
    #[arg(long, env = "KEYGATE_PUBLIC_BASE_URL", default_value = "http://localhost:3000")]
    public_base_url: String,

    /// Monetized provider link the callback is wrapped in
    #[arg(
        long,
        env = "KEYGATE_PROVIDER_URL",
        default_value = "https://linkvertise.com/YOUR_USER_ID/YOUR_LINK_ID"
    )]
    provider_url: String,

    /// Pending link lifetime in seconds
    #[arg(long, env = "KEYGATE_PENDING_TTL_SECS", default_value = "600")]
    pending_ttl_secs: u64,

    /// Background sweep interval in seconds (disabled when unset)
    #[arg(long, env = "KEYGATE_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Header carrying the client IP when behind a proxy (e.g. x-forwarded-for)
    #[arg(long, env = "KEYGATE_FORWARDED_HEADER")]
    forwarded_header: Option<String>,

    /// Proxies allowed to set the forwarded header (comma-separated; empty trusts all)
    #[arg(long, env = "KEYGATE_TRUSTED_PROXIES", value_delimiter = ',')]
    trusted_proxies: Vec<IpAddr>,

    /// Serve the administrative endpoints
    #[arg(long, env = "KEYGATE_ADMIN")]
    admin: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> KeygateConfig {
        KeygateConfig {
            public_base_url: self.public_base_url.clone(),
            provider_url: self.provider_url.clone(),
            pending_ttl: Duration::from_secs(self.pending_ttl_secs),
            trust: TrustPolicy {
                forwarded_header: self.forwarded_header.clone(),
                trusted_proxies: self.trusted_proxies.clone(),
            },
            sweep_interval: self.sweep_interval_secs.map(Duration::from_secs),
            ..KeygateConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = args.config();
    let keygate = Arc::new(Keygate::new(config).context("Invalid configuration")?);

    if let Some(every) = keygate.config().sweep_interval {
        spawn_sweeper(keygate.links().clone(), every);
        info!("Background sweep every {:?}", every);
    }

    let app = if args.admin {
        build_router(keygate.clone())
    } else {
        build_core_router(keygate.clone())
    };

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Keygate listening on {}", addr);
    info!(
        "Callback URL: {}{}",
        keygate.config().public_base_url.trim_end_matches('/'),
        keygate.config().callback_path
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    info!("Keygate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
}
