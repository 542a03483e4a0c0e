//! Sealproxy - Main entry point
//!
//! A content-rewriting web proxy with signed proxy URLs

use anyhow::Result;
use clap::Parser;
use sealproxy::{
    generate_secret, read_secret_file, Brand, FetchConfig, Frontend, HttpFetcher, MarkupMinifier, ProxyServer, RotatingSecret,
    SecretProvider, ServerConfig, Signer, StaticSecret,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Sealproxy - A content-rewriting web proxy
#[derive(Parser, Debug)]
#[command(name = "sealproxy")]
#[command(author = "Sealproxy Contributors")]
#[command(version)]
#[command(about = "A content-rewriting web proxy with signed proxy URLs")]
struct Args {
    /// HTTP port to listen on
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: IpAddr,

    /// HMAC secret for proxy tokens (random per process when unset)
    #[arg(long, env = "PROXY_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Read the HMAC secret from a file; re-read on SIGHUP
    #[arg(long, env = "PROXY_SECRET_FILE", conflicts_with = "secret")]
    secret_file: Option<PathBuf>,

    /// Brand name shown on proxied pages
    #[arg(long, env = "BRAND_NAME", default_value = "Sealproxy")]
    brand_name: String,

    /// Brand tagline shown on proxied pages
    #[arg(long, env = "BRAND_TAGLINE", default_value = "")]
    brand_tagline: String,

    /// Outbound fetch timeout in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "10")]
    fetch_timeout_secs: u64,

    /// Largest upstream body the proxy will read
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "10485760")]
    max_body_bytes: usize,

    /// Outbound User-Agent header
    #[arg(long, env = "PROXY_USER_AGENT")]
    user_agent: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Sealproxy v{}", env!("CARGO_PKG_VERSION"));

    let secrets = secret_provider(&args)?;

    let mut fetch_config = FetchConfig {
        timeout: Duration::from_secs(args.fetch_timeout_secs),
        max_body_bytes: args.max_body_bytes,
        ..FetchConfig::default()
    };
    if let Some(user_agent) = args.user_agent {
        fetch_config.user_agent = user_agent;
    }
    let fetcher = HttpFetcher::new(&fetch_config)?;
    info!(
        "Outbound fetches: timeout {}s, body limit {} bytes",
        args.fetch_timeout_secs, args.max_body_bytes
    );

    let frontend = Frontend::new(
        Brand {
            name: args.brand_name,
            tagline: args.brand_tagline,
        },
        Signer::new(secrets),
        Arc::new(fetcher),
        Arc::new(MarkupMinifier),
    );

    let config = ServerConfig {
        bind_address: args.bind_address,
        http_port: args.http_port,
    };

    let server = Arc::new(ProxyServer::new(config, Arc::new(frontend)));

    info!("Sealproxy started successfully");

    server.run().await?;

    Ok(())
}

fn secret_provider(args: &Args) -> Result<Arc<dyn SecretProvider>> {
    if let Some(path) = &args.secret_file {
        let rotating = Arc::new(RotatingSecret::new(read_secret_file(path)?));
        info!("Loaded proxy secret from {}", path.display());
        reload_on_hangup(rotating.clone(), path.to_path_buf());
        return Ok(rotating);
    }

    match &args.secret {
        Some(secret) if !secret.is_empty() => Ok(Arc::new(StaticSecret::new(secret.as_str()))),
        _ => {
            warn!("No PROXY_SECRET configured; generated a per-process secret, tokens will not survive a restart");
            Ok(Arc::new(StaticSecret::new(generate_secret())))
        }
    }
}

#[cfg(unix)]
fn reload_on_hangup(secrets: Arc<RotatingSecret>, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Secret rotation on SIGHUP unavailable: {}", e);
                return;
            }
        };

        while hangups.recv().await.is_some() {
            match read_secret_file(&path) {
                Ok(secret) => {
                    secrets.rotate(secret);
                    info!("Rotated proxy secret from {}", path.display());
                }
                Err(e) => warn!("Keeping current proxy secret: {:#}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn reload_on_hangup(_secrets: Arc<RotatingSecret>, path: PathBuf) {
    warn!("Secret rotation on SIGHUP is not supported on this platform; {} is read once", path.display());
}
