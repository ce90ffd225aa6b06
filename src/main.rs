//! socksd - Dual SOCKS4/4A and SOCKS5 Proxy Server
//!
//! This is the main entry point for the socksd daemon.

use anyhow::Result;
use clap::Parser;
use socksd::config::load_config;
use socksd::server::{Server, SocksVersion};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// socksd - SOCKS4/4A and SOCKS5 proxy server
#[derive(Parser, Debug)]
#[command(name = "socksd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "settings.ini")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = Arc::new(load_config(&args.config)?);

    info!("socksd v{}", socksd::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    // Start one listener per enabled protocol version. A version that
    // fails to start never takes the other one down.
    let mut registries = Vec::new();
    for version in [SocksVersion::Socks4, SocksVersion::Socks5] {
        let enabled = match version {
            SocksVersion::Socks4 => config.socks4.enable,
            SocksVersion::Socks5 => config.socks5.enable,
        };

        if !enabled {
            info!("{} disabled in configuration", version);
            continue;
        }

        match Server::bind(Arc::clone(&config), version).await {
            Ok(server) => {
                info!("{} running at {}", version, server.local_addr()?);
                registries.push(server.registry());
                tokio::spawn(server.run());
            }
            Err(e) => {
                error!("{} was not started: {:#}", version, e);
            }
        }
    }

    shutdown_signal().await;

    info!("Shutting down...");
    for registry in &registries {
        registry.stop_all();
    }

    Ok(())
}

/// Wait for Ctrl+C or a termination signal (cross-platform)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
