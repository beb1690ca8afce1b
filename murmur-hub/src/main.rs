//! murmur hub -- in-memory REST + WebSocket backend for development.
//!
//! Serves the message API (`POST /messages`, `GET /messages`, delete,
//! react, mark-read) and the realtime socket (`/ws/chat?token=`) that the
//! murmur client talks to. Auth is the dev scheme: the bearer token IS the
//! user id. Content stays encrypted end to end; the hub never decrypts.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin murmur-hub
//!
//! # Run on custom address
//! cargo run --bin murmur-hub -- --bind 127.0.0.1:9090
//! ```

use clap::Parser;
use murmur_hub::config::{HubCliArgs, HubConfig};

#[tokio::main]
async fn main() {
    let cli = HubCliArgs::parse();

    let config = match HubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting murmur hub");

    match murmur_hub::start_server(&config.bind_addr).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "hub listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "hub task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start hub");
            std::process::exit(1);
        }
    }
}
