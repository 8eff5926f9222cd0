//! egress-proxy - allowlist-enforcing HTTP CONNECT proxy
//!
//! The allowlist and the enforcement mode are compiled in; see `build.rs`.

use anyhow::{Context, Result};
use clap::Parser;
use egress_config::AllowlistDocument;
use egress_events::EventLogger;
use egress_policy::{AdmissionPolicy, Mode};
use egress_server_connect::{ConnectServer, ConnectServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

const EMBEDDED_ALLOWLIST: &str = include_str!(concat!(env!("OUT_DIR"), "/allowlist.yaml"));
const BUILD_MODE: &str = env!("EGRESS_BUILD_MODE");

const VERSION: &str = concat!(
    env!("GIT_TAG"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Egress proxy - tunnels CONNECT requests to allowlisted destinations
#[derive(Parser, Debug)]
#[command(name = "egress-proxy")]
#[command(about = "HTTP CONNECT proxy that only tunnels to allowlisted destinations")]
#[command(version = VERSION)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "EGRESS_LISTEN", default_value = "127.0.0.1:9091")]
    listen: SocketAddr,

    /// Diagnostic log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also emit DEBUG records in the event log
    #[arg(short, long)]
    verbose: bool,

    /// Seconds to wait when connecting to a destination
    #[arg(long, default_value = "10")]
    dial_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let logger = EventLogger::stdout().with_debug(cli.verbose);

    let policy = match load_policy() {
        Ok(policy) => Arc::new(policy),
        Err(e) => {
            error!("Failed to initialize proxy: {:#}", e);
            logger.initialization_failed(format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let config = ConnectServerConfig {
        bind_addr: cli.listen,
        dial_timeout: Duration::from_secs(cli.dial_timeout),
    };

    let server = match ConnectServer::bind(config, policy, logger.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            logger.server_failed(e.to_string());
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Proxy server failed: {}", e);
                logger.server_failed(e.to_string());
                std::process::exit(1);
            }
        }
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping proxy..."),
                Err(e) => error!("Error listening for shutdown signal: {}", e),
            }
        }
    }

    Ok(())
}

/// Build the admission policy from the compiled-in allowlist and mode
fn load_policy() -> Result<AdmissionPolicy> {
    let mode: Mode = BUILD_MODE.parse()?;
    let index = AllowlistDocument::parse(EMBEDDED_ALLOWLIST)
        .context("Embedded allowlist is not valid YAML")?
        .into_index()
        .context("Embedded allowlist is invalid")?;

    info!("Loaded {} allowlist entries ({} mode)", index.len(), mode);
    Ok(AdmissionPolicy::new(index, mode))
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
