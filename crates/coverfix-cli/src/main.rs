//! Coverfix command-line entry point
//!
//! One flag: `--local` connects to the store directly; without it the run
//! goes through the SSH tunnel. Connection parameters come from
//! `COVERFIX_*` environment variables, with defaults matching the deployed
//! topology. A handled top-level failure is printed and the process still
//! exits 0; only an unhandled panic yields a non-zero status.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use coverfix_core::{run_backfill, BackfillConfig, ConnectMode};
use coverfix_store::StoreConfig;
use coverfix_tunnel::TunnelConfig;
use tracing_subscriber::EnvFilter;

/// Backfill missing cover dimensions on post records
#[derive(Debug, Parser)]
#[command(name = "coverfix", version, about)]
struct Cli {
    /// Connect to the store directly instead of through the SSH tunnel
    #[arg(long)]
    local: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.local) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::SUCCESS;
        }
    };

    tracing::info!(local = cli.local, database = %config.database, "starting backfill");
    match run_backfill(config).await {
        Ok(report) => {
            println!("repair complete: {report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("backfill aborted: {err}");
            ExitCode::SUCCESS
        }
    }
}

/// Assemble the immutable run configuration from flags, environment, and
/// defaults
fn load_config(local: bool) -> anyhow::Result<BackfillConfig> {
    let mode = if local {
        ConnectMode::Local {
            host: env_or("COVERFIX_MONGO_HOST", StoreConfig::DEFAULT_HOST),
            port: env_port("COVERFIX_MONGO_PORT", StoreConfig::DEFAULT_PORT)?,
        }
    } else {
        let ssh_host = env::var("COVERFIX_SSH_HOST")
            .context("remote mode needs COVERFIX_SSH_HOST (or pass --local)")?;
        let ssh_user = env::var("COVERFIX_SSH_USER")
            .context("remote mode needs COVERFIX_SSH_USER (or pass --local)")?;
        let mut tunnel = TunnelConfig::new(ssh_host, ssh_user)
            .with_ssh_port(env_port("COVERFIX_SSH_PORT", TunnelConfig::DEFAULT_SSH_PORT)?)
            .with_remote_bind(
                env_or("COVERFIX_MONGO_HOST", TunnelConfig::DEFAULT_REMOTE_BIND_HOST),
                env_port("COVERFIX_MONGO_PORT", TunnelConfig::DEFAULT_REMOTE_BIND_PORT)?,
            );
        if let Ok(key_path) = env::var("COVERFIX_SSH_KEY") {
            tunnel = tunnel.with_key_path(PathBuf::from(key_path));
        }
        ConnectMode::Remote(tunnel)
    };

    let mut config = BackfillConfig::new(mode);
    if let Ok(database) = env::var("COVERFIX_DB") {
        config.database = database;
    }
    if let Ok(collection) = env::var("COVERFIX_COLLECTION") {
        config.collection = collection;
    }
    Ok(config)
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_port(name: &str, default: u16) -> anyhow::Result<u16> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a port number")),
        Err(_) => Ok(default),
    }
}
