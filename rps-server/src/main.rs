//! RPS Match Server
//!
//! Listens on the given port and pairs joining players into matches.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rps_server::{MatchServer, ServerConfig, PROTOCOL_VERSION, VERSION};

/// Rock-paper-scissors matchmaking server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TCP port to listen on.
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("RPS server v{} (protocol {})", VERSION, PROTOCOL_VERSION);

    let server = Arc::new(MatchServer::bind(ServerConfig::with_port(cli.port)).await?);
    // Always shown, whatever the log filter.
    eprintln!("{}", server.readiness_notice());

    let signal = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            signal.shutdown();
        }
    });

    server.run().await;

    Ok(())
}
