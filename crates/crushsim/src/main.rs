//! Placement-simulator server.
//!
//! Serves the JSON line-frame protocol over TCP; each connection gets
//! its own simulator.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crushsim")]
#[command(about = "CRUSH placement and replication simulator", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "CRUSHSIM_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let listener = TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!("listening on {}", cli.listen);

    gateway::serve(listener).await?;
    Ok(())
}
