//! `parley-server`: runs the Parley gateway on a TCP address.

use std::time::Duration;

use clap::Parser;
use parley::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley debate room server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "WebSocket server for timed debate and free chat rooms")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seconds a disconnected participant has to come back
    #[arg(long, default_value_t = 10)]
    grace_secs: u64,

    /// Seconds between announcing a room's closure and deleting it
    #[arg(long, default_value_t = 5)]
    deletion_delay_secs: u64,

    /// Seconds between viability sweeps over started rooms
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), ParleyError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = CoordinatorConfig {
        reconnect_grace: Duration::from_secs(args.grace_secs),
        deletion_delay: Duration::from_secs(args.deletion_delay_secs),
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        ..CoordinatorConfig::default()
    };

    let server = ParleyServer::builder()
        .bind(&args.bind)
        .config(config)
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, ?config, "parley-server starting");

    server.run().await
}
