//! Entry point: parse CLI flags, bootstrap logging, bind and run the
//! server until Ctrl-C.

use clap::Parser;
use sipd_engine::{Server, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A terminating SIP UAS signaling server.
#[derive(Debug, Parser)]
#[command(name = "sipd", version, about)]
struct Cli {
    /// UDP port to listen on.
    #[arg(long, default_value_t = ServerConfig::default().port)]
    port: u16,

    /// Number of worker tasks; each owns an independent call/dialog/
    /// transaction registry.
    #[arg(long, default_value_t = ServerConfig::default().worker_count)]
    workers: usize,

    /// Per-worker bounded queue capacity.
    #[arg(long, default_value_t = ServerConfig::default().queue_capacity)]
    queue_capacity: usize,

    /// Log level when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let config = ServerConfig {
        port: cli.port,
        worker_count: cli.workers.max(1),
        queue_capacity: cli.queue_capacity.max(1),
    };

    info!(?config, "starting sipd");

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "failed to start server");
            std::process::exit(1);
        }
    };

    info!(port = server.port(), "sipd is listening");

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    server.shutdown().await;
    Ok(())
}
