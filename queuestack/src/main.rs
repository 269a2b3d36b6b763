//! queuestack - local lease-based queue service
//!
//! Serves in-memory message queues with visibility-timeout leasing and
//! at-least-once delivery over a JSON HTTP API.

mod config;
mod router;

use clap::Parser;
use queuestack_queue::{QueueService, QueueServiceConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "queuestack")]
#[command(about = "Local lease-based queue service", long_about = None)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "QUEUESTACK_PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long, env = "QUEUESTACK_HOST")]
    host: Option<String>,

    /// Path to a configuration file
    #[arg(short, long, env = "QUEUESTACK_CONFIG")]
    config: Option<String>,

    /// Fail when creating a queue that already exists
    #[arg(long)]
    strict_create: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "QUEUESTACK_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "queuestack={level},queuestack_queue={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config::Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if args.strict_create {
        config.queue.strict_create = true;
    }

    let engine = QueueServiceConfig::from(&config.queue);
    info!("Starting queuestack...");
    info!(
        max_batch_size = engine.max_batch_size,
        max_message_bytes = engine.max_message_bytes,
        default_visibility_timeout_secs = engine.default_visibility_timeout.as_secs(),
        strict_create = engine.strict_create,
        "Queue engine configured"
    );

    let service = Arc::new(QueueService::new(engine));
    let app = router::create_router(service);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
