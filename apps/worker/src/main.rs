#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use webcheck::pool;
use webcheck::shutdown::shutdown_token;
use webcheck::worker::{CheckExecutor, ConsumerSettings, ResultReporter, Worker, http_client_builder};
use webcheck::{Config, RedisStreamStore};

/// Upper bound for any request the client makes; probes and submissions set tighter deadlines.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(version, about = "Consumes web check jobs, probes the sites and reports the results")]
struct Cli {
    /// Config file (default: ~/.config/webcheck/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Consumer name within the group (default: worker-<pid>-<random>)
    #[arg(long)]
    consumer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(consumer) = cli.consumer {
        config.worker.consumer_name = Some(consumer);
    }
    info!("Loaded configuration:\n{config}");

    let pool = pool::connect(&config.redis).await.context("failed to connect to Redis")?;

    let client = http_client_builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let reporter = ResultReporter::new(
        client.clone(),
        &config.backend.url,
        Duration::from_secs(config.backend.submit_timeout_secs),
    )
    .context("invalid backend url")?;
    reporter.check_reachable().await.context("backend is not reachable")?;

    let worker = Worker::new(
        Arc::new(RedisStreamStore::new(pool)),
        CheckExecutor::http(client),
        reporter,
        ConsumerSettings::from_config(&config.stream, &config.worker),
    );
    info!(consumer = %worker.settings().consumer, "Worker initialized successfully");

    worker.run(shutdown_token()).await.context("failed to set up the consumer group")?;
    Ok(())
}
