#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use webcheck::pool;
use webcheck::shutdown::shutdown_token;
use webcheck::{Config, DueCheckEvaluator, JobProducer, RedisLastCheckStore, RedisSiteRegistry, RedisStreamStore};

#[derive(Debug, Parser)]
#[command(version, about = "Finds due web checks and enqueues them on the job stream")]
struct Cli {
    /// Config file (default: ~/.config/webcheck/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single scheduling pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    info!("Loaded configuration:\n{config}");

    let pool = pool::connect(&config.redis).await.context("failed to connect to Redis")?;

    let evaluator = DueCheckEvaluator::new(
        Arc::new(RedisSiteRegistry::new(pool.clone(), &config.scheduler.sites_key)),
        Arc::new(RedisLastCheckStore::new(pool.clone(), &config.scheduler.last_check_prefix)),
        JobProducer::new(Arc::new(RedisStreamStore::new(pool)), &config.stream.name),
    );

    if cli.once {
        let report = evaluator.run_pass().await.context("scheduling pass failed")?;
        info!(enqueued = report.enqueued, failed = report.failed, "Single pass finished");
        return Ok(());
    }

    evaluator.run(config.scheduler.tick(), shutdown_token()).await;
    Ok(())
}
