use anyhow::{bail, Context};
use async_trait::async_trait;
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rustci_agent::ci::connectors::DockerEngine;
use rustci_agent::{Agent, AgentConfig, JobSink, Line, LogSink, Result, Work};

/// Reports job transitions to the process log.
struct ConsoleJobSink;

#[async_trait]
impl JobSink for ConsoleJobSink {
    async fn update(&self, work: &Work) -> Result<()> {
        info!(
            "📋 Job #{} is {} (exit code {})",
            work.job.number, work.job.status, work.job.exit_code
        );
        if !work.job.error.is_empty() {
            warn!("⚠️ {}", work.job.error);
        }
        Ok(())
    }
}

/// Prints build output to stdout.
struct ConsoleLogSink;

#[async_trait]
impl LogSink for ConsoleLogSink {
    async fn write(&self, line: &Line) -> Result<()> {
        println!("[{}:L{}:{}s] {}", line.proc, line.pos, line.time, line.out);
        Ok(())
    }
}

fn load_work() -> anyhow::Result<Work> {
    let mut args = std::env::args().skip(1);
    let Some(work_path) = args.next() else {
        bail!("usage: rustci-agent <work.json> [pipeline.yml]");
    };

    let raw = std::fs::read_to_string(&work_path)
        .with_context(|| format!("Failed to read work file {}", work_path))?;
    let mut work: Work = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse work file {}", work_path))?;

    if let Some(yaml_path) = args.next() {
        work.yaml = std::fs::read_to_string(&yaml_path)
            .with_context(|| format!("Failed to read pipeline file {}", yaml_path))?;
    }
    Ok(work)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::init()?;
    let mut work = load_work()?;

    let engine = DockerEngine::new();
    engine.ping().await?;

    let agent = Agent::new(
        config,
        Arc::new(engine),
        Arc::new(ConsoleJobSink),
        Arc::new(ConsoleLogSink),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Interrupt received, cancelling build");
            on_signal.cancel();
        }
    });

    info!("🚀 Starting {} build #{}", work.repo.full_name, work.build.number);
    // outcome is carried in work.job
    let _ = agent.run(&mut work, cancel).await;

    std::process::exit(work.job.exit_code);
}
