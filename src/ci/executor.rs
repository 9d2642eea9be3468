//! Job agent
//!
//! Compiles a work item, drives the resulting pipeline to completion and
//! reports job status and log output to the injected sinks.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::compiler::Compiler;
use super::config::Config;
use super::connectors::Engine;
use super::pipeline::{Event, Line, Pipeline};
use super::secrets::SecretReplacer;
use crate::config::AgentConfig;
use crate::error::{AppError, Result};
use crate::models::{JobStatus, Work};

const COMPILE_ERROR_EXIT_CODE: i32 = 255;
const DEFAULT_BUILD_TIMEOUT_MINUTES: u64 = 60;

/// Receives the work item after every job status transition.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn update(&self, work: &Work) -> Result<()>;
}

/// Receives redacted log lines.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, line: &Line) -> Result<()>;
}

enum Wake {
    Event(Event),
    Cancelled,
    Deadline,
    Idle,
}

pub struct Agent {
    config: AgentConfig,
    compiler: Compiler,
    engine: Arc<dyn Engine>,
    jobs: Arc<dyn JobSink>,
    logs: Arc<dyn LogSink>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        engine: Arc<dyn Engine>,
        jobs: Arc<dyn JobSink>,
        logs: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            compiler: Compiler::new(config.clone()),
            config,
            engine,
            jobs,
            logs,
        }
    }

    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Runs one job to completion. `work.job` carries the outcome; the error
    /// is returned as well so callers can react to it.
    pub async fn run(&self, work: &mut Work, cancel: CancellationToken) -> Result<()> {
        work.job.status = JobStatus::Running;
        work.job.started = chrono::Utc::now().timestamp();

        let config = match self.compiler.compile(&work.yaml, work) {
            Ok(config) => config,
            Err(e) => {
                error!("❌ Failed to compile pipeline: {}", e);
                work.job.status = JobStatus::Error;
                work.job.exit_code = COMPILE_ERROR_EXIT_CODE;
                work.job.error = e.to_string();
                work.job.finished = work.job.started;
                self.update(work).await;
                return Err(e);
            }
        };

        info!(
            "🚀 Running {} build #{} job #{}",
            work.repo.full_name, work.build.number, work.job.number
        );
        self.update(work).await;

        let result = self.exec(config, work, cancel).await;

        work.job.finished = chrono::Utc::now().timestamp();
        match &result {
            Ok(()) => {
                work.job.exit_code = 0;
                work.job.error.clear();
            }
            Err(e) => match e.exit_code() {
                Some(code) => {
                    work.job.exit_code = code;
                    work.job.error.clear();
                }
                None => {
                    work.job.exit_code = COMPILE_ERROR_EXIT_CODE;
                    work.job.error = e.to_string();
                }
            },
        }
        work.job.status = JobStatus::from_exit_code(work.job.exit_code);

        info!(
            "🏁 Job #{} finished: {} (exit code {})",
            work.job.number, work.job.status, work.job.exit_code
        );
        self.update(work).await;
        result
    }

    async fn exec(&self, config: Config, work: &Work, cancel: CancellationToken) -> Result<()> {
        let mut pipeline = Pipeline::new(config, Arc::clone(&self.engine), self.config.buffer);
        let result = self.drive(&mut pipeline, work, cancel).await;
        pipeline.teardown().await;
        result
    }

    async fn drive(
        &self,
        pipeline: &mut Pipeline,
        work: &Work,
        cancel: CancellationToken,
    ) -> Result<()> {
        pipeline.setup().await?;

        let replacer = SecretReplacer::new(&work.secrets);
        let deadline = sleep(build_timeout(work.repo.timeout));
        tokio::pin!(deadline);

        loop {
            let idle = sleep(self.config.timeout);

            let wake = tokio::select! {
                _ = cancel.cancelled() => Wake::Cancelled,
                _ = &mut deadline => Wake::Deadline,
                _ = idle => Wake::Idle,
                event = pipeline.recv() => Wake::Event(event),
            };

            let event = match wake {
                Wake::Event(event) => event,
                Wake::Cancelled => return Err(self.halt(pipeline, AppError::Cancelled).await),
                Wake::Deadline => return Err(self.halt(pipeline, AppError::TimeoutExceeded).await),
                Wake::Idle => {
                    let cause = AppError::Inactive {
                        timeout: self.config.timeout,
                    };
                    return Err(self.halt(pipeline, cause).await);
                }
            };

            match event {
                Event::Next => self.next(pipeline, work).await,
                Event::Line(line) => {
                    let out = replacer.replace(&line.out).into_owned();
                    let line = Line { out, ..line };
                    if let Err(e) = self.logs.write(&line).await {
                        warn!("⚠️ Failed to write log line: {}", e);
                    }
                }
                Event::Done => {
                    return match pipeline.err().await {
                        Some(e) => Err(e),
                        None => Ok(()),
                    };
                }
            }
        }
    }

    /// Decides whether the staged step runs.
    async fn next(&self, pipeline: &mut Pipeline, work: &Work) {
        let status = if pipeline.err().await.is_some() {
            JobStatus::Failure
        } else {
            JobStatus::Success
        };

        let Some(step) = pipeline.head_mut() else {
            return;
        };
        step.environment
            .insert("DRONE_BUILD_STATUS".to_string(), status.to_string());

        let matched = step.constraints.matches(
            &self.config.platform,
            &work.build.deploy,
            work.build.event.as_str(),
            &work.build.branch,
            status.as_str(),
            &work.job.environment,
        );

        if matched {
            pipeline.exec().await;
        } else {
            debug!("⏭️ Step {} does not match its constraints", step.name);
            pipeline.skip().await;
        }
    }

    async fn halt(&self, pipeline: &mut Pipeline, cause: AppError) -> AppError {
        warn!("🛑 {}", cause);
        pipeline.stop().await;
        cause
    }

    async fn update(&self, work: &Work) {
        if let Err(e) = self.jobs.update(work).await {
            warn!("⚠️ Failed to report job status: {}", e);
        }
    }
}

fn build_timeout(minutes: u64) -> Duration {
    let minutes = if minutes == 0 {
        DEFAULT_BUILD_TIMEOUT_MINUTES
    } else {
        minutes
    };
    Duration::from_secs(minutes * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_timeout_default() {
        assert_eq!(build_timeout(0), Duration::from_secs(3600));
        assert_eq!(build_timeout(15), Duration::from_secs(900));
    }
}
