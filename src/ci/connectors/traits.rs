use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::ci::config::Step;
use crate::error::Result;

/// Exit state of a finished container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub exit_code: i32,
    pub oom_killed: bool,
}

impl ContainerState {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            oom_killed: false,
        }
    }
}

/// Combined stdout and stderr of a container.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// Container runtime used by the pipeline driver.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Starts the container described by `step`, pulling the image when it is
    /// missing or `step.pull` is set. Returns the container id.
    async fn container_start(&self, step: &Step) -> Result<String>;

    /// Stops gracefully, then kills.
    async fn container_stop(&self, id: &str) -> Result<()>;

    async fn container_remove(&self, id: &str) -> Result<()>;

    /// Blocks until the container exits.
    async fn container_wait(&self, id: &str) -> Result<ContainerState>;

    async fn container_logs(&self, id: &str) -> Result<LogStream>;
}
