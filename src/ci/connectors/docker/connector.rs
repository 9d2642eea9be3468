//! Docker engine
//!
//! Drives the `docker` command line client:
//! - Image pulls with optional registry login
//! - Container create, start, stop, wait and removal
//! - Log streaming with a bounded reconnect loop

use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::super::traits::{ContainerState, Engine, LogStream};
use crate::ci::config::Step;
use crate::error::{AppError, Result};

const LOG_ATTEMPTS: usize = 5;
const LOG_PIPE_CAPACITY: usize = 64 * 1024;
const STOP_TIMEOUT_SECS: &str = "10";

/// Variables the docker client reads for its own configuration. The client only
/// ever sees the agent's values for these.
const CLIENT_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "TMPDIR",
    "XDG_RUNTIME_DIR",
    "DOCKER_HOST",
    "DOCKER_CONTEXT",
    "DOCKER_CONFIG",
    "DOCKER_CERT_PATH",
    "DOCKER_TLS_VERIFY",
    "DOCKER_API_VERSION",
    "DOCKER_CONTENT_TRUST",
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "NO_PROXY",
    "no_proxy",
    "ALL_PROXY",
    "all_proxy",
];

fn is_client_var(key: &str) -> bool {
    CLIENT_ENV.contains(&key)
}

/// [`Engine`] backed by the local `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    binary: String,
}

impl DockerEngine {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// A docker invocation carrying only the agent's client environment.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env_clear()
            .envs(CLIENT_ENV.iter().filter_map(|key| {
                std::env::var_os(key).map(|value| (*key, value))
            }))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> Result<Output> {
        let output = cmd
            .output()
            .await
            .map_err(|e| AppError::EngineError(format!("Failed to execute docker {}: {}", what, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::EngineError(format!(
                "docker {} failed: {}",
                what,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Checks docker is reachable.
    pub async fn ping(&self) -> Result<()> {
        debug!("🔍 Validating Docker availability");
        let mut cmd = self.command();
        cmd.args(["version", "--format", "{{.Server.Version}}"]);
        let output = self.run(cmd, "version").await?;
        debug!(
            "✅ Docker available: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> bool {
        let mut cmd = self.command();
        cmd.args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        matches!(cmd.status().await, Ok(status) if status.success())
    }

    async fn login(&self, step: &Step) -> Result<()> {
        let auth = &step.auth_config;
        let registry = registry_host(&step.image);
        debug!("🔑 Logging in to registry {:?} for {}", registry, step.name);

        let mut cmd = self.command();
        cmd.args(["login", "--username", &auth.username, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(registry) = registry {
            cmd.arg(registry);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::EngineError(format!("Failed to execute docker login: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(auth.password.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(AppError::EngineError(format!(
                "docker login failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn pull(&self, step: &Step) -> Result<()> {
        if !step.auth_config.is_empty() {
            self.login(step).await?;
        }

        info!("📥 Pulling image: {}", step.image);
        let mut cmd = self.command();
        cmd.args(["pull", &step.image]);
        self.run(cmd, "pull").await?;
        Ok(())
    }

    async fn inspect(&self, id: &str, format: &str) -> Result<String> {
        let mut cmd = self.command();
        cmd.args(["inspect", "--format", format, id]);
        let output = self.run(cmd, "inspect").await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn is_running(&self, id: &str) -> bool {
        match self.inspect(id, "{{.State.Running}}").await {
            Ok(state) => state == "true",
            Err(_) => false,
        }
    }

    /// Follows the container logs into `writer` until the container stops,
    /// reconnecting a bounded number of times.
    async fn stream_logs<W>(self, id: String, mut writer: W)
    where
        W: AsyncWrite + Send + Unpin,
    {
        let mut since: Option<i64> = None;

        for attempt in 0..LOG_ATTEMPTS {
            if attempt > 0 {
                debug!("🔁 Reconnecting to logs of {} (attempt {})", id, attempt + 1);
            }

            match self.follow_once(&id, since, &mut writer).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => warn!("⚠️ Log stream for {} interrupted: {}", id, e),
            }
            since = Some(chrono::Utc::now().timestamp());

            if !self.is_running(&id).await {
                break;
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!("🔌 Log reader for {} already closed: {}", id, e);
        }
    }

    /// One `docker logs --follow` session. Returns `Ok(false)` once the reader
    /// side has gone away.
    async fn follow_once<W>(&self, id: &str, since: Option<i64>, writer: &mut W) -> Result<bool>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let mut cmd = self.command();
        cmd.args(["logs", "--follow"]);
        if let Some(since) = since {
            cmd.args(["--since", &since.to_string()]);
        }
        cmd.arg(id).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::EngineError(format!("Failed to execute docker logs: {}", e)))?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(AppError::EngineError("docker logs produced no output pipes".to_string()));
        };

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            let line = tokio::select! {
                line = stdout_lines.next_line(), if stdout_open => match line? {
                    Some(line) => line,
                    None => {
                        stdout_open = false;
                        continue;
                    }
                },
                line = stderr_lines.next_line(), if stderr_open => match line? {
                    Some(line) => line,
                    None => {
                        stderr_open = false;
                        continue;
                    }
                },
            };

            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
            {
                return Ok(false);
            }
        }

        child.wait().await?;
        Ok(true)
    }
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn container_start(&self, step: &Step) -> Result<String> {
        if step.pull || !self.image_exists(&step.image).await {
            self.pull(step).await?;
        }

        let mut cmd = self.command();
        cmd.args(create_args(step));
        for (key, value) in &step.environment {
            // values travel through the client's environment, not its argv
            if !is_client_var(key) {
                cmd.env(key, value);
            }
        }
        let output = self.run(cmd, "create").await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let mut cmd = self.command();
        cmd.args(["start", &id]);
        if let Err(e) = self.run(cmd, "start").await {
            error!("❌ Failed to start container for {}: {}", step.name, e);
            // the id never reaches the caller, so nobody else can remove it
            if let Err(rm) = self.container_remove(&id).await {
                warn!("⚠️ Failed to remove unstarted container {}: {}", id, rm);
            }
            return Err(e);
        }

        info!("🐳 Started container {} for {} ({})", step.id, step.name, step.image);
        Ok(id)
    }

    async fn container_stop(&self, id: &str) -> Result<()> {
        debug!("🛑 Stopping container: {}", id);
        let mut cmd = self.command();
        cmd.args(["stop", "--time", STOP_TIMEOUT_SECS, id]);
        self.run(cmd, "stop").await?;
        Ok(())
    }

    async fn container_remove(&self, id: &str) -> Result<()> {
        debug!("🧹 Removing container: {}", id);
        let mut cmd = self.command();
        cmd.args(["rm", "--force", "--volumes", id]);
        self.run(cmd, "rm").await?;
        Ok(())
    }

    async fn container_wait(&self, id: &str) -> Result<ContainerState> {
        let mut cmd = self.command();
        cmd.args(["wait", id]);
        let output = self.run(cmd, "wait").await?;

        let raw = String::from_utf8_lossy(&output.stdout);
        let exit_code = raw.trim().parse::<i32>().map_err(|e| {
            AppError::EngineError(format!("unexpected docker wait output {:?}: {}", raw.trim(), e))
        })?;
        let oom_killed = self.inspect(id, "{{.State.OOMKilled}}").await? == "true";

        Ok(ContainerState {
            exit_code,
            oom_killed,
        })
    }

    async fn container_logs(&self, id: &str) -> Result<LogStream> {
        let (reader, writer) = tokio::io::duplex(LOG_PIPE_CAPACITY);
        tokio::spawn(self.clone().stream_logs(id.to_string(), writer));
        Ok(Box::new(reader))
    }
}

/// Arguments for `docker create`.
fn create_args(step: &Step) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into()];
    if !step.id.is_empty() {
        args.extend(["--name".into(), step.id.clone()]);
    }

    if step.privileged {
        args.push("--privileged".into());
    }
    if step.oom_kill_disable {
        args.push("--oom-kill-disable".into());
    }
    if step.shm_size > 0 {
        args.extend(["--shm-size".into(), step.shm_size.to_string()]);
    }
    if !step.network.is_empty() {
        args.extend(["--network".into(), step.network.clone()]);
    }
    if !step.working_dir.is_empty() {
        args.extend(["--workdir".into(), step.working_dir.clone()]);
    }

    let mut keys: Vec<&String> = step.environment.keys().collect();
    keys.sort();
    for key in keys {
        if is_client_var(key) {
            args.extend(["--env".into(), format!("{}={}", key, step.environment[key])]);
        } else {
            args.extend(["--env".into(), key.clone()]);
        }
    }

    let mut labels: Vec<(&String, &String)> = step.labels.iter().collect();
    labels.sort();
    for (key, value) in labels {
        args.extend(["--label".into(), format!("{}={}", key, value)]);
    }

    let repeated: [(&str, &Vec<String>); 6] = [
        ("--volume", &step.volumes),
        ("--volumes-from", &step.volumes_from),
        ("--dns", &step.dns),
        ("--dns-search", &step.dns_search),
        ("--device", &step.devices),
        ("--add-host", &step.extra_hosts),
    ];
    for (flag, values) in repeated {
        for value in values {
            args.extend([flag.to_string(), value.clone()]);
        }
    }

    let mut entrypoint = step.entrypoint.iter();
    if let Some(program) = entrypoint.next() {
        args.extend(["--entrypoint".into(), program.clone()]);
    }

    args.push(step.image.clone());
    args.extend(entrypoint.cloned());
    args.extend(step.command.iter().cloned());
    args
}

/// Registry host of an image reference, `None` for Docker Hub.
fn registry_host(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    if first.contains('.') || first.contains(':') || first == "localhost" {
        Some(first)
    } else {
        None
    }
}
