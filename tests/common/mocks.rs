use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;

use rustci_agent::ci::connectors::{ContainerState, Engine, LogStream};
use rustci_agent::ci::{Line, Step};
use rustci_agent::error::{AppError, Result};
use rustci_agent::models::Work;
use rustci_agent::{JobSink, LogSink};

/// Scripted container engine. Behaviour is keyed by step name.
#[derive(Default)]
pub struct MockEngine {
    exit_codes: HashMap<String, i32>,
    logs: HashMap<String, String>,
    paced: HashMap<String, (Vec<String>, Duration)>,
    fail_start: HashSet<String>,
    hang: HashSet<String>,
    oom: HashSet<String>,
    calls: Mutex<Vec<String>>,
    started: Mutex<Vec<Step>>,
    names: Mutex<HashMap<String, String>>,
    stopped: Mutex<HashSet<String>>,
    notify: Notify,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit(mut self, step: &str, code: i32) -> Self {
        self.exit_codes.insert(step.to_string(), code);
        self
    }

    pub fn logs(mut self, step: &str, output: &str) -> Self {
        self.logs.insert(step.to_string(), output.to_string());
        self
    }

    /// Emits `lines` one at a time, `interval` apart.
    pub fn paced_logs(mut self, step: &str, lines: &[&str], interval: Duration) -> Self {
        let lines = lines.iter().map(|l| l.to_string()).collect();
        self.paced.insert(step.to_string(), (lines, interval));
        self
    }

    pub fn fail_start(mut self, step: &str) -> Self {
        self.fail_start.insert(step.to_string());
        self
    }

    /// `container_wait` blocks until the container is stopped.
    pub fn hang(mut self, step: &str) -> Self {
        self.hang.insert(step.to_string());
        self
    }

    pub fn oom(mut self, step: &str) -> Self {
        self.oom.insert(step.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<Step> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_names(&self) -> Vec<String> {
        self.started().into_iter().map(|s| s.name).collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn name_of(&self, id: &str) -> String {
        self.names
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn is_stopped(&self, id: &str) -> bool {
        self.stopped.lock().unwrap().contains(id)
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn container_start(&self, step: &Step) -> Result<String> {
        self.record(format!("start {}", step.name));
        if self.fail_start.contains(&step.name) {
            return Err(AppError::EngineError(format!("no such image: {}", step.image)));
        }

        let id = if step.id.is_empty() {
            step.name.clone()
        } else {
            step.id.clone()
        };
        self.names.lock().unwrap().insert(id.clone(), step.name.clone());
        self.started.lock().unwrap().push(step.clone());
        Ok(id)
    }

    async fn container_stop(&self, id: &str) -> Result<()> {
        self.record(format!("stop {}", self.name_of(id)));
        self.stopped.lock().unwrap().insert(id.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn container_remove(&self, id: &str) -> Result<()> {
        self.record(format!("remove {}", self.name_of(id)));
        Ok(())
    }

    async fn container_wait(&self, id: &str) -> Result<ContainerState> {
        let name = self.name_of(id);

        if self.hang.contains(&name) {
            loop {
                let notified = self.notify.notified();
                if self.is_stopped(id) {
                    break;
                }
                notified.await;
            }
            return Ok(ContainerState::exited(137));
        }

        Ok(ContainerState {
            exit_code: self.exit_codes.get(&name).copied().unwrap_or(0),
            oom_killed: self.oom.contains(&name),
        })
    }

    async fn container_logs(&self, id: &str) -> Result<LogStream> {
        if let Some((lines, interval)) = self.paced.get(&self.name_of(id)).cloned() {
            let (reader, mut writer) = tokio::io::duplex(1024);
            tokio::spawn(async move {
                for line in lines {
                    tokio::time::sleep(interval).await;
                    if writer.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
            return Ok(Box::new(reader));
        }

        let output = self.logs.get(&self.name_of(id)).cloned().unwrap_or_default();
        Ok(Box::new(std::io::Cursor::new(output.into_bytes())))
    }
}

/// Keeps a snapshot of every job update.
#[derive(Default)]
pub struct RecordingJobSink {
    updates: Mutex<Vec<Work>>,
}

impl RecordingJobSink {
    pub fn updates(&self) -> Vec<Work> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobSink for RecordingJobSink {
    async fn update(&self, work: &Work) -> Result<()> {
        self.updates.lock().unwrap().push(work.clone());
        Ok(())
    }
}

/// Keeps every log line written.
#[derive(Default)]
pub struct RecordingLogSink {
    lines: Mutex<Vec<Line>>,
}

impl RecordingLogSink {
    pub fn lines(&self) -> Vec<Line> {
        self.lines.lock().unwrap().clone()
    }

    pub fn output(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.out).collect()
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn write(&self, line: &Line) -> Result<()> {
        self.lines.lock().unwrap().push(line.clone());
        Ok(())
    }
}
