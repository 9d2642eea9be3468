//! Pipeline execution driver
//!
//! Walks a compiled [`Config`] one step at a time. The caller owns every state
//! transition: it receives [`Event`]s from [`Pipeline::recv`] and answers each
//! [`Event::Next`] with [`Pipeline::exec`] or [`Pipeline::skip`]. Container
//! work runs on background tasks that report back over channels, so log
//! backpressure never blocks the caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::{Config, Step};
use super::connectors::Engine;
use crate::error::{AppError, Result};

pub const DEFAULT_BUFFER: usize = 500;

/// One line of container output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Step name.
    pub proc: String,
    /// Zero-based line number within the step.
    pub pos: usize,
    /// Seconds since the step's container started.
    pub time: i64,
    pub out: String,
}

/// What the caller has to react to next.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A step is staged at [`Pipeline::head`] and waits for exec or skip.
    Next,
    Line(Line),
    /// Every step has been passed, or the pipeline was stopped.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Setup,
    Running,
    Stopped,
    Finished,
}

#[derive(Debug)]
enum Signal {
    Next,
    Finished,
    Done,
}

#[derive(Default)]
struct Shared {
    containers: Vec<String>,
    err: Option<AppError>,
    stopped: bool,
}

impl Shared {
    fn record(&mut self, err: AppError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

pub struct Pipeline {
    steps: Vec<Step>,
    services: Vec<Step>,
    cursor: usize,
    state: PipelineState,
    engine: Arc<dyn Engine>,
    pipe_tx: mpsc::Sender<Line>,
    pipe_rx: mpsc::Receiver<Line>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    shared: Arc<Mutex<Shared>>,
    tasks: Vec<JoinHandle<()>>,
    torn_down: bool,
}

impl Pipeline {
    /// Disabled steps are dropped up front and never staged.
    pub fn new(config: Config, engine: Arc<dyn Engine>, buffer: usize) -> Self {
        let (pipe_tx, pipe_rx) = mpsc::channel(buffer.max(1));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let steps = config.pipeline.into_iter().filter(|s| !s.disabled).collect();
        let services = config.services.into_iter().filter(|s| !s.disabled).collect();

        Self {
            steps,
            services,
            cursor: 0,
            state: PipelineState::Created,
            engine,
            pipe_tx,
            pipe_rx,
            signal_tx,
            signal_rx,
            shared: Arc::new(Mutex::new(Shared::default())),
            tasks: Vec::new(),
            torn_down: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Starts the service containers and stages the first step.
    pub async fn setup(&mut self) -> Result<()> {
        self.state = PipelineState::Setup;

        for service in &self.services {
            let id = self.engine.container_start(service).await.map_err(|e| {
                error!("❌ Failed to start service {}: {}", service.name, e);
                e
            })?;
            info!("🧩 Service {} started", service.name);
            self.shared.lock().await.containers.push(id.clone());

            let logs = tokio::spawn(stream_logs(
                Arc::clone(&self.engine),
                id,
                service.name.clone(),
                self.pipe_tx.clone(),
            ));
            self.tasks.push(logs);
        }

        self.state = PipelineState::Running;
        let first = if self.steps.is_empty() {
            Signal::Done
        } else {
            Signal::Next
        };
        self.signal(first);
        Ok(())
    }

    /// Waits for the next event. Log lines are delivered ahead of control
    /// events.
    pub async fn recv(&mut self) -> Event {
        loop {
            let signal = tokio::select! {
                biased;

                Some(line) = self.pipe_rx.recv() => return Event::Line(line),
                Some(signal) = self.signal_rx.recv() => signal,
            };

            match signal {
                Signal::Next => return Event::Next,
                Signal::Finished => self.step().await,
                Signal::Done => {
                    if self.state == PipelineState::Running {
                        self.state = PipelineState::Finished;
                    }
                    return Event::Done;
                }
            }
        }
    }

    /// The staged step.
    pub fn head(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    pub fn head_mut(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.cursor)
    }

    /// Runs the staged step. The next [`Event::Next`] fires once it has
    /// finished, or right away for detached steps.
    pub async fn exec(&mut self) {
        if self.shared.lock().await.stopped {
            warn!("⚠️ Pipeline stopped, not executing further steps");
            return;
        }
        let Some(step) = self.head().cloned() else {
            return;
        };

        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        let pipe = self.pipe_tx.clone();
        let signal = self.signal_tx.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = run_step(engine, &step, pipe, Arc::clone(&shared)).await {
                warn!("⚠️ Step {} failed: {}", step.name, e);
                shared.lock().await.record(e);
            }
            // receiver only goes away with the pipeline itself
            let _ = signal.send(Signal::Finished);
        });
        self.tasks.push(task);
    }

    /// Passes over the staged step without contacting the engine.
    pub async fn skip(&mut self) {
        if let Some(step) = self.head() {
            debug!("⏭️ Skipping step {}", step.name);
        }
        self.step().await;
    }

    /// First failure observed by any step.
    pub async fn err(&self) -> Option<AppError> {
        self.shared.lock().await.err.clone()
    }

    /// Stops every running container and ends the pipeline.
    pub async fn stop(&mut self) {
        let containers = {
            let mut shared = self.shared.lock().await;
            if shared.stopped {
                return;
            }
            shared.stopped = true;
            shared.record(AppError::Terminated);
            shared.containers.clone()
        };

        info!("🛑 Stopping pipeline ({} containers)", containers.len());
        self.state = PipelineState::Stopped;
        for id in &containers {
            if let Err(e) = self.engine.container_stop(id).await {
                warn!("⚠️ Failed to stop container {}: {}", id, e);
            }
        }
        self.signal(Signal::Done);
    }

    /// Removes every container the pipeline created. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        for task in self.tasks.drain(..) {
            task.abort();
        }

        let containers = std::mem::take(&mut self.shared.lock().await.containers);
        debug!("🧹 Tearing down {} containers", containers.len());
        for id in containers {
            if let Err(e) = self.engine.container_remove(&id).await {
                warn!("⚠️ Failed to remove container {}: {}", id, e);
            }
        }
    }

    async fn step(&mut self) {
        self.cursor += 1;
        let stopped = self.shared.lock().await.stopped;
        if stopped || self.cursor >= self.steps.len() {
            self.signal(Signal::Done);
        } else {
            self.signal(Signal::Next);
        }
    }

    fn signal(&self, signal: Signal) {
        // both ends live in self
        let _ = self.signal_tx.send(signal);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        handle.spawn(async move {
            let containers = std::mem::take(&mut shared.lock().await.containers);
            for id in containers {
                if let Err(e) = engine.container_remove(&id).await {
                    warn!("⚠️ Failed to remove container {}: {}", id, e);
                }
            }
        });
    }
}

async fn run_step(
    engine: Arc<dyn Engine>,
    step: &Step,
    pipe: mpsc::Sender<Line>,
    shared: Arc<Mutex<Shared>>,
) -> Result<()> {
    info!("🔄 Executing step: {}", step.name);
    let id = engine.container_start(step).await?;

    let stopped = {
        let mut shared = shared.lock().await;
        shared.containers.push(id.clone());
        shared.stopped
    };
    if stopped {
        // stop() ran while the container was starting
        engine.container_stop(&id).await?;
    }

    let logs = tokio::spawn(stream_logs(
        Arc::clone(&engine),
        id.clone(),
        step.name.clone(),
        pipe,
    ));

    if step.detached {
        debug!("🧩 Step {} detached", step.name);
        return Ok(());
    }

    let state = engine.container_wait(&id).await?;
    if let Err(e) = logs.await {
        debug!("🔌 Log task for {} ended abnormally: {}", step.name, e);
    }

    if state.oom_killed {
        return Err(AppError::OomKilled {
            name: step.name.clone(),
        });
    }
    if state.exit_code != 0 {
        return Err(AppError::ExitError {
            name: step.name.clone(),
            code: state.exit_code,
        });
    }

    info!("✅ Step completed successfully: {}", step.name);
    Ok(())
}

async fn stream_logs(engine: Arc<dyn Engine>, id: String, name: String, pipe: mpsc::Sender<Line>) {
    let stream = match engine.container_logs(&id).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("⚠️ Unable to read logs for {}: {}", name, e);
            return;
        }
    };

    let started = Instant::now();
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut pos = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("⚠️ Log stream for {} failed: {}", name, e);
                break;
            }
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = Line {
            proc: name.clone(),
            pos,
            time: i64::try_from(started.elapsed().as_secs()).unwrap_or(i64::MAX),
            out: String::from_utf8_lossy(&buf).into_owned(),
        };
        pos += 1;

        if pipe.send(line).await.is_err() {
            break;
        }
    }
}
