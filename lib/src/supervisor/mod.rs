//! Lifecycle of the one renderer process allowed to drive the matrix.
//!
//! Every transition happens under a single async mutex, so two concurrent
//! `start` calls are strictly ordered: the second one only begins after the
//! first has fully stopped the previous renderer and spawned its own.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::command::{RendererInvocation, RendererKind};

#[cfg(any(test, feature = "fake-renderer"))]
pub mod fake;

/// How long a renderer gets to exit after SIGTERM before it is killed.
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running renderer, as seen by the supervisor.
#[async_trait]
pub trait RendererProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Asks the process to exit (SIGTERM).
    fn terminate(&mut self) -> io::Result<()>;

    /// Kills the process unconditionally (SIGKILL). Does not wait.
    fn kill(&mut self) -> io::Result<()>;

    /// Returns true if the process has already exited.
    fn try_wait(&mut self) -> io::Result<bool>;

    async fn wait(&mut self) -> io::Result<()>;
}

pub trait Launcher: Send + Sync {
    fn launch(&self, invocation: &RendererInvocation) -> io::Result<Box<dyn RendererProcess>>;
}

/// Spawns the real renderer binaries.
pub struct CommandLauncher {
    text_program: PathBuf,
    image_program: PathBuf,
}

impl CommandLauncher {
    pub fn new(text_program: impl Into<PathBuf>, image_program: impl Into<PathBuf>) -> Self {
        Self {
            text_program: text_program.into(),
            image_program: image_program.into(),
        }
    }

    fn program(&self, kind: RendererKind) -> &PathBuf {
        match kind {
            RendererKind::Text => &self.text_program,
            RendererKind::Image => &self.image_program,
        }
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, invocation: &RendererInvocation) -> io::Result<Box<dyn RendererProcess>> {
        let child = Command::new(self.program(invocation.kind()))
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(ChildProcess(child)))
    }
}

struct ChildProcess(Child);

#[async_trait]
impl RendererProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    fn terminate(&mut self) -> io::Result<()> {
        // no pid means tokio already reaped it
        let Some(pid) = self.0.id() else {
            return Ok(());
        };
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        Ok(self.0.try_wait()?.is_some())
    }

    async fn wait(&mut self) -> io::Result<()> {
        self.0.wait().await.map(|_| ())
    }
}

/// Read-only view of the active renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub pid: Option<u32>,
    pub started_at: DateTime<Local>,
    pub invocation: RendererInvocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The renderer exited after SIGTERM.
    Graceful,
    /// The renderer ignored SIGTERM and was killed.
    Forced,
    /// The renderer had already exited on its own.
    AlreadyExited,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start {kind:?} renderer: {source}")]
    Spawn {
        kind: RendererKind,
        #[source]
        source: io::Error,
    },
}

struct ActiveProcess {
    process: Box<dyn RendererProcess>,
    started_at: DateTime<Local>,
    invocation: RendererInvocation,
}

impl ActiveProcess {
    fn status(&self) -> ProcessStatus {
        ProcessStatus {
            pid: self.process.id(),
            started_at: self.started_at,
            invocation: self.invocation.clone(),
        }
    }
}

pub struct Supervisor {
    launcher: Arc<dyn Launcher>,
    active: Mutex<Option<ActiveProcess>>,
    stop_timeout: Duration,
}

impl Supervisor {
    pub fn new(launcher: impl Launcher + 'static) -> Self {
        Self {
            launcher: Arc::new(launcher),
            active: Mutex::new(None),
            stop_timeout: GRACEFUL_STOP_TIMEOUT,
        }
    }

    /// Stops whatever is running, then spawns `invocation`.
    ///
    /// If the spawn fails the supervisor is left idle; the previous renderer
    /// is not brought back.
    pub async fn start(
        &self,
        invocation: RendererInvocation,
    ) -> Result<ProcessStatus, SupervisorError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            stop_process(previous, self.stop_timeout).await;
        }

        let process = self.launcher.launch(&invocation).map_err(|source| {
            error!("failed to spawn {:?} renderer: {source}", invocation.kind());
            SupervisorError::Spawn {
                kind: invocation.kind(),
                source,
            }
        })?;

        let started = ActiveProcess {
            process,
            started_at: Local::now(),
            invocation,
        };
        let status = started.status();
        info!(
            "started {:?} renderer (pid {:?})",
            status.invocation.kind(),
            status.pid
        );
        *active = Some(started);
        Ok(status)
    }

    /// Stops the active renderer, if any. Returns `None` when idle.
    pub async fn stop(&self) -> Option<StopOutcome> {
        let mut active = self.active.lock().await;
        let previous = active.take()?;
        Some(stop_process(previous, self.stop_timeout).await)
    }

    /// The active renderer, if one is still running. A renderer that has
    /// exited on its own is reaped here and the supervisor becomes idle.
    pub async fn status(&self) -> Option<ProcessStatus> {
        let mut active = self.active.lock().await;
        let exited = match active.as_mut() {
            Some(current) => current.process.try_wait().unwrap_or_else(|e| {
                warn!("failed to poll renderer: {e}");
                false
            }),
            None => return None,
        };
        if exited {
            info!("renderer exited on its own");
            *active = None;
            return None;
        }
        active.as_ref().map(ActiveProcess::status)
    }

    /// Final stop on service exit, so no renderer outlives the daemon.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Some(outcome) => info!("renderer stopped on shutdown ({outcome:?})"),
            None => info!("no renderer running at shutdown"),
        }
    }
}

async fn stop_process(mut active: ActiveProcess, timeout: Duration) -> StopOutcome {
    let process = &mut active.process;
    let pid = process.id();

    if let Ok(true) = process.try_wait() {
        info!("renderer (pid {pid:?}) had already exited");
        return StopOutcome::AlreadyExited;
    }

    if let Err(e) = process.terminate() {
        warn!("failed to send SIGTERM to renderer (pid {pid:?}): {e}");
    }
    match tokio::time::timeout(timeout, process.wait()).await {
        Ok(Ok(())) => {
            info!("renderer (pid {pid:?}) stopped");
            return StopOutcome::Graceful;
        }
        Ok(Err(e)) => warn!("failed waiting for renderer (pid {pid:?}): {e}, killing it"),
        Err(_) => warn!(
            "renderer (pid {pid:?}) still running {}s after SIGTERM, killing it",
            timeout.as_secs()
        ),
    }

    if let Err(e) = process.kill() {
        warn!("failed to kill renderer (pid {pid:?}): {e}");
    }
    if let Err(e) = process.wait().await {
        error!("failed to reap renderer (pid {pid:?}): {e}");
    }
    StopOutcome::Forced
}
