use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notesync_core::RemoteGateway;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::config::SyncInterval;
use super::context::StatusSnapshot;
use super::orchestrator::{CycleOutcome, SyncOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Sync { force_full: bool },
    SetInterval(SyncInterval),
    Stop,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("sync worker has stopped")]
    Stopped,
}

/// Background task that runs one sync cycle at a time.
pub struct SyncWorker {
    handle: SyncHandle,
    task: JoinHandle<()>,
}

impl SyncWorker {
    pub fn spawn<G>(orchestrator: Arc<SyncOrchestrator<G>>) -> Self
    where
        G: RemoteGateway + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let handle = SyncHandle {
            commands,
            current: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
            status: orchestrator.subscribe_status(),
        };
        let task = tokio::spawn(worker_loop(
            orchestrator,
            rx,
            Arc::clone(&handle.current),
            handle.shutdown.clone(),
        ));
        Self { handle, task }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Waits for the worker loop to exit after `stop`.
    pub async fn wait(self) {
        if let Err(err) = self.task.await {
            error!("sync worker task failed: {err}");
        }
    }
}

/// Cloneable control surface for a running worker.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
    status: watch::Receiver<StatusSnapshot>,
}

impl SyncHandle {
    /// Incremental cycle, as on a timer tick or after the token changed.
    pub fn sync_now(&self) -> Result<(), WorkerError> {
        self.send(WorkerCommand::Sync { force_full: false })
    }

    pub fn force_sync(&self) -> Result<(), WorkerError> {
        self.send(WorkerCommand::Sync { force_full: true })
    }

    pub fn set_interval(&self, interval: SyncInterval) -> Result<(), WorkerError> {
        self.send(WorkerCommand::SetInterval(interval))
    }

    /// Abandons the running cycle (or the pause before its retry) after the
    /// in-flight remote call returns. The worker keeps running.
    pub fn cancel(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = current.as_ref() {
            token.cancel();
        }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
        let _ = self.commands.send(WorkerCommand::Stop);
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    fn send(&self, command: WorkerCommand) -> Result<(), WorkerError> {
        if self.shutdown.is_cancelled() {
            return Err(WorkerError::Stopped);
        }
        self.commands
            .send(command)
            .map_err(|_| WorkerError::Stopped)
    }
}

async fn worker_loop<G: RemoteGateway>(
    orchestrator: Arc<SyncOrchestrator<G>>,
    mut rx: mpsc::UnboundedReceiver<WorkerCommand>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
) {
    let mut interval = orchestrator.config().interval;
    info!(interval_secs = interval.as_secs(), "sync worker started");
    loop {
        let mut force_full = false;
        tokio::select! {
            _ = shutdown.cancelled() => break,
            command = rx.recv() => match command {
                None | Some(WorkerCommand::Stop) => break,
                Some(WorkerCommand::SetInterval(next)) => {
                    debug!(interval_secs = next.as_secs(), "sync interval changed");
                    interval = next;
                    continue;
                }
                Some(WorkerCommand::Sync { force_full: full }) => force_full = full,
            },
            _ = tick(interval) => {}
        }

        // Requests queued while idle collapse into this cycle.
        let mut stopping = false;
        while let Ok(command) = rx.try_recv() {
            match command {
                WorkerCommand::Sync { force_full: full } => force_full |= full,
                WorkerCommand::SetInterval(next) => interval = next,
                WorkerCommand::Stop => stopping = true,
            }
        }
        if stopping {
            break;
        }

        if !run_until_settled(&orchestrator, force_full, &current, &shutdown).await {
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(orchestrator.config().idle_pause) => {}
        }
    }
    info!("sync worker stopped");
}

async fn tick(interval: SyncInterval) {
    match interval {
        SyncInterval::Every(period) => tokio::time::sleep(period).await,
        SyncInterval::Manual => std::future::pending::<()>().await,
    }
}

/// Runs the cycle and, after rate limits or connectivity errors, waits and
/// resumes it. Returns false when the worker is shutting down.
async fn run_until_settled<G: RemoteGateway>(
    orchestrator: &SyncOrchestrator<G>,
    mut force_full: bool,
    current: &Mutex<Option<CancellationToken>>,
    shutdown: &CancellationToken,
) -> bool {
    loop {
        let token = shutdown.child_token();
        set_current(current, Some(token.clone()));
        let outcome = orchestrator.run_cycle(force_full, &token).await;
        let pause = match outcome {
            Ok(CycleOutcome::Completed(_)) | Ok(CycleOutcome::Cancelled) => None,
            Ok(CycleOutcome::RateLimited { retry_after }) => Some(retry_after),
            Ok(CycleOutcome::Unavailable { .. }) => Some(orchestrator.config().connect_retry),
            Err(err) => {
                error!("sync cycle aborted: {err}");
                None
            }
        };
        let Some(pause) = pause else {
            set_current(current, None);
            return !shutdown.is_cancelled();
        };
        if !wait_or_cancel(pause, &token).await {
            set_current(current, None);
            return !shutdown.is_cancelled();
        }
        force_full = false;
    }
}

async fn wait_or_cancel(pause: Duration, token: &CancellationToken) -> bool {
    debug!(pause_secs = pause.as_secs(), "waiting before resuming sync cycle");
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(pause) => true,
    }
}

fn set_current(current: &Mutex<Option<CancellationToken>>, token: Option<CancellationToken>) {
    *current.lock().unwrap_or_else(PoisonError::into_inner) = token;
}
