use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notesync_core::NoteStoreClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::connection::Builder as ConnectionBuilder;
use zbus::object_server::SignalEmitter;

use crate::dbus_api::SyncDbusService;
use crate::ids::{DBUS_NAME_SYNC, DBUS_OBJECT_PATH_SYNC};
use crate::storage::{TokenStorage, pick_token};
use crate::sync::config::{DEFAULT_BATCH_SIZE, DEFAULT_CONNECT_RETRY, DEFAULT_SYNC_INTERVAL};
use crate::sync::{
    CycleOutcome, LocalStore, SyncConfig, SyncEvent, SyncInterval, SyncObserver, SyncOrchestrator,
    SyncWorker,
};

const DATA_DIR_NAME: &str = "notesync";
const DB_FILE_NAME: &str = "sync.db";
const BLOB_DIR_NAME: &str = "blobs";

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub base_url: Option<String>,
    pub web_url: Option<String>,
    pub interval: SyncInterval,
    pub connect_retry: Duration,
    pub batch_size: u32,
    pub full_sync_on_force: bool,
    pub honor_full_sync_before: bool,
    pub enable_dbus: bool,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let data_dir = std::env::var("NOTESYNC_DATA_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_data_dir);
        let interval = read_interval_env(
            "NOTESYNC_SYNC_INTERVAL_SECS",
            SyncInterval::Every(DEFAULT_SYNC_INTERVAL),
        );
        let connect_retry = Duration::from_secs(read_u64_env(
            "NOTESYNC_CONNECT_RETRY_SECS",
            DEFAULT_CONNECT_RETRY.as_secs(),
        ));
        let batch_size = u32::try_from(read_u64_env(
            "NOTESYNC_BATCH_SIZE",
            u64::from(DEFAULT_BATCH_SIZE),
        ))
        .context("NOTESYNC_BATCH_SIZE is out of range")?;

        Ok(Self {
            data_dir,
            base_url: read_string_env("NOTESYNC_BASE_URL"),
            web_url: read_string_env("NOTESYNC_WEB_URL"),
            interval,
            connect_retry,
            batch_size,
            full_sync_on_force: read_bool_env("NOTESYNC_FULL_SYNC_ON_FORCE", true),
            honor_full_sync_before: read_bool_env("NOTESYNC_HONOR_FULL_SYNC_BEFORE", true),
            enable_dbus: read_bool_env("NOTESYNC_ENABLE_DBUS", true),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(self.data_dir.join(BLOB_DIR_NAME));
        config.interval = self.interval;
        config.connect_retry = self.connect_retry;
        config.batch_size = self.batch_size;
        config.full_sync_on_force = self.full_sync_on_force;
        config.honor_full_sync_before = self.honor_full_sync_before;
        config
    }
}

/// Forwards engine events to the async side, where D-Bus signals are sent.
struct ChannelObserver {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncObserver for ChannelObserver {
    fn on_event(&self, event: &SyncEvent) {
        let _ = self.tx.send(event.clone());
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    orchestrator: Arc<SyncOrchestrator<NoteStoreClient>>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("failed to create data dir at {:?}", config.data_dir))?;

        let token = resolve_token()?;
        let client = build_client(&config, token)?;
        let store = LocalStore::open(&config.db_path())
            .await
            .context("failed to open local store")?;

        let (tx, events) = mpsc::unbounded_channel();
        let orchestrator = SyncOrchestrator::new(client, store, config.sync_config())
            .with_observer(Arc::new(ChannelObserver { tx }));
        orchestrator
            .publish_persisted_state()
            .await
            .context("failed to read sync state")?;

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            events,
        })
    }

    /// Runs a single cycle in the foreground and returns.
    pub async fn run_once(self, force_full: bool) -> anyhow::Result<()> {
        let outcome = self
            .orchestrator
            .run_cycle(force_full, &CancellationToken::new())
            .await?;
        match outcome {
            CycleOutcome::Completed(summary) => {
                info!(
                    local_usn = summary.local_usn,
                    full = summary.full,
                    "sync finished"
                );
                Ok(())
            }
            CycleOutcome::RateLimited { retry_after } => {
                anyhow::bail!("rate limited, retry in {}s", retry_after.as_secs())
            }
            CycleOutcome::Unavailable { reason } => anyhow::bail!("service unavailable: {reason}"),
            CycleOutcome::Cancelled => anyhow::bail!("sync cancelled"),
        }
    }

    pub async fn run(self, force_full: bool) -> anyhow::Result<()> {
        let Self {
            config,
            orchestrator,
            mut events,
        } = self;
        info!(
            data_dir = %config.data_dir.display(),
            interval_secs = config.interval.as_secs(),
            dbus = config.enable_dbus,
            "notesyncd started"
        );

        let worker = SyncWorker::spawn(orchestrator);
        let handle = worker.handle();

        let dbus_connection = if config.enable_dbus {
            let connection = ConnectionBuilder::session()?
                .name(DBUS_NAME_SYNC)?
                .serve_at(DBUS_OBJECT_PATH_SYNC, SyncDbusService::new(handle.clone()))?
                .build()
                .await
                .context("failed to start D-Bus object server")?;
            Some(connection)
        } else {
            None
        };

        let signal_emitter = match &dbus_connection {
            Some(connection) => Some(
                SignalEmitter::new(connection, DBUS_OBJECT_PATH_SYNC)
                    .context("failed to create D-Bus signal emitter")?
                    .into_owned(),
            ),
            None => None,
        };
        let signal_handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(emitter) = &signal_emitter else {
                    continue;
                };
                if let Err(err) = emit_signal(emitter, &event).await {
                    warn!("failed to emit D-Bus signal: {err}");
                }
            }
        });

        if force_full {
            handle.force_sync()?;
        } else {
            handle.sync_now()?;
        }

        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;
        info!("shutdown requested");

        handle.stop();
        worker.wait().await;
        signal_handle.abort();
        drop(dbus_connection);
        Ok(())
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
