use thiserror::Error;
use zbus::{interface, object_server::SignalEmitter};

use crate::ids::{DBUS_ERROR_FAILED, DBUS_ERROR_INVALID_ARGUMENT, DBUS_ERROR_STOPPED};
use crate::sync::{SyncHandle, SyncInterval, WorkerError};

#[derive(Debug, Error)]
pub enum DbusServiceError {
    #[error("sync worker is not running")]
    Stopped,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation failed")]
    Failed,
}

impl From<WorkerError> for DbusServiceError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Stopped => DbusServiceError::Stopped,
        }
    }
}

pub fn dbus_error_name(err: &DbusServiceError) -> &'static str {
    match err {
        DbusServiceError::Stopped => DBUS_ERROR_STOPPED,
        DbusServiceError::InvalidArgument(_) => DBUS_ERROR_INVALID_ARGUMENT,
        DbusServiceError::Failed => DBUS_ERROR_FAILED,
    }
}

fn map_to_fdo(err: DbusServiceError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("{}: {}", dbus_error_name(&err), err))
}

/// `-1` selects manual mode; any other value must be a positive number of
/// seconds.
fn interval_from_dbus(secs: i64) -> Result<SyncInterval, DbusServiceError> {
    match secs {
        -1 => Ok(SyncInterval::Manual),
        secs if secs > 0 => Ok(SyncInterval::from_secs(secs)),
        other => Err(DbusServiceError::InvalidArgument(format!(
            "interval must be positive or -1, got {other}"
        ))),
    }
}

pub struct SyncDbusService {
    handle: SyncHandle,
}

impl SyncDbusService {
    pub fn new(handle: SyncHandle) -> Self {
        Self { handle }
    }
}

#[interface(name = "org.notesync.Sync1")]
impl SyncDbusService {
    async fn force_sync(&self) -> zbus::fdo::Result<()> {
        tracing::info!("dbus ForceSync");
        self.handle
            .force_sync()
            .map_err(|err| map_to_fdo(err.into()))
    }

    async fn sync_now(&self) -> zbus::fdo::Result<()> {
        tracing::info!("dbus SyncNow");
        self.handle.sync_now().map_err(|err| map_to_fdo(err.into()))
    }

    async fn cancel(&self) -> zbus::fdo::Result<()> {
        tracing::info!("dbus Cancel");
        self.handle.cancel();
        Ok(())
    }

    async fn set_interval(&self, secs: i64) -> zbus::fdo::Result<()> {
        let interval = interval_from_dbus(secs).map_err(map_to_fdo)?;
        tracing::info!(secs, "dbus SetInterval");
        self.handle
            .set_interval(interval)
            .map_err(|err| map_to_fdo(err.into()))
    }

    async fn get_status(&self) -> zbus::fdo::Result<(String, String)> {
        let status = self.handle.status().status;
        Ok((status.as_str().to_string(), status.detail()))
    }

    /// `last_sync` is milliseconds since the epoch, `0` before the first sync.
    async fn get_sync_state(&self) -> zbus::fdo::Result<(i64, i64, i64)> {
        let snapshot = self.handle.status();
        Ok((
            snapshot.local_usn,
            snapshot.remote_usn,
            snapshot.last_sync.unwrap_or(0),
        ))
    }

    #[zbus(signal)]
    pub async fn sync_state_changed(ctxt: &SignalEmitter<'_>, phase: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn data_changed(ctxt: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn status_changed(
        ctxt: &SignalEmitter<'_>,
        status: &str,
        detail: &str,
    ) -> zbus::Result<()>;
}
