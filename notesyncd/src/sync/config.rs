use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CONNECT_RETRY: Duration = Duration::from_secs(30);
pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const IDLE_PAUSE: Duration = Duration::from_secs(1);

/// When the worker starts a cycle on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncInterval {
    Every(Duration),
    Manual,
}

impl SyncInterval {
    /// `0` or a negative value selects manual mode.
    pub fn from_secs(secs: i64) -> Self {
        if secs <= 0 {
            SyncInterval::Manual
        } else {
            SyncInterval::Every(Duration::from_secs(secs as u64))
        }
    }

    pub fn as_secs(self) -> i64 {
        match self {
            SyncInterval::Every(period) => period.as_secs() as i64,
            SyncInterval::Manual => -1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub blob_root: PathBuf,
    pub batch_size: u32,
    pub connect_retry: Duration,
    /// `force_sync` re-enumerates everything instead of pulling increments.
    pub full_sync_on_force: bool,
    /// Run a full pull when the server declares its `full_sync_before`
    /// threshold newer than the last successful sync.
    pub honor_full_sync_before: bool,
    pub idle_pause: Duration,
    pub interval: SyncInterval,
}

impl SyncConfig {
    pub fn new(blob_root: impl Into<PathBuf>) -> Self {
        Self {
            blob_root: blob_root.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_retry: DEFAULT_CONNECT_RETRY,
            full_sync_on_force: true,
            honor_full_sync_before: true,
            idle_pause: IDLE_PAUSE,
            interval: SyncInterval::Every(DEFAULT_SYNC_INTERVAL),
        }
    }
}
