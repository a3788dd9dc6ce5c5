use std::time::Duration;

use notesync_core::GatewayError;
use thiserror::Error;

use super::blobs::BlobError;
use super::paths::PathError;
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("remote service unavailable: {0}")]
    Unavailable(String),
    #[error("sync cancelled")]
    Cancelled,
    #[error("remote error: {0}")]
    Remote(GatewayError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

impl SyncError {
    /// Interruptions pause the cycle; it resumes from the last committed batch.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. } | SyncError::Unavailable(_) | SyncError::Cancelled
        )
    }
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RateLimited { retry_after } => SyncError::RateLimited { retry_after },
            GatewayError::Unavailable(reason) => SyncError::Unavailable(reason),
            other => SyncError::Remote(other),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(StoreError::Sqlx(err))
    }
}
