use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::types::{
    ChunkRequest, NotePayload, NotebookPayload, RemoteNote, RemoteNotebook, RemoteTag, SharedNote,
    SyncChunk, SyncSummary, TagPayload,
};

/// Failure of a single remote call, already classified for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("rate limit reached, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("remote service unavailable: {0}")]
    Unavailable(String),
    #[error("remote entity not found: {0}")]
    NotFound(String),
    #[error("remote entity with the same name exists: {0}")]
    Duplicate(String),
    #[error("remote rejected request: {0}")]
    Rejected(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl GatewayError {
    /// Errors after which the same call may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Unavailable(_)
        )
    }
}

/// The set of remote calls the sync engine relies on.
///
/// Timeouts are the implementation's concern; callers only see success,
/// `RateLimited` or `Unavailable` (plus the permanent rejections).
pub trait RemoteGateway: Send + Sync {
    fn get_sync_summary(&self) -> impl Future<Output = Result<SyncSummary, GatewayError>> + Send;

    fn fetch_changes(
        &self,
        request: ChunkRequest,
    ) -> impl Future<Output = Result<SyncChunk, GatewayError>> + Send;

    fn fetch_note(&self, guid: &str)
    -> impl Future<Output = Result<RemoteNote, GatewayError>> + Send;

    fn fetch_blob(&self, guid: &str) -> impl Future<Output = Result<Vec<u8>, GatewayError>> + Send;

    fn create_notebook(
        &self,
        payload: &NotebookPayload,
    ) -> impl Future<Output = Result<RemoteNotebook, GatewayError>> + Send;

    fn update_notebook(
        &self,
        payload: &NotebookPayload,
    ) -> impl Future<Output = Result<RemoteNotebook, GatewayError>> + Send;

    fn delete_notebook(&self, guid: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn create_tag(
        &self,
        payload: &TagPayload,
    ) -> impl Future<Output = Result<RemoteTag, GatewayError>> + Send;

    fn update_tag(
        &self,
        payload: &TagPayload,
    ) -> impl Future<Output = Result<RemoteTag, GatewayError>> + Send;

    fn delete_tag(&self, guid: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn create_note(
        &self,
        payload: &NotePayload,
    ) -> impl Future<Output = Result<RemoteNote, GatewayError>> + Send;

    fn update_note(
        &self,
        payload: &NotePayload,
    ) -> impl Future<Output = Result<RemoteNote, GatewayError>> + Send;

    fn delete_note(&self, guid: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn share_note(&self, guid: &str)
    -> impl Future<Output = Result<SharedNote, GatewayError>> + Send;

    fn stop_sharing_note(&self, guid: &str)
    -> impl Future<Output = Result<(), GatewayError>> + Send;
}
