use std::future::Future;

use notesync_core::{GatewayError, RemoteGateway};
use tracing::{info, warn};

use super::context::CycleContext;
use super::error::SyncError;
use super::model::{ShareStatus, now_millis};
use super::store::StoreTx;

/// Publishing notes through the remote service.
pub trait Shareable: Send + Sync {
    /// Publishes the note and records the public link.
    ///
    /// `share_date` is the date the server reported, if any; otherwise the
    /// current time is stored.
    fn share<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        note_id: i64,
        guid: &str,
        share_date: Option<i64>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Withdraws the public link on the server, then locally.
    fn stop_sharing<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        note_id: i64,
        guid: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Clears the local share fields only.
    fn clear_sharing(
        &self,
        tx: &mut StoreTx,
        note_id: i64,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoteSharing;

impl Shareable for NoteSharing {
    async fn share<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        note_id: i64,
        guid: &str,
        share_date: Option<i64>,
    ) -> Result<(), SyncError> {
        match ctx.gateway.share_note(guid).await {
            Ok(shared) => {
                let date = share_date.unwrap_or_else(now_millis);
                tx.set_note_share(note_id, ShareStatus::Shared, Some(date), Some(&shared.share_url))
                    .await?;
                info!(note_id, "note shared");
                Ok(())
            }
            Err(err) if err.is_retryable() || matches!(err, GatewayError::Auth(_)) => {
                Err(err.into())
            }
            Err(err) => {
                warn!(note_id, "share request refused: {err}");
                tx.set_note_share(note_id, ShareStatus::None, None, None)
                    .await?;
                Ok(())
            }
        }
    }

    async fn stop_sharing<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        note_id: i64,
        guid: &str,
    ) -> Result<(), SyncError> {
        match ctx.gateway.stop_sharing_note(guid).await {
            Ok(()) | Err(GatewayError::NotFound(_)) => {}
            Err(err) if err.is_retryable() || matches!(err, GatewayError::Auth(_)) => {
                return Err(err.into());
            }
            Err(err) => warn!(note_id, "stop sharing refused, clearing locally: {err}"),
        }
        self.clear_sharing(tx, note_id).await
    }

    async fn clear_sharing(&self, tx: &mut StoreTx, note_id: i64) -> Result<(), SyncError> {
        tx.set_note_share(note_id, ShareStatus::None, None, None)
            .await?;
        Ok(())
    }
}
