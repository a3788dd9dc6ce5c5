use sqlx::Row;

use super::{StoreError, StoreTx, flag};

/// Persistent cursor of the sync protocol plus rate-limit bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub local_usn: i64,
    pub remote_usn: i64,
    pub last_sync: Option<i64>,
    pub need_full_sync: bool,
    pub server_time: Option<i64>,
    pub full_sync_before: i64,
    pub uploaded_bytes: i64,
    pub rate_limit_until: Option<i64>,
    pub connect_error_count: i64,
}

impl StoreTx {
    pub async fn load_sync_state(&mut self) -> Result<SyncState, StoreError> {
        let row = sqlx::query(
            "SELECT local_usn, remote_usn, last_sync, need_full_sync, server_time,
                    full_sync_before, uploaded_bytes, rate_limit_until, connect_error_count
             FROM sync_state WHERE id = 1",
        )
        .fetch_optional(&mut *self.tx)
        .await?;
        let Some(row) = row else {
            return Ok(SyncState::default());
        };
        let need_full_sync: i64 = row.try_get("need_full_sync")?;
        Ok(SyncState {
            local_usn: row.try_get("local_usn")?,
            remote_usn: row.try_get("remote_usn")?,
            last_sync: row.try_get("last_sync")?,
            need_full_sync: need_full_sync != 0,
            server_time: row.try_get("server_time")?,
            full_sync_before: row.try_get("full_sync_before")?,
            uploaded_bytes: row.try_get("uploaded_bytes")?,
            rate_limit_until: row.try_get("rate_limit_until")?,
            connect_error_count: row.try_get("connect_error_count")?,
        })
    }

    pub async fn save_sync_state(&mut self, state: &SyncState) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_state (
                id, local_usn, remote_usn, last_sync, need_full_sync, server_time,
                full_sync_before, uploaded_bytes, rate_limit_until, connect_error_count
             )
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                local_usn = excluded.local_usn,
                remote_usn = excluded.remote_usn,
                last_sync = excluded.last_sync,
                need_full_sync = excluded.need_full_sync,
                server_time = excluded.server_time,
                full_sync_before = excluded.full_sync_before,
                uploaded_bytes = excluded.uploaded_bytes,
                rate_limit_until = excluded.rate_limit_until,
                connect_error_count = excluded.connect_error_count",
        )
        .bind(state.local_usn)
        .bind(state.remote_usn)
        .bind(state.last_sync)
        .bind(flag(state.need_full_sync))
        .bind(state.server_time)
        .bind(state.full_sync_before)
        .bind(state.uploaded_bytes)
        .bind(state.rate_limit_until)
        .bind(state.connect_error_count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
