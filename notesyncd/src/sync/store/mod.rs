use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Sqlite, SqlitePool, Transaction, migrate::Migrator};
use thiserror::Error;

mod linked;
mod notebooks;
mod notes;
mod resources;
mod searches;
mod sync_state;
mod tags;

pub use sync_state::SyncState;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pending action: {0}")]
    InvalidAction(String),
    #[error("invalid share status: {0}")]
    InvalidShareStatus(String),
    #[error("{table} row {id} does not exist")]
    MissingRow { table: &'static str, id: i64 },
}

/// Local mirror of the remote account, backed by SQLite.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Runs migrations and makes sure a default notebook exists.
    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        let mut tx = self.begin().await?;
        tx.ensure_default_notebook().await?;
        tx.commit().await
    }

    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    /// Convenience read outside of a cycle.
    pub async fn sync_state(&self) -> Result<SyncState, StoreError> {
        let mut tx = self.begin().await?;
        let state = tx.load_sync_state().await?;
        tx.commit().await?;
        Ok(state)
    }
}

/// One unit of work against the store; dropped without `commit` it rolls back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn flag(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
