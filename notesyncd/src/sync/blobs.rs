use std::io;
use std::path::{Path, PathBuf};

use md5::Context;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("blob integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

pub fn md5_hex(body: &[u8]) -> String {
    let mut ctx = Context::new();
    ctx.consume(body);
    format!("{:x}", ctx.compute())
}

/// Blob file changes made alongside one store transaction.
///
/// Staged files are already in place; `rollback` removes them again.
/// Doomed files stay until `commit`, so a rolled back delete keeps its blob.
#[derive(Debug, Default)]
pub struct BlobJournal {
    staged: Vec<PathBuf>,
    doomed: Vec<PathBuf>,
}

impl BlobJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies `body` against `expected_md5` and writes it to `target`.
    ///
    /// Returns `false` when an identical file was already in place.
    pub async fn stage(
        &mut self,
        target: &Path,
        body: &[u8],
        expected_md5: &str,
    ) -> Result<bool, BlobError> {
        let expected_md5 = expected_md5.to_ascii_lowercase();
        let actual_md5 = md5_hex(body);
        if actual_md5 != expected_md5 {
            return Err(BlobError::IntegrityMismatch {
                expected_md5,
                actual_md5,
            });
        }
        self.doomed.retain(|path| path != target);
        if tokio::fs::try_exists(target).await? {
            return Ok(false);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let mut file = tokio::fs::File::create(&partial).await?;
        file.write_all(body).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&partial, target).await?;

        self.staged.push(target.to_path_buf());
        Ok(true)
    }

    /// Schedules a blob for removal once the transaction commits.
    pub fn doom(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.doomed.contains(&path) {
            self.doomed.push(path);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.doomed.is_empty()
    }

    pub async fn commit(self) {
        for path in self.doomed {
            remove_blob(&path).await;
        }
    }

    pub async fn rollback(self) {
        for path in self.staged {
            remove_blob(&path).await;
        }
    }
}

async fn remove_blob(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed blob");
            // Per-hash directories are left empty once their only file is gone.
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), "failed to remove blob: {err}"),
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
