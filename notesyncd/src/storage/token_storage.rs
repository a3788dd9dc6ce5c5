use keyring::Entry;
use thiserror::Error;

use crate::ids::KEYRING_SERVICE;

const TOKEN_KEY: &str = "notesync_token";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("keyring error: {0}")]
    KeyringError(#[from] keyring::Error),
    #[error("token not found")]
    TokenNotFound,
}

/// Access token kept in the desktop keyring.
pub struct TokenStorage {
    entry: Entry,
}

impl TokenStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            entry: Entry::new(KEYRING_SERVICE, TOKEN_KEY)?,
        })
    }

    pub fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.entry.set_password(token)?;
        Ok(())
    }

    pub fn get_token(&self) -> Result<String, StorageError> {
        match self.entry.get_password() {
            Ok(token) => Ok(token),
            Err(keyring::Error::NoEntry) => Err(StorageError::TokenNotFound),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn delete_token(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }
}

/// Picks the token from the environment first, then from the keyring.
pub(crate) fn pick_token(
    env_token: Option<String>,
    stored: impl FnOnce() -> Result<String, StorageError>,
) -> Result<String, StorageError> {
    match env_token.filter(|token| !token.trim().is_empty()) {
        Some(token) => Ok(token),
        None => stored(),
    }
}
