mod token_storage;

pub(crate) use token_storage::pick_token;

pub use token_storage::{StorageError, TokenStorage};
