use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("agent '{name}' already exists in this channel")]
    DuplicateAgent { name: String },

    #[error("credential error: {0}")]
    Crypto(#[from] CryptoError),
}
