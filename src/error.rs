//! Error types for itemflow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// The version marker presented on write no longer matches the stored one.
    #[error("version conflict on item {0}")]
    VersionConflict(String),

    /// Every conditional write lost its race; the item is unchanged.
    #[error("gave up updating item {key} after {attempts} conflicting attempt(s)")]
    ConcurrencyExhausted { key: String, attempts: u32 },

    #[error("communication failure: {0}")]
    Communication(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid index query: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures talking to the repository or the index.
    pub fn is_communication(&self) -> bool {
        match self {
            Error::Communication(_) => true,
            Error::Database(sqlx::Error::RowNotFound) => false,
            Error::Database(_) => true,
            _ => false,
        }
    }

    /// True when retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::VersionConflict(_) | Error::ConcurrencyExhausted { .. }
        ) || self.is_communication()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
