//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB reported a failure
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to encode record: {0}")]
    Serialization(String),

    /// Stored bytes no longer match the record type
    #[error("Failed to decode record: {0}")]
    Deserialization(String),

    /// Column family not created at open time
    #[error("Unknown column family: {0}")]
    InvalidColumnFamily(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
