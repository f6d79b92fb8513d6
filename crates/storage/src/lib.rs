//! Storage Layer
//!
//! Schemaless JSON document collections. SQLite (via sqlx) when a database
//! URL is configured and reachable, an in-memory store otherwise.

mod filter;
mod repository;

pub use filter::Filter;
pub use repository::{Document, Repository};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}
