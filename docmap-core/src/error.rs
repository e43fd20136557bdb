//! Error types and result types for document mapping operations.
//!
//! This module provides the error taxonomy shared by every crate in the workspace.
//! Use [`DocumentResult<T>`] as the return type for fallible operations.
//!
//! "Not found" is never represented here: lookups return `Option` and
//! paginated queries return an empty [`Page`](crate::page::Page).

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when mapping documents to a store.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The caller supplied contradictory or structurally invalid parameters.
    ///
    /// Surfaced synchronously, before any store call is issued, and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The store rejected an insert. Raised by the insert path of a save and
    /// absorbed by the save flow itself.
    #[error("Insert failed in collection {1}: {0}")]
    Insert(String, String),
    /// An error occurred in the underlying store during a find, update, delete or count.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A raw record field could not be absorbed into a typed entity field.
    /// The first argument is the field name.
    #[error("Could not hydrate field {0}: {1}")]
    Hydration(String, String),
    /// An identifier in a filter could not be coerced into an ObjectId.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The in-memory backend does not interpret the given operator or pipeline stage.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error during provider initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// A specialized `Result` type for document mapping operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

impl DocumentError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        DocumentError::Configuration(message.into())
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        DocumentError::Backend(message.into())
    }

    /// Returns `true` if this error reports a caller contract violation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DocumentError::Configuration(_))
    }
}

impl From<BsonError> for DocumentError {
    fn from(err: BsonError) -> Self {
        DocumentError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentError::Serialization(err.to_string())
    }
}
