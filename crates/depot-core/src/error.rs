//! Error types for storage operations.
//!
//! Capability and configuration errors are produced before any backend call.
//! Backend failures are classified into this taxonomy only where the core can
//! do so with confidence; everything else is wrapped in [`StorageError::Backend`]
//! with just enough context (storage name, location) for diagnosis.

use crate::data::Location;

/// Storage operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Operation is excluded from the effective capability set. The backend
    /// was never contacted.
    #[error("Operation {operation} is not supported by {storage} storage")]
    Unsupported { storage: String, operation: String },

    #[error("Storage adapter {0} is not registered")]
    UnknownAdapter(String),

    #[error("Unknown location transformer {0}")]
    UnknownTransformer(String),

    #[error("Cannot initialize storage {name}: {problem}")]
    InvalidConfiguration { name: String, problem: String },

    #[error("Cannot initialize storage {name}: {option} option is required")]
    MissingConfiguration { name: String, option: String },

    /// The transformer pipeline rejected the proposed location.
    #[error("Cannot use location {location}: {problem}")]
    Location { location: Location, problem: String },

    #[error("File {location} does not exist inside storage {storage}")]
    MissingFile { storage: String, location: Location },

    #[error("File {location} already exists inside storage {storage}")]
    ExistingFile { storage: String, location: Location },

    #[error("Upload size {actual} surpasses max allowed size {limit}")]
    LargeUpload { actual: u64, limit: u64 },

    /// A multipart fragment would advance the position past the declared size.
    #[error("Upload size {actual} exceeds expected size {expected}")]
    UploadOutOfBound { actual: u64, expected: u64 },

    #[error("Actual value of upload size ({actual}) does not match expected value ({expected})")]
    UploadSizeMismatch { actual: u64, expected: u64 },

    #[error("Actual value of content type ({actual}) does not match expected value ({expected})")]
    UploadTypeMismatch { actual: String, expected: String },

    #[error("Actual value of content hash ({actual}) does not match expected value ({expected})")]
    UploadHashMismatch { actual: String, expected: String },

    #[error("Type {0} is not supported by storage")]
    WrongUploadType(String),

    #[error("{storage} rejected upload: {problem}")]
    Content { storage: String, problem: String },

    /// Unclassified backend failure, re-surfaced with the storage name and
    /// the location it happened at.
    #[error("Storage {storage} backend failure: {source}")]
    Backend {
        storage: String,
        location: Option<Location>,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn missing_file(storage: impl Into<String>, location: &Location) -> Self {
        StorageError::MissingFile {
            storage: storage.into(),
            location: location.clone(),
        }
    }

    pub fn existing_file(storage: impl Into<String>, location: &Location) -> Self {
        StorageError::ExistingFile {
            storage: storage.into(),
            location: location.clone(),
        }
    }

    pub fn location(location: Location, problem: impl Into<String>) -> Self {
        StorageError::Location {
            location,
            problem: problem.into(),
        }
    }

    pub fn unsupported(storage: impl Into<String>, operation: impl Into<String>) -> Self {
        StorageError::Unsupported {
            storage: storage.into(),
            operation: operation.into(),
        }
    }

    pub fn backend(
        storage: impl Into<String>,
        location: Option<&Location>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        StorageError::Backend {
            storage: storage.into(),
            location: location.cloned(),
            source: source.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
