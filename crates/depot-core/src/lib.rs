//! Depot Core Library
//!
//! This crate provides the value types shared by every part of the depot
//! storage abstraction: the capability flags, the file data model, uploads
//! with streaming hashing, the error taxonomy, settings intake and the
//! generic registry used for adapters and location transformers.
//!
//! The dispatch core itself (service contracts, the storage facade, the
//! transformer pipeline) lives in the `depot-storage` crate.

pub mod capability;
pub mod data;
pub mod error;
pub mod registry;
pub mod settings;
pub mod upload;

// Re-export commonly used types
pub use capability::Capability;
pub use data::{Extras, FileData, Location, OCTET_STREAM, UPLOADED_KEY};
pub use error::{StorageError, StorageResult};
pub use registry::{Registry, RegistryError};
pub use settings::{humanize_filesize, is_supported_type, parse_filesize, Settings};
pub use upload::{HashingReader, Upload, UploadSource, CHUNK_SIZE};
