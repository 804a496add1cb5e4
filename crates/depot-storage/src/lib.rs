//! Depot Storage Library
//!
//! This crate provides the backend-facing half of depot: the service
//! contracts a backend adapter implements ([`Uploader`], [`Reader`],
//! [`Manager`]), the capability-checked [`Storage`] facade callers talk to,
//! the location transformer pipeline and the adapter factory.
//!
//! # Locations
//!
//! A location is an opaque, backend-defined address. The facade runs every
//! incoming location through the transformers named in settings before any
//! backend call; the `safe_relative_path` built-in rejects locations that
//! would resolve outside the storage root.

pub mod factory;
#[cfg(feature = "storage-memory")]
pub mod memory;
pub mod storage;
pub mod traits;
pub mod transformers;

// Re-export commonly used types
pub use depot_core::{
    Capability, Extras, FileData, Location, Settings, StorageError, StorageResult, Upload,
};
pub use factory::{make_storage, Extension, Plugins, StorageAdapter};
#[cfg(feature = "storage-memory")]
pub use memory::MemoryAdapter;
pub use storage::Storage;
pub use traits::{ByteStream, LocationStream, Manager, Reader, SignedAction, StorageService, Uploader};
pub use transformers::{register_builtin_transformers, LocationTransformer};
