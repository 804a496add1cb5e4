//! Service contracts implemented by backend adapters.
//!
//! A backend adapter provides three role-scoped services: an [`Uploader`]
//! that writes data, a [`Reader`] that streams it back and a [`Manager`] for
//! maintenance operations. Each service declares the capability subset it
//! implements independently of which methods exist; a method may be present
//! but excluded from the declared set, which is how a backend is turned
//! read-only or otherwise restricted without changing code.
//!
//! Methods a backend does not implement fall back to default bodies that
//! fail with an unsupported-operation error. The facade normally refuses
//! such calls before they ever reach the service.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use depot_core::{Capability, Extras, FileData, Location, StorageError, StorageResult, Upload};

/// Lazy, forward-only, single-pass sequence of byte chunks.
///
/// Consuming it is the caller's responsibility; it must not be replayed
/// without re-invoking `stream`.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Lazy sequence of all locations known to a storage.
pub type LocationStream = Pin<Box<dyn Stream<Item = StorageResult<Location>> + Send>>;

/// Action a signed URL authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedAction {
    Upload,
    Download,
    Delete,
}

impl fmt::Display for SignedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignedAction::Upload => write!(f, "upload"),
            SignedAction::Download => write!(f, "download"),
            SignedAction::Delete => write!(f, "delete"),
        }
    }
}

/// Base contract of all storage services.
pub trait StorageService: Send + Sync {
    /// Operations actually implemented by this service.
    fn capabilities(&self) -> Capability {
        Capability::NONE
    }

    /// Storage name used in diagnostics.
    fn name(&self) -> &str {
        "storage"
    }
}

/// Service responsible for writing data into a storage.
///
/// The facade calls methods of this service after its capability gate; e.g.
/// `Storage::upload(location, upload, extras)` results in
/// `Uploader::upload(location, upload, extras)`.
#[async_trait]
pub trait Uploader: StorageService {
    /// Write the full byte source to `location` in a single pass.
    ///
    /// If `override_existing` is disabled and an object already occupies the
    /// location, fails with an existing-file error before any bytes are
    /// written. The returned record carries the integrity hash computed
    /// during the write.
    async fn upload(
        &self,
        _location: &Location,
        _upload: Upload,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "CREATE"))
    }

    /// Prepare everything for a staged upload of `size` total bytes.
    ///
    /// The returned record's `storage_data` encodes the opaque upload handle
    /// and a position counter of 0.
    async fn multipart_start(
        &self,
        _location: &Location,
        _size: u64,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "MULTIPART"))
    }

    /// Show the current details of an incomplete upload.
    async fn multipart_refresh(
        &self,
        _data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "MULTIPART"))
    }

    /// Add the next fragment to an incomplete upload.
    ///
    /// Fails with an out-of-bound error when the advanced position would
    /// exceed the declared total size.
    async fn multipart_update(
        &self,
        _data: &FileData,
        _upload: Upload,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "MULTIPART"))
    }

    /// Verify integrity and finalize an incomplete upload.
    ///
    /// Valid only when the position equals the declared total size.
    async fn multipart_complete(
        &self,
        _data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "MULTIPART"))
    }
}

/// Service responsible for reading data from a storage.
#[async_trait]
pub trait Reader: StorageService {
    /// Byte stream of the file content.
    ///
    /// Fails with a missing-file error if the object is gone.
    async fn stream(&self, _data: &FileData, _extras: &Extras) -> StorageResult<ByteStream> {
        Err(StorageError::unsupported(self.name(), "STREAM"))
    }

    /// File content as a single byte object; equal to fully draining
    /// [`Reader::stream`].
    async fn content(&self, data: &FileData, extras: &Extras) -> StorageResult<Bytes> {
        let mut stream = self.stream(data, extras).await?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Byte stream of the `start..end` fragment of the file content.
    ///
    /// The default drains `stream` and slices; backends with native range
    /// reads should override it.
    async fn range(
        &self,
        data: &FileData,
        start: u64,
        end: Option<u64>,
        extras: &Extras,
    ) -> StorageResult<ByteStream> {
        let content = self.content(data, extras).await?;
        let len = content.len() as u64;
        let start = start.min(len) as usize;
        let end = end.unwrap_or(len).min(len).max(start as u64) as usize;
        let fragment = content.slice(start..end);
        Ok(Box::pin(futures::stream::once(async move {
            Ok::<_, StorageError>(fragment)
        })))
    }
}

/// Service responsible for maintenance file operations.
#[async_trait]
pub trait Manager: StorageService {
    /// Check if the file exists in the storage.
    async fn exists(&self, _data: &FileData, _extras: &Extras) -> StorageResult<bool> {
        Err(StorageError::unsupported(self.name(), "EXISTS"))
    }

    /// Remove the file from the storage.
    ///
    /// Returns `true` if something was actually deleted, `false` if the file
    /// was already absent. Never an error for "already gone".
    async fn remove(&self, _data: &FileData, _extras: &Extras) -> StorageResult<bool> {
        Err(StorageError::unsupported(self.name(), "REMOVE"))
    }

    /// Lazy sequence of all locations known to the storage.
    async fn scan(&self, _extras: &Extras) -> StorageResult<LocationStream> {
        Err(StorageError::unsupported(self.name(), "SCAN"))
    }

    /// Reconstruct full file details purely from a location, re-deriving
    /// size, type and hash.
    async fn analyze(&self, _location: &Location, _extras: &Extras) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "ANALYZE"))
    }

    /// Duplicate the file at a new location inside the same storage.
    async fn copy(
        &self,
        _location: &Location,
        _data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "COPY"))
    }

    /// Relocate the file inside the same storage.
    ///
    /// After success the source location no longer resolves. Implemented as
    /// an atomic rename where the backend offers one, else copy-then-remove.
    async fn rename(
        &self,
        _location: &Location,
        _data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "MOVE"))
    }

    /// Concatenate existing files into a new one, order-preserving.
    async fn compose(
        &self,
        _location: &Location,
        _datas: &[FileData],
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "COMPOSE"))
    }

    /// Extend an existing file with the bytes of an upload.
    async fn append(
        &self,
        _data: &FileData,
        _upload: Upload,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        Err(StorageError::unsupported(self.name(), "APPEND"))
    }

    /// Permanent download link.
    async fn permanent_link(&self, _data: &FileData, _extras: &Extras) -> StorageResult<String> {
        Err(StorageError::unsupported(self.name(), "LINK_PERMANENT"))
    }

    /// Download link that expires after `ttl`.
    async fn temporal_link(
        &self,
        _data: &FileData,
        _ttl: Duration,
        _extras: &Extras,
    ) -> StorageResult<String> {
        Err(StorageError::unsupported(self.name(), "LINK_TEMPORAL"))
    }

    /// Link that stops resolving after the first use.
    async fn one_time_link(&self, _data: &FileData, _extras: &Extras) -> StorageResult<String> {
        Err(StorageError::unsupported(self.name(), "LINK_ONE_TIME"))
    }

    /// Signed URL authorizing `action` on `location` for `ttl`.
    async fn signed_link(
        &self,
        _action: SignedAction,
        _location: &Location,
        _ttl: Duration,
        _extras: &Extras,
    ) -> StorageResult<String> {
        Err(StorageError::unsupported(self.name(), "SIGNED"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl StorageService for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[async_trait]
    impl Uploader for Bare {}

    #[async_trait]
    impl Manager for Bare {}

    #[tokio::test]
    async fn test_default_methods_are_unsupported() {
        let bare = Bare;
        let err = Uploader::upload(
            &bare,
            &Location::from("x"),
            Upload::from_bytes("x"),
            &Extras::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::Unsupported { .. }));
        assert_eq!(
            err.to_string(),
            "Operation CREATE is not supported by bare storage"
        );

        let err = Manager::remove(&bare, &FileData::from_location("x"), &Extras::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unsupported { .. }));
    }
}
