//! Capability-checked dispatch over a backend's services.
//!
//! [`Storage`] owns one uploader, one reader and one manager plus the
//! settings they were built from. Every public method computes the
//! capability bits it needs and refuses the call before the backend is
//! contacted when any bit is missing from the effective set. A declared
//! capability is a binding promise in the other direction too: if the bit is
//! set, the call is always attempted against the real backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use depot_core::{
    is_supported_type, Capability, Extras, FileData, Location, Registry, Settings, StorageError,
    StorageResult, Upload,
};

use crate::traits::{ByteStream, LocationStream, Manager, Reader, SignedAction, Uploader};
use crate::transformers::LocationTransformer;

/// A fully configured storage instance.
///
/// Cheap to clone; all clones share the same services and settings.
#[derive(Clone)]
pub struct Storage {
    settings: Arc<Settings>,
    uploader: Arc<dyn Uploader>,
    reader: Arc<dyn Reader>,
    manager: Arc<dyn Manager>,
    transformers: Registry<LocationTransformer>,
    capabilities: Capability,
}

impl Storage {
    pub fn new(
        settings: Arc<Settings>,
        uploader: Arc<dyn Uploader>,
        reader: Arc<dyn Reader>,
        manager: Arc<dyn Manager>,
        transformers: Registry<LocationTransformer>,
    ) -> Storage {
        let declared =
            uploader.capabilities() | reader.capabilities() | manager.capabilities();
        let capabilities = declared.exclude(settings.disabled_capabilities);
        Storage {
            settings,
            uploader,
            reader,
            manager,
            transformers,
            capabilities,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Effective capability set: everything the services declare minus the
    /// bits disabled in settings.
    pub fn capabilities(&self) -> Capability {
        self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.supports(capability)
    }

    fn require(&self, capability: Capability, operation: &str) -> StorageResult<()> {
        if self.capabilities.supports(capability) {
            Ok(())
        } else {
            Err(StorageError::unsupported(self.name(), operation))
        }
    }

    /// Run the location through the transformers named in settings, in
    /// order, each consuming the previous output.
    pub async fn prepare_location(
        &self,
        location: &Location,
        upload: Option<&Upload>,
        extras: &Extras,
    ) -> StorageResult<Location> {
        let mut location = location.clone();
        for name in &self.settings.location_transformers {
            let transformer = self
                .transformers
                .get(name)
                .await
                .map_err(|_| StorageError::UnknownTransformer(name.clone()))?;
            location = transformer(&location, upload, extras)?;
        }
        Ok(location)
    }

    fn validate_size(&self, size: u64) -> StorageResult<()> {
        if self.settings.max_size > 0 && size > self.settings.max_size {
            return Err(StorageError::LargeUpload {
                actual: size,
                limit: self.settings.max_size,
            });
        }
        Ok(())
    }

    fn validate_content_type(&self, content_type: &str) -> StorageResult<()> {
        if !is_supported_type(content_type, &self.settings.supported_types) {
            return Err(StorageError::WrongUploadType(content_type.to_string()));
        }
        Ok(())
    }

    fn validate_upload(&self, upload: &Upload) -> StorageResult<()> {
        self.validate_size(upload.size)?;
        self.validate_content_type(&upload.content_type)
    }

    /// Write the upload to the storage in a single pass.
    pub async fn upload(
        &self,
        location: &Location,
        upload: Upload,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::CREATE, "CREATE")?;
        self.validate_upload(&upload)?;
        let location = self.prepare_location(location, Some(&upload), extras).await?;
        let data = self.uploader.upload(&location, upload, extras).await?;
        tracing::info!(
            storage = %self.name(),
            location = %data.location,
            size_bytes = data.size,
            "Upload finished"
        );
        Ok(data)
    }

    /// Prepare a staged upload of `size` total bytes.
    pub async fn multipart_start(
        &self,
        location: &Location,
        size: u64,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::MULTIPART, "MULTIPART")?;
        self.validate_size(size)?;
        let location = self.prepare_location(location, None, extras).await?;
        let data = self.uploader.multipart_start(&location, size, extras).await?;
        tracing::info!(
            storage = %self.name(),
            location = %data.location,
            size_bytes = size,
            "Multipart upload initiated"
        );
        Ok(data)
    }

    /// Show the current details of an incomplete upload.
    pub async fn multipart_refresh(
        &self,
        data: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::MULTIPART, "MULTIPART")?;
        self.uploader.multipart_refresh(data, extras).await
    }

    /// Add the next fragment to an incomplete upload.
    pub async fn multipart_update(
        &self,
        data: &FileData,
        upload: Upload,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::MULTIPART, "MULTIPART")?;
        self.uploader.multipart_update(data, upload, extras).await
    }

    /// Finalize an incomplete upload.
    pub async fn multipart_complete(
        &self,
        data: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::MULTIPART, "MULTIPART")?;
        let data = self.uploader.multipart_complete(data, extras).await?;
        tracing::info!(
            storage = %self.name(),
            location = %data.location,
            size_bytes = data.size,
            "Multipart upload completed"
        );
        Ok(data)
    }

    /// Prepare a staged upload whose partial state survives process
    /// restarts.
    ///
    /// Same state machine as [`Storage::multipart_start`]; the separate
    /// capability bit marks backends that guarantee durability of the
    /// partial state.
    pub async fn resumable_start(
        &self,
        location: &Location,
        size: u64,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::RESUMABLE, "RESUMABLE")?;
        self.validate_size(size)?;
        let location = self.prepare_location(location, None, extras).await?;
        self.uploader.multipart_start(&location, size, extras).await
    }

    /// Show the current position of an interrupted upload.
    pub async fn resumable_refresh(
        &self,
        data: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::RESUMABLE, "RESUMABLE")?;
        self.uploader.multipart_refresh(data, extras).await
    }

    /// Continue an interrupted upload with the next fragment.
    pub async fn resumable_resume(
        &self,
        data: &FileData,
        upload: Upload,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::RESUMABLE, "RESUMABLE")?;
        self.uploader.multipart_update(data, upload, extras).await
    }

    /// Finalize a resumable upload.
    pub async fn resumable_complete(
        &self,
        data: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::RESUMABLE, "RESUMABLE")?;
        self.uploader.multipart_complete(data, extras).await
    }

    /// Byte stream of the file content.
    pub async fn stream(&self, data: &FileData, extras: &Extras) -> StorageResult<ByteStream> {
        self.require(Capability::STREAM, "STREAM")?;
        self.reader.stream(data, extras).await
    }

    /// Full file content as a single byte object.
    pub async fn content(&self, data: &FileData, extras: &Extras) -> StorageResult<bytes::Bytes> {
        self.require(Capability::STREAM, "STREAM")?;
        self.reader.content(data, extras).await
    }

    /// Byte stream of the `start..end` fragment of the file content.
    pub async fn range(
        &self,
        data: &FileData,
        start: u64,
        end: Option<u64>,
        extras: &Extras,
    ) -> StorageResult<ByteStream> {
        self.require(Capability::RANGE, "RANGE")?;
        self.reader.range(data, start, end, extras).await
    }

    pub async fn exists(&self, data: &FileData, extras: &Extras) -> StorageResult<bool> {
        self.require(Capability::EXISTS, "EXISTS")?;
        self.manager.exists(data, extras).await
    }

    /// Remove the file. `true` if something was actually deleted.
    pub async fn remove(&self, data: &FileData, extras: &Extras) -> StorageResult<bool> {
        self.require(Capability::REMOVE, "REMOVE")?;
        let removed = self.manager.remove(data, extras).await?;
        tracing::info!(
            storage = %self.name(),
            location = %data.location,
            removed,
            "Remove finished"
        );
        Ok(removed)
    }

    /// Lazy sequence of all locations known to the storage.
    pub async fn scan(&self, extras: &Extras) -> StorageResult<LocationStream> {
        self.require(Capability::SCAN, "SCAN")?;
        self.manager.scan(extras).await
    }

    /// Reconstruct full file details from a bare location.
    pub async fn analyze(&self, location: &Location, extras: &Extras) -> StorageResult<FileData> {
        self.require(Capability::ANALYZE, "ANALYZE")?;
        self.manager.analyze(location, extras).await
    }

    /// Duplicate the file at `location` inside the same storage.
    pub async fn copy(
        &self,
        location: &Location,
        data: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::COPY, "COPY")?;
        let location = self.prepare_location(location, None, extras).await?;
        self.manager.copy(&location, data, extras).await
    }

    /// Relocate the file to `location` inside the same storage.
    ///
    /// After success the old location no longer resolves; the caller must
    /// discard the old file details and use the returned ones.
    pub async fn rename(
        &self,
        location: &Location,
        data: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::MOVE, "MOVE")?;
        let location = self.prepare_location(location, None, extras).await?;
        let moved = self.manager.rename(&location, data, extras).await?;
        tracing::info!(
            storage = %self.name(),
            from = %data.location,
            to = %moved.location,
            "Move finished"
        );
        Ok(moved)
    }

    /// Concatenate existing files into a new one at `location`,
    /// order-preserving. Fails if any source is missing.
    pub async fn compose(
        &self,
        location: &Location,
        datas: &[FileData],
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::COMPOSE, "COMPOSE")?;
        let location = self.prepare_location(location, None, extras).await?;
        self.manager.compose(&location, datas, extras).await
    }

    /// Extend an existing file with the bytes of the upload.
    pub async fn append(
        &self,
        data: &FileData,
        upload: Upload,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::APPEND, "APPEND")?;
        self.validate_size(data.size.saturating_add(upload.size))?;
        self.manager.append(data, upload, extras).await
    }

    /// Extend an existing file with the bytes of another existing file.
    pub async fn append_from(
        &self,
        data: &FileData,
        source: &FileData,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::APPEND | Capability::STREAM, "APPEND")?;
        let upload = self.reader_upload(source, extras).await?;
        self.append(data, upload, extras).await
    }

    pub async fn permanent_link(&self, data: &FileData, extras: &Extras) -> StorageResult<String> {
        self.require(Capability::LINK_PERMANENT, "LINK_PERMANENT")?;
        self.manager.permanent_link(data, extras).await
    }

    pub async fn temporal_link(
        &self,
        data: &FileData,
        ttl: Duration,
        extras: &Extras,
    ) -> StorageResult<String> {
        self.require(Capability::LINK_TEMPORAL, "LINK_TEMPORAL")?;
        self.manager.temporal_link(data, ttl, extras).await
    }

    pub async fn one_time_link(&self, data: &FileData, extras: &Extras) -> StorageResult<String> {
        self.require(Capability::LINK_ONE_TIME, "LINK_ONE_TIME")?;
        self.manager.one_time_link(data, extras).await
    }

    pub async fn signed_link(
        &self,
        action: SignedAction,
        location: &Location,
        ttl: Duration,
        extras: &Extras,
    ) -> StorageResult<String> {
        self.require(Capability::SIGNED, "SIGNED")?;
        let location = self.prepare_location(location, None, extras).await?;
        self.manager.signed_link(action, &location, ttl, extras).await
    }

    /// Copy the file into `dest`, which may be a different storage or even a
    /// different backend.
    ///
    /// Requires STREAM here and CREATE on the destination. Falls back to
    /// [`Storage::copy`] when `dest` is the same storage instance.
    pub async fn copy_to(
        &self,
        location: &Location,
        data: &FileData,
        dest: &Storage,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::STREAM, "STREAM")?;
        let upload = self.reader_upload(data, extras).await?;
        dest.upload(location, upload, extras).await
    }

    /// Move the file into `dest`, removing it here afterwards.
    pub async fn move_to(
        &self,
        location: &Location,
        data: &FileData,
        dest: &Storage,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        self.require(Capability::STREAM | Capability::REMOVE, "MOVE")?;
        let moved = self.copy_to(location, data, dest, extras).await?;
        self.manager.remove(data, extras).await?;
        Ok(moved)
    }

    /// Re-package the file's content as an upload for cross-storage
    /// transfers.
    async fn reader_upload(&self, data: &FileData, extras: &Extras) -> StorageResult<Upload> {
        let stream = self.reader.stream(data, extras).await?;
        let reader = StreamReader::new(
            stream.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );
        Ok(Upload::new(
            Box::pin(reader),
            data.location.as_str().to_string(),
            data.size,
            data.content_type.clone(),
        ))
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.settings.name)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.settings.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
