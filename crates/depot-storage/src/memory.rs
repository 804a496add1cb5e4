//! In-memory storage backend.
//!
//! Keeps every object in a shared map guarded by an async lock. Mostly
//! useful in tests and as the reference implementation of the service
//! contracts; it implements everything except link generation and signed
//! URLs, which have no meaning without an external address.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use depot_core::{
    Capability, Extras, FileData, Location, Registry, Settings, StorageError, StorageResult,
    Upload, CHUNK_SIZE, OCTET_STREAM,
};

use crate::factory::StorageAdapter;
use crate::storage::Storage;
use crate::traits::{ByteStream, LocationStream, Manager, Reader, StorageService, Uploader};
use crate::transformers::LocationTransformer;

type Bucket = Arc<RwLock<HashMap<Location, Vec<u8>>>>;

/// Factory for the `memory` adapter type.
pub struct MemoryAdapter;

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn build(
        &self,
        settings: Settings,
        transformers: Registry<LocationTransformer>,
    ) -> StorageResult<Storage> {
        let settings = Arc::new(settings);
        let bucket: Bucket = Arc::new(RwLock::new(HashMap::new()));
        Ok(Storage::new(
            settings.clone(),
            Arc::new(MemoryUploader {
                bucket: bucket.clone(),
                settings: settings.clone(),
            }),
            Arc::new(MemoryReader {
                bucket: bucket.clone(),
                settings: settings.clone(),
            }),
            Arc::new(MemoryManager { bucket, settings }),
            transformers,
        ))
    }
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn guess_content_type(location: &Location) -> String {
    mime_guess::from_path(location.as_str())
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

pub struct MemoryUploader {
    bucket: Bucket,
    settings: Arc<Settings>,
}

impl StorageService for MemoryUploader {
    fn capabilities(&self) -> Capability {
        Capability::CREATE | Capability::MULTIPART | Capability::RESUMABLE
    }

    fn name(&self) -> &str {
        &self.settings.name
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(
        &self,
        location: &Location,
        upload: Upload,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        // Occupancy is checked before any bytes are read.
        if !self.settings.override_existing
            && self.bucket.read().await.contains_key(location)
        {
            return Err(StorageError::existing_file(self.name(), location));
        }

        let content_type = upload.content_type.clone();
        let mut reader = upload.hashing_reader();
        let content = reader.read_all().await?;
        let data = FileData::new(
            location.clone(),
            reader.position(),
            content_type,
            reader.hash(),
        );
        self.bucket
            .write()
            .await
            .insert(location.clone(), content.to_vec());
        Ok(data)
    }

    async fn multipart_start(
        &self,
        location: &Location,
        size: u64,
        extras: &Extras,
    ) -> StorageResult<FileData> {
        if !self.settings.override_existing
            && self.bucket.read().await.contains_key(location)
        {
            return Err(StorageError::existing_file(self.name(), location));
        }
        self.bucket
            .write()
            .await
            .insert(location.clone(), Vec::with_capacity(size as usize));

        // Callers may pin the expected content type and hash up front; both
        // are verified at completion.
        let content_type = extras
            .get("content_type")
            .and_then(|v| v.as_str())
            .unwrap_or(OCTET_STREAM);
        let hash = extras
            .get("hash")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(FileData::new(location.clone(), size, content_type, hash).with_uploaded(0))
    }

    async fn multipart_refresh(
        &self,
        data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let bucket = self.bucket.read().await;
        let content = bucket
            .get(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;
        Ok(data.with_uploaded(content.len() as u64))
    }

    async fn multipart_update(
        &self,
        data: &FileData,
        upload: Upload,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let fragment = upload.hashing_reader().read_all().await?;
        let mut bucket = self.bucket.write().await;
        let content = bucket
            .get_mut(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;

        let position = content.len() as u64 + fragment.len() as u64;
        if position > data.size {
            return Err(StorageError::UploadOutOfBound {
                actual: position,
                expected: data.size,
            });
        }
        content.extend_from_slice(&fragment);
        Ok(data.with_uploaded(position))
    }

    async fn multipart_complete(
        &self,
        data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let bucket = self.bucket.read().await;
        let content = bucket
            .get(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;

        let actual = content.len() as u64;
        if actual != data.size {
            return Err(StorageError::UploadSizeMismatch {
                actual,
                expected: data.size,
            });
        }
        // A pinned content type is verified against what the location itself
        // suggests; when neither side says more than octet-stream there is
        // nothing to disagree about.
        let guessed = guess_content_type(&data.location);
        if data.content_type != OCTET_STREAM
            && guessed != OCTET_STREAM
            && guessed != data.content_type
        {
            return Err(StorageError::UploadTypeMismatch {
                actual: guessed,
                expected: data.content_type.clone(),
            });
        }
        let hash = sha256_hex(content);
        if !data.hash.is_empty() && data.hash != hash {
            return Err(StorageError::UploadHashMismatch {
                actual: hash,
                expected: data.hash.clone(),
            });
        }
        Ok(FileData::new(
            data.location.clone(),
            actual,
            data.content_type.clone(),
            hash,
        ))
    }
}

pub struct MemoryReader {
    bucket: Bucket,
    settings: Arc<Settings>,
}

impl StorageService for MemoryReader {
    fn capabilities(&self) -> Capability {
        Capability::STREAM | Capability::RANGE
    }

    fn name(&self) -> &str {
        &self.settings.name
    }
}

#[async_trait]
impl Reader for MemoryReader {
    async fn stream(&self, data: &FileData, _extras: &Extras) -> StorageResult<ByteStream> {
        let bucket = self.bucket.read().await;
        let content = bucket
            .get(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;
        let content = Bytes::copy_from_slice(content);

        let chunks: Vec<StorageResult<Bytes>> = (0..content.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(content.slice(start..content.len().min(start + CHUNK_SIZE))))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn range(
        &self,
        data: &FileData,
        start: u64,
        end: Option<u64>,
        _extras: &Extras,
    ) -> StorageResult<ByteStream> {
        let bucket = self.bucket.read().await;
        let content = bucket
            .get(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;

        let len = content.len() as u64;
        let start = start.min(len);
        let end = end.unwrap_or(len).min(len).max(start);
        let fragment = Bytes::copy_from_slice(&content[start as usize..end as usize]);
        Ok(Box::pin(stream::once(async move {
            Ok::<_, StorageError>(fragment)
        })))
    }
}

pub struct MemoryManager {
    bucket: Bucket,
    settings: Arc<Settings>,
}

impl StorageService for MemoryManager {
    fn capabilities(&self) -> Capability {
        Capability::EXISTS
            | Capability::REMOVE
            | Capability::SCAN
            | Capability::ANALYZE
            | Capability::COPY
            | Capability::MOVE
            | Capability::COMPOSE
            | Capability::APPEND
    }

    fn name(&self) -> &str {
        &self.settings.name
    }
}

#[async_trait]
impl Manager for MemoryManager {
    async fn exists(&self, data: &FileData, _extras: &Extras) -> StorageResult<bool> {
        Ok(self.bucket.read().await.contains_key(&data.location))
    }

    async fn remove(&self, data: &FileData, _extras: &Extras) -> StorageResult<bool> {
        Ok(self.bucket.write().await.remove(&data.location).is_some())
    }

    async fn scan(&self, _extras: &Extras) -> StorageResult<LocationStream> {
        let locations: Vec<StorageResult<Location>> = self
            .bucket
            .read()
            .await
            .keys()
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(locations)))
    }

    async fn analyze(&self, location: &Location, _extras: &Extras) -> StorageResult<FileData> {
        let bucket = self.bucket.read().await;
        let content = bucket
            .get(location)
            .ok_or_else(|| StorageError::missing_file(self.name(), location))?;
        Ok(FileData::new(
            location.clone(),
            content.len() as u64,
            guess_content_type(location),
            sha256_hex(content),
        ))
    }

    async fn copy(
        &self,
        location: &Location,
        data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let mut bucket = self.bucket.write().await;
        if !self.settings.override_existing && bucket.contains_key(location) {
            return Err(StorageError::existing_file(self.name(), location));
        }
        let content = bucket
            .get(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?
            .clone();
        bucket.insert(location.clone(), content);
        Ok(data.with_location(location.clone()))
    }

    async fn rename(
        &self,
        location: &Location,
        data: &FileData,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let mut bucket = self.bucket.write().await;
        if !self.settings.override_existing && bucket.contains_key(location) {
            return Err(StorageError::existing_file(self.name(), location));
        }
        let content = bucket
            .remove(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;
        bucket.insert(location.clone(), content);
        Ok(data.with_location(location.clone()))
    }

    async fn compose(
        &self,
        location: &Location,
        datas: &[FileData],
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let mut bucket = self.bucket.write().await;
        if !self.settings.override_existing && bucket.contains_key(location) {
            return Err(StorageError::existing_file(self.name(), location));
        }
        // All sources are verified before the first byte is written.
        for data in datas {
            if !bucket.contains_key(&data.location) {
                return Err(StorageError::missing_file(self.name(), &data.location));
            }
        }

        let mut combined = Vec::new();
        for data in datas {
            if let Some(content) = bucket.get(&data.location) {
                combined.extend_from_slice(content);
            }
        }
        let result = FileData::new(
            location.clone(),
            combined.len() as u64,
            OCTET_STREAM,
            sha256_hex(&combined),
        );
        bucket.insert(location.clone(), combined);
        Ok(result)
    }

    async fn append(
        &self,
        data: &FileData,
        upload: Upload,
        _extras: &Extras,
    ) -> StorageResult<FileData> {
        let fragment = upload.hashing_reader().read_all().await?;
        let mut bucket = self.bucket.write().await;
        let content = bucket
            .get_mut(&data.location)
            .ok_or_else(|| StorageError::missing_file(self.name(), &data.location))?;
        content.extend_from_slice(&fragment);
        Ok(FileData::new(
            data.location.clone(),
            content.len() as u64,
            data.content_type.clone(),
            sha256_hex(content),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn storage() -> Storage {
        MemoryAdapter
            .build(Settings::default(), Registry::new())
            .await
            .unwrap()
    }

    fn extras() -> Extras {
        Extras::new()
    }

    #[tokio::test]
    async fn test_upload_computes_hash_while_writing() {
        let storage = storage().await;
        let data = storage
            .upload(
                &Location::from("greeting.txt"),
                Upload::from_bytes("hello world"),
                &extras(),
            )
            .await
            .unwrap();
        assert_eq!(data.size, 11);
        assert_eq!(
            data.hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_upload_refuses_occupied_location() {
        let storage = storage().await;
        let location = Location::from("a.txt");
        storage
            .upload(&location, Upload::from_bytes("a"), &extras())
            .await
            .unwrap();
        let err = storage
            .upload(&location, Upload::from_bytes("b"), &extras())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ExistingFile { .. }));
    }

    #[tokio::test]
    async fn test_multipart_out_of_bound_fragment() {
        let storage = storage().await;
        let data = storage
            .multipart_start(&Location::from("big.bin"), 4, &extras())
            .await
            .unwrap();
        let err = storage
            .multipart_update(&data, Upload::from_bytes("12345"), &extras())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::UploadOutOfBound {
                actual: 5,
                expected: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_multipart_complete_checks_expected_hash() {
        let storage = storage().await;
        let mut start_extras = Extras::new();
        start_extras.insert(
            "hash".to_string(),
            serde_json::Value::String("0".repeat(64)),
        );
        let data = storage
            .multipart_start(&Location::from("h.bin"), 2, &start_extras)
            .await
            .unwrap();
        let data = storage
            .multipart_update(&data, Upload::from_bytes("hi"), &extras())
            .await
            .unwrap();
        let err = storage
            .multipart_complete(&data, &extras())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UploadHashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_multipart_complete_checks_expected_content_type() {
        let storage = storage().await;
        let mut start_extras = Extras::new();
        start_extras.insert(
            "content_type".to_string(),
            serde_json::Value::String("image/png".to_string()),
        );
        let data = storage
            .multipart_start(&Location::from("page.txt"), 2, &start_extras)
            .await
            .unwrap();
        let data = storage
            .multipart_update(&data, Upload::from_bytes("hi"), &extras())
            .await
            .unwrap();
        let err = storage
            .multipart_complete(&data, &extras())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::UploadTypeMismatch { actual, expected }
                if actual == "text/plain" && expected == "image/png"
        ));
    }

    #[tokio::test]
    async fn test_multipart_complete_accepts_matching_content_type() {
        let storage = storage().await;
        let mut start_extras = Extras::new();
        start_extras.insert(
            "content_type".to_string(),
            serde_json::Value::String("text/plain".to_string()),
        );
        let data = storage
            .multipart_start(&Location::from("notes.txt"), 2, &start_extras)
            .await
            .unwrap();
        let data = storage
            .multipart_update(&data, Upload::from_bytes("hi"), &extras())
            .await
            .unwrap();
        let done = storage.multipart_complete(&data, &extras()).await.unwrap();
        assert_eq!(done.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_analyze_rederives_details() {
        let storage = storage().await;
        storage
            .upload(
                &Location::from("doc.html"),
                Upload::from_bytes("<html></html>"),
                &extras(),
            )
            .await
            .unwrap();
        let data = storage
            .analyze(&Location::from("doc.html"), &extras())
            .await
            .unwrap();
        assert_eq!(data.size, 13);
        assert_eq!(data.content_type, "text/html");
        assert!(!data.hash.is_empty());
    }

    #[tokio::test]
    async fn test_scan_lists_every_location() {
        let storage = storage().await;
        for name in ["x", "y", "z"] {
            storage
                .upload(&Location::from(name), Upload::from_bytes(name), &extras())
                .await
                .unwrap();
        }
        let mut locations: Vec<String> = storage
            .scan(&extras())
            .await
            .unwrap()
            .map(|l| l.unwrap().into_string())
            .collect()
            .await;
        locations.sort();
        assert_eq!(locations, ["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_range_reads_fragment() {
        let storage = storage().await;
        let data = storage
            .upload(
                &Location::from("r.txt"),
                Upload::from_bytes("0123456789"),
                &extras(),
            )
            .await
            .unwrap();
        let mut stream = storage.range(&data, 2, Some(5), &extras()).await.unwrap();
        let fragment = stream.next().await.unwrap().unwrap();
        assert_eq!(&fragment[..], b"234");
    }

    #[tokio::test]
    async fn test_links_are_not_supported() {
        let storage = storage().await;
        let data = FileData::from_location("x");
        let err = storage.permanent_link(&data, &extras()).await.unwrap_err();
        assert!(matches!(err, StorageError::Unsupported { .. }));
    }
}
