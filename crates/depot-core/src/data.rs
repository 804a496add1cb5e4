//! The entities every storage component exchanges.
//!
//! [`Location`] addresses a file inside one storage instance, [`FileData`]
//! describes a stored file, and [`Extras`] is the open-ended key-value bag
//! passed through every operation for backend-specific details.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Default content type assumed when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Key under which in-progress multipart uploads track their position
/// inside [`FileData::storage_data`].
pub const UPLOADED_KEY: &str = "uploaded";

/// Opaque key-value data passed through storage operations.
///
/// Values are plain JSON so the whole bag stays serializable.
pub type Extras = serde_json::Map<String, serde_json::Value>;

/// Opaque address of a file inside one storage instance.
///
/// Not a filesystem path in general; the meaning is backend-defined. A
/// location is produced by the caller or a transformer and consumed
/// immediately by a service call.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(value: impl Into<String>) -> Self {
        Location(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Location(value.to_string())
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Location(value)
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({:?})", self.0)
    }
}

/// Information required by a storage to operate on a file.
///
/// A `FileData` is never mutated in place. Every operation that changes the
/// underlying object returns a new value; the caller must discard the old
/// one because it may reference an object that no longer exists.
///
/// `storage_data` holds backend-specific attributes a given backend may need
/// to re-locate or re-verify the object: internal object ids, multipart
/// upload handles, the position counter of an in-progress upload. It is plain
/// data, safe to serialize and hand back later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub location: Location,
    pub size: u64,
    pub content_type: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub storage_data: Extras,
}

impl FileData {
    pub fn new(
        location: impl Into<Location>,
        size: u64,
        content_type: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        FileData {
            location: location.into(),
            size,
            content_type: content_type.into(),
            hash: hash.into(),
            storage_data: Extras::new(),
        }
    }

    /// Minimal form with only a location.
    ///
    /// Used when the caller already trusts the address and does not need
    /// verified metadata.
    pub fn from_location(location: impl Into<Location>) -> Self {
        FileData::new(location, 0, OCTET_STREAM, "")
    }

    /// Copy of this record pointing at a different location.
    pub fn with_location(&self, location: impl Into<Location>) -> Self {
        let mut data = self.clone();
        data.location = location.into();
        data
    }

    pub fn with_storage_data(mut self, storage_data: Extras) -> Self {
        self.storage_data = storage_data;
        self
    }

    /// Position counter of an in-progress multipart upload, 0 when absent.
    pub fn uploaded(&self) -> u64 {
        self.storage_data
            .get(UPLOADED_KEY)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }

    /// Copy of this record with the position counter set to `position`.
    pub fn with_uploaded(&self, position: u64) -> Self {
        let mut data = self.clone();
        data.storage_data
            .insert(UPLOADED_KEY.to_string(), json!(position));
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_location_is_minimal() {
        let data = FileData::from_location("a/b.txt");
        assert_eq!(data.location.as_str(), "a/b.txt");
        assert_eq!(data.size, 0);
        assert_eq!(data.content_type, OCTET_STREAM);
        assert!(data.hash.is_empty());
        assert!(data.storage_data.is_empty());
    }

    #[test]
    fn test_with_location_returns_new_value() {
        let data = FileData::new("old.txt", 3, "text/plain", "abc");
        let moved = data.with_location("new.txt");
        assert_eq!(data.location.as_str(), "old.txt");
        assert_eq!(moved.location.as_str(), "new.txt");
        assert_eq!(moved.size, 3);
        assert_eq!(moved.hash, "abc");
    }

    #[test]
    fn test_uploaded_counter_round_trip() {
        let data = FileData::from_location("part.bin").with_uploaded(5);
        assert_eq!(data.uploaded(), 5);
        let advanced = data.with_uploaded(11);
        assert_eq!(data.uploaded(), 5);
        assert_eq!(advanced.uploaded(), 11);
    }

    #[test]
    fn test_file_data_serializes_round_trip() {
        let data = FileData::new("x.bin", 42, "application/zip", "deadbeef").with_uploaded(7);
        let json = serde_json::to_string(&data).unwrap();
        let back: FileData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
