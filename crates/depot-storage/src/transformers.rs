//! Location transformers applied before any operation touches a backend.
//!
//! A transformer is a pure function from a requested location to the
//! location actually used. The facade looks up the transformers named in
//! [`Settings::location_transformers`](depot_core::Settings) by name, in
//! order, and threads the location through them. An unknown name aborts the
//! operation before the backend is involved.

use std::path::{Component, Path};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use depot_core::{Extras, Location, Registry, StorageError, StorageResult, Upload};

/// Named transformation applied to a location during preparation.
///
/// Receives the incoming location, the upload when the operation carries one
/// (single-pass uploads and multipart starts) and the per-call extras.
pub type LocationTransformer =
    Arc<dyn Fn(&Location, Option<&Upload>, &Extras) -> StorageResult<Location> + Send + Sync>;

/// Register every built-in transformer under its well-known name.
pub async fn register_builtin_transformers(registry: &Registry<LocationTransformer>) {
    let builtins: [(&str, LocationTransformer); 6] = [
        ("safe_relative_path", Arc::new(safe_relative_path)),
        ("static_uuid", Arc::new(static_uuid)),
        ("uuid_prefix", Arc::new(uuid_prefix)),
        ("uuid_with_extension", Arc::new(uuid_with_extension)),
        ("datetime_prefix", Arc::new(datetime_prefix)),
        ("fix_extension", Arc::new(fix_extension)),
    ];
    for (name, transformer) in builtins {
        // Built-ins are registered first, so the names are free.
        let _ = registry.register(name, transformer, true).await;
    }
}

/// Normalize the location into a path that cannot escape the storage root.
///
/// Collapses `.` segments, resolves `..` against preceding segments and
/// rejects locations that are absolute or climb above the root.
pub fn safe_relative_path(
    location: &Location,
    _upload: Option<&Upload>,
    _extras: &Extras,
) -> StorageResult<Location> {
    let mut segments: Vec<&str> = Vec::new();
    for component in Path::new(location.as_str()).components() {
        match component {
            Component::Normal(segment) => match segment.to_str() {
                Some(segment) => segments.push(segment),
                None => {
                    return Err(StorageError::location(
                        location.clone(),
                        "contains non-unicode segments",
                    ))
                }
            },
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(StorageError::location(
                        location.clone(),
                        "climbs above the storage root",
                    ));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::location(
                    location.clone(),
                    "must be relative to the storage root",
                ))
            }
        }
    }
    if segments.is_empty() {
        return Err(StorageError::location(
            location.clone(),
            "resolves to an empty path",
        ));
    }
    Ok(Location::from(segments.join("/")))
}

/// Replace the whole location with a random UUID.
pub fn static_uuid(
    _location: &Location,
    _upload: Option<&Upload>,
    _extras: &Extras,
) -> StorageResult<Location> {
    Ok(Location::from(Uuid::new_v4().to_string()))
}

/// Prepend a random UUID to the location.
pub fn uuid_prefix(
    location: &Location,
    _upload: Option<&Upload>,
    _extras: &Extras,
) -> StorageResult<Location> {
    Ok(Location::from(format!(
        "{}{}",
        Uuid::new_v4(),
        location.as_str()
    )))
}

/// Replace the location with a random UUID keeping the original extension.
pub fn uuid_with_extension(
    location: &Location,
    _upload: Option<&Upload>,
    _extras: &Extras,
) -> StorageResult<Location> {
    let name = Uuid::new_v4().to_string();
    match Path::new(location.as_str()).extension().and_then(|e| e.to_str()) {
        Some(extension) => Ok(Location::from(format!("{name}.{extension}"))),
        None => Ok(Location::from(name)),
    }
}

/// Prepend the current UTC timestamp to the location.
pub fn datetime_prefix(
    location: &Location,
    _upload: Option<&Upload>,
    _extras: &Extras,
) -> StorageResult<Location> {
    Ok(Location::from(format!(
        "{}{}",
        Utc::now().to_rfc3339(),
        location.as_str()
    )))
}

/// Replace the location's extension with one matching the upload's content
/// type.
///
/// Requires an upload in the call; leaves the location unchanged when no
/// extension is known for the content type.
pub fn fix_extension(
    location: &Location,
    upload: Option<&Upload>,
    _extras: &Extras,
) -> StorageResult<Location> {
    let upload = upload.ok_or_else(|| {
        StorageError::location(
            location.clone(),
            "extension can only be fixed during an upload",
        )
    })?;
    let extension = mime_guess::get_mime_extensions_str(&upload.content_type)
        .and_then(|extensions| extensions.first());
    match extension {
        Some(extension) => {
            let stem = Path::new(location.as_str())
                .with_extension(extension)
                .to_string_lossy()
                .into_owned();
            Ok(Location::from(stem))
        }
        None => Ok(location.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extras() -> Extras {
        Extras::new()
    }

    #[test]
    fn test_safe_relative_path_normalizes() {
        let out = safe_relative_path(&Location::from("a/./b/../c.txt"), None, &extras()).unwrap();
        assert_eq!(out.as_str(), "a/c.txt");
    }

    #[test]
    fn test_safe_relative_path_rejects_escape() {
        let err = safe_relative_path(&Location::from("../../etc/passwd"), None, &extras());
        assert!(matches!(err, Err(StorageError::Location { .. })));

        let err = safe_relative_path(&Location::from("/etc/passwd"), None, &extras());
        assert!(matches!(err, Err(StorageError::Location { .. })));
    }

    #[test]
    fn test_uuid_with_extension_keeps_extension() {
        let out =
            uuid_with_extension(&Location::from("report.pdf"), None, &extras()).unwrap();
        assert!(out.as_str().ends_with(".pdf"));
        assert_ne!(out.as_str(), "report.pdf");
    }

    #[test]
    fn test_fix_extension_requires_upload() {
        let err = fix_extension(&Location::from("report.bin"), None, &extras());
        assert!(matches!(err, Err(StorageError::Location { .. })));

        let upload = Upload::from_bytes("x").with_content_type("application/pdf");
        let out = fix_extension(&Location::from("report.bin"), Some(&upload), &extras()).unwrap();
        assert!(out.as_str().starts_with("report."));
        assert_ne!(out.as_str(), "report.bin");
    }

    #[tokio::test]
    async fn test_builtins_are_registered() {
        let registry = Registry::new();
        register_builtin_transformers(&registry).await;
        assert!(registry.contains("safe_relative_path").await);
        assert!(registry.contains("static_uuid").await);
        assert!(registry.contains("fix_extension").await);
    }
}
