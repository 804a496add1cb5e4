//! Adapter discovery and storage construction.
//!
//! [`Plugins`] holds the two registries extension code populates: storage
//! adapters by type name and location transformers by name. `setup` fills in
//! the built-ins; [`Plugins::apply`] gives any collaborator module a chance
//! to add its own before storages are built.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use depot_core::{Registry, Settings, StorageError, StorageResult};

use crate::storage::Storage;
use crate::transformers::{register_builtin_transformers, LocationTransformer};

/// Factory for one storage backend type.
///
/// Registered in [`Plugins::adapters`] under the name configuration refers
/// to in its `type` field.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Build a storage from validated settings.
    ///
    /// Backend-specific options live in [`Settings::extra`]; the adapter
    /// validates them here and fails with a configuration error when they
    /// do not add up.
    async fn build(
        &self,
        settings: Settings,
        transformers: Registry<LocationTransformer>,
    ) -> StorageResult<Storage>;
}

/// Extension hooks a collaborator module may implement.
///
/// Both hooks are optional; the default bodies register nothing. Invoked
/// once per extension during process start-up via [`Plugins::apply`].
#[async_trait]
pub trait Extension: Send + Sync {
    async fn register_adapters(&self, _adapters: &Registry<Arc<dyn StorageAdapter>>) {}

    async fn register_location_transformers(
        &self,
        _transformers: &Registry<LocationTransformer>,
    ) {
    }
}

/// Process-wide registries of adapters and transformers.
///
/// Cheap to clone; clones share the underlying registries.
#[derive(Clone, Default)]
pub struct Plugins {
    pub adapters: Registry<Arc<dyn StorageAdapter>>,
    pub location_transformers: Registry<LocationTransformer>,
}

impl Plugins {
    pub fn new() -> Plugins {
        Plugins::default()
    }

    /// Registries pre-populated with everything shipped in this crate.
    pub async fn setup() -> Plugins {
        let plugins = Plugins::new();
        register_builtin_transformers(&plugins.location_transformers).await;
        #[cfg(feature = "storage-memory")]
        {
            let adapter: Arc<dyn StorageAdapter> = Arc::new(crate::memory::MemoryAdapter);
            let _ = plugins.adapters.register("memory", adapter, true).await;
        }
        plugins
    }

    /// Let an extension populate the registries.
    pub async fn apply(&self, extension: &dyn Extension) {
        extension.register_adapters(&self.adapters).await;
        extension
            .register_location_transformers(&self.location_transformers)
            .await;
    }
}

/// Build a storage named `name` from an untyped configuration mapping.
///
/// The mapping must carry a `type` field naming a registered adapter;
/// everything else is interpreted by [`Settings::from_value`] and the
/// adapter itself.
pub async fn make_storage(
    name: impl Into<String>,
    config: Value,
    plugins: &Plugins,
) -> StorageResult<Storage> {
    let name = name.into();
    let mut map = match config {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::InvalidConfiguration {
                name,
                problem: format!("settings must be a mapping, got {other}"),
            })
        }
    };

    let adapter_type = match map.remove("type") {
        Some(Value::String(adapter_type)) => adapter_type,
        Some(_) => {
            return Err(StorageError::InvalidConfiguration {
                name,
                problem: "type must be a string".to_string(),
            })
        }
        None => {
            return Err(StorageError::MissingConfiguration {
                name,
                option: "type".to_string(),
            })
        }
    };

    let adapter = plugins
        .adapters
        .get(&adapter_type)
        .await
        .map_err(|_| StorageError::UnknownAdapter(adapter_type.clone()))?;

    map.entry("name").or_insert(Value::String(name.clone()));
    let settings = Settings::from_value(Value::Object(map))?;

    tracing::debug!(
        storage = %name,
        adapter = %adapter_type,
        "Building storage"
    );
    adapter
        .build(settings, plugins.location_transformers.clone())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_make_storage_requires_type() {
        let plugins = Plugins::setup().await;
        let err = make_storage("default", json!({}), &plugins)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_make_storage_unknown_adapter() {
        let plugins = Plugins::setup().await;
        let err = make_storage("default", json!({"type": "nope"}), &plugins)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownAdapter(name) if name == "nope"));
    }

    #[cfg(feature = "storage-memory")]
    #[tokio::test]
    async fn test_make_storage_builds_memory() {
        let plugins = Plugins::setup().await;
        let storage = make_storage("default", json!({"type": "memory"}), &plugins)
            .await
            .unwrap();
        assert_eq!(storage.name(), "default");
        assert!(storage.supports(depot_core::Capability::CREATE));
    }

    #[tokio::test]
    async fn test_extension_hooks_are_optional() {
        struct Noop;
        #[async_trait]
        impl Extension for Noop {}

        let plugins = Plugins::setup().await;
        plugins.apply(&Noop).await;
        assert!(plugins.location_transformers.contains("static_uuid").await);
    }
}
