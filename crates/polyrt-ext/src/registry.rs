//! Extension type registry.
//!
//! Writers (register/unregister) take the write lock; lookups take the read
//! lock, so a lookup sees either the whole descriptor or nothing. Descriptors
//! are handed out as `Arc`s and stay valid after being unregistered.
//!
//! Every change bumps a generation counter. A backend variant keeps its copy
//! of the host registry current with `restore`, which never goes back to an
//! older generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use polyrt_core::config::UnknownExtensionTypeBehavior;
use polyrt_core::schema::DataType;
use polyrt_core::types::Series;

use crate::convert;
use crate::error::{RegistryError, Result};

/// User-supplied behavior attached to an extension type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionOptions {
    /// Free-form metadata carried with the type (e.g. units, schema version).
    pub metadata: Option<serde_json::Value>,
    /// Human-readable name used when displaying values.
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionTypeDescriptor {
    pub name: String,
    pub storage_type: DataType,
    pub options: ExtensionOptions,
}

impl ExtensionTypeDescriptor {
    /// The logical dtype values of this extension type carry.
    pub fn dtype(&self) -> DataType {
        DataType::Extension {
            name: self.name.clone(),
            storage: Box::new(self.storage_type.clone()),
        }
    }
}

/// Registry contents in transferable form. A host sends this to a backend
/// living in another library so both sides agree on the registered types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Bumped by every change to the source registry.
    pub generation: u64,
    pub types: Vec<ExtensionTypeDescriptor>,
    pub unknown: UnknownExtensionTypeBehavior,
}

pub struct ExtensionRegistry {
    types: RwLock<HashMap<String, Arc<ExtensionTypeDescriptor>>>,
    unknown: RwLock<UnknownExtensionTypeBehavior>,
    generation: AtomicU64,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            unknown: RwLock::new(UnknownExtensionTypeBehavior::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn register(
        &self,
        name: &str,
        storage_type: DataType,
        options: ExtensionOptions,
    ) -> Result<Arc<ExtensionTypeDescriptor>> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if !is_supported_storage(&storage_type) {
            return Err(RegistryError::UnsupportedStorage {
                name: name.to_string(),
                storage: storage_type,
            });
        }

        let mut types = self.types.write();
        if types.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        let descriptor = Arc::new(ExtensionTypeDescriptor {
            name: name.to_string(),
            storage_type,
            options,
        });
        types.insert(name.to_string(), descriptor.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(name, storage = %descriptor.storage_type, "registered extension type");
        Ok(descriptor)
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<ExtensionTypeDescriptor>> {
        let mut types = self.types.write();
        let removed = types
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(types);
        tracing::debug!(name, "unregistered extension type");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ExtensionTypeDescriptor>> {
        self.types
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert `series` to the registered extension type `name`.
    pub fn to_extension(&self, series: &Series, name: &str) -> Result<Series> {
        let descriptor = self.get(name)?;
        convert::to_extension(series, &descriptor)
    }

    /// Current registrations and unknown-type policy, sorted by name.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let guard = self.types.read();
        let generation = self.generation.load(Ordering::SeqCst);
        let unknown = self.unknown_type_behavior();
        let mut types: Vec<ExtensionTypeDescriptor> = guard.values().map(|d| (**d).clone()).collect();
        drop(guard);
        types.sort_by(|a, b| a.name.cmp(&b.name));
        RegistrySnapshot {
            generation,
            types,
            unknown,
        }
    }

    /// Replace every registration with the contents of `snapshot`, unless
    /// this registry already holds the same or a later generation. Returns
    /// whether anything was replaced.
    ///
    /// Descriptors whose definition is unchanged keep their `Arc`.
    pub fn restore(&self, snapshot: &RegistrySnapshot) -> bool {
        let mut types = self.types.write();
        if snapshot.generation <= self.generation.load(Ordering::SeqCst) {
            return false;
        }
        let mut next = HashMap::with_capacity(snapshot.types.len());
        for descriptor in &snapshot.types {
            let kept = types
                .remove(&descriptor.name)
                .filter(|existing| **existing == *descriptor)
                .unwrap_or_else(|| Arc::new(descriptor.clone()));
            next.insert(descriptor.name.clone(), kept);
        }
        *types = next;
        *self.unknown.write() = snapshot.unknown;
        self.generation.store(snapshot.generation, Ordering::SeqCst);
        true
    }

    pub fn unknown_type_behavior(&self) -> UnknownExtensionTypeBehavior {
        *self.unknown.read()
    }

    pub fn set_unknown_type_behavior(&self, behavior: UnknownExtensionTypeBehavior) {
        let _types = self.types.write();
        *self.unknown.write() = behavior;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Map a dtype found in loaded data onto what this process knows.
    ///
    /// Registered extension names must agree on storage. Unknown names follow
    /// the configured `UnknownExtensionTypeBehavior`.
    pub fn resolve_loaded(&self, dtype: &DataType) -> Result<DataType> {
        let DataType::Extension { name, storage } = dtype else {
            return Ok(dtype.clone());
        };
        match self.get(name) {
            Ok(descriptor) => {
                if **storage != descriptor.storage_type {
                    return Err(RegistryError::Conversion {
                        name: name.clone(),
                        expected: descriptor.storage_type.clone(),
                        found: (**storage).clone(),
                    });
                }
                Ok(descriptor.dtype())
            }
            Err(_) => match self.unknown_type_behavior() {
                UnknownExtensionTypeBehavior::LoadAsStorage => Ok(storage.storage().clone()),
                UnknownExtensionTypeBehavior::LoadAsGeneric => Ok(dtype.clone()),
                UnknownExtensionTypeBehavior::WarnAndLoadAsStorage => {
                    tracing::warn!(
                        name = %name,
                        "unknown extension type, loading as its storage type; register it to keep the extension"
                    );
                    Ok(storage.storage().clone())
                }
            },
        }
    }
}

fn is_supported_storage(dtype: &DataType) -> bool {
    dtype.is_physical() && *dtype != DataType::Null
}

static GLOBAL: OnceLock<ExtensionRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn global() -> &'static ExtensionRegistry {
    GLOBAL.get_or_init(ExtensionRegistry::new)
}
