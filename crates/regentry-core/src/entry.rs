//! Registry entries: lookup, properties, and plane traversal.

use crate::backend::{NativePayload, RawObject, RegistryBackend};
use crate::config::{Plane, RegistryConfig};
use crate::error::{RegistryError, Result};
use crate::handle::{Handle, Ownership};
use crate::value::PropertyValue;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

/// Every property of an entry. Properties whose native value has no typed
/// counterpart are present with `None`.
pub type PropertyMap<B> = BTreeMap<String, Option<PropertyValue<<B as RegistryBackend>::Payload>>>;

/// A node of the registry tree.
///
/// Two entries are equal when they wrap the same native reference, however
/// they were reached; the diagnostic path takes no part in equality or
/// hashing.
pub struct RegistryEntry<B: RegistryBackend> {
    handle: Handle<B>,
}

impl<B: RegistryBackend> RegistryEntry<B> {
    /// The root of the registry tree.
    pub fn root(backend: &Arc<B>) -> Self {
        let raw = backend.root_entry();
        Self::from_raw(backend, raw, None, Ownership::Owned)
    }

    /// Resolve a path such as `IODeviceTree:/options`.
    ///
    /// Never fails: when nothing matches, the returned entry is invalid and
    /// [`RegistryEntry::is_valid`] reports it.
    pub fn from_path(backend: &Arc<B>, path: &str) -> Self {
        let raw = backend.entry_from_path(path);
        Self::from_raw(backend, raw, Some(path.to_string()), Ownership::Owned)
    }

    /// The device NVRAM entry.
    pub fn nvram(backend: &Arc<B>) -> Self {
        Self::from_path(backend, RegistryConfig::NVRAM_PATH)
    }

    /// Wrap a native reference. `ownership` decides whether dropping the
    /// entry releases `raw`.
    pub fn from_raw(
        backend: &Arc<B>,
        raw: RawObject,
        path: Option<String>,
        ownership: Ownership,
    ) -> Self {
        if raw.is_null() {
            warn!(
                "Registry entry is not valid (path: {})",
                path.as_deref().unwrap_or(RegistryConfig::UNKNOWN_PATH)
            );
        }
        Self {
            handle: Handle::new(backend.clone(), raw, path, ownership),
        }
    }

    /// Wrap a native reference owned elsewhere.
    pub fn borrowed(backend: &Arc<B>, raw: RawObject, path: Option<String>) -> Self {
        Self::from_raw(backend, raw, path, Ownership::Borrowed)
    }

    pub fn raw(&self) -> RawObject {
        self.handle.raw()
    }

    pub fn path(&self) -> Option<&str> {
        self.handle.path()
    }

    pub fn ownership(&self) -> Ownership {
        self.handle.ownership()
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    fn backend(&self) -> &Arc<B> {
        self.handle.backend()
    }

    // ========================================
    // Properties
    // ========================================

    /// Every property of this entry.
    pub fn all_properties(&self) -> Result<PropertyMap<B>> {
        let payload = self.backend().all_properties(self.raw()).map_err(|status| {
            RegistryError::PropertyFetch {
                reason: format!(
                    "property snapshot returned error: {}",
                    self.backend().describe_status(status)
                ),
            }
        })?;

        let mapping = payload
            .as_ref()
            .and_then(|payload| payload.as_mapping())
            .ok_or_else(|| RegistryError::PropertyFetch {
                reason: "Unable to get dictionary of all items".to_string(),
            })?;

        Ok(mapping
            .iter()
            .map(|(name, native)| (name.clone(), PropertyValue::from_native(native)))
            .collect())
    }

    /// A single property. `None` if the entry has no such property or its
    /// value has no typed counterpart.
    pub fn property(&self, name: &str) -> Option<PropertyValue<B::Payload>> {
        let native = self.backend().property(self.raw(), name)?;
        PropertyValue::from_native(&native)
    }

    /// Alias of [`RegistryEntry::property`].
    pub fn object_named(&self, name: &str) -> Option<PropertyValue<B::Payload>> {
        self.property(name)
    }

    /// Store a property.
    pub fn set_property(&self, name: &str, value: &PropertyValue<B::Payload>) -> Result<()> {
        let status = self
            .backend()
            .set_property(self.raw(), name, &value.to_native());
        if status.is_success() {
            debug!("Set property {} on registry object {}", name, self.raw());
            return Ok(());
        }

        Err(RegistryError::PropertySet {
            name: name.to_string(),
            value: value.to_string(),
            status,
            message: self.backend().describe_status(status),
        })
    }

    // ========================================
    // Traversal
    // ========================================

    /// Children of this entry in every plane, in [`Plane::ALL`] order.
    ///
    /// An entry reachable in several planes appears once per plane, each time
    /// labelled with its path in that plane. Planes that cannot be iterated
    /// contribute nothing.
    pub fn subentries(&self) -> Vec<Self> {
        Plane::ALL
            .into_iter()
            .flat_map(|plane| self.subentries_in(plane))
            .collect()
    }

    /// Children of this entry in one plane.
    pub fn subentries_in(&self, plane: Plane) -> Vec<Self> {
        let backend = self.backend();
        let iterator = match backend.child_iterator(self.raw(), plane) {
            Ok(iterator) if !iterator.is_null() => iterator,
            Ok(_) => {
                debug!("No {} iterator for registry object {}", plane, self.raw());
                return Vec::new();
            }
            Err(status) => {
                debug!(
                    "Failed to iterate {} children of registry object {}: {}",
                    plane,
                    self.raw(),
                    backend.describe_status(status)
                );
                return Vec::new();
            }
        };

        // Released when the loop below is done, whichever way it ends.
        let _iterator = Handle::owned(backend.clone(), iterator, None);

        std::iter::from_fn(|| {
            let child = backend.iterator_next(iterator);
            (!child.is_null()).then_some(child)
        })
        .map(|child| {
            let path = backend.entry_path(child, plane);
            Self::from_raw(backend, child, path, Ownership::Owned)
        })
        .collect()
    }
}

impl<B: RegistryBackend> PartialEq for RegistryEntry<B> {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

impl<B: RegistryBackend> Eq for RegistryEntry<B> {}

impl<B: RegistryBackend> Hash for RegistryEntry<B> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw().hash(state);
    }
}

impl<B: RegistryBackend> fmt::Display for RegistryEntry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry: {}, Path: {}",
            self.raw(),
            self.path().unwrap_or(RegistryConfig::UNKNOWN_PATH)
        )
    }
}

impl<B: RegistryBackend> fmt::Debug for RegistryEntry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("handle", &self.handle)
            .finish()
    }
}
