//! regentry - typed access to multi-plane device registry trees.
//!
//! A registry is a tree of hardware entries addressed by reference-counted
//! native handles. Each entry carries named properties and may have
//! different children in each plane (service, power, device tree, ...).
//! This crate wraps a registry backend in three layers:
//!
//! - [`Handle`]: a native reference with a release policy fixed at
//!   construction, released exactly once on drop when owned
//! - [`PropertyValue`]: the closed set of property kinds, marshalled to and
//!   from the backend's untyped payloads
//! - [`RegistryEntry`]: lookup by path or root, property access, and
//!   per-plane traversal
//!
//! # Example
//!
//! ```rust
//! use regentry::backend::memory::{MemoryRegistry, MemoryValue};
//! use regentry::{Plane, PropertyValue, RegistryEntry};
//! use std::sync::Arc;
//!
//! let registry = MemoryRegistry::new("Root");
//! let options = registry.add_child(registry.root_id(), Plane::DeviceTree, "options");
//! registry.insert_property(options, "boot-args", MemoryValue::String("-v".into()));
//! let registry = Arc::new(registry);
//!
//! let nvram = RegistryEntry::nvram(&registry);
//! assert!(nvram.is_valid());
//! assert_eq!(nvram.property("boot-args"), Some(PropertyValue::from("-v")));
//!
//! nvram.set_property("auto-boot", &PropertyValue::from("false"))?;
//! for child in RegistryEntry::root(&registry).subentries() {
//!     println!("{child}");
//! }
//! # Ok::<(), regentry::RegistryError>(())
//! ```

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod handle;
pub mod platform;
pub mod value;

// Re-export commonly used types
pub use backend::{KernReturn, NativePayload, Number, RawObject, RegistryBackend};
pub use config::{Plane, RegistryConfig};
pub use entry::{PropertyMap, RegistryEntry};
pub use error::{RegistryError, Result};
pub use handle::{Handle, Ownership};
pub use value::{PropertyValue, ValueKind};

#[cfg(target_os = "macos")]
pub use platform::IoKitRegistry;
