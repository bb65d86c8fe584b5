//! Backend capability trait and native types.
//!
//! A backend is the registry service itself: it hands out reference-counted
//! native objects, answers property queries with untyped payloads, and walks
//! per-plane child lists through iterator objects. Everything above this
//! module is written against [`RegistryBackend`] only.
//!
//! # Backends
//!
//! - [`memory::MemoryRegistry`] - in-process tree with reference bookkeeping
//! - `platform::iokit::IoKitRegistry` - the native registry (macOS only)

pub mod memory;

use crate::config::Plane;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque native object reference (entry or iterator). Zero is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RawObject(pub u32);

impl RawObject {
    pub const NULL: RawObject = RawObject(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status code returned by backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernReturn(pub i32);

impl KernReturn {
    pub const SUCCESS: KernReturn = KernReturn(0);
    pub const ERROR: KernReturn = KernReturn(0xe000_02bc_u32 as i32);
    pub const BAD_ARGUMENT: KernReturn = KernReturn(0xe000_02c2_u32 as i32);
    pub const UNSUPPORTED: KernReturn = KernReturn(0xe000_02c7_u32 as i32);
    pub const NOT_PERMITTED: KernReturn = KernReturn(0xe000_02e2_u32 as i32);
    pub const NOT_FOUND: KernReturn = KernReturn(0xe000_02f0_u32 as i32);

    pub fn is_success(&self) -> bool {
        *self == KernReturn::SUCCESS
    }

    fn name(&self) -> Option<&'static str> {
        match *self {
            KernReturn::SUCCESS => Some("success"),
            KernReturn::ERROR => Some("general error"),
            KernReturn::BAD_ARGUMENT => Some("invalid argument"),
            KernReturn::UNSUPPORTED => Some("unsupported function"),
            KernReturn::NOT_PERMITTED => Some("not permitted"),
            KernReturn::NOT_FOUND => Some("data was not found"),
            _ => None,
        }
    }
}

impl fmt::Display for KernReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#x})", self.0 as u32),
            None => write!(f, "status {:#x}", self.0 as u32),
        }
    }
}

/// A native number, integer or floating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integer value, if this number is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Integer(i) => Some(i),
            Number::Float(_) => None,
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

/// An untyped property payload as the backend represents it.
///
/// The `as_*` probes are structural: a payload may answer more than one of
/// them, and `PropertyValue::from_native` resolves such overlaps by a fixed
/// priority order. The `from_*` constructors build the backend's canonical
/// representation of each kind.
pub trait NativePayload: Clone + fmt::Debug + PartialEq {
    fn as_text(&self) -> Option<String>;
    fn as_bytes(&self) -> Option<Vec<u8>>;
    /// String-keyed view. Payloads with any non-text key answer `None`.
    fn as_mapping(&self) -> Option<BTreeMap<String, Self>>;
    fn as_list(&self) -> Option<Vec<Self>>;
    fn as_timestamp(&self) -> Option<DateTime<Utc>>;
    fn as_number(&self) -> Option<Number>;

    fn from_text(text: &str) -> Self;
    fn from_bytes(bytes: &[u8]) -> Self;
    fn from_mapping(mapping: &BTreeMap<String, Self>) -> Self;
    fn from_list(items: &[Self]) -> Self;
    fn from_timestamp(timestamp: DateTime<Utc>) -> Self;
    fn from_number(number: Number) -> Self;
}

/// The primitive operations a registry service must offer.
///
/// Calls that return a [`RawObject`] hand the caller one reference, which
/// the caller gives back through [`RegistryBackend::release`].
pub trait RegistryBackend {
    /// Untyped property payload.
    type Payload: NativePayload;

    /// Root of the main tree. Never null.
    fn root_entry(&self) -> RawObject;

    /// Resolve a `Plane:/a/b` path. Null when nothing matches.
    fn entry_from_path(&self, path: &str) -> RawObject;

    /// Snapshot of every property on `entry`.
    ///
    /// `Ok(None)` means the call succeeded but produced no payload.
    fn all_properties(&self, entry: RawObject)
        -> Result<Option<Self::Payload>, KernReturn>;

    /// A single property, or `None` if `entry` has no property `name`.
    fn property(&self, entry: RawObject, name: &str) -> Option<Self::Payload>;

    fn set_property(&self, entry: RawObject, name: &str, value: &Self::Payload) -> KernReturn;

    /// Iterator over the children of `entry` in `plane`.
    fn child_iterator(&self, entry: RawObject, plane: Plane) -> Result<RawObject, KernReturn>;

    /// Next child from `iterator`; null once exhausted.
    fn iterator_next(&self, iterator: RawObject) -> RawObject;

    /// Path of `entry` within `plane`, if it is attached there.
    fn entry_path(&self, entry: RawObject, plane: Plane) -> Option<String>;

    /// Give back one reference to `object`.
    fn release(&self, object: RawObject);

    /// Human-readable text for a status code.
    fn describe_status(&self, status: KernReturn) -> String {
        status.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_object_null() {
        assert!(RawObject::NULL.is_null());
        assert!(RawObject::default().is_null());
        assert!(!RawObject(7).is_null());
    }

    #[test]
    fn test_kern_return_display() {
        assert!(KernReturn::SUCCESS.is_success());
        assert!(!KernReturn::ERROR.is_success());
        assert_eq!(
            KernReturn::NOT_PERMITTED.to_string(),
            "not permitted (0xe00002e2)"
        );
        assert_eq!(KernReturn(5).to_string(), "status 0x5");
    }

    #[test]
    fn test_number_accessors() {
        assert_eq!(Number::from(3i64).as_i64(), Some(3));
        assert_eq!(Number::from(1.5f64).as_i64(), None);
        assert_eq!(Number::Integer(2).as_f64(), 2.0);
        assert_eq!(Number::Float(0.25).to_string(), "0.25");
    }
}
