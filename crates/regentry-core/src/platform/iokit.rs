//! IOKit registry backend.
//!
//! Entries and iterators are `io_object_t` ports owned by this task; each
//! one returned by IOKit carries a reference that `IOObjectRelease` gives
//! back. Property payloads are CoreFoundation property-list objects.

// This module owns the IOKit FFI boundary. Every unsafe block states its
// contract in a `SAFETY:` comment.
#![allow(unsafe_code)]

use crate::backend::{KernReturn, NativePayload, Number, RawObject, RegistryBackend};
use crate::config::Plane;
use chrono::{DateTime, Utc};
use core_foundation::array::CFArray;
use core_foundation::base::{kCFAllocatorDefault, CFAllocatorRef, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::data::CFData;
use core_foundation::date::CFDate;
use core_foundation::dictionary::{CFDictionary, CFMutableDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use libc::{c_char, kern_return_t, mach_port_t};
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::ptr;
use tracing::trace;

type IoObject = mach_port_t;

/// Seconds between the Unix epoch and the CoreFoundation reference date
/// (2001-01-01T00:00:00Z).
const CF_ABSOLUTE_TIME_UNIX_OFFSET: f64 = 978_307_200.0;

/// `kIOMainPortDefault`, which IOKit defines as `MACH_PORT_NULL`.
const MAIN_PORT_DEFAULT: mach_port_t = 0;

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    fn IORegistryGetRootEntry(main_port: mach_port_t) -> IoObject;
    fn IORegistryEntryFromPath(main_port: mach_port_t, path: *const c_char) -> IoObject;
    fn IORegistryEntryCreateCFProperties(
        entry: IoObject,
        properties: *mut CFMutableDictionaryRef,
        allocator: CFAllocatorRef,
        options: u32,
    ) -> kern_return_t;
    fn IORegistryEntryCreateCFProperty(
        entry: IoObject,
        key: CFStringRef,
        allocator: CFAllocatorRef,
        options: u32,
    ) -> CFTypeRef;
    fn IORegistryEntrySetCFProperty(
        entry: IoObject,
        name: CFStringRef,
        property: CFTypeRef,
    ) -> kern_return_t;
    fn IORegistryEntryGetChildIterator(
        entry: IoObject,
        plane: *const c_char,
        iterator: *mut IoObject,
    ) -> kern_return_t;
    fn IORegistryEntryCopyPath(entry: IoObject, plane: *const c_char) -> CFStringRef;
    fn IOIteratorNext(iterator: IoObject) -> IoObject;
    fn IOObjectRelease(object: IoObject) -> kern_return_t;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFNumberIsFloatType(number: CFTypeRef) -> u8;
}

extern "C" {
    fn mach_error_string(error_value: kern_return_t) -> *const c_char;
}

/// NUL-terminated plane name for IOKit calls.
fn plane_name(plane: Plane) -> &'static CStr {
    match plane {
        Plane::Service => c"IOService",
        Plane::Power => c"IOPower",
        Plane::DeviceTree => c"IODeviceTree",
        Plane::Audio => c"IOAudio",
        Plane::FireWire => c"IOFireWire",
        Plane::Usb => c"IOUSB",
    }
}

/// The native IOKit registry.
#[derive(Debug, Clone, Copy)]
pub struct IoKitRegistry {
    main_port: mach_port_t,
}

impl Default for IoKitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IoKitRegistry {
    pub fn new() -> Self {
        Self {
            main_port: MAIN_PORT_DEFAULT,
        }
    }
}

impl RegistryBackend for IoKitRegistry {
    type Payload = CFType;

    fn root_entry(&self) -> RawObject {
        // SAFETY: plain call with a valid main port; returns a +1 reference.
        RawObject(unsafe { IORegistryGetRootEntry(self.main_port) })
    }

    fn entry_from_path(&self, path: &str) -> RawObject {
        let Ok(path) = CString::new(path) else {
            return RawObject::NULL;
        };
        // SAFETY: `path` is NUL-terminated and outlives the call.
        RawObject(unsafe { IORegistryEntryFromPath(self.main_port, path.as_ptr()) })
    }

    fn all_properties(&self, entry: RawObject) -> Result<Option<CFType>, KernReturn> {
        let mut properties: CFMutableDictionaryRef = ptr::null_mut();
        // SAFETY: `properties` is a valid out-pointer; on success IOKit stores
        // a dictionary created under the create rule into it.
        let status = unsafe {
            IORegistryEntryCreateCFProperties(entry.0, &mut properties, kCFAllocatorDefault, 0)
        };
        if status != 0 {
            return Err(KernReturn(status));
        }
        if properties.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null and +1 from the create call; the wrapper takes over
        // that reference.
        Ok(Some(unsafe {
            CFType::wrap_under_create_rule(properties as CFTypeRef)
        }))
    }

    fn property(&self, entry: RawObject, name: &str) -> Option<CFType> {
        let key = CFString::new(name);
        // SAFETY: `key` is a live CFString for the duration of the call.
        let value = unsafe {
            IORegistryEntryCreateCFProperty(
                entry.0,
                key.as_concrete_TypeRef(),
                kCFAllocatorDefault,
                0,
            )
        };
        if value.is_null() {
            return None;
        }
        // SAFETY: non-null and +1 from the create call.
        Some(unsafe { CFType::wrap_under_create_rule(value) })
    }

    fn set_property(&self, entry: RawObject, name: &str, value: &CFType) -> KernReturn {
        let key = CFString::new(name);
        // SAFETY: key and value are live CF objects; IOKit retains what it keeps.
        KernReturn(unsafe {
            IORegistryEntrySetCFProperty(entry.0, key.as_concrete_TypeRef(), value.as_CFTypeRef())
        })
    }

    fn child_iterator(&self, entry: RawObject, plane: Plane) -> Result<RawObject, KernReturn> {
        let mut iterator: IoObject = 0;
        // SAFETY: the plane name is a static C string and `iterator` a valid
        // out-pointer.
        let status = unsafe {
            IORegistryEntryGetChildIterator(entry.0, plane_name(plane).as_ptr(), &mut iterator)
        };
        if status != 0 {
            return Err(KernReturn(status));
        }
        Ok(RawObject(iterator))
    }

    fn iterator_next(&self, iterator: RawObject) -> RawObject {
        // SAFETY: plain call; a null or exhausted iterator yields 0.
        RawObject(unsafe { IOIteratorNext(iterator.0) })
    }

    fn entry_path(&self, entry: RawObject, plane: Plane) -> Option<String> {
        // SAFETY: the plane name is a static C string.
        let path = unsafe { IORegistryEntryCopyPath(entry.0, plane_name(plane).as_ptr()) };
        if path.is_null() {
            return None;
        }
        // SAFETY: non-null and +1 from the copy call.
        Some(unsafe { CFString::wrap_under_create_rule(path) }.to_string())
    }

    fn release(&self, object: RawObject) {
        // SAFETY: callers give back a reference they hold exactly once.
        let status = unsafe { IOObjectRelease(object.0) };
        trace!("IOObjectRelease({}) -> {:#x}", object, status as u32);
    }

    fn describe_status(&self, status: KernReturn) -> String {
        // SAFETY: mach_error_string returns a pointer to static storage or null.
        let message = unsafe { mach_error_string(status.0) };
        if message.is_null() {
            return status.to_string();
        }
        // SAFETY: non-null, NUL-terminated, static.
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Wrap a CF object borrowed from a live container.
///
/// # Safety
/// `object` must be a valid, non-null CF object kept alive by its container
/// for the duration of the call.
unsafe fn retain_borrowed(object: *const std::ffi::c_void) -> CFType {
    // SAFETY: guaranteed by the caller; the get rule adds our own reference.
    unsafe { CFType::wrap_under_get_rule(object) }
}

impl NativePayload for CFType {
    fn as_text(&self) -> Option<String> {
        self.downcast::<CFString>().map(|s| s.to_string())
    }

    fn as_bytes(&self) -> Option<Vec<u8>> {
        self.downcast::<CFData>().map(|d| d.bytes().to_vec())
    }

    fn as_mapping(&self) -> Option<BTreeMap<String, Self>> {
        let dictionary = self.downcast::<CFDictionary>()?;
        let (keys, values) = dictionary.get_keys_and_values();
        keys.into_iter()
            .zip(values)
            .map(|(key, value)| {
                // SAFETY: keys and values are owned by `dictionary`, alive here.
                let (key, value) = unsafe { (retain_borrowed(key), retain_borrowed(value)) };
                key.downcast::<CFString>().map(|key| (key.to_string(), value))
            })
            .collect()
    }

    fn as_list(&self) -> Option<Vec<Self>> {
        let array = self.downcast::<CFArray>()?;
        Some(
            array
                .get_all_values()
                .into_iter()
                // SAFETY: elements are owned by `array`, alive here.
                .map(|item| unsafe { retain_borrowed(item) })
                .collect(),
        )
    }

    fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        let date = self.downcast::<CFDate>()?;
        let unix = date.abs_time() + CF_ABSOLUTE_TIME_UNIX_OFFSET;
        let secs = unix.floor();
        let nanos = ((unix - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }

    fn as_number(&self) -> Option<Number> {
        if let Some(boolean) = self.downcast::<CFBoolean>() {
            return Some(Number::Integer(i64::from(bool::from(boolean))));
        }
        let number = self.downcast::<CFNumber>()?;
        // SAFETY: `number` is a live CFNumber.
        if unsafe { CFNumberIsFloatType(number.as_CFTypeRef()) } != 0 {
            number.to_f64().map(Number::Float)
        } else {
            number.to_i64().map(Number::Integer)
        }
    }

    fn from_text(text: &str) -> Self {
        CFString::new(text).as_CFType()
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        CFData::from_buffer(bytes).as_CFType()
    }

    fn from_mapping(mapping: &BTreeMap<String, Self>) -> Self {
        let pairs: Vec<(CFString, CFType)> = mapping
            .iter()
            .map(|(key, value)| (CFString::new(key), value.clone()))
            .collect();
        CFDictionary::from_CFType_pairs(&pairs).as_CFType()
    }

    fn from_list(items: &[Self]) -> Self {
        CFArray::from_CFTypes(items).as_CFType()
    }

    fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        let unix = timestamp.timestamp() as f64 + f64::from(timestamp.timestamp_subsec_nanos()) / 1e9;
        CFDate::new(unix - CF_ABSOLUTE_TIME_UNIX_OFFSET).as_CFType()
    }

    fn from_number(number: Number) -> Self {
        match number {
            Number::Integer(i) => CFNumber::from(i).as_CFType(),
            Number::Float(f) => CFNumber::from(f).as_CFType(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::RegistryEntry;
    use crate::value::PropertyValue;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_root_entry_is_valid() {
        let registry = Arc::new(IoKitRegistry::new());
        let root = RegistryEntry::root(&registry);
        assert!(root.is_valid());
        assert!(!root.subentries_in(Plane::Service).is_empty());
    }

    #[test]
    fn test_bogus_path_is_invalid() {
        let registry = Arc::new(IoKitRegistry::new());
        assert!(!RegistryEntry::from_path(&registry, "IOService:/no/such/entry").is_valid());
        assert!(!RegistryEntry::from_path(&registry, "").is_valid());
    }

    #[test]
    fn test_cf_round_trip() {
        let timestamp = Utc.with_ymd_and_hms(2023, 3, 15, 0, 0, 0).unwrap();
        let values: Vec<PropertyValue<CFType>> = vec![
            PropertyValue::from("IOPlatformExpertDevice"),
            PropertyValue::from(vec![1u8, 2, 3]),
            PropertyValue::from(42i64),
            PropertyValue::from(0.5f64),
            PropertyValue::from(timestamp),
        ];
        for value in values {
            assert_eq!(PropertyValue::from_native(&value.to_native()), Some(value));
        }
    }

    #[test]
    fn test_cf_boolean_reads_as_number() {
        let native = CFBoolean::true_value().as_CFType();
        assert_eq!(
            PropertyValue::from_native(&native),
            Some(PropertyValue::Number(Number::Integer(1)))
        );
    }

    #[test]
    fn test_describe_status() {
        let registry = IoKitRegistry::new();
        assert!(!registry.describe_status(KernReturn::ERROR).is_empty());
    }
}
