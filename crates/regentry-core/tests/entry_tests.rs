//! Integration tests for registry entries over the in-process backend.
//!
//! These cover handle ownership, identity, property access, and plane
//! traversal through the public API only.

use regentry::backend::memory::{MemoryRegistry, MemoryValue, PlaneFault};
use regentry::{
    KernReturn, Ownership, Plane, PropertyValue, RawObject, RegistryBackend, RegistryEntry,
    RegistryError,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize the tracing subscriber for tests.
/// Only initializes once, even if called multiple times.
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .with_target(false)
            .init();
    });
}

/// A small machine: a platform expert with two CPUs in the service plane,
/// the platform and `cpu1` mirrored in the power plane, and an NVRAM node.
struct Machine {
    registry: Arc<MemoryRegistry>,
    platform: RawObject,
    cpu0: RawObject,
    cpu1: RawObject,
    options: RawObject,
}

fn create_machine() -> Machine {
    init_tracing();

    let registry = MemoryRegistry::new("Root");
    let root = registry.root_id();
    let platform = registry.add_child(root, Plane::Service, "J274AP");
    let cpu0 = registry.add_child(platform, Plane::Service, "cpu0");
    let cpu1 = registry.add_child(platform, Plane::Service, "cpu1");
    let options = registry.add_child(root, Plane::DeviceTree, "options");
    registry.attach(root, Plane::Power, platform);
    registry.attach(platform, Plane::Power, cpu1);

    registry.insert_property(platform, "model", MemoryValue::String("Macmini9,1".into()));
    registry.insert_property(platform, "IOPlatformUUID", MemoryValue::Data(vec![0xAB; 16]));
    registry.insert_property(platform, "cpu-count", MemoryValue::Integer(2));
    registry.insert_property(platform, "opaque", MemoryValue::Null);
    registry.insert_property(options, "boot-args", MemoryValue::String("".into()));

    Machine {
        registry: Arc::new(registry),
        platform,
        cpu0,
        cpu1,
        options,
    }
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn test_root_always_valid() {
    let machine = create_machine();
    for _ in 0..3 {
        assert!(RegistryEntry::root(&machine.registry).is_valid());
    }
    assert_eq!(machine.registry.total_outstanding(), 0);
}

#[test]
fn test_from_path_failure_is_not_an_error() {
    let machine = create_machine();
    for path in ["", "J274AP", "IOService:J274AP", "IOService:/J274AP/cpu9", "Bogus:/"] {
        let entry = RegistryEntry::from_path(&machine.registry, path);
        assert!(!entry.is_valid(), "{path:?} should not resolve");
    }
    assert_eq!(machine.registry.over_releases(), 0);
}

#[test]
fn test_same_reference_different_paths_are_equal() {
    let machine = create_machine();
    let by_service = RegistryEntry::from_path(&machine.registry, "IOService:/J274AP/cpu1");
    let by_power = RegistryEntry::from_path(&machine.registry, "IOPower:/J274AP/cpu1");
    assert!(by_service.is_valid());
    assert_ne!(by_service.path(), by_power.path());
    assert_eq!(by_service, by_power);
    assert_eq!(hash_of(&by_service), hash_of(&by_power));

    let other = RegistryEntry::from_path(&machine.registry, "IOService:/J274AP/cpu0");
    assert_ne!(by_service, other);
    assert_eq!(other.raw(), machine.cpu0);
}

#[test]
fn test_subentries_concatenate_planes_in_order() {
    let machine = create_machine();
    let platform = RegistryEntry::from_path(&machine.registry, "IOService:/J274AP");

    let children = platform.subentries();
    let raws: Vec<_> = children.iter().map(RegistryEntry::raw).collect();
    let paths: Vec<_> = children.iter().map(|c| c.path().unwrap_or_default()).collect();

    assert_eq!(raws, [machine.cpu0, machine.cpu1, machine.cpu1]);
    assert_eq!(
        paths,
        [
            "IOService:/J274AP/cpu0",
            "IOService:/J274AP/cpu1",
            "IOPower:/J274AP/cpu1",
        ]
    );
    assert!(children.iter().all(|c| c.raw() != machine.platform));
    assert!(children.iter().all(|c| c.ownership() == Ownership::Owned));
}

#[test]
fn test_subentries_release_everything() {
    let machine = create_machine();
    {
        let root = RegistryEntry::root(&machine.registry);
        let children = root.subentries();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], children[1]);
        assert_eq!(machine.registry.live_iterators(), 0);
        for child in &children {
            let _ = child.subentries();
        }
    }
    assert_eq!(machine.registry.total_outstanding(), 0);
    assert_eq!(machine.registry.over_releases(), 0);
    assert_eq!(machine.registry.live_iterators(), 0);
}

#[test]
fn test_subentries_survive_plane_faults() {
    let machine = create_machine();
    machine
        .registry
        .fail_plane(Plane::Service, PlaneFault::Status(KernReturn::ERROR));
    machine.registry.fail_plane(Plane::Audio, PlaneFault::NullIterator);

    let platform = RegistryEntry::from_path(&machine.registry, "IOService:/J274AP");
    let children = platform.subentries();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].raw(), machine.cpu1);
    assert_eq!(children[0].path(), Some("IOPower:/J274AP/cpu1"));
}

#[test]
fn test_leaf_has_no_subentries() {
    let machine = create_machine();
    let cpu0 = RegistryEntry::from_path(&machine.registry, "IOService:/J274AP/cpu0");
    assert!(cpu0.subentries().is_empty());
}

#[test]
fn test_shared_reference_released_once() {
    let machine = create_machine();
    let raw = machine.registry.entry_from_path("IOService:/J274AP");
    assert_eq!(machine.registry.outstanding(raw), 1);

    let owner = RegistryEntry::from_raw(&machine.registry, raw, None, Ownership::Owned);
    let viewer = RegistryEntry::borrowed(&machine.registry, raw, Some("IOService:/J274AP".into()));
    assert_eq!(owner, viewer);

    drop(viewer);
    assert_eq!(machine.registry.release_count(raw), 0);
    drop(owner);
    assert_eq!(machine.registry.release_count(raw), 1);
    assert_eq!(machine.registry.outstanding(raw), 0);
    assert_eq!(machine.registry.over_releases(), 0);
}

#[test]
fn test_all_properties() {
    let machine = create_machine();
    let platform = RegistryEntry::from_path(&machine.registry, "IOService:/J274AP");
    let properties = platform.all_properties().unwrap();

    assert_eq!(properties.len(), 4);
    assert_eq!(
        properties["model"],
        Some(PropertyValue::Text("Macmini9,1".into()))
    );
    assert_eq!(
        properties["IOPlatformUUID"].as_ref().map(ToString::to_string),
        Some("Data (16 bytes)".to_string())
    );
    assert_eq!(properties["cpu-count"], Some(PropertyValue::from(2i64)));
    assert!(properties.contains_key("opaque"));
    assert_eq!(properties["opaque"], None);
}

#[test]
fn test_invalid_entry_fetch_fails() {
    let machine = create_machine();
    let missing = RegistryEntry::from_path(&machine.registry, "IOService:/nope");
    let err = missing.all_properties().unwrap_err();
    assert!(matches!(err, RegistryError::PropertyFetch { .. }));
    assert!(missing.property("model").is_none());
}

#[test]
fn test_write_then_read() {
    let machine = create_machine();
    let nvram = RegistryEntry::nvram(&machine.registry);
    assert_eq!(nvram.raw(), machine.options);

    nvram
        .set_property("boot-args", &PropertyValue::from("-v debug=0x14e"))
        .unwrap();
    assert_eq!(
        nvram.property("boot-args"),
        Some(PropertyValue::from("-v debug=0x14e"))
    );
}

#[test]
fn test_write_failure_is_surfaced() {
    let machine = create_machine();
    machine.registry.set_read_only(machine.options);
    let nvram = RegistryEntry::nvram(&machine.registry);

    let result = nvram.set_property("boot-args", &PropertyValue::from("-s"));
    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(KernReturn::NOT_PERMITTED));
    assert_eq!(
        err.to_string(),
        "Failed to set -s for property boot-args: not permitted (0xe00002e2)"
    );
    assert_eq!(nvram.property("boot-args"), Some(PropertyValue::from("")));
}
