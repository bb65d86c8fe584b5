//! In-process registry backend.
//!
//! `MemoryRegistry` keeps a tree of named entries with per-plane child lists
//! and property tables, and hands out references the way a native registry
//! does: every object returned from a lookup or iterator carries one
//! reference that must be given back through `release`. Outstanding
//! references, release counts, and over-releases are recorded so ownership
//! mistakes are observable.
//!
//! Faults can be injected per entry or per plane to exercise the error paths
//! of the layers above.

use super::{KernReturn, NativePayload, Number, RawObject, RegistryBackend};
use crate::config::{Plane, RegistryConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// Native payload of the in-process backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MemoryValue {
    String(String),
    Data(Vec<u8>),
    Dictionary(BTreeMap<String, MemoryValue>),
    Array(Vec<MemoryValue>),
    Date(DateTime<Utc>),
    Integer(i64),
    Real(f64),
    /// Reads as the number 0 or 1.
    Boolean(bool),
    /// Ordered association list. Reads as a mapping when its keys are
    /// unique, and always as a list of `[key, value]` arrays.
    Pairs(Vec<(String, MemoryValue)>),
    /// Matches none of the typed kinds.
    Null,
}

impl NativePayload for MemoryValue {
    fn as_text(&self) -> Option<String> {
        match self {
            MemoryValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            MemoryValue::Data(d) => Some(d.clone()),
            _ => None,
        }
    }

    fn as_mapping(&self) -> Option<BTreeMap<String, Self>> {
        match self {
            MemoryValue::Dictionary(map) => Some(map.clone()),
            MemoryValue::Pairs(pairs) => {
                let map: BTreeMap<_, _> = pairs.iter().cloned().collect();
                (map.len() == pairs.len()).then_some(map)
            }
            _ => None,
        }
    }

    fn as_list(&self) -> Option<Vec<Self>> {
        match self {
            MemoryValue::Array(items) => Some(items.clone()),
            MemoryValue::Pairs(pairs) => Some(
                pairs
                    .iter()
                    .map(|(k, v)| MemoryValue::Array(vec![MemoryValue::String(k.clone()), v.clone()]))
                    .collect(),
            ),
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            MemoryValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<Number> {
        match *self {
            MemoryValue::Integer(i) => Some(Number::Integer(i)),
            MemoryValue::Real(f) => Some(Number::Float(f)),
            MemoryValue::Boolean(b) => Some(Number::Integer(i64::from(b))),
            _ => None,
        }
    }

    fn from_text(text: &str) -> Self {
        MemoryValue::String(text.to_string())
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        MemoryValue::Data(bytes.to_vec())
    }

    fn from_mapping(mapping: &BTreeMap<String, Self>) -> Self {
        MemoryValue::Dictionary(mapping.clone())
    }

    fn from_list(items: &[Self]) -> Self {
        MemoryValue::Array(items.to_vec())
    }

    fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        MemoryValue::Date(timestamp)
    }

    fn from_number(number: Number) -> Self {
        match number {
            Number::Integer(i) => MemoryValue::Integer(i),
            Number::Float(f) => MemoryValue::Real(f),
        }
    }
}

/// How a plane misbehaves when asked for a child iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneFault {
    /// The iterator request fails with this status.
    Status(KernReturn),
    /// The request succeeds but yields a null iterator.
    NullIterator,
}

/// How an entry's bulk property snapshot misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFault {
    /// The snapshot call fails with this status.
    Status(KernReturn),
    /// The call succeeds without producing a payload.
    Empty,
    /// The call succeeds with a payload that is not a mapping.
    NotAMapping,
}

#[derive(Debug, Default)]
struct MemoryEntry {
    name: String,
    properties: BTreeMap<String, MemoryValue>,
    children: BTreeMap<Plane, Vec<RawObject>>,
    parents: BTreeMap<Plane, RawObject>,
    read_only: bool,
    snapshot_fault: Option<SnapshotFault>,
}

#[derive(Debug)]
struct MemoryState {
    root: RawObject,
    next_id: u32,
    entries: BTreeMap<RawObject, MemoryEntry>,
    iterators: HashMap<RawObject, VecDeque<RawObject>>,
    /// References handed out and not yet given back.
    references: HashMap<RawObject, usize>,
    /// Successful releases per object.
    releases: HashMap<RawObject, usize>,
    over_releases: usize,
    plane_faults: HashMap<Plane, PlaneFault>,
}

impl MemoryState {
    fn allocate(&mut self) -> RawObject {
        let id = RawObject(self.next_id);
        self.next_id += 1;
        id
    }

    fn hand_out(&mut self, object: RawObject) -> RawObject {
        *self.references.entry(object).or_insert(0) += 1;
        object
    }

    fn child_named(&self, parent: RawObject, plane: Plane, name: &str) -> Option<RawObject> {
        self.entries
            .get(&parent)?
            .children
            .get(&plane)?
            .iter()
            .copied()
            .find(|child| self.entries.get(child).is_some_and(|e| e.name == name))
    }

    fn resolve(&self, path: &str) -> Option<RawObject> {
        let (plane_name, rest) = path.split_once(RegistryConfig::PLANE_SEPARATOR)?;
        let plane = Plane::from_str(plane_name)?;
        let rest = rest.strip_prefix(RegistryConfig::PATH_SEPARATOR)?;

        rest.split(RegistryConfig::PATH_SEPARATOR)
            .filter(|component| !component.is_empty())
            .try_fold(self.root, |current, name| self.child_named(current, plane, name))
    }

    fn path_of(&self, entry: RawObject, plane: Plane) -> Option<String> {
        let mut names = Vec::new();
        let mut current = entry;
        while current != self.root {
            // A parent chain longer than the tree is a cycle.
            if names.len() >= self.entries.len() {
                return None;
            }
            let node = self.entries.get(&current)?;
            names.push(node.name.as_str());
            current = *node.parents.get(&plane)?;
        }
        names.reverse();
        let separator = RegistryConfig::PATH_SEPARATOR.to_string();
        Some(format!("{}{}", plane.root_path(), names.join(separator.as_str())))
    }
}

/// In-process registry backend.
#[derive(Debug)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new("Root")
    }
}

impl MemoryRegistry {
    /// Create a registry holding only a root entry named `root_name`.
    pub fn new(root_name: &str) -> Self {
        let root = RawObject(1);
        let mut entries = BTreeMap::new();
        entries.insert(
            root,
            MemoryEntry {
                name: root_name.to_string(),
                ..Default::default()
            },
        );

        Self {
            state: Mutex::new(MemoryState {
                root,
                next_id: 2,
                entries,
                iterators: HashMap::new(),
                references: HashMap::new(),
                releases: HashMap::new(),
                over_releases: 0,
                plane_faults: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================
    // Tree construction
    // ========================================

    /// The root object id. Does not hand out a reference.
    pub fn root_id(&self) -> RawObject {
        self.state().root
    }

    /// Create a new entry named `name` as the last child of `parent` in
    /// `plane`. Returns its id without handing out a reference, or null if
    /// `parent` does not exist.
    pub fn add_child(&self, parent: RawObject, plane: Plane, name: &str) -> RawObject {
        let mut state = self.state();
        if !state.entries.contains_key(&parent) {
            return RawObject::NULL;
        }
        let child = state.allocate();
        state.entries.insert(
            child,
            MemoryEntry {
                name: name.to_string(),
                ..Default::default()
            },
        );
        Self::link(&mut state, parent, plane, child);
        child
    }

    /// Attach an existing entry under `parent` in another plane.
    /// Returns false if either entry is unknown or `child` already has a
    /// parent in `plane`.
    pub fn attach(&self, parent: RawObject, plane: Plane, child: RawObject) -> bool {
        let mut state = self.state();
        let attachable = state.entries.contains_key(&parent)
            && state
                .entries
                .get(&child)
                .is_some_and(|entry| !entry.parents.contains_key(&plane));
        if attachable {
            Self::link(&mut state, parent, plane, child);
        }
        attachable
    }

    fn link(state: &mut MemoryState, parent: RawObject, plane: Plane, child: RawObject) {
        if let Some(entry) = state.entries.get_mut(&parent) {
            entry.children.entry(plane).or_default().push(child);
        }
        if let Some(entry) = state.entries.get_mut(&child) {
            entry.parents.insert(plane, parent);
        }
    }

    /// Store a property directly, bypassing read-only protection.
    pub fn insert_property(&self, entry: RawObject, name: &str, value: MemoryValue) {
        if let Some(e) = self.state().entries.get_mut(&entry) {
            e.properties.insert(name.to_string(), value);
        }
    }

    /// Current stored value of a property.
    pub fn stored_property(&self, entry: RawObject, name: &str) -> Option<MemoryValue> {
        self.state()
            .entries
            .get(&entry)
            .and_then(|e| e.properties.get(name).cloned())
    }

    // ========================================
    // Fault injection
    // ========================================

    /// Reject every `set_property` on `entry` with `NOT_PERMITTED`.
    pub fn set_read_only(&self, entry: RawObject) {
        if let Some(e) = self.state().entries.get_mut(&entry) {
            e.read_only = true;
        }
    }

    pub fn fail_snapshot(&self, entry: RawObject, fault: SnapshotFault) {
        if let Some(e) = self.state().entries.get_mut(&entry) {
            e.snapshot_fault = Some(fault);
        }
    }

    pub fn fail_plane(&self, plane: Plane, fault: PlaneFault) {
        self.state().plane_faults.insert(plane, fault);
    }

    // ========================================
    // Reference bookkeeping
    // ========================================

    /// References to `object` handed out and not yet released.
    pub fn outstanding(&self, object: RawObject) -> usize {
        self.state().references.get(&object).copied().unwrap_or(0)
    }

    /// Total references handed out and not yet released, across all objects.
    pub fn total_outstanding(&self) -> usize {
        self.state().references.values().sum()
    }

    /// Number of successful releases of `object`.
    pub fn release_count(&self, object: RawObject) -> usize {
        self.state().releases.get(&object).copied().unwrap_or(0)
    }

    /// Releases of objects that had no outstanding reference.
    pub fn over_releases(&self) -> usize {
        self.state().over_releases
    }

    /// Iterators that have been created and not yet released.
    pub fn live_iterators(&self) -> usize {
        self.state().iterators.len()
    }
}

impl RegistryBackend for MemoryRegistry {
    type Payload = MemoryValue;

    fn root_entry(&self) -> RawObject {
        let mut state = self.state();
        let root = state.root;
        state.hand_out(root)
    }

    fn entry_from_path(&self, path: &str) -> RawObject {
        let mut state = self.state();
        match state.resolve(path) {
            Some(entry) => state.hand_out(entry),
            None => RawObject::NULL,
        }
    }

    fn all_properties(&self, entry: RawObject) -> Result<Option<MemoryValue>, KernReturn> {
        let state = self.state();
        let entry = state.entries.get(&entry).ok_or(KernReturn::BAD_ARGUMENT)?;
        match entry.snapshot_fault {
            Some(SnapshotFault::Status(status)) => Err(status),
            Some(SnapshotFault::Empty) => Ok(None),
            Some(SnapshotFault::NotAMapping) => Ok(Some(MemoryValue::Array(Vec::new()))),
            None => Ok(Some(MemoryValue::Dictionary(entry.properties.clone()))),
        }
    }

    fn property(&self, entry: RawObject, name: &str) -> Option<MemoryValue> {
        self.stored_property(entry, name)
    }

    fn set_property(&self, entry: RawObject, name: &str, value: &MemoryValue) -> KernReturn {
        let mut state = self.state();
        match state.entries.get_mut(&entry) {
            None => KernReturn::BAD_ARGUMENT,
            Some(e) if e.read_only => KernReturn::NOT_PERMITTED,
            Some(e) => {
                e.properties.insert(name.to_string(), value.clone());
                KernReturn::SUCCESS
            }
        }
    }

    fn child_iterator(&self, entry: RawObject, plane: Plane) -> Result<RawObject, KernReturn> {
        let mut state = self.state();
        match state.plane_faults.get(&plane) {
            Some(PlaneFault::Status(status)) => return Err(*status),
            Some(PlaneFault::NullIterator) => return Ok(RawObject::NULL),
            None => {}
        }

        let children: VecDeque<_> = state
            .entries
            .get(&entry)
            .ok_or(KernReturn::BAD_ARGUMENT)?
            .children
            .get(&plane)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();

        let iterator = state.allocate();
        state.iterators.insert(iterator, children);
        Ok(state.hand_out(iterator))
    }

    fn iterator_next(&self, iterator: RawObject) -> RawObject {
        let mut state = self.state();
        let next = state
            .iterators
            .get_mut(&iterator)
            .and_then(VecDeque::pop_front);
        match next {
            Some(child) => state.hand_out(child),
            None => RawObject::NULL,
        }
    }

    fn entry_path(&self, entry: RawObject, plane: Plane) -> Option<String> {
        self.state().path_of(entry, plane)
    }

    fn release(&self, object: RawObject) {
        let mut state = self.state();
        let remaining = match state.references.get_mut(&object) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Some(*count)
            }
            _ => None,
        };
        let Some(remaining) = remaining else {
            state.over_releases += 1;
            warn!("Release of object {} with no outstanding reference", object);
            return;
        };

        *state.releases.entry(object).or_insert(0) += 1;
        if remaining == 0 {
            state.references.remove(&object);
            state.iterators.remove(&object);
        }
        trace!("Released object {} ({} remaining)", object, remaining);
    }
}
