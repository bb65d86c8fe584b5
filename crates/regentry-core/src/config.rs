//! Centralized configuration for regentry.
//!
//! Well-known registry paths, path grammar separators, and the set of planes
//! that traversal walks.

use serde::{Deserialize, Serialize};

/// Registry-level configuration.
pub struct RegistryConfig;

impl RegistryConfig {
    /// Path of the device NVRAM entry.
    pub const NVRAM_PATH: &'static str = "IODeviceTree:/options";
    /// Separates the plane name from the path inside that plane.
    pub const PLANE_SEPARATOR: char = ':';
    /// Separates entry names inside a plane path.
    pub const PATH_SEPARATOR: char = '/';
    /// Label used when an entry has no known path.
    pub const UNKNOWN_PATH: &'static str = "Unknown";
}

/// A parent/child hierarchy layered over the registry's node set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Plane {
    Service,
    Power,
    DeviceTree,
    Audio,
    FireWire,
    Usb,
}

impl Plane {
    /// Every plane, in the order `RegistryEntry::subentries` walks them.
    pub const ALL: [Plane; 6] = [
        Plane::Service,
        Plane::Power,
        Plane::DeviceTree,
        Plane::Audio,
        Plane::FireWire,
        Plane::Usb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plane::Service => "IOService",
            Plane::Power => "IOPower",
            Plane::DeviceTree => "IODeviceTree",
            Plane::Audio => "IOAudio",
            Plane::FireWire => "IOFireWire",
            Plane::Usb => "IOUSB",
        }
    }

    /// Parses a plane name. Matching is exact, since registry plane names are case-sensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        Plane::ALL.into_iter().find(|plane| plane.as_str() == s)
    }

    /// Root path of this plane, e.g. `IOService:/`.
    pub fn root_path(&self) -> String {
        format!(
            "{}{}{}",
            self.as_str(),
            RegistryConfig::PLANE_SEPARATOR,
            RegistryConfig::PATH_SEPARATOR
        )
    }
}

impl Default for Plane {
    fn default() -> Self {
        Plane::Service
    }
}

impl std::fmt::Display for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_names_round_trip() {
        for plane in Plane::ALL {
            assert_eq!(Plane::from_str(plane.as_str()), Some(plane));
        }
        assert_eq!(Plane::from_str("ioservice"), None);
        assert_eq!(Plane::from_str(""), None);
    }

    #[test]
    fn test_traversal_order() {
        let names: Vec<_> = Plane::ALL.iter().map(Plane::as_str).collect();
        assert_eq!(
            names,
            ["IOService", "IOPower", "IODeviceTree", "IOAudio", "IOFireWire", "IOUSB"]
        );
    }

    #[test]
    fn test_root_path() {
        assert_eq!(Plane::DeviceTree.root_path(), "IODeviceTree:/");
        assert!(RegistryConfig::NVRAM_PATH.starts_with(&Plane::DeviceTree.root_path()));
    }
}
