//! Native registry backends.
//!
//! All `#[cfg]` blocks for OS-specific registry access live here.
//!
//! # Supported Platforms
//!
//! - **macOS**: IOKit registry (`iokit::IoKitRegistry`)
//! - **Everything else**: no native registry; use `backend::memory::MemoryRegistry`

#[cfg(target_os = "macos")]
pub mod iokit;

#[cfg(target_os = "macos")]
pub use iokit::IoKitRegistry;

/// Returns true if this platform has a native registry backend.
pub fn has_native_registry() -> bool {
    cfg!(target_os = "macos")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_native_registry() {
        #[cfg(target_os = "macos")]
        assert!(has_native_registry());
        #[cfg(not(target_os = "macos"))]
        assert!(!has_native_registry());
    }
}
