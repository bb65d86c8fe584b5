//! Error types for regentry.
//!
//! Only backend failures surface as errors. An entry with a null native
//! reference is reported through `RegistryEntry::is_valid`, and a property
//! whose native value has no typed counterpart is reported as `None`.

use crate::backend::KernReturn;
use thiserror::Error;

/// Main error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The bulk property snapshot could not be acquired or interpreted.
    #[error("Failed to acquire all registry entry properties: {reason}")]
    PropertyFetch { reason: String },

    /// The backend refused to store a property.
    #[error("Failed to set {value} for property {name}: {message}")]
    PropertySet {
        name: String,
        /// Rendered form of the value that was being written.
        value: String,
        status: KernReturn,
        /// Backend description of `status`.
        message: String,
    },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    /// Backend status code carried by this error, if any.
    pub fn status(&self) -> Option<KernReturn> {
        match self {
            RegistryError::PropertySet { status, .. } => Some(*status),
            RegistryError::PropertyFetch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::PropertyFetch {
            reason: "Unable to get dictionary of all items".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to acquire all registry entry properties: Unable to get dictionary of all items"
        );
    }

    #[test]
    fn test_set_error_display_and_status() {
        let err = RegistryError::PropertySet {
            name: "boot-args".into(),
            value: "-v".into(),
            status: KernReturn::NOT_PERMITTED,
            message: "not permitted".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to set -v for property boot-args: not permitted"
        );
        assert_eq!(err.status(), Some(KernReturn::NOT_PERMITTED));
    }

    #[test]
    fn test_fetch_error_has_no_status() {
        let err = RegistryError::PropertyFetch {
            reason: "x".into(),
        };
        assert!(err.status().is_none());
    }
}
