//! Scoped ownership of native registry references.
//!
//! A [`Handle`] pairs a native reference with the backend that issued it and
//! decides, once and at construction, whether dropping the handle gives the
//! reference back. Owned handles release on every exit path, including early
//! returns and unwinding; borrowed handles never release.

use crate::backend::{RawObject, RegistryBackend};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Whether a handle is responsible for releasing its native reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ownership {
    /// The handle holds one reference and releases it on drop.
    #[default]
    Owned,
    /// Someone else holds the reference; drop does nothing.
    Borrowed,
}

/// A native registry reference with an optional diagnostic path.
pub struct Handle<B: RegistryBackend> {
    backend: Arc<B>,
    raw: RawObject,
    path: Option<String>,
    ownership: Ownership,
}

impl<B: RegistryBackend> Handle<B> {
    /// Wrap `raw`. Validity is not checked; see [`Handle::is_valid`].
    pub fn new(backend: Arc<B>, raw: RawObject, path: Option<String>, ownership: Ownership) -> Self {
        Self {
            backend,
            raw,
            path,
            ownership,
        }
    }

    /// Wrap a reference the caller received from the backend and now hands over.
    pub fn owned(backend: Arc<B>, raw: RawObject, path: Option<String>) -> Self {
        Self::new(backend, raw, path, Ownership::Owned)
    }

    /// Wrap a reference that stays owned elsewhere.
    pub fn borrowed(backend: Arc<B>, raw: RawObject, path: Option<String>) -> Self {
        Self::new(backend, raw, path, Ownership::Borrowed)
    }

    pub fn raw(&self) -> RawObject {
        self.raw
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// True iff the native reference is non-null.
    pub fn is_valid(&self) -> bool {
        !self.raw.is_null()
    }
}

impl<B: RegistryBackend> Drop for Handle<B> {
    fn drop(&mut self) {
        if self.ownership == Ownership::Owned && self.is_valid() {
            trace!("Releasing registry object {}", self.raw);
            self.backend.release(self.raw);
        }
    }
}

impl<B: RegistryBackend> fmt::Debug for Handle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("raw", &self.raw)
            .field("path", &self.path)
            .field("ownership", &self.ownership)
            .finish()
    }
}
