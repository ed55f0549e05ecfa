//! Scoped resource handles
//!
//! A [`Scoped`] pins one cached resource for as long as it (or any clone of
//! it) is alive. The garbage collector never hard-deletes a record whose pin
//! count is above zero.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vecmeta_core::{Id, Resource};

/// Cached resource plus its pin count
#[derive(Debug)]
pub struct HolderEntry<T> {
    resource: T,
    pins: AtomicUsize,
}

impl<T: Resource> HolderEntry<T> {
    pub(crate) fn new(resource: T) -> Self {
        HolderEntry {
            resource,
            pins: AtomicUsize::new(0),
        }
    }

    /// Current number of live scoped handles
    pub fn pins(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }

    /// Borrow the cached resource
    pub fn resource(&self) -> &T {
        &self.resource
    }
}

/// Pinning handle on a cached resource
///
/// Acquisition increments the pin count, drop decrements it. Clones share
/// the same cache entry and each hold their own pin.
pub struct Scoped<T: Resource> {
    entry: Arc<HolderEntry<T>>,
}

impl<T: Resource> Scoped<T> {
    /// Pin `entry`
    pub(crate) fn new(entry: Arc<HolderEntry<T>>) -> Self {
        entry.pins.fetch_add(1, Ordering::AcqRel);
        Scoped { entry }
    }

    /// Id of the pinned resource
    pub fn id(&self) -> Id {
        self.entry.resource.id()
    }

    /// Pin count of the underlying entry, including this handle
    pub fn pins(&self) -> usize {
        self.entry.pins()
    }

    /// Copy of the pinned resource, used to derive a successor record
    pub fn to_owned_resource(&self) -> T {
        self.entry.resource.clone()
    }

    /// Whether two handles pin the same cache entry
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.entry, &b.entry)
    }
}

impl<T: Resource> Clone for Scoped<T> {
    fn clone(&self) -> Self {
        Scoped::new(Arc::clone(&self.entry))
    }
}

impl<T: Resource> Drop for Scoped<T> {
    fn drop(&mut self) {
        self.entry.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Resource> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entry.resource
    }
}

impl<T: Resource> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("resource", &self.entry.resource)
            .field("pins", &self.pins())
            .finish()
    }
}
