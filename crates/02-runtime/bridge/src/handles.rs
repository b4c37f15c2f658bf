use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Opaque non-zero token standing in for a value owned by a [`HandleRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Rebuilds a handle from its raw form; zero is the null handle.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Handle)
    }

    /// Raw form suitable for crossing a foreign boundary.
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Table mapping handles to values so foreign callers never hold pointers.
///
/// Handles are never reused within one registry.
pub struct HandleRegistry<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<Handle, T>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `value` and returns its handle.
    pub fn insert(&self, value: T) -> Handle {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = Handle(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN));
        self.entries.lock().insert(handle, value);
        handle
    }

    /// Runs `f` against the value behind `handle`.
    ///
    /// The registry lock is held while `f` runs, so `f` must not touch the
    /// registry.
    pub fn with<R>(&self, handle: Handle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries.lock().get_mut(&handle).map(f)
    }

    /// Removes and returns the value; the handle becomes dangling.
    pub fn take(&self, handle: Handle) -> Option<T> {
        self.entries.lock().remove(&handle)
    }

    /// Drops the value behind `handle`. Returns `false` if it was unknown.
    pub fn release(&self, handle: Handle) -> bool {
        self.take(handle).is_some()
    }

    /// True while `handle` refers to a live value.
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every live value.
    pub fn clear(&self) {
        let drained: Vec<T> = self.entries.lock().drain().map(|(_, v)| v).collect();
        drop(drained);
    }
}

impl<T: Clone> HandleRegistry<T> {
    /// Clones the value behind `handle` out of the registry.
    pub fn get_cloned(&self, handle: Handle) -> Option<T> {
        self.entries.lock().get(&handle).cloned()
    }
}
