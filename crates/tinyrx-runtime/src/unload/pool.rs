#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Unload, UnloadAction};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, default_sink, guarded};

struct PoolInner {
    entries: Vec<Rc<dyn Unload>>,
    unloaded: Cell<bool>,
    sink: Rc<dyn DiagnosticSink>,
}

/// Aggregate disposer for a scope.
///
/// Cloning an `UnloadPool` creates a new handle to the same pool, which is
/// how listener registrations far from the scope owner add their removal
/// actions to it.
///
/// # Usage
///
/// ```ignore
/// let pool = UnloadPool::new();
/// let score = Observed::new(&ids, 0);
/// score.add_value_listener_scoped(|v| println!("score {v}"), &pool);
///
/// // Scene teardown: every scoped listener is detached.
/// pool.unload();
/// ```
#[derive(Clone)]
pub struct UnloadPool {
    inner: Rc<RefCell<PoolInner>>,
}

impl UnloadPool {
    /// Create an empty pool that logs failures through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(default_sink())
    }

    /// Create an empty pool that reports failures to `sink`.
    #[must_use]
    pub fn with_sink(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::with_capacity(4, sink)
    }

    /// Create an empty pool with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PoolInner {
                entries: Vec::with_capacity(capacity),
                unloaded: Cell::new(false),
                sink,
            })),
        }
    }

    /// Add an entry and hand it back for chaining.
    pub fn add<U: Unload + 'static>(&self, unload: U) -> Rc<U> {
        let entry = Rc::new(unload);
        self.inner.borrow_mut().entries.push(entry.clone());
        entry
    }

    /// Add an already shared entry.
    pub fn add_shared(&self, unload: Rc<dyn Unload>) {
        self.inner.borrow_mut().entries.push(unload);
    }

    /// Add a cleanup closure.
    pub fn add_action(&self, action: impl Fn() + 'static) -> Rc<UnloadAction> {
        self.add(UnloadAction::new(action))
    }

    /// Add several shared entries, preserving their order.
    pub fn add_all(&self, unloads: impl IntoIterator<Item = Rc<dyn Unload>>) {
        self.inner.borrow_mut().entries.extend(unloads);
    }

    /// Remove an entry by identity. Returns `false` if it is not in the pool.
    pub fn remove<U: Unload + 'static>(&self, unload: &Rc<U>) -> bool {
        let target = Rc::as_ptr(unload).cast::<()>();
        let mut inner = self.inner.borrow_mut();
        match inner
            .entries
            .iter()
            .position(|entry| Rc::as_ptr(entry).cast::<()>() == target)
        {
            Some(index) => {
                inner.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Discard every entry without invoking it and mark the pool reusable.
    pub fn clear(&self) {
        let dropped = {
            let mut inner = self.inner.borrow_mut();
            inner.unloaded.set(false);
            std::mem::take(&mut inner.entries)
        };
        drop(dropped);
    }

    /// Invoke every entry, isolating failures, then mark the pool unloaded.
    ///
    /// A no-op if the pool is already unloaded.
    pub fn unload(&self) {
        let (entries, sink) = {
            let inner = self.inner.borrow();
            if inner.unloaded.replace(true) {
                return;
            }
            (inner.entries.clone(), Rc::clone(&inner.sink))
        };

        let mut failures = 0usize;
        for entry in &entries {
            if !guarded(&*sink, DiagnosticKind::CleanupFailed, "UnloadPool", || {
                entry.unload();
            }) {
                failures += 1;
            }
        }

        tracing::debug!(entries = entries.len(), failures, "unload pool torn down");
    }

    /// Unload unless already unloaded. Returns whether entries were invoked.
    pub fn try_unload(&self) -> bool {
        if self.is_unloaded() {
            return false;
        }
        self.unload();
        true
    }

    /// Whether `unload()` ran since creation or the last `clear()`.
    #[must_use]
    pub fn is_unloaded(&self) -> bool {
        self.inner.borrow().unloaded.get()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether the pool holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Unload the pool in `slot` (if any) and replace it with a fresh one
    /// sharing the same sink. Returns a handle to the new pool.
    pub fn recreate(slot: &mut Option<UnloadPool>) -> UnloadPool {
        let fresh = match slot.take() {
            Some(old) => {
                old.unload();
                let sink = Rc::clone(&old.inner.borrow().sink);
                UnloadPool::with_sink(sink)
            }
            None => UnloadPool::new(),
        };
        *slot = Some(fresh.clone());
        fresh
    }
}

impl Default for UnloadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Unload for UnloadPool {
    fn unload(&self) {
        UnloadPool::unload(self);
    }
}

impl std::fmt::Debug for UnloadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("UnloadPool")
            .field("entries", &inner.entries.len())
            .field("unloaded", &inner.unloaded.get())
            .finish()
    }
}

/// Unload every item, isolating failures. Returns the number that panicked.
pub fn unload_each<'a, U, I>(items: I, sink: &dyn DiagnosticSink) -> usize
where
    U: Unload + ?Sized + 'a,
    I: IntoIterator<Item = &'a U>,
{
    items
        .into_iter()
        .filter(|item| !guarded(sink, DiagnosticKind::CleanupFailed, "unload_each", || item.unload()))
        .count()
}
