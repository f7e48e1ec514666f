#![forbid(unsafe_code)]

//! Two-buffer sequence with deferred application.
//!
//! A [`LazyList`] lets a dispatch loop iterate a stable snapshot while the
//! code it calls registers and unregisters entries on the same list.
//! Mutations land in a pending buffer; [`apply()`](LazyList::apply) publishes
//! them as a new live snapshot.
//!
//! # Invariants
//!
//! 1. The live snapshot is replaced wholesale by `apply()` and never edited in
//!    place, so a snapshot taken before a mutation is unaffected by it.
//! 2. `is_dirty()` is true exactly when pending may differ from live.
//! 3. `apply()` is idempotent.
//!
//! # Dispatch contract
//!
//! Callers apply once (if dirty) before a pass, then iterate the snapshot.
//! Entries added during the pass appear in the next pass.

use std::rc::Rc;

/// Deferred-apply sequence.
#[derive(Debug, Clone)]
pub struct LazyList<T> {
    live: Rc<[T]>,
    pending: Vec<T>,
    dirty: bool,
}

impl<T: Clone> LazyList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty list with room for `capacity` pending entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            live: Rc::from(Vec::new()),
            pending: Vec::with_capacity(capacity),
            dirty: false,
        }
    }

    /// Append to pending.
    pub fn add(&mut self, item: T) {
        self.pending.push(item);
        self.dirty = true;
    }

    /// Insert into pending at `index`, clamped to the pending length.
    pub fn insert(&mut self, index: usize, item: T) {
        let index = index.min(self.pending.len());
        self.pending.insert(index, item);
        self.dirty = true;
    }

    /// Remove the first pending entry matching `pred`.
    pub fn remove_where(&mut self, pred: impl FnMut(&T) -> bool) -> bool {
        match self.pending.iter().position(pred) {
            Some(index) => {
                self.pending.remove(index);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Empty pending.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.dirty = true;
    }

    /// Publish pending as the new live snapshot.
    pub fn apply(&mut self) {
        self.live = Rc::from(self.pending.as_slice());
        self.dirty = false;
    }

    /// Apply only when dirty. Returns whether an apply happened.
    pub fn apply_if_dirty(&mut self) -> bool {
        if self.dirty {
            self.apply();
            true
        } else {
            false
        }
    }

    /// Apply if needed and return the live snapshot for a dispatch pass.
    pub fn prepare(&mut self) -> Rc<[T]> {
        self.apply_if_dirty();
        self.snapshot()
    }
}

impl<T> LazyList<T> {
    /// Whether pending has unapplied changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Live length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether live is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Pending length.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether any pending entry matches `pred`.
    pub fn contains_where(&self, pred: impl FnMut(&T) -> bool) -> bool {
        self.pending.iter().any(pred)
    }

    /// Live entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.live.get(index)
    }

    /// Iterate live.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.live.iter()
    }

    /// Shared handle to the live snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Rc<[T]> {
        Rc::clone(&self.live)
    }
}

impl<T: Clone + PartialEq> LazyList<T> {
    /// Remove the first pending entry equal to `item`.
    pub fn remove(&mut self, item: &T) -> bool {
        self.remove_where(|candidate| candidate == item)
    }

    /// Whether pending contains `item`.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.pending.contains(item)
    }
}

impl<T: Clone> Default for LazyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a LazyList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
