#![forbid(unsafe_code)]

//! Listener channels shared by every observable type.
//!
//! A channel is a [`LazyList`] of `(ListenerId, Rc<F>)` entries. Dispatch
//! takes a snapshot of the live buffer under a short borrow, releases the
//! borrow, and then invokes each entry through the diagnostic guard, so a
//! listener may freely re-enter the observable that is notifying it.

use std::rc::Rc;

use super::lazy_list::LazyList;
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, guarded};

/// Handle returned by every listener registration.
///
/// Ids are unique per observable instance, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Per-instance listener id counter.
#[derive(Debug, Default)]
pub(crate) struct ListenerSeq {
    next: u64,
}

impl ListenerSeq {
    pub(crate) fn next(&mut self) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        id
    }
}

/// One registered callback.
pub(crate) struct Listener<F: ?Sized> {
    pub(crate) id: ListenerId,
    pub(crate) f: Rc<F>,
}

impl<F: ?Sized> Clone for Listener<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            f: Rc::clone(&self.f),
        }
    }
}

/// Where a new listener goes in the pending buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Append.
    Normal,
    /// Index 0.
    First,
    /// Just before the current last entry.
    Last,
}

/// Deferred-apply listener list for callbacks of type `F`.
pub(crate) struct Channel<F: ?Sized> {
    list: LazyList<Listener<F>>,
}

impl<F: ?Sized> Channel<F> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            list: LazyList::with_capacity(capacity),
        }
    }

    /// Register `f` under `id`. An empty pending buffer makes every
    /// placement behave like `Normal`.
    pub(crate) fn push(&mut self, id: ListenerId, f: Rc<F>, placement: Placement) {
        let entry = Listener { id, f };
        let pending = self.list.pending_len();
        match placement {
            _ if pending == 0 => self.list.add(entry),
            Placement::Normal => self.list.add(entry),
            Placement::First => self.list.insert(0, entry),
            Placement::Last => self.list.insert(pending - 1, entry),
        }
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        self.list.remove_where(|entry| entry.id == id)
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.list.contains_where(|entry| entry.id == id)
    }

    pub(crate) fn clear(&mut self) {
        self.list.clear();
    }

    /// Apply if dirty and hand back the live snapshot.
    pub(crate) fn prepare(&mut self) -> Rc<[Listener<F>]> {
        self.list.prepare()
    }

    /// Number of listeners that will see the next dispatch.
    pub(crate) fn pending_len(&self) -> usize {
        self.list.pending_len()
    }
}

/// Invoke every listener in `snapshot`, isolating panics.
/// Returns the number of listeners that completed.
pub(crate) fn dispatch<F: ?Sized>(
    snapshot: &[Listener<F>],
    sink: &dyn DiagnosticSink,
    source: &'static str,
    mut call: impl FnMut(&F),
) -> usize {
    snapshot
        .iter()
        .filter(|entry| {
            guarded(sink, DiagnosticKind::ListenerPanicked, source, || {
                call(&entry.f);
            })
        })
        .count()
}
