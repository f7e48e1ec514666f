#![forbid(unsafe_code)]

//! Lazily loaded values.
//!
//! [`Loaded<T>`] either starts ready or holds a loader that runs on first
//! access. Assigning a value before the first access discards the loader
//! without running it. [`ObservedLoaded<T>`] adds change listeners on top.
//!
//! # Failure Modes
//!
//! - A loader that reads its own `Loaded` re-enters initialisation and
//!   panics.
//! - A loader that panics leaves the value unloaded with no loader; every
//!   later read panics too. Use [`Loaded::set`] to recover.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::listener::{Channel, ListenerId, ListenerSeq, Placement, dispatch};
use super::observed::DEFAULT_CAPACITY;
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::unload::{Unload, UnloadPool};

type Loader<T> = Box<dyn FnOnce() -> T>;

/// A value produced on first access.
pub struct Loaded<T> {
    value: OnceCell<T>,
    loader: Cell<Option<Loader<T>>>,
}

impl<T> Loaded<T> {
    /// Already-loaded value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value: OnceCell::from(value),
            loader: Cell::new(None),
        }
    }

    /// Value produced by `load` on first [`get`](Self::get).
    #[must_use]
    pub fn lazy(load: impl FnOnce() -> T + 'static) -> Self {
        Self {
            value: OnceCell::new(),
            loader: Cell::new(Some(Box::new(load))),
        }
    }

    /// The value, loading it first if needed.
    ///
    /// # Panics
    ///
    /// If the loader re-enters this `Loaded`, or an earlier load panicked.
    pub fn get(&self) -> &T {
        self.value.get_or_init(|| match self.loader.take() {
            Some(load) => load(),
            None => panic!("Loaded value has no loader: an earlier load panicked"),
        })
    }

    /// Replace the value. A pending loader is dropped unrun.
    pub fn set(&mut self, value: T) {
        self.loader.set(None);
        self.value = OnceCell::from(value);
    }

    /// Whether the value is present without loading.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }

    /// The value if already loaded.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.value.get()
    }

    /// Consume, loading if needed.
    ///
    /// # Panics
    ///
    /// If an earlier load panicked.
    pub fn into_inner(self) -> T {
        match (self.value.into_inner(), self.loader.into_inner()) {
            (Some(value), _) => value,
            (None, Some(load)) => load(),
            (None, None) => panic!("Loaded value has no loader: an earlier load panicked"),
        }
    }
}

impl<T: PartialEq> PartialEq for Loaded<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: PartialEq> PartialEq<T> for Loaded<T> {
    fn eq(&self, other: &T) -> bool {
        self.get() == other
    }
}

impl<T: Eq> Eq for Loaded<T> {}

impl<T: std::hash::Hash> std::hash::Hash for Loaded<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.get().hash(state);
    }
}

impl<T> From<T> for Loaded<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Display> fmt::Display for Loaded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Loaded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(value) => f.debug_tuple("Loaded").field(value).finish(),
            None => f.write_str("Loaded(<pending>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// ObservedLoaded
// ---------------------------------------------------------------------------

struct ObservedLoadedInner<T> {
    loaded: Loaded<T>,
    seq: ListenerSeq,
    listeners: Channel<dyn Fn(&T)>,
    sink: Rc<dyn DiagnosticSink>,
}

/// Shared [`Loaded<T>`] that notifies on every [`set`](Self::set).
///
/// Loading itself is not a change and notifies nobody.
pub struct ObservedLoaded<T> {
    inner: Rc<RefCell<ObservedLoadedInner<T>>>,
}

impl<T> Clone for ObservedLoaded<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> ObservedLoaded<T> {
    /// Already-loaded value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::build(Loaded::new(value), DEFAULT_CAPACITY, default_sink())
    }

    /// Value produced by `load` on first read.
    #[must_use]
    pub fn lazy(load: impl FnOnce() -> T + 'static) -> Self {
        Self::build(Loaded::lazy(load), DEFAULT_CAPACITY, default_sink())
    }

    pub(crate) fn build(loaded: Loaded<T>, capacity: usize, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservedLoadedInner {
                loaded,
                seq: ListenerSeq::default(),
                listeners: Channel::with_capacity(capacity),
                sink,
            })),
        }
    }

    /// Borrow the value, loading it first if needed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(self.inner.borrow().loaded.get())
    }

    /// Whether the value is present without loading.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.borrow().loaded.is_loaded()
    }

    /// Register a listener for assigned values.
    pub fn add_listener(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.listeners.push(id, Rc::new(f), Placement::Normal);
        id
    }

    /// Register a listener removed when `pool` unloads.
    pub fn add_listener_scoped(&self, f: impl Fn(&T) + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.add_listener(f);
        let weak = Rc::downgrade(&self.inner);
        pool.add_action(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.remove(id);
            }
        });
        id
    }

    /// Unregister a listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().listeners.remove(id)
    }

    /// Registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.pending_len()
    }

    /// Drop every listener.
    pub fn unload(&self) {
        self.inner.borrow_mut().listeners.clear();
    }
}

impl<T: Clone + 'static> ObservedLoaded<T> {
    /// Copy of the value, loading it first if needed.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Assign and notify listeners with the new value.
    pub fn set(&self, value: T) {
        let (listeners, sink) = {
            let mut inner = self.inner.borrow_mut();
            inner.loaded.set(value.clone());
            (inner.listeners.prepare(), Rc::clone(&inner.sink))
        };
        dispatch(&listeners, &*sink, "ObservedLoaded", |f| f(&value));
    }
}

impl<T: 'static> Unload for ObservedLoaded<T> {
    fn unload(&self) {
        ObservedLoaded::unload(self);
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservedLoaded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservedLoaded")
            .field("loaded", &inner.loaded)
            .field("listeners", &inner.listeners.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_runs_once_on_first_get() {
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let loaded = Loaded::lazy(move || {
            c.set(c.get() + 1);
            "config".to_string()
        });
        assert!(!loaded.is_loaded());
        assert_eq!(calls.get(), 0);
        assert_eq!(loaded.get(), "config");
        assert_eq!(loaded.get(), "config");
        assert_eq!(calls.get(), 1);
        assert!(loaded.is_loaded());
    }

    #[test]
    fn set_before_load_skips_loader() {
        let mut loaded = Loaded::lazy(|| -> u32 { panic!("must not load") });
        loaded.set(3);
        assert_eq!(*loaded.get(), 3);
        assert_eq!(loaded.into_inner(), 3);
    }

    #[test]
    fn equality_compares_values() {
        let a = Loaded::new(5);
        let b = Loaded::lazy(|| 5);
        assert_eq!(a, b);
        assert!(a == 5);
        assert_eq!(a.to_string(), "5");
        assert_eq!(format!("{:?}", Loaded::<u8>::lazy(|| 1)), "Loaded(<pending>)");
    }

    #[test]
    fn observed_set_notifies_but_load_does_not() {
        let loaded = ObservedLoaded::lazy(|| 10);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        loaded.add_listener(move |v| s.borrow_mut().push(*v));

        assert_eq!(loaded.get(), 10);
        assert!(seen.borrow().is_empty());
        loaded.set(11);
        assert_eq!(*seen.borrow(), vec![11]);
        assert_eq!(loaded.get(), 11);
    }

    #[test]
    fn observed_scoped_listener_removed_by_pool() {
        let loaded = ObservedLoaded::new(0);
        let pool = UnloadPool::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        loaded.add_listener_scoped(move |_| h.set(h.get() + 1), &pool);
        loaded.set(1);
        pool.unload();
        loaded.set(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(loaded.listener_count(), 0);
    }
}
