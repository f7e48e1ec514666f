#![forbid(unsafe_code)]

//! Observable single value with three listener channels.
//!
//! # Invariants
//!
//! 1. The [`ObservedId`] is drawn once from the injected [`IdGenerator`] and
//!    never changes; equality and hashing use it, not the value.
//! 2. `set()` notifies no-arg listeners, then value listeners, then change
//!    listeners, each in live order.
//! 3. Pending registrations are applied at most once per `set()`, before any
//!    listener runs. A listener added during dispatch fires on the next
//!    `set()`.
//! 4. `set_silent()` never notifies.
//!
//! # Failure Modes
//!
//! - **Listener panics**: caught, reported as
//!   [`DiagnosticKind::ListenerPanicked`](crate::diagnostics::DiagnosticKind),
//!   and the remaining listeners still run. The new value stays assigned.
//! - **`with()` closure calls `set()` on the same value**: the inner
//!   `RefCell` is already borrowed and the call panics. Listeners are never
//!   run under a borrow, so they may call `set()`.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use tinyrx_core::ids::IdGenerator;

use super::listener::{Channel, ListenerId, ListenerSeq, Placement, dispatch};
use super::narrow::Narrow;
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::unload::{Unload, UnloadPool};

/// Default pending capacity of each listener channel.
pub(crate) const DEFAULT_CAPACITY: usize = 4;

/// Identity of an observable, drawn from an [`IdGenerator`].
///
/// Ids are unique only within one generator and its clones. Two separate
/// generators both start at 0, so their ids collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservedId(u64);

impl ObservedId {
    pub(crate) fn from_generator(ids: &IdGenerator) -> Self {
        Self(ids.next_id())
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ObservedInner<T> {
    value: T,
    seq: ListenerSeq,
    plain: Channel<dyn Fn()>,
    values: Channel<dyn Fn(&T)>,
    changes: Channel<dyn Fn(&T, &T)>,
    sink: Rc<dyn DiagnosticSink>,
}

impl<T> ObservedInner<T> {
    fn remove(&mut self, id: ListenerId) -> bool {
        self.plain.remove(id) || self.values.remove(id) || self.changes.remove(id)
    }
}

/// A shared value that notifies listeners when it is `set`.
///
/// Cloning an `Observed` creates a new handle to the **same** value and
/// listeners, with the same id.
///
/// # Usage
///
/// ```ignore
/// let ids = IdGenerator::new();
/// let health = Observed::new(&ids, 100);
/// health.add_change_listener(|old, new| println!("{old} -> {new}"));
/// health.set(80);
/// assert_eq!(health.get(), 80);
/// ```
pub struct Observed<T> {
    id: ObservedId,
    inner: Rc<RefCell<ObservedInner<T>>>,
}

impl<T> Clone for Observed<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Observed<T> {
    /// Create an observable with an id from `ids`.
    pub fn new(ids: &IdGenerator, value: T) -> Self {
        Self::with_sink(ids, value, default_sink())
    }

    /// Create an observable that reports listener failures to `sink`.
    pub fn with_sink(ids: &IdGenerator, value: T, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::build(ObservedId::from_generator(ids), value, DEFAULT_CAPACITY, sink)
    }

    pub(crate) fn build(
        id: ObservedId,
        value: T,
        capacity: usize,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            id,
            inner: Rc::new(RefCell::new(ObservedInner {
                value,
                seq: ListenerSeq::default(),
                plain: Channel::with_capacity(capacity),
                values: Channel::with_capacity(capacity),
                changes: Channel::with_capacity(capacity),
                sink,
            })),
        }
    }

    /// Identity of this observable.
    #[must_use]
    pub fn id(&self) -> ObservedId {
        self.id
    }

    /// Assign without notifying anyone.
    pub fn set_silent(&self, value: T) {
        self.inner.borrow_mut().value = value;
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    // -----------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------

    fn register_plain(&self, f: Rc<dyn Fn()>, placement: Placement) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.plain.push(id, f, placement);
        id
    }

    fn register_value(&self, f: Rc<dyn Fn(&T)>, placement: Placement) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.values.push(id, f, placement);
        id
    }

    fn register_change(&self, f: Rc<dyn Fn(&T, &T)>, placement: Placement) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.changes.push(id, f, placement);
        id
    }

    /// Listen for changes without receiving the value.
    pub fn add_listener(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register_plain(Rc::new(f), Placement::Normal)
    }

    /// Like [`add_listener`](Self::add_listener), placed ahead of every
    /// pending no-arg listener.
    pub fn add_listener_first(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register_plain(Rc::new(f), Placement::First)
    }

    /// Like [`add_listener`](Self::add_listener), placed just before the
    /// current last no-arg listener.
    pub fn add_listener_last(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register_plain(Rc::new(f), Placement::Last)
    }

    /// Listen for changes, receiving the new value.
    pub fn add_value_listener(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        self.register_value(Rc::new(f), Placement::Normal)
    }

    /// Value listener placed ahead of every pending value listener.
    pub fn add_value_listener_first(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        self.register_value(Rc::new(f), Placement::First)
    }

    /// Value listener placed just before the current last value listener.
    pub fn add_value_listener_last(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        self.register_value(Rc::new(f), Placement::Last)
    }

    /// Listen for changes, receiving `(old, new)`.
    pub fn add_change_listener(&self, f: impl Fn(&T, &T) + 'static) -> ListenerId {
        self.register_change(Rc::new(f), Placement::Normal)
    }

    /// Change listener placed ahead of every pending change listener.
    pub fn add_change_listener_first(&self, f: impl Fn(&T, &T) + 'static) -> ListenerId {
        self.register_change(Rc::new(f), Placement::First)
    }

    /// Change listener placed just before the current last change listener.
    pub fn add_change_listener_last(&self, f: impl Fn(&T, &T) + 'static) -> ListenerId {
        self.register_change(Rc::new(f), Placement::Last)
    }

    /// [`add_listener`](Self::add_listener), removed when `pool` unloads.
    pub fn add_listener_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.add_listener(f);
        self.unload_with(id, pool)
    }

    /// [`add_value_listener`](Self::add_value_listener), removed when `pool`
    /// unloads.
    pub fn add_value_listener_scoped(
        &self,
        f: impl Fn(&T) + 'static,
        pool: &UnloadPool,
    ) -> ListenerId {
        let id = self.add_value_listener(f);
        self.unload_with(id, pool)
    }

    /// [`add_change_listener`](Self::add_change_listener), removed when
    /// `pool` unloads.
    pub fn add_change_listener_scoped(
        &self,
        f: impl Fn(&T, &T) + 'static,
        pool: &UnloadPool,
    ) -> ListenerId {
        let id = self.add_change_listener(f);
        self.unload_with(id, pool)
    }

    /// Run `f` on change, but only when the new value narrows to `V`.
    pub fn add_listener_kind<V: 'static>(&self, f: impl Fn() + 'static) -> ListenerId
    where
        T: Narrow<V>,
    {
        self.add_value_listener(move |value: &T| {
            if Narrow::<V>::narrow(value).is_some() {
                f();
            }
        })
    }

    /// Run `f` with the narrowed value when the new value is of kind `V`.
    pub fn add_value_listener_kind<V: 'static>(&self, f: impl Fn(&V) + 'static) -> ListenerId
    where
        T: Narrow<V>,
    {
        self.add_value_listener(move |value: &T| {
            if let Some(narrowed) = Narrow::<V>::narrow(value) {
                f(narrowed);
            }
        })
    }

    /// Register removal of listener `id` in `pool`. Returns `id`.
    ///
    /// The pool holds only a weak handle, so it does not keep this value
    /// alive.
    pub fn unload_with(&self, id: ListenerId, pool: &UnloadPool) -> ListenerId {
        let weak = Rc::downgrade(&self.inner);
        pool.add_action(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().remove(id);
            }
        });
        id
    }

    /// Unregister a listener from whichever channel holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove(id)
    }

    /// Whether `id` is registered (including not-yet-applied registrations).
    #[must_use]
    pub fn has_listener(&self, id: ListenerId) -> bool {
        let inner = self.inner.borrow();
        inner.plain.contains(id) || inner.values.contains(id) || inner.changes.contains(id)
    }

    /// Total registered listeners across the three channels.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.plain.pending_len() + inner.values.pending_len() + inner.changes.pending_len()
    }

    /// Drop every listener. The value is kept.
    pub fn unload(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.plain.clear();
        inner.values.clear();
        inner.changes.clear();
    }
}

impl<T: Clone + 'static> Observed<T> {
    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Same as [`get`](Self::get).
    #[must_use]
    pub fn value(&self) -> T {
        self.get()
    }

    /// Assign and notify no-arg, value, then change listeners.
    pub fn set(&self, value: T) {
        let (old, plain, values, changes, sink) = {
            let mut inner = self.inner.borrow_mut();
            let old = std::mem::replace(&mut inner.value, value.clone());
            (
                old,
                inner.plain.prepare(),
                inner.values.prepare(),
                inner.changes.prepare(),
                Rc::clone(&inner.sink),
            )
        };

        dispatch(&plain, &*sink, "Observed", |f| f());
        dispatch(&values, &*sink, "Observed", |f| f(&value));
        dispatch(&changes, &*sink, "Observed", |f| f(&old, &value));
    }
}

impl<T: 'static> Unload for Observed<T> {
    fn unload(&self) {
        Observed::unload(self);
    }
}

/// Identity comparison by [`ObservedId`].
///
/// Handles from the same generator are equal only if they share state.
/// Handles built from different [`IdGenerator`]s can compare equal and hash
/// alike while being unrelated; keep observables that meet in one set or
/// map on a single generator.
impl<T> PartialEq for Observed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Observed<T> {}

impl<T: PartialEq> PartialEq<T> for Observed<T> {
    fn eq(&self, other: &T) -> bool {
        self.inner.borrow().value == *other
    }
}

impl<T> Hash for Observed<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: fmt::Display> fmt::Display for Observed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.borrow().value.fmt(f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Observed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observed")
            .field("id", &self.id)
            .field("value", &inner.value)
            .finish_non_exhaustive()
    }
}
