#![forbid(unsafe_code)]

//! Fire-and-forget input signals.
//!
//! Unlike [`Observed`](super::Observed), an input holds no state: `send`
//! just fans the call out to the current listeners.
//!
//! - [`InputListener`]: argument-less signal.
//! - [`InputValueListener<T>`]: signal carrying a value. Use a tuple `T` for
//!   multi-argument signals. There is deliberately no argument-less `send`.
//! - [`InputSingleListener`]: predicate listeners, stopping at the first one
//!   that returns the expected answer.

use std::cell::RefCell;
use std::rc::Rc;

use super::listener::{Channel, ListenerId, ListenerSeq, Placement, dispatch};
use super::narrow::Narrow;
use super::observed::DEFAULT_CAPACITY;
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, default_sink, guarded};
use crate::unload::{Unload, UnloadPool};

fn scope<S: 'static>(
    weak: std::rc::Weak<RefCell<S>>,
    id: ListenerId,
    pool: &UnloadPool,
    remove: fn(&mut S, ListenerId) -> bool,
) -> ListenerId {
    pool.add_action(move || {
        if let Some(inner) = weak.upgrade() {
            remove(&mut inner.borrow_mut(), id);
        }
    });
    id
}

// ---------------------------------------------------------------------------
// InputListener
// ---------------------------------------------------------------------------

struct PlainInput {
    seq: ListenerSeq,
    listeners: Channel<dyn Fn()>,
    sink: Rc<dyn DiagnosticSink>,
}

impl PlainInput {
    fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Argument-less signal.
#[derive(Clone)]
pub struct InputListener {
    inner: Rc<RefCell<PlainInput>>,
}

impl InputListener {
    /// Signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(default_sink())
    }

    /// Signal reporting listener failures to `sink`.
    #[must_use]
    pub fn with_sink(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::build(DEFAULT_CAPACITY, sink)
    }

    pub(crate) fn build(capacity: usize, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PlainInput {
                seq: ListenerSeq::default(),
                listeners: Channel::with_capacity(capacity),
                sink,
            })),
        }
    }

    /// Notify every listener.
    pub fn send(&self) {
        let (listeners, sink) = {
            let mut inner = self.inner.borrow_mut();
            (inner.listeners.prepare(), Rc::clone(&inner.sink))
        };
        dispatch(&listeners, &*sink, "InputListener", |f| f());
    }

    /// Register a listener.
    pub fn add_listener(&self, f: impl Fn() + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.listeners.push(id, Rc::new(f), Placement::Normal);
        id
    }

    /// Register a listener removed when `pool` unloads.
    pub fn add_listener_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.add_listener(f);
        scope(Rc::downgrade(&self.inner), id, pool, PlainInput::remove)
    }

    /// Unregister a listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove(id)
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

impl Default for InputListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Unload for InputListener {
    fn unload(&self) {
        InputListener::unload(self);
    }
}

impl std::fmt::Debug for InputListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputListener")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InputValueListener
// ---------------------------------------------------------------------------

struct ValueInput<T> {
    seq: ListenerSeq,
    plain: Channel<dyn Fn()>,
    values: Channel<dyn Fn(&T)>,
    sink: Rc<dyn DiagnosticSink>,
}

impl<T> ValueInput<T> {
    fn remove(&mut self, id: ListenerId) -> bool {
        self.plain.remove(id) || self.values.remove(id)
    }
}

/// Signal carrying a `T`.
pub struct InputValueListener<T> {
    inner: Rc<RefCell<ValueInput<T>>>,
}

impl<T> Clone for InputValueListener<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> InputValueListener<T> {
    /// Signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(default_sink())
    }

    /// Signal reporting listener failures to `sink`.
    #[must_use]
    pub fn with_sink(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::build(DEFAULT_CAPACITY, sink)
    }

    pub(crate) fn build(capacity: usize, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ValueInput {
                seq: ListenerSeq::default(),
                plain: Channel::with_capacity(capacity),
                values: Channel::with_capacity(capacity),
                sink,
            })),
        }
    }

    /// Notify no-arg listeners, then value listeners with `value`.
    pub fn send(&self, value: T) {
        self.send_many(std::iter::once(value));
    }

    /// Notify no-arg listeners once, then every value listener for each of
    /// `values` in order. Nothing is sent when `values` is empty.
    pub fn send_many(&self, values: impl IntoIterator<Item = T>) {
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            return;
        }
        let (plain, valued, sink) = {
            let mut inner = self.inner.borrow_mut();
            (
                inner.plain.prepare(),
                inner.values.prepare(),
                Rc::clone(&inner.sink),
            )
        };
        dispatch(&plain, &*sink, "InputValueListener", |f| f());
        for value in values {
            dispatch(&valued, &*sink, "InputValueListener", |f| f(&value));
        }
    }

    /// Register a listener that ignores the value.
    pub fn add_listener(&self, f: impl Fn() + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.plain.push(id, Rc::new(f), Placement::Normal);
        id
    }

    /// Register a value listener.
    pub fn add_value_listener(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.values.push(id, Rc::new(f), Placement::Normal);
        id
    }

    /// Value listener that only runs for values narrowing to `V`.
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

    /// [`add_listener`](Self::add_listener), removed when `pool` unloads.
    pub fn add_listener_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.add_listener(f);
        scope(Rc::downgrade(&self.inner), id, pool, ValueInput::remove)
    }

    /// [`add_value_listener`](Self::add_value_listener), removed when `pool`
    /// unloads.
    pub fn add_value_listener_scoped(
        &self,
        f: impl Fn(&T) + 'static,
        pool: &UnloadPool,
    ) -> ListenerId {
        let id = self.add_value_listener(f);
        scope(Rc::downgrade(&self.inner), id, pool, ValueInput::remove)
    }

    /// Unregister a listener from either channel.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove(id)
    }

    /// Registered listeners across both channels.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.plain.pending_len() + inner.values.pending_len()
    }

    /// Drop every listener.
    pub fn unload(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.plain.clear();
        inner.values.clear();
    }
}

impl<T: 'static> Default for InputValueListener<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Unload for InputValueListener<T> {
    fn unload(&self) {
        InputValueListener::unload(self);
    }
}

impl<T> std::fmt::Debug for InputValueListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("InputValueListener")
            .field("plain", &inner.plain.pending_len())
            .field("values", &inner.values.pending_len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InputSingleListener
// ---------------------------------------------------------------------------

struct SingleInput {
    seq: ListenerSeq,
    listeners: Channel<dyn Fn() -> bool>,
    sink: Rc<dyn DiagnosticSink>,
}

impl SingleInput {
    fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Signal answered by the first listener that returns the expected result.
///
/// Typical use is "back button": handlers are asked in order and the first
/// one that consumes the event stops the walk.
#[derive(Clone)]
pub struct InputSingleListener {
    inner: Rc<RefCell<SingleInput>>,
}

impl InputSingleListener {
    /// Signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(default_sink())
    }

    /// Signal reporting listener failures to `sink`.
    #[must_use]
    pub fn with_sink(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::build(DEFAULT_CAPACITY, sink)
    }

    pub(crate) fn build(capacity: usize, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SingleInput {
                seq: ListenerSeq::default(),
                listeners: Channel::with_capacity(capacity),
                sink,
            })),
        }
    }

    /// Ask listeners in order until one returns `expected`.
    ///
    /// Returns the id of that listener, or `None` if nobody answered. A
    /// listener that panics counts as not answering.
    pub fn send(&self, expected: bool) -> Option<ListenerId> {
        let (listeners, sink) = {
            let mut inner = self.inner.borrow_mut();
            (inner.listeners.prepare(), Rc::clone(&inner.sink))
        };
        listeners.iter().find_map(|entry| {
            let mut answer = None;
            guarded(
                &*sink,
                DiagnosticKind::ListenerPanicked,
                "InputSingleListener",
                || answer = Some((entry.f)()),
            );
            (answer == Some(expected)).then_some(entry.id)
        })
    }

    /// Register a predicate listener.
    pub fn add_listener(&self, f: impl Fn() -> bool + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.seq.next();
        inner.listeners.push(id, Rc::new(f), Placement::Normal);
        id
    }

    /// Register a predicate listener removed when `pool` unloads.
    pub fn add_listener_scoped(
        &self,
        f: impl Fn() -> bool + 'static,
        pool: &UnloadPool,
    ) -> ListenerId {
        let id = self.add_listener(f);
        scope(Rc::downgrade(&self.inner), id, pool, SingleInput::remove)
    }

    /// Unregister a listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove(id)
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

impl Default for InputSingleListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Unload for InputSingleListener {
    fn unload(&self) {
        InputSingleListener::unload(self);
    }
}

impl std::fmt::Debug for InputSingleListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSingleListener")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
