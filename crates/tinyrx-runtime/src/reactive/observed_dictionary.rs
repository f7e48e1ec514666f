#![forbid(unsafe_code)]

//! Observable keyed map.
//!
//! Four channels: add, add-with-value, remove, remove-with-value. Listeners
//! receive the value, not the key. Iteration order of [`keys()`] and
//! [`values()`] is unspecified.
//!
//! [`keys()`]: ObservedDictionary::keys
//! [`values()`]: ObservedDictionary::values

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashMap;

use super::listener::{Channel, ListenerId, ListenerSeq, Placement, dispatch};
use super::observed::DEFAULT_CAPACITY;
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::unload::{Unload, UnloadPool};

const SOURCE: &str = "ObservedDictionary";

struct DictState<K, V> {
    map: AHashMap<K, V>,
    seq: ListenerSeq,
    on_add: Channel<dyn Fn()>,
    on_add_value: Channel<dyn Fn(&V)>,
    on_remove: Channel<dyn Fn()>,
    on_remove_value: Channel<dyn Fn(&V)>,
    sink: Rc<dyn DiagnosticSink>,
}

impl<K, V> DictState<K, V> {
    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.on_add.remove(id)
            || self.on_add_value.remove(id)
            || self.on_remove.remove(id)
            || self.on_remove_value.remove(id)
    }
}

/// A shared map that notifies on insert and remove.
///
/// Cloning creates a new handle to the **same** map.
pub struct ObservedDictionary<K, V> {
    inner: Rc<RefCell<DictState<K, V>>>,
}

impl<K, V> Clone for ObservedDictionary<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> ObservedDictionary<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::from_map(AHashMap::new())
    }

    /// Dictionary over an existing map.
    #[must_use]
    pub fn from_map(map: AHashMap<K, V>) -> Self {
        Self::build(map, DEFAULT_CAPACITY, default_sink())
    }

    /// Empty dictionary reporting listener failures to `sink`.
    #[must_use]
    pub fn with_sink(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::build(AHashMap::new(), DEFAULT_CAPACITY, sink)
    }

    pub(crate) fn build(map: AHashMap<K, V>, capacity: usize, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DictState {
                map,
                seq: ListenerSeq::default(),
                on_add: Channel::with_capacity(capacity),
                on_add_value: Channel::with_capacity(capacity),
                on_remove: Channel::with_capacity(capacity),
                on_remove_value: Channel::with_capacity(capacity),
                sink,
            })),
        }
    }

    fn notify_add(&self, value: &V) {
        let (plain, valued, sink) = {
            let mut state = self.inner.borrow_mut();
            (
                state.on_add.prepare(),
                state.on_add_value.prepare(),
                Rc::clone(&state.sink),
            )
        };
        dispatch(&plain, &*sink, SOURCE, |f| f());
        dispatch(&valued, &*sink, SOURCE, |f| f(value));
    }

    fn notify_remove(&self, value: &V) {
        let (plain, valued, sink) = {
            let mut state = self.inner.borrow_mut();
            (
                state.on_remove.prepare(),
                state.on_remove_value.prepare(),
                Rc::clone(&state.sink),
            )
        };
        dispatch(&plain, &*sink, SOURCE, |f| f());
        dispatch(&valued, &*sink, SOURCE, |f| f(value));
    }

    /// Insert a new entry and notify add listeners.
    ///
    /// Returns `false`, without touching the map or notifying, if `key` is
    /// already present.
    pub fn insert(&self, key: K, value: V) -> bool {
        {
            let mut state = self.inner.borrow_mut();
            if state.map.contains_key(&key) {
                return false;
            }
            state.map.insert(key, value.clone());
        }
        self.notify_add(&value);
        true
    }

    /// Remove `key` and notify remove listeners with its value.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.inner.borrow_mut().map.remove(key);
        match removed {
            Some(value) => {
                self.notify_remove(&value);
                true
            }
            None => false,
        }
    }

    /// Current value under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.borrow().map.get(key).cloned()
    }

    /// Read the value under `key` in place.
    pub fn with_value<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R {
        f(self.inner.borrow().map.get(key))
    }

    /// Snapshot of the keys.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.inner.borrow().map.keys().cloned().collect()
    }

    /// Snapshot of the values.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.inner.borrow().map.values().cloned().collect()
    }

    fn register(&self, pick: impl FnOnce(&mut DictState<K, V>, ListenerId)) -> ListenerId {
        let mut state = self.inner.borrow_mut();
        let id = state.seq.next();
        pick(&mut state, id);
        id
    }

    /// Notified after every insert, without the value.
    pub fn on_add(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register(|s, id| s.on_add.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified with each inserted value.
    pub fn on_add_value(&self, f: impl Fn(&V) + 'static) -> ListenerId {
        self.register(|s, id| s.on_add_value.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified after every removal, without the value.
    pub fn on_remove(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register(|s, id| s.on_remove.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified with each removed value.
    pub fn on_remove_value(&self, f: impl Fn(&V) + 'static) -> ListenerId {
        self.register(|s, id| s.on_remove_value.push(id, Rc::new(f), Placement::Normal))
    }

    /// [`on_add`](Self::on_add), removed when `pool` unloads.
    pub fn on_add_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.on_add(f);
        self.unload_with(id, pool)
    }

    /// [`on_add_value`](Self::on_add_value), removed when `pool` unloads.
    pub fn on_add_value_scoped(&self, f: impl Fn(&V) + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.on_add_value(f);
        self.unload_with(id, pool)
    }

    /// [`on_remove`](Self::on_remove), removed when `pool` unloads.
    pub fn on_remove_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.on_remove(f);
        self.unload_with(id, pool)
    }

    /// [`on_remove_value`](Self::on_remove_value), removed when `pool`
    /// unloads.
    pub fn on_remove_value_scoped(
        &self,
        f: impl Fn(&V) + 'static,
        pool: &UnloadPool,
    ) -> ListenerId {
        let id = self.on_remove_value(f);
        self.unload_with(id, pool)
    }

    /// Register removal of listener `id` in `pool`. Returns `id`.
    pub fn unload_with(&self, id: ListenerId, pool: &UnloadPool) -> ListenerId {
        let weak = Rc::downgrade(&self.inner);
        pool.add_action(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().remove_listener(id);
            }
        });
        id
    }
}

impl<K, V> ObservedDictionary<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + PartialEq + 'static,
{
    /// For each of `values`, remove one entry holding it and notify remove
    /// listeners. Returns the number of entries removed.
    pub fn remove_values(&self, values: &[V]) -> usize {
        let mut removed = 0;
        for value in values {
            let key = {
                let state = self.inner.borrow();
                state
                    .map
                    .iter()
                    .find(|(_, candidate)| *candidate == value)
                    .map(|(key, _)| key.clone())
            };
            let Some(key) = key else { continue };
            let taken = self.inner.borrow_mut().map.remove(&key);
            if let Some(taken) = taken {
                self.notify_remove(&taken);
                removed += 1;
            }
        }
        removed
    }
}

impl<K: Eq + Hash, V> ObservedDictionary<K, V> {
    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.borrow().map.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().map.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().map.is_empty()
    }

    /// Unregister a listener from whichever channel holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove_listener(id)
    }

    /// Registered listeners across all channels.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let state = self.inner.borrow();
        state.on_add.pending_len()
            + state.on_add_value.pending_len()
            + state.on_remove.pending_len()
            + state.on_remove_value.pending_len()
    }

    /// Drop every listener. Entries are kept.
    pub fn unload(&self) {
        let mut state = self.inner.borrow_mut();
        state.on_add.clear();
        state.on_add_value.clear();
        state.on_remove.clear();
        state.on_remove_value.clear();
    }
}

impl<K, V> Default for ObservedDictionary<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ObservedDictionary<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl<K: Eq + Hash, V> Unload for ObservedDictionary<K, V> {
    fn unload(&self) {
        ObservedDictionary::unload(self);
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ObservedDictionary<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.borrow().map.iter()).finish()
    }
}
