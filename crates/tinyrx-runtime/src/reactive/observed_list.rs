#![forbid(unsafe_code)]

//! Observable ordered collection.
//!
//! [`ObservedList<T>`] notifies five listener channels: add, add-with-value,
//! remove, remove-with-value, and clear. Mutations come in two flavours:
//!
//! - **Synchronous** (`add`, `remove`, `set`, ...): mutate, then notify every
//!   listener before returning.
//! - **Batched** (`add_async`, `remove_many_async`, ...): mutate
//!   synchronously, then notify through a pacer that yields to the
//!   list's [`Scheduler`] whenever the time budget is spent. At most one
//!   batched mutation runs at a time.
//!
//! # Invariants
//!
//! 1. The sequence mutation of any call completes before its first
//!    notification, and is never split across a yield. `set` is the
//!    exception: remove listeners still see the old element in place.
//! 2. Within an event, no-arg listeners run before with-value listeners.
//!    With several values, every with-value listener sees value 1 before any
//!    sees value 2.
//! 3. `set(index, v)` notifies remove for the old element, then add for `v`.
//! 4. A batched call rejected by the lock changes nothing and notifies no one.
//! 5. The batch lock is released however the batch ends: completion,
//!    interruption, or the future being dropped.
//!
//! # Failure Modes
//!
//! - **Listener panics**: caught and reported; remaining listeners run.
//! - **Mutation after `dispose()`**: ignored and logged at debug level.
//!   Batched calls return [`BatchError::Disposed`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tinyrx_core::cx::Cx;

use super::batch::{BatchError, BatchLock, BatchStats, DEFAULT_BATCH_BUDGET, Pacer};
use super::listener::{Channel, Listener, ListenerId, ListenerSeq, Placement, dispatch};
use super::observed::DEFAULT_CAPACITY;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, default_sink, guarded};
use crate::scheduler::{NextTick, Scheduler};
use crate::unload::{Unload, UnloadPool};

const SOURCE: &str = "ObservedList";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Add,
    Remove,
}

type PlainSnapshot = Rc<[Listener<dyn Fn()>]>;
type ValueSnapshot<T> = Rc<[Listener<dyn Fn(&T)>]>;

struct ListState<T> {
    /// `None` once disposed.
    items: Option<Vec<T>>,
    /// `None` means "before the first element".
    cursor: Option<usize>,
    seq: ListenerSeq,
    on_add: Channel<dyn Fn()>,
    on_add_value: Channel<dyn Fn(&T)>,
    on_remove: Channel<dyn Fn()>,
    on_remove_value: Channel<dyn Fn(&T)>,
    on_clear: Channel<dyn Fn()>,
}

impl<T> ListState<T> {
    fn prepare(&mut self, event: Event) -> (PlainSnapshot, ValueSnapshot<T>) {
        match event {
            Event::Add => (self.on_add.prepare(), self.on_add_value.prepare()),
            Event::Remove => (self.on_remove.prepare(), self.on_remove_value.prepare()),
        }
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.on_add.remove(id)
            || self.on_add_value.remove(id)
            || self.on_remove.remove(id)
            || self.on_remove_value.remove(id)
            || self.on_clear.remove(id)
    }

    fn clear_listeners(&mut self) {
        self.on_add.clear();
        self.on_add_value.clear();
        self.on_remove.clear();
        self.on_remove_value.clear();
        self.on_clear.clear();
    }
}

struct ListShared<T> {
    state: RefCell<ListState<T>>,
    locked: Cell<bool>,
    budget: Duration,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn DiagnosticSink>,
}

/// A shared, observable, ordered sequence.
///
/// Cloning an `ObservedList` creates a new handle to the **same** sequence.
///
/// # Usage
///
/// ```ignore
/// let inventory = ObservedList::new();
/// inventory.on_add_value(|item: &String| println!("picked up {item}"));
/// inventory.add("sword".to_string());
///
/// // Large drops are paced across frames.
/// let (cx, _ctrl) = Cx::background();
/// inventory.add_many_async(&cx, loot).await?;
/// ```
pub struct ObservedList<T> {
    shared: Rc<ListShared<T>>,
}

impl<T> Clone for ObservedList<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + 'static> ObservedList<T> {
    /// Empty list that yields with [`NextTick`] and logs through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// List over existing items.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::with_parts(items, Rc::new(NextTick), default_sink())
    }

    /// List with an explicit scheduler and diagnostic sink.
    #[must_use]
    pub fn with_parts(
        items: Vec<T>,
        scheduler: Rc<dyn Scheduler>,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        Self::build(items, DEFAULT_CAPACITY, DEFAULT_BATCH_BUDGET, scheduler, sink)
    }

    pub(crate) fn build(
        items: Vec<T>,
        capacity: usize,
        budget: Duration,
        scheduler: Rc<dyn Scheduler>,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            shared: Rc::new(ListShared {
                state: RefCell::new(ListState {
                    items: Some(items),
                    cursor: None,
                    seq: ListenerSeq::default(),
                    on_add: Channel::with_capacity(capacity),
                    on_add_value: Channel::with_capacity(capacity),
                    on_remove: Channel::with_capacity(capacity),
                    on_remove_value: Channel::with_capacity(capacity),
                    on_clear: Channel::with_capacity(capacity),
                }),
                locked: Cell::new(false),
                budget,
                scheduler,
                sink,
            }),
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Run `f` on the backing sequence, or log and return `None` if disposed.
    fn mutate<R>(&self, op: &'static str, f: impl FnOnce(&mut Vec<T>) -> R) -> Option<R> {
        let mut state = self.shared.state.borrow_mut();
        match state.items.as_mut() {
            Some(items) => Some(f(items)),
            None => {
                tracing::debug!(op, "mutation ignored: list is disposed");
                None
            }
        }
    }

    fn notify(&self, event: Event, values: &[T]) {
        let (plain, valued) = self.shared.state.borrow_mut().prepare(event);
        let sink = &*self.shared.sink;
        dispatch(&plain, sink, SOURCE, |f| f());
        for value in values {
            dispatch(&valued, sink, SOURCE, |f| f(value));
        }
    }

    async fn notify_paced(
        &self,
        pacer: &mut Pacer<'_>,
        event: Event,
        values: &[T],
    ) -> Result<(), BatchError> {
        let (plain, valued) = self.shared.state.borrow_mut().prepare(event);
        let sink = &*self.shared.sink;
        for entry in plain.iter() {
            pacer.checkpoint().await?;
            guarded(sink, DiagnosticKind::ListenerPanicked, SOURCE, || (entry.f)());
            pacer.record();
        }
        for value in values {
            for entry in valued.iter() {
                pacer.checkpoint().await?;
                guarded(sink, DiagnosticKind::ListenerPanicked, SOURCE, || {
                    (entry.f)(value);
                });
                pacer.record();
            }
        }
        Ok(())
    }

    fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.shared.sink.report(Diagnostic::new(kind, SOURCE, message));
    }

    /// Lock, mutate, then notify `event` for the values `mutate` returns.
    async fn run_batch(
        &self,
        cx: &Cx,
        budget: Duration,
        event: Event,
        mutate: impl FnOnce(&mut Vec<T>) -> Vec<T>,
    ) -> Result<BatchStats, BatchError> {
        let Some(_lock) = BatchLock::acquire(&self.shared.locked) else {
            self.report(
                DiagnosticKind::BatchLocked,
                "batched mutation rejected: another one is in flight",
            );
            return Err(BatchError::Locked);
        };
        if let Err(reason) = cx.check() {
            let err = BatchError::Interrupted {
                reason,
                notified: 0,
            };
            self.report(DiagnosticKind::BatchInterrupted, err.to_string());
            return Err(err);
        }

        let affected = self
            .mutate("batch", mutate)
            .ok_or(BatchError::Disposed)?;
        if affected.is_empty() {
            return Ok(BatchStats::default());
        }

        let mut pacer = Pacer::new(cx, &*self.shared.scheduler, budget);
        match self.notify_paced(&mut pacer, event, &affected).await {
            Ok(()) => {
                let stats = pacer.finish(affected.len());
                tracing::debug!(
                    affected = stats.affected,
                    notified = stats.notified,
                    yields = stats.yields,
                    "batched mutation complete"
                );
                Ok(stats)
            }
            Err(err) => {
                self.report(DiagnosticKind::BatchInterrupted, err.to_string());
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------
    // Synchronous mutation
    // -----------------------------------------------------------------

    /// Append and notify add listeners.
    pub fn add(&self, value: T) {
        if self.mutate("add", |items| items.push(value.clone())).is_some() {
            self.notify(Event::Add, std::slice::from_ref(&value));
        }
    }

    /// Append every value, then notify once for the no-arg channel and once
    /// per value for the with-value channel. Returns the number appended.
    pub fn add_many(&self, values: impl IntoIterator<Item = T>) -> usize {
        let values: Vec<T> = values.into_iter().collect();
        if values.is_empty() {
            return 0;
        }
        match self.mutate("add_many", |items| items.extend_from_slice(&values)) {
            Some(()) => {
                self.notify(Event::Add, &values);
                values.len()
            }
            None => 0,
        }
    }

    /// Remove the element at `index` and notify remove listeners.
    /// `None` (and no notification) when out of range.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        let removed = self
            .mutate("remove_at", |items| {
                (index < items.len()).then(|| items.remove(index))
            })
            .flatten()?;
        self.notify(Event::Remove, std::slice::from_ref(&removed));
        Some(removed)
    }

    /// Remove every element, last first, notifying once per element.
    /// Returns the number removed.
    pub fn remove_all(&self) -> usize {
        let count = self.len();
        let mut removed = 0;
        for _ in 0..count {
            let Some(value) = self.mutate("remove_all", Vec::pop).flatten() else {
                break;
            };
            self.notify(Event::Remove, std::slice::from_ref(&value));
            removed += 1;
        }
        removed
    }

    /// Empty the sequence and notify clear listeners.
    pub fn clear(&self) {
        if self.mutate("clear", Vec::clear).is_none() {
            return;
        }
        let listeners = self.shared.state.borrow_mut().on_clear.prepare();
        dispatch(&listeners, &*self.shared.sink, SOURCE, |f| f());
    }

    /// Replace the element at `index`: notifies remove while the old element
    /// is still stored, writes `value`, then notifies add. Returns the old
    /// element, or `None` (and no notification) when out of range.
    ///
    /// If a remove listener shrinks the list past `index`, `value` is
    /// appended instead. If one disposes the list, add is not notified.
    pub fn set(&self, index: usize, value: T) -> Option<T> {
        let old = self
            .mutate("set", |items| items.get(index).cloned())
            .flatten()?;
        self.notify(Event::Remove, std::slice::from_ref(&old));
        let stored = self.mutate("set", |items| match items.get_mut(index) {
            Some(slot) => *slot = value.clone(),
            None => items.push(value.clone()),
        });
        if stored.is_some() {
            self.notify(Event::Add, std::slice::from_ref(&value));
        }
        Some(old)
    }

    /// Sort with `compare` without notifying anyone.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        self.mutate("sort", |items| items.sort_by(compare));
    }

    // -----------------------------------------------------------------
    // Batched mutation
    // -----------------------------------------------------------------

    /// Batched [`add`](Self::add) with the list's default budget.
    pub async fn add_async(&self, cx: &Cx, value: T) -> Result<BatchStats, BatchError> {
        self.add_async_with_budget(cx, value, self.shared.budget)
            .await
    }

    /// Batched [`add`](Self::add) with an explicit budget.
    pub async fn add_async_with_budget(
        &self,
        cx: &Cx,
        value: T,
        budget: Duration,
    ) -> Result<BatchStats, BatchError> {
        self.add_many_async_with_budget(cx, [value], budget).await
    }

    /// Batched [`add_many`](Self::add_many) with the list's default budget.
    pub async fn add_many_async(
        &self,
        cx: &Cx,
        values: impl IntoIterator<Item = T>,
    ) -> Result<BatchStats, BatchError> {
        self.add_many_async_with_budget(cx, values, self.shared.budget)
            .await
    }

    /// Batched [`add_many`](Self::add_many) with an explicit budget.
    ///
    /// An empty `values` returns `Ok` with zeroed stats without taking the
    /// lock.
    pub async fn add_many_async_with_budget(
        &self,
        cx: &Cx,
        values: impl IntoIterator<Item = T>,
        budget: Duration,
    ) -> Result<BatchStats, BatchError> {
        let values: Vec<T> = values.into_iter().collect();
        if values.is_empty() {
            return Ok(BatchStats::default());
        }
        self.run_batch(cx, budget, Event::Add, move |items| {
            items.extend_from_slice(&values);
            values
        })
        .await
    }

    // -----------------------------------------------------------------
    // Cursor and iteration
    // -----------------------------------------------------------------

    /// Advance the built-in cursor. Returns `false` once past the end.
    pub fn move_next(&self) -> bool {
        let mut state = self.shared.state.borrow_mut();
        let len = state.items.as_ref().map_or(0, Vec::len);
        let next = state.cursor.map_or(0, |pos| pos.saturating_add(1)).min(len);
        state.cursor = Some(next);
        next < len
    }

    /// Element under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<T> {
        let state = self.shared.state.borrow();
        let pos = state.cursor?;
        state.items.as_ref()?.get(pos).cloned()
    }

    /// Rewind the cursor to before the first element.
    pub fn reset(&self) {
        self.shared.state.borrow_mut().cursor = None;
    }

    /// Restartable copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> ListSnapshot<T> {
        let items: Rc<[T]> = self.with_items(|items| Rc::from(items));
        ListSnapshot { items }
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.with_items(<[T]>::to_vec)
    }

    /// Element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.with_items(|items| items.get(index).cloned())
    }

    // -----------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------

    fn register(
        &self,
        pick: impl FnOnce(&mut ListState<T>, ListenerId),
    ) -> ListenerId {
        let mut state = self.shared.state.borrow_mut();
        let id = state.seq.next();
        pick(&mut state, id);
        id
    }

    /// Notified after every add, without the value.
    pub fn on_add(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register(|s, id| s.on_add.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified once per added value.
    pub fn on_add_value(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        self.register(|s, id| s.on_add_value.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified after every removal, without the value.
    pub fn on_remove(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register(|s, id| s.on_remove.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified once per removed value.
    pub fn on_remove_value(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        self.register(|s, id| s.on_remove_value.push(id, Rc::new(f), Placement::Normal))
    }

    /// Notified after `clear()`.
    pub fn on_clear(&self, f: impl Fn() + 'static) -> ListenerId {
        self.register(|s, id| s.on_clear.push(id, Rc::new(f), Placement::Normal))
    }

    /// [`on_add`](Self::on_add), removed when `pool` unloads.
    pub fn on_add_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.on_add(f);
        self.unload_with(id, pool)
    }

    /// [`on_add_value`](Self::on_add_value), removed when `pool` unloads.
    pub fn on_add_value_scoped(&self, f: impl Fn(&T) + 'static, pool: &UnloadPool) -> ListenerId {
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
        f: impl Fn(&T) + 'static,
        pool: &UnloadPool,
    ) -> ListenerId {
        let id = self.on_remove_value(f);
        self.unload_with(id, pool)
    }

    /// [`on_clear`](Self::on_clear), removed when `pool` unloads.
    pub fn on_clear_scoped(&self, f: impl Fn() + 'static, pool: &UnloadPool) -> ListenerId {
        let id = self.on_clear(f);
        self.unload_with(id, pool)
    }

    /// Register removal of listener `id` in `pool`. Returns `id`.
    pub fn unload_with(&self, id: ListenerId, pool: &UnloadPool) -> ListenerId {
        let weak = Rc::downgrade(&self.shared);
        pool.add_action(move || {
            if let Some(shared) = weak.upgrade() {
                shared.state.borrow_mut().remove_listener(id);
            }
        });
        id
    }
}

impl<T: Clone + PartialEq + 'static> ObservedList<T> {
    /// Remove the first element equal to `value` and notify remove
    /// listeners. `false` (and no notification) when absent.
    pub fn remove(&self, value: &T) -> bool {
        let removed = self.mutate("remove", |items| remove_first(items, value)).flatten();
        match removed {
            Some(removed) => {
                self.notify(Event::Remove, std::slice::from_ref(&removed));
                true
            }
            None => false,
        }
    }

    /// Remove the first occurrence of each of `values`. Notifies the no-arg
    /// channel once and the with-value channel once per element actually
    /// removed. Returns the number removed.
    pub fn remove_many(&self, values: &[T]) -> usize {
        let removed = self
            .mutate("remove_many", |items| remove_each(items, values))
            .unwrap_or_default();
        if !removed.is_empty() {
            self.notify(Event::Remove, &removed);
        }
        removed.len()
    }

    /// Batched [`remove`](Self::remove) with the list's default budget.
    pub async fn remove_async(&self, cx: &Cx, value: &T) -> Result<BatchStats, BatchError> {
        self.remove_many_async_with_budget(cx, std::slice::from_ref(value), self.shared.budget)
            .await
    }

    /// Batched [`remove`](Self::remove) with an explicit budget.
    pub async fn remove_async_with_budget(
        &self,
        cx: &Cx,
        value: &T,
        budget: Duration,
    ) -> Result<BatchStats, BatchError> {
        self.remove_many_async_with_budget(cx, std::slice::from_ref(value), budget)
            .await
    }

    /// Batched [`remove_many`](Self::remove_many) with the list's default
    /// budget.
    pub async fn remove_many_async(
        &self,
        cx: &Cx,
        values: &[T],
    ) -> Result<BatchStats, BatchError> {
        self.remove_many_async_with_budget(cx, values, self.shared.budget)
            .await
    }

    /// Batched [`remove_many`](Self::remove_many) with an explicit budget.
    /// Values not present are skipped; if none are present the call
    /// returns zeroed stats.
    pub async fn remove_many_async_with_budget(
        &self,
        cx: &Cx,
        values: &[T],
        budget: Duration,
    ) -> Result<BatchStats, BatchError> {
        if values.is_empty() {
            return Ok(BatchStats::default());
        }
        self.run_batch(cx, budget, Event::Remove, |items| remove_each(items, values))
            .await
    }

    /// Position of the first element equal to `value`.
    #[must_use]
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.with_items(|items| items.iter().position(|item| item == value))
    }

    /// Whether any element equals `value`.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.with_items(|items| items.contains(value))
    }
}

impl<T: Clone + Ord + 'static> ObservedList<T> {
    /// Sort ascending without notifying anyone.
    pub fn sort(&self) {
        self.sort_by(Ord::cmp);
    }
}

impl<T> ObservedList<T> {
    /// Read the contents in place. A disposed list reads as empty.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let state = self.shared.state.borrow();
        f(state.items.as_deref().unwrap_or(&[]))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_items(<[T]>::len)
    }

    /// Whether the list has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a batched mutation is in flight.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.shared.locked.get()
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.state.borrow().items.is_none()
    }

    /// Budget used by the batched methods without a `_with_budget` suffix.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.shared.budget
    }

    /// Unregister a listener from whichever channel holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.state.borrow_mut().remove_listener(id)
    }

    /// Registered listeners across all five channels.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let state = self.shared.state.borrow();
        state.on_add.pending_len()
            + state.on_add_value.pending_len()
            + state.on_remove.pending_len()
            + state.on_remove_value.pending_len()
            + state.on_clear.pending_len()
    }

    /// Drop every listener. The contents are kept.
    pub fn unload(&self) {
        self.shared.state.borrow_mut().clear_listeners();
    }

    /// Reset the cursor, release the contents, and drop every listener.
    pub fn dispose(&self) {
        let released = {
            let mut state = self.shared.state.borrow_mut();
            state.cursor = None;
            state.clear_listeners();
            state.items.take()
        };
        drop(released);
        tracing::debug!("observed list disposed");
    }
}

fn remove_first<T: PartialEq>(items: &mut Vec<T>, value: &T) -> Option<T> {
    let index = items.iter().position(|item| item == value)?;
    Some(items.remove(index))
}

fn remove_each<T: PartialEq>(items: &mut Vec<T>, values: &[T]) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| remove_first(items, value))
        .collect()
}

impl<T: Clone + 'static> Default for ObservedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> From<Vec<T>> for ObservedList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Clone + 'static> FromIterator<T> for ObservedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T> Unload for ObservedList<T> {
    fn unload(&self) {
        ObservedList::unload(self);
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("ObservedList")
            .field("items", &state.items)
            .field("cursor", &state.cursor)
            .field("locked", &self.shared.locked.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ListSnapshot
// ---------------------------------------------------------------------------

/// Contents of an [`ObservedList`] at the moment of the call.
///
/// Iterating does not consume it, so it can be walked any number of times.
#[derive(Clone)]
pub struct ListSnapshot<T> {
    items: Rc<[T]>,
}

impl<T> ListSnapshot<T> {
    /// Iterate by reference.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Number of elements captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Captured element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Captured contents as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a ListSnapshot<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for ListSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::scheduler::FrameClock;
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;
    use tinyrx_core::cx::{CxError, LabClock};

    type Log<T> = Rc<RefCell<Vec<T>>>;

    fn recorder<T: Clone + 'static>() -> (Log<T>, impl Fn(&T) + 'static) {
        let log: Log<T> = Rc::default();
        let sink = Rc::clone(&log);
        (log, move |v: &T| sink.borrow_mut().push(v.clone()))
    }

    fn events(list: &ObservedList<&'static str>) -> Log<String> {
        let log: Log<String> = Rc::default();
        let l = Rc::clone(&log);
        list.on_add(move || l.borrow_mut().push("add".into()));
        let l = Rc::clone(&log);
        list.on_add_value(move |v| l.borrow_mut().push(format!("add:{v}")));
        let l = Rc::clone(&log);
        list.on_remove(move || l.borrow_mut().push("remove".into()));
        let l = Rc::clone(&log);
        list.on_remove_value(move |v| l.borrow_mut().push(format!("remove:{v}")));
        let l = Rc::clone(&log);
        list.on_clear(move || l.borrow_mut().push("clear".into()));
        log
    }

    #[test]
    fn remove_middle_element_scenario() {
        let list = ObservedList::new();
        for s in ["a", "b", "c"] {
            list.add(s);
        }
        let log = events(&list);

        assert!(list.remove(&"b"));
        assert_eq!(list.to_vec(), vec!["a", "c"]);
        assert_eq!(*log.borrow(), vec!["remove", "remove:b"]);
    }

    #[test]
    fn remove_missing_does_not_notify() {
        let list = ObservedList::from_vec(vec!["a"]);
        let log = events(&list);
        assert!(!list.remove(&"z"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn set_fires_remove_before_add() {
        let list = ObservedList::from_vec(vec!["a", "b"]);
        let log = events(&list);
        assert_eq!(list.set(1, "x"), Some("b"));
        assert_eq!(list.to_vec(), vec!["a", "x"]);
        assert_eq!(*log.borrow(), vec!["remove", "remove:b", "add", "add:x"]);
    }

    #[test]
    fn set_remove_listener_sees_old_element_in_place() {
        let list = ObservedList::from_vec(vec!["a", "b"]);
        let seen: Log<String> = Rc::default();
        let (s, l) = (Rc::clone(&seen), list.clone());
        list.on_remove_value(move |v| s.borrow_mut().push(format!("remove {v}: {:?}", l.to_vec())));
        let (s, l) = (Rc::clone(&seen), list.clone());
        list.on_add_value(move |v| s.borrow_mut().push(format!("add {v}: {:?}", l.to_vec())));

        assert_eq!(list.set(1, "x"), Some("b"));
        assert_eq!(
            *seen.borrow(),
            vec![
                r#"remove b: ["a", "b"]"#.to_string(),
                r#"add x: ["a", "x"]"#.to_string(),
            ]
        );
    }

    #[test]
    fn set_after_remove_listener_shrinks_list_appends() {
        let list = ObservedList::from_vec(vec!["a", "b"]);
        let l = list.clone();
        // The nested remove_at re-enters this listener once with index 1
        // already gone, which stops the recursion.
        list.on_remove_value(move |v| {
            if *v == "b" {
                l.remove_at(1);
            }
        });
        assert_eq!(list.set(1, "x"), Some("b"));
        assert_eq!(list.to_vec(), vec!["a", "x"]);
    }

    #[test]
    fn set_out_of_range_is_silent() {
        let list = ObservedList::from_vec(vec!["a"]);
        let log = events(&list);
        assert_eq!(list.set(3, "x"), None);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn add_many_notifies_plain_once_and_each_value() {
        let list = ObservedList::new();
        let log = events(&list);
        assert_eq!(list.add_many(["a", "b"]), 2);
        assert_eq!(*log.borrow(), vec!["add", "add:a", "add:b"]);
        assert_eq!(list.add_many(Vec::new()), 0);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn remove_many_reports_only_removed() {
        let list = ObservedList::from_vec(vec!["a", "b", "c"]);
        let log = events(&list);
        assert_eq!(list.remove_many(&["c", "zz", "a"]), 2);
        assert_eq!(list.to_vec(), vec!["b"]);
        assert_eq!(*log.borrow(), vec!["remove", "remove:c", "remove:a"]);
    }

    #[test]
    fn remove_at_and_out_of_range() {
        let list = ObservedList::from_vec(vec!["a", "b"]);
        let log = events(&list);
        assert_eq!(list.remove_at(0), Some("a"));
        assert_eq!(list.remove_at(5), None);
        assert_eq!(*log.borrow(), vec!["remove", "remove:a"]);
    }

    #[test]
    fn remove_all_goes_from_the_end() {
        let list = ObservedList::from_vec(vec!["a", "b", "c"]);
        let (removed, push) = recorder::<&str>();
        list.on_remove_value(push);
        assert_eq!(list.remove_all(), 3);
        assert!(list.is_empty());
        assert_eq!(*removed.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn clear_notifies_clear_channel_only() {
        let list = ObservedList::from_vec(vec!["a", "b"]);
        let log = events(&list);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(*log.borrow(), vec!["clear"]);
    }

    #[test]
    fn listener_added_mid_dispatch_waits() {
        let list: ObservedList<u32> = ObservedList::new();
        let late = Rc::new(Cell::new(0));
        let handle = list.clone();
        let late_inner = Rc::clone(&late);
        let armed = Cell::new(false);
        list.on_add(move || {
            if !armed.replace(true) {
                let late = Rc::clone(&late_inner);
                handle.on_add(move || late.set(late.get() + 1));
            }
        });

        list.add(1);
        assert_eq!(late.get(), 0);
        list.add(2);
        assert_eq!(late.get(), 1);
    }

    #[test]
    fn listener_may_mutate_the_list() {
        let list: ObservedList<u32> = ObservedList::new();
        let handle = list.clone();
        list.on_add_value(move |v| {
            if *v < 3 {
                handle.add(v + 1);
            }
        });
        list.add(1);
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let sink = RecordingSink::new();
        let list = ObservedList::with_parts(Vec::new(), Rc::new(NextTick), Rc::new(sink.clone()));
        list.on_add(|| panic!("listener failed"));
        let (added, push) = recorder::<u8>();
        list.on_add_value(push);

        list.add(9);
        assert_eq!(*added.borrow(), vec![9]);
        assert_eq!(sink.count(DiagnosticKind::ListenerPanicked), 1);
    }

    #[test]
    fn cursor_walks_and_resets() {
        let list = ObservedList::from_vec(vec![10, 20]);
        assert_eq!(list.current(), None);
        assert!(list.move_next());
        assert_eq!(list.current(), Some(10));
        assert!(list.move_next());
        assert_eq!(list.current(), Some(20));
        assert!(!list.move_next());
        assert!(!list.move_next());
        assert_eq!(list.current(), None);

        list.reset();
        assert!(list.move_next());
        assert_eq!(list.current(), Some(10));
    }

    #[test]
    fn snapshot_is_restartable_and_stable() {
        let list = ObservedList::from_vec(vec![1, 2, 3]);
        let snap = list.snapshot();
        list.add(4);
        let first: Vec<_> = snap.iter().copied().collect();
        let second: Vec<_> = (&snap).into_iter().copied().collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn queries() {
        let list: ObservedList<i32> = [3, 1, 2].into_iter().collect();
        assert_eq!(list.index_of(&1), Some(1));
        assert!(list.contains(&2));
        assert!(!list.contains(&7));
        assert_eq!(list.get(0), Some(3));
        list.sort();
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        assert_eq!(list.with_items(|items| items.iter().sum::<i32>()), 6);
    }

    #[test]
    fn dispose_releases_everything() {
        let list = ObservedList::from_vec(vec!["a"]);
        let log = events(&list);
        list.move_next();
        list.dispose();

        assert!(list.is_disposed());
        assert_eq!(list.listener_count(), 0);
        assert_eq!(list.current(), None);
        list.add("b");
        assert!(list.is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn scoped_listener_detaches() {
        let list: ObservedList<u8> = ObservedList::new();
        let pool = UnloadPool::new();
        let (added, push) = recorder::<u8>();
        list.on_add_value_scoped(push, &pool);
        list.add(1);
        pool.unload();
        list.add(2);
        assert_eq!(*added.borrow(), vec![1]);
    }

    #[test]
    fn unload_keeps_items() {
        let list = ObservedList::from_vec(vec![1]);
        list.on_add(|| {});
        list.on_clear(|| {});
        Unload::unload(&list);
        assert_eq!(list.listener_count(), 0);
        assert_eq!(list.to_vec(), vec![1]);
    }

    // -- batched ----------------------------------------------------------

    struct Harness {
        list: ObservedList<u32>,
        frames: FrameClock,
        clock: LabClock,
        sink: RecordingSink,
    }

    fn harness() -> Harness {
        let frames = FrameClock::new();
        let sink = RecordingSink::new();
        let list = ObservedList::with_parts(
            Vec::new(),
            Rc::new(frames.clone()),
            Rc::new(sink.clone()),
        );
        Harness {
            list,
            frames,
            clock: LabClock::new(),
            sink,
        }
    }

    /// Value listener that logs and burns `cost` of lab time.
    fn costly_listener(h: &Harness, cost: Duration) -> Log<u32> {
        let log: Log<u32> = Rc::default();
        let l = Rc::clone(&log);
        let clock = h.clock.clone();
        h.list.on_add_value(move |v| {
            l.borrow_mut().push(*v);
            clock.advance(cost);
        });
        log
    }

    type Outcome = Rc<RefCell<Option<Result<BatchStats, BatchError>>>>;

    fn spawn_add_many(
        pool: &LocalPool,
        h: &Harness,
        cx: Cx,
        values: Vec<u32>,
        budget: Duration,
    ) -> Outcome {
        let outcome: Outcome = Rc::default();
        let out = Rc::clone(&outcome);
        let list = h.list.clone();
        pool.spawner()
            .spawn_local(async move {
                let result = list.add_many_async_with_budget(&cx, values, budget).await;
                *out.borrow_mut() = Some(result);
            })
            .expect("spawn");
        outcome
    }

    #[test]
    fn batched_add_yields_after_budget_and_resumes() {
        let h = harness();
        let log = costly_listener(&h, Duration::from_millis(4));
        let (cx, _ctrl) = Cx::lab(&h.clock);
        let mut pool = LocalPool::new();

        let outcome = spawn_add_many(&pool, &h, cx, (1..=6).collect(), Duration::from_millis(10));
        pool.run_until_stalled();

        assert_eq!(h.list.len(), 6, "mutation is not split");
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(h.list.is_locked());
        assert_eq!(h.frames.waiting(), 1);

        h.frames.tick();
        pool.run_until_stalled();

        assert_eq!(*log.borrow(), vec![1, 2, 3, 4, 5, 6]);
        assert!(!h.list.is_locked());
        let stats = outcome.borrow_mut().take().expect("finished").expect("ok");
        assert_eq!(
            stats,
            BatchStats {
                affected: 6,
                notified: 6,
                yields: 1
            }
        );
    }

    #[test]
    fn second_batch_while_locked_changes_nothing() {
        let h = harness();
        let log = costly_listener(&h, Duration::from_millis(20));
        let (cx, _ctrl) = Cx::lab(&h.clock);
        let mut pool = LocalPool::new();

        let outcome = spawn_add_many(&pool, &h, cx.clone(), vec![1, 2], Duration::from_millis(10));
        pool.run_until_stalled();
        assert!(h.list.is_locked());
        assert_eq!(*log.borrow(), vec![1]);

        let rejected = block_on(h.list.add_many_async(&cx, [7, 8]));
        assert_eq!(rejected, Err(BatchError::Locked));
        assert_eq!(h.list.to_vec(), vec![1, 2]);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(h.sink.count(DiagnosticKind::BatchLocked), 1);

        h.frames.tick();
        pool.run_until_stalled();
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert!(matches!(*outcome.borrow(), Some(Ok(_))));
    }

    #[test]
    fn cancellation_stops_notifications_and_releases_lock() {
        let h = harness();
        let log = costly_listener(&h, Duration::from_millis(20));
        let (cx, ctrl) = Cx::lab(&h.clock);
        let mut pool = LocalPool::new();

        let outcome = spawn_add_many(&pool, &h, cx, vec![1, 2, 3], Duration::from_millis(10));
        pool.run_until_stalled();
        ctrl.cancel();
        h.frames.tick();
        pool.run_until_stalled();

        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(h.list.to_vec(), vec![1, 2, 3]);
        assert!(!h.list.is_locked());
        assert_eq!(
            outcome.borrow_mut().take(),
            Some(Err(BatchError::Interrupted {
                reason: CxError::Cancelled,
                notified: 1
            }))
        );
        assert_eq!(h.sink.count(DiagnosticKind::BatchInterrupted), 1);
    }

    #[test]
    fn cancelled_before_start_does_not_mutate() {
        let h = harness();
        let (cx, ctrl) = Cx::lab(&h.clock);
        ctrl.cancel();
        let result = block_on(h.list.add_async(&cx, 1));
        assert!(matches!(result, Err(BatchError::Interrupted { notified: 0, .. })));
        assert!(h.list.is_empty());
        assert!(!h.list.is_locked());
    }

    #[test]
    fn dropped_batch_future_releases_lock() {
        let h = harness();
        costly_listener(&h, Duration::from_millis(20));
        let (cx, _ctrl) = Cx::lab(&h.clock);
        {
            let mut pool = LocalPool::new();
            spawn_add_many(&pool, &h, cx.clone(), vec![1, 2], Duration::from_millis(10));
            pool.run_until_stalled();
            assert!(h.list.is_locked());
        }
        assert!(!h.list.is_locked());
        assert!(block_on(h.list.add_async(&cx, 3)).is_ok());
    }

    #[test]
    fn batched_remove_notifies_removed_values() {
        let h = harness();
        h.list.add_many([1, 2, 3]);
        let (removed, push) = recorder::<u32>();
        h.list.on_remove_value(push);
        let (cx, _ctrl) = Cx::lab(&h.clock);

        let stats = block_on(h.list.remove_many_async(&cx, &[3, 9, 1])).expect("ok");
        assert_eq!(stats.affected, 2);
        assert_eq!(stats.notified, 2);
        assert_eq!(*removed.borrow(), vec![3, 1]);
        assert_eq!(h.list.to_vec(), vec![2]);

        let missing = block_on(h.list.remove_async(&cx, &42)).expect("ok");
        assert_eq!(missing, BatchStats::default());
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let h = harness();
        let (cx, _ctrl) = Cx::lab(&h.clock);
        let stats = block_on(h.list.add_many_async(&cx, Vec::new())).expect("ok");
        assert_eq!(stats, BatchStats::default());
        assert!(!h.list.is_locked());
    }

    #[test]
    fn batch_on_disposed_list() {
        let h = harness();
        h.list.dispose();
        let (cx, _ctrl) = Cx::lab(&h.clock);
        assert_eq!(block_on(h.list.add_async(&cx, 1)), Err(BatchError::Disposed));
        assert!(!h.list.is_locked());
    }

    #[test]
    fn default_budget() {
        let list: ObservedList<u8> = ObservedList::new();
        assert_eq!(list.budget(), Duration::from_millis(64));
    }
}
