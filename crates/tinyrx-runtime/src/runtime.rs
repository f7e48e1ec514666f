#![forbid(unsafe_code)]

//! Composition root.
//!
//! [`ReactiveRuntime`] owns the pieces every reactive object needs: the id
//! generator, the [`ReactiveConfig`], the [`Scheduler`] batched mutations
//! yield to, and the [`DiagnosticSink`] failures are reported to. Objects
//! created through it share all four.
//!
//! # Usage
//!
//! ```ignore
//! let clock = FrameClock::new();
//! let rt = ReactiveRuntime::builder()
//!     .scheduler(Rc::new(clock.clone()))
//!     .build();
//!
//! let name = rt.observed(String::from("untitled"));
//! let rows = rt.list::<Row>();
//! let pool = rt.pool();
//! name.add_value_listener_scoped(|n| println!("{n}"), &pool);
//! ```
//!
//! The runtime is a cheap handle; clones share the id sequence.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashMap;
use tinyrx_core::ids::IdGenerator;

use crate::config::{ConfigError, ReactiveConfig};
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::reactive::input::{InputListener, InputSingleListener, InputValueListener};
use crate::reactive::loaded::{Loaded, ObservedLoaded};
use crate::reactive::observed::{Observed, ObservedId};
use crate::reactive::observed_dictionary::ObservedDictionary;
use crate::reactive::observed_list::ObservedList;
use crate::scheduler::{NextTick, Scheduler};
use crate::unload::UnloadPool;

/// Shared services for constructing reactive objects.
#[derive(Clone)]
pub struct ReactiveRuntime {
    ids: IdGenerator,
    config: ReactiveConfig,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn DiagnosticSink>,
}

impl ReactiveRuntime {
    /// Runtime with default config, [`NextTick`] scheduling and the tracing
    /// sink.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Runtime configured from `TINYRX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::builder().config(ReactiveConfig::from_env()?).build())
    }

    #[must_use]
    pub fn builder() -> ReactiveRuntimeBuilder {
        ReactiveRuntimeBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &ReactiveConfig {
        &self.config
    }

    #[must_use]
    pub fn sink(&self) -> Rc<dyn DiagnosticSink> {
        Rc::clone(&self.sink)
    }

    #[must_use]
    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.scheduler)
    }

    /// Id the next [`observed`](Self::observed) call will receive.
    #[must_use]
    pub fn peek_id(&self) -> u64 {
        self.ids.peek()
    }

    // --- constructors -----------------------------------------------------

    /// New observable with a fresh id.
    pub fn observed<T: 'static>(&self, value: T) -> Observed<T> {
        Observed::build(
            ObservedId::from_generator(&self.ids),
            value,
            self.config.capacity,
            self.sink(),
        )
    }

    /// Empty list using the runtime scheduler and batch budget.
    pub fn list<T: Clone + 'static>(&self) -> ObservedList<T> {
        self.list_from(Vec::new())
    }

    /// List over existing items.
    pub fn list_from<T: Clone + 'static>(&self, items: Vec<T>) -> ObservedList<T> {
        ObservedList::build(
            items,
            self.config.capacity,
            self.config.batch_budget,
            self.scheduler(),
            self.sink(),
        )
    }

    pub fn dictionary<K, V>(&self) -> ObservedDictionary<K, V>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        ObservedDictionary::build(AHashMap::new(), self.config.capacity, self.sink())
    }

    pub fn input(&self) -> InputListener {
        InputListener::build(self.config.capacity, self.sink())
    }

    pub fn value_input<T: 'static>(&self) -> InputValueListener<T> {
        InputValueListener::build(self.config.capacity, self.sink())
    }

    pub fn single_input(&self) -> InputSingleListener {
        InputSingleListener::build(self.config.capacity, self.sink())
    }

    /// Observed value produced by `load` on first read.
    pub fn loaded<T: 'static>(&self, load: impl FnOnce() -> T + 'static) -> ObservedLoaded<T> {
        ObservedLoaded::build(Loaded::lazy(load), self.config.capacity, self.sink())
    }

    /// Empty unload pool reporting to the runtime sink.
    pub fn pool(&self) -> UnloadPool {
        UnloadPool::with_capacity(self.config.capacity, self.sink())
    }
}

impl Default for ReactiveRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveRuntime")
            .field("next_id", &self.ids.peek())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`ReactiveRuntime`].
#[derive(Default)]
pub struct ReactiveRuntimeBuilder {
    ids: Option<IdGenerator>,
    config: ReactiveConfig,
    scheduler: Option<Rc<dyn Scheduler>>,
    sink: Option<Rc<dyn DiagnosticSink>>,
}

impl ReactiveRuntimeBuilder {
    #[must_use]
    pub fn config(mut self, config: ReactiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing id sequence.
    ///
    /// Without this, [`build`](Self::build) starts a fresh generator at 0,
    /// so observables from two runtimes can carry equal ids. Share one
    /// generator when they are compared or hashed together.
    #[must_use]
    pub fn ids(mut self, ids: IdGenerator) -> Self {
        self.ids = Some(ids);
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Rc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn build(self) -> ReactiveRuntime {
        ReactiveRuntime {
            ids: self.ids.unwrap_or_default(),
            config: self.config,
            scheduler: self.scheduler.unwrap_or_else(|| Rc::new(NextTick)),
            sink: self.sink.unwrap_or_else(default_sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticKind, RecordingSink};
    use crate::scheduler::FrameClock;
    use crate::unload::Unload;
    use std::cell::Cell;
    use std::time::Duration;

    #[test]
    fn observed_ids_are_sequential() {
        let rt = ReactiveRuntime::new();
        let first = rt.peek_id();
        let a = rt.observed(1);
        let b = rt.observed("b");
        assert_eq!(a.id().get(), first);
        assert_eq!(b.id().get(), first + 1);
        assert_eq!(rt.clone().peek_id(), first + 2);
    }

    #[test]
    fn shared_generator_across_runtimes() {
        let ids = IdGenerator::starting_at(100);
        let a = ReactiveRuntime::builder().ids(ids.clone()).build();
        let b = ReactiveRuntime::builder().ids(ids).build();
        assert_eq!(a.observed(()).id().get(), 100);
        assert_eq!(b.observed(()).id().get(), 101);
    }

    #[test]
    fn separate_generators_reuse_ids() {
        let a = ReactiveRuntime::new();
        let b = ReactiveRuntime::new();
        let x = a.observed(1);
        let y = b.observed(2);
        assert_eq!(x.id(), y.id());
        assert!(x == y);

        let shared = IdGenerator::new();
        let a = ReactiveRuntime::builder().ids(shared.clone()).build();
        let b = ReactiveRuntime::builder().ids(shared).build();
        assert!(a.observed(1) != b.observed(1));
    }

    #[test]
    fn objects_report_to_runtime_sink() {
        let sink = RecordingSink::new();
        let rt = ReactiveRuntime::builder().sink(Rc::new(sink.clone())).build();

        let value = rt.observed(0);
        value.add_listener(|| panic!("listener"));
        value.set(1);

        let input = rt.input();
        input.add_listener(|| panic!("input"));
        input.send();

        let pool = rt.pool();
        pool.add_action(|| panic!("cleanup"));
        pool.unload();

        assert_eq!(sink.count(DiagnosticKind::ListenerPanicked), 2);
        assert_eq!(sink.count(DiagnosticKind::CleanupFailed), 1);
    }

    #[test]
    fn lists_use_configured_budget() {
        let clock = FrameClock::new();
        let rt = ReactiveRuntime::builder()
            .config(ReactiveConfig::default().with_batch_budget(Duration::from_millis(3)))
            .scheduler(Rc::new(clock))
            .build();
        let list = rt.list_from(vec![1, 2]);
        assert_eq!(list.budget(), Duration::from_millis(3));
        assert_eq!(list.len(), 2);
        assert!(rt.list::<u8>().is_empty());
    }

    #[test]
    fn everything_fits_in_a_pool() {
        let rt = ReactiveRuntime::new();
        let pool = rt.pool();
        let hits = Rc::new(Cell::new(0));

        let value = pool.add(rt.observed(0));
        let dict = pool.add(rt.dictionary::<u8, u8>());
        let signal = pool.add(rt.value_input::<u8>());
        let single = pool.add(rt.single_input());
        let loaded = pool.add(rt.loaded(|| 1));

        let h = Rc::clone(&hits);
        value.add_listener(move || h.set(h.get() + 1));
        dict.on_add(|| {});
        signal.add_listener(|| {});
        single.add_listener(|| true);
        loaded.add_listener(|_| {});

        pool.unload();
        value.set(1);
        assert_eq!(hits.get(), 0);
        assert_eq!(dict.listener_count(), 0);
        assert_eq!(signal.listener_count(), 0);
        assert_eq!(single.listener_count(), 0);
        assert_eq!(loaded.listener_count(), 0);
        Unload::unload(&*value);
    }

    #[test]
    fn loaded_is_lazy() {
        let rt = ReactiveRuntime::new();
        let loaded = rt.loaded(|| "ready");
        assert!(!loaded.is_loaded());
        assert_eq!(loaded.get(), "ready");
    }
}
