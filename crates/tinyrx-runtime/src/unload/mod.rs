#![forbid(unsafe_code)]

//! Manual lifetime scoping for listener registrations.
//!
//! Scene- or feature-scoped objects have no deterministic destructor in a
//! frame-driven host, so registrations are collected into an [`UnloadPool`]
//! and torn down together when the scope ends.
//!
//! - [`Unload`]: anything that can release its resources on demand.
//! - [`UnloadAction`]: a closure wrapped as an `Unload` entry.
//! - [`UnloadPool`]: an ordered set of entries, itself an `Unload`.
//!
//! # Invariants
//!
//! 1. `unload()` invokes every entry once, in insertion order, even when some
//!    of them panic.
//! 2. After `unload()`, `is_unloaded()` is true until `clear()`.
//! 3. `unload()` on an unloaded pool does nothing.
//! 4. `clear()` discards entries without invoking them.

mod pool;

pub use pool::{UnloadPool, unload_each};

/// Releases resources (listener registrations, pending work) on demand.
pub trait Unload {
    /// Release. Called at most once per pool teardown.
    fn unload(&self);
}

/// A cleanup closure usable as a pool entry.
pub struct UnloadAction {
    action: Box<dyn Fn()>,
}

impl UnloadAction {
    /// Wrap `action`.
    pub fn new(action: impl Fn() + 'static) -> Self {
        Self {
            action: Box::new(action),
        }
    }
}

impl Unload for UnloadAction {
    fn unload(&self) {
        (self.action)();
    }
}

impl std::fmt::Debug for UnloadAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnloadAction").finish_non_exhaustive()
    }
}
