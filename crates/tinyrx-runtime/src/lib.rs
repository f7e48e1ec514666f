#![forbid(unsafe_code)]

//! Runtime: reactive values and collections, cooperative batch scheduling,
//! scoped teardown, and failure diagnostics.
//!
//! Everything here is single-threaded (`Rc` / `RefCell`). Start from a
//! [`ReactiveRuntime`], or construct the types in [`reactive`] directly.

pub mod config;
pub mod diagnostics;
pub mod reactive;
pub mod runtime;
pub mod scheduler;
pub mod unload;

pub use config::{ConfigError, ReactiveConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, RecordingSink, TracingSink};
pub use reactive::{
    BatchError, BatchStats, InputListener, InputSingleListener, InputValueListener, LazyList,
    ListSnapshot, ListenerId, Loaded, Narrow, Observed, ObservedDictionary, ObservedId,
    ObservedList, ObservedLoaded,
};
pub use runtime::{ReactiveRuntime, ReactiveRuntimeBuilder};
pub use scheduler::{FrameClock, NextTick, Scheduler};
pub use unload::{Unload, UnloadAction, UnloadPool, unload_each};
