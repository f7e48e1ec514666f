#![forbid(unsafe_code)]

//! tinyrx public facade crate.
//!
//! Re-exports the runtime surface and a prelude for glob imports.

pub use tinyrx_runtime::*;

pub mod prelude {
    pub use tinyrx_core as core;
    pub use tinyrx_runtime as runtime;

    pub use tinyrx_core::cx::{Cx, CxController, CxError, LabClock};
    pub use tinyrx_core::ids::IdGenerator;
    pub use tinyrx_runtime::{
        BatchError, BatchStats, FrameClock, InputListener, InputSingleListener, InputValueListener,
        LazyList, ListenerId, Loaded, Observed, ObservedDictionary, ObservedList, ObservedLoaded,
        ReactiveConfig, ReactiveRuntime, Scheduler, Unload, UnloadPool,
    };
}
