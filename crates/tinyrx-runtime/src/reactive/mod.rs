#![forbid(unsafe_code)]

//! Reactive values, collections, and signals.
//!
//! - [`LazyList`]: deferred-apply list; reads see the last applied snapshot.
//! - [`Observed`]: a value that notifies on every assignment.
//! - [`ObservedList`]: a notifying sequence with time-budgeted batched
//!   mutations and a cursor.
//! - [`ObservedDictionary`]: a notifying keyed map.
//! - [`InputListener`], [`InputValueListener`], [`InputSingleListener`]:
//!   stateless signals.
//! - [`Loaded`], [`ObservedLoaded`]: values produced on first access.
//!
//! # Architecture
//!
//! Every notifier is a cloneable `Rc<RefCell<..>>` handle. Listener sets are
//! [`LazyList`]s: registration and removal touch only the pending buffer, and
//! a notification takes an `Rc<[..]>` snapshot and releases the borrow
//! before calling anyone. Listeners may therefore register, remove, read, or
//! mutate the notifier they are called from.
//!
//! # Invariants
//!
//! 1. A notification reaches exactly the listeners registered when it
//!    started, in registration order (`_first` / `_last` placements aside).
//! 2. Changes made by a listener take effect from the next notification.
//! 3. A panicking listener is reported to the notifier's
//!    [`DiagnosticSink`](crate::diagnostics::DiagnosticSink) and the rest
//!    still run.
//! 4. At most one batched mutation is in flight per [`ObservedList`].
//!
//! # Failure Modes
//!
//! - Notifiers are `!Send`. Sharing across threads is a compile error.
//! - Reading a notifier's value from inside a `with` closure and assigning
//!   to it in the same closure panics on the `RefCell`.

pub mod batch;
pub mod input;
pub mod lazy_list;
pub mod listener;
pub mod loaded;
pub mod narrow;
pub mod observed;
pub mod observed_dictionary;
pub mod observed_list;

pub use batch::{BatchError, BatchStats, DEFAULT_BATCH_BUDGET};
pub use input::{InputListener, InputSingleListener, InputValueListener};
pub use lazy_list::LazyList;
pub use listener::ListenerId;
pub use loaded::{Loaded, ObservedLoaded};
pub use narrow::Narrow;
pub use observed::{Observed, ObservedId};
pub use observed_dictionary::ObservedDictionary;
pub use observed_list::{ListSnapshot, ObservedList};
