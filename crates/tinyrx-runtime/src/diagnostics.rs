#![forbid(unsafe_code)]

//! Non-fatal failure reporting.
//!
//! Nothing in the reactive layer lets a listener or cleanup failure escape to
//! its caller. Failures are caught at the dispatch site and handed to a
//! [`DiagnosticSink`], and the pass continues with the next entry.
//!
//! - [`TracingSink`] (the default) turns each report into a `tracing` event.
//! - [`RecordingSink`] keeps reports in memory so tests and tooling can
//!   inspect them.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A listener panicked during dispatch.
    ListenerPanicked,
    /// An unload entry panicked during pool teardown.
    CleanupFailed,
    /// A batched mutation was rejected because another one is in flight.
    BatchLocked,
    /// A batched mutation stopped early (cancelled or deadline exceeded).
    BatchInterrupted,
}

impl DiagnosticKind {
    /// Stable name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListenerPanicked => "listener_panicked",
            Self::CleanupFailed => "cleanup_failed",
            Self::BatchLocked => "batch_locked",
            Self::BatchInterrupted => "batch_interrupted",
        }
    }
}

/// A single failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Failure category.
    pub kind: DiagnosticKind,
    /// Component that observed the failure (e.g. `"ObservedList"`).
    pub source: &'static str,
    /// Human-readable detail, usually the panic payload.
    pub message: String,
}

impl Diagnostic {
    /// Build a report.
    #[must_use]
    pub fn new(kind: DiagnosticKind, source: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.source, self.message)
    }
}

/// Receiver for non-fatal failure reports.
pub trait DiagnosticSink {
    /// Accept one report. Must not panic.
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::ListenerPanicked | DiagnosticKind::CleanupFailed => {
                tracing::error!(
                    kind = diagnostic.kind.as_str(),
                    source = diagnostic.source,
                    message = %diagnostic.message,
                    "reactive failure isolated"
                );
            }
            DiagnosticKind::BatchLocked | DiagnosticKind::BatchInterrupted => {
                tracing::warn!(
                    kind = diagnostic.kind.as_str(),
                    source = diagnostic.source,
                    message = %diagnostic.message,
                    "batched mutation did not complete"
                );
            }
        }
    }
}

/// Sink that stores every report. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<Diagnostic>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all reports so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    /// Number of reports of the given kind.
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records.borrow().iter().filter(|d| d.kind == kind).count()
    }

    /// Total number of reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Drop all stored reports.
    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.records.borrow_mut().push(diagnostic);
    }
}

/// The sink used when none is injected.
#[must_use]
pub fn default_sink() -> Rc<dyn DiagnosticSink> {
    Rc::new(TracingSink)
}

/// Run `f`, converting a panic into a report. Returns `true` if `f` completed.
pub(crate) fn guarded(
    sink: &dyn DiagnosticSink,
    kind: DiagnosticKind,
    source: &'static str,
    f: impl FnOnce(),
) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            sink.report(Diagnostic::new(kind, source, panic_message(payload.as_ref())));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
