#![forbid(unsafe_code)]

//! Time-budgeted notification pacing for batched list mutations.
//!
//! A batched mutation changes the sequence synchronously and then walks its
//! listener invocations through a [`Pacer`]. Before every invocation the
//! pacer checks the [`Cx`]; once the time spent since the last yield exceeds
//! the budget it awaits [`Scheduler::yield_frame`] first. Time comes from the
//! `Cx` clock, so a lab clock makes pacing deterministic.
//!
//! The one-batch-at-a-time rule is enforced by [`BatchLock`], which releases
//! on every exit path, including a dropped future.

use std::cell::Cell;
use std::time::Duration;

use thiserror::Error;
use tinyrx_core::cx::{Cx, CxError, Stopwatch};

use crate::scheduler::Scheduler;

/// Default time a batch may spend notifying before it yields.
pub const DEFAULT_BATCH_BUDGET: Duration = Duration::from_millis(64);

/// Why a batched mutation did not run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Another batched mutation is in flight. Nothing was changed.
    #[error("another batched mutation is in flight")]
    Locked,

    /// The collection was disposed. Nothing was changed.
    #[error("collection is disposed")]
    Disposed,

    /// Cancelled or out of time. The sequence mutation (if any) stands and
    /// `notified` listener invocations already happened.
    #[error("batch interrupted after {notified} notifications: {reason}")]
    Interrupted { reason: CxError, notified: usize },
}

impl BatchError {
    /// The context error, for [`Interrupted`](Self::Interrupted).
    #[must_use]
    pub fn reason(&self) -> Option<CxError> {
        match self {
            Self::Interrupted { reason, .. } => Some(*reason),
            Self::Locked | Self::Disposed => None,
        }
    }
}

/// Outcome of a completed batched mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Elements added or removed.
    pub affected: usize,
    /// Listener invocations performed.
    pub notified: usize,
    /// Times the batch yielded to the scheduler.
    pub yields: usize,
}

// ---------------------------------------------------------------------------
// BatchLock
// ---------------------------------------------------------------------------

/// RAII holder of a collection's batch flag.
pub(crate) struct BatchLock<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> BatchLock<'a> {
    /// Take the flag, or `None` if it is already held.
    pub(crate) fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for BatchLock<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Paces listener invocations against a time budget.
pub(crate) struct Pacer<'a> {
    cx: &'a Cx,
    scheduler: &'a dyn Scheduler,
    budget: Duration,
    watch: Stopwatch,
    stats: BatchStats,
}

impl<'a> Pacer<'a> {
    pub(crate) fn new(cx: &'a Cx, scheduler: &'a dyn Scheduler, budget: Duration) -> Self {
        Self {
            cx,
            scheduler,
            budget,
            watch: cx.stopwatch(),
            stats: BatchStats::default(),
        }
    }

    /// Call before each invocation. Yields if the budget is spent, then
    /// checks the context.
    pub(crate) async fn checkpoint(&mut self) -> Result<(), BatchError> {
        if self.stats.notified > 0 && self.watch.exceeded(self.budget) {
            tracing::trace!(
                notified = self.stats.notified,
                elapsed_us = self.watch.elapsed().as_micros() as u64,
                "batch budget spent, yielding"
            );
            self.scheduler
                .yield_frame(self.cx)
                .await
                .map_err(|reason| self.interrupted(reason))?;
            self.stats.yields += 1;
            self.watch.restart();
        }
        self.cx.check().map_err(|reason| self.interrupted(reason))
    }

    /// Count one invocation.
    pub(crate) fn record(&mut self) {
        self.stats.notified += 1;
    }

    pub(crate) fn finish(mut self, affected: usize) -> BatchStats {
        self.stats.affected = affected;
        self.stats
    }

    fn interrupted(&self, reason: CxError) -> BatchError {
        BatchError::Interrupted {
            reason,
            notified: self.stats.notified,
        }
    }
}
