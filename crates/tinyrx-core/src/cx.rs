//! Cancellation context (`Cx`) for cooperative, frame-bounded work.
//!
//! A `Cx` is the handle a long-running notification pass carries across its
//! suspension points. It answers three questions:
//!
//! - **Should I stop?** `cx.is_cancelled()` / `cx.check()`.
//! - **Am I out of time?** An optional deadline, tightened through
//!   [`Cx::child`] chains.
//! - **What time is it?** `cx.now()` reads either the wall clock or a
//!   [`LabClock`], so time-budgeted dispatch can be tested deterministically.
//!
//! # Design
//!
//! The reactive layer is single-threaded, so `Cx` shares its state through
//! `Rc` and `Cell` and is deliberately `!Send`. Cancelling goes through the
//! companion [`CxController`]; dropping the controller does not cancel.
//!
//! # Example
//!
//! ```
//! use tinyrx_core::cx::{Cx, LabClock};
//! use web_time::Duration;
//!
//! let clock = LabClock::new();
//! let (cx, ctrl) = Cx::lab_with_deadline(&clock, Duration::from_millis(100));
//! assert!(!cx.is_done());
//!
//! clock.advance(Duration::from_millis(150));
//! assert!(cx.is_expired());
//!
//! ctrl.cancel();
//! assert!(cx.is_cancelled());
//! ```

use std::cell::Cell;
use std::rc::Rc;

use web_time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::logging::debug;
#[cfg(not(feature = "tracing"))]
use crate::debug;

thread_local! {
    static NEXT_CX_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_cx_id() -> u64 {
    NEXT_CX_ID.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        id
    })
}

// ─── Time source ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TimeSource {
    Real,
    Lab(LabClock),
}

impl TimeSource {
    fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(clock) => clock.now(),
        }
    }
}

/// A manually advanced clock.
///
/// Every `Cx` built from the same `LabClock` (and every clone of the clock)
/// observes the same time. Listeners in tests call [`LabClock::advance`] to
/// simulate expensive work without sleeping.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset: Rc<Cell<Duration>>,
}

impl LabClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.offset.set(self.offset.get().saturating_add(delta));
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + self.offset.get()
    }

    /// Total time advanced since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Shared state ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct CxInner {
    id: u64,
    cancelled: Cell<bool>,
    /// Absolute deadline, if any. Parents are consulted separately.
    deadline: Option<Instant>,
    time_source: TimeSource,
    parent: Option<Rc<CxInner>>,
}

impl CxInner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.get() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Tightest deadline along the parent chain.
    fn effective_deadline(&self) -> Option<Instant> {
        let parent = self.parent.as_ref().and_then(|p| p.effective_deadline());
        match (self.deadline, parent) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }
}

// ─── Cx ──────────────────────────────────────────────────────────────────────

/// Cancellation and deadline handle.
///
/// Cheap to clone; clones observe the same cancellation flag.
#[derive(Clone, Debug)]
pub struct Cx {
    inner: Rc<CxInner>,
}

impl Cx {
    /// A root context with no deadline on the wall clock.
    #[must_use]
    pub fn background() -> (Self, CxController) {
        Self::new_inner(None, TimeSource::Real, None)
    }

    /// A root context on the wall clock that expires after `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Duration) -> (Self, CxController) {
        Self::new_inner(Some(deadline), TimeSource::Real, None)
    }

    /// A root context driven by `clock`.
    #[must_use]
    pub fn lab(clock: &LabClock) -> (Self, CxController) {
        Self::new_inner(None, TimeSource::Lab(clock.clone()), None)
    }

    /// A context driven by `clock` that expires after `deadline` of lab time.
    #[must_use]
    pub fn lab_with_deadline(clock: &LabClock, deadline: Duration) -> (Self, CxController) {
        Self::new_inner(Some(deadline), TimeSource::Lab(clock.clone()), None)
    }

    /// Derive a child with its own deadline.
    ///
    /// The effective deadline is the tighter of the two, and cancelling the
    /// parent cancels the child.
    #[must_use]
    pub fn child(&self, deadline: Duration) -> (Self, CxController) {
        Self::new_inner(
            Some(deadline),
            self.inner.time_source.clone(),
            Some(Rc::clone(&self.inner)),
        )
    }

    /// Derive a child that only inherits the parent's deadline.
    #[must_use]
    pub fn child_inherit(&self) -> (Self, CxController) {
        Self::new_inner(
            None,
            self.inner.time_source.clone(),
            Some(Rc::clone(&self.inner)),
        )
    }

    fn new_inner(
        deadline: Option<Duration>,
        time_source: TimeSource,
        parent: Option<Rc<CxInner>>,
    ) -> (Self, CxController) {
        let now = time_source.now();
        let inner = Rc::new(CxInner {
            id: next_cx_id(),
            cancelled: Cell::new(false),
            deadline: deadline.and_then(|d| now.checked_add(d)),
            time_source,
            parent,
        });
        let ctrl = CxController {
            inner: Rc::clone(&inner),
        };
        (Self { inner }, ctrl)
    }

    /// Identifier for log correlation.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether this context or any ancestor was cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Whether the effective deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|d| d.is_zero())
    }

    /// Cancelled or expired.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Time left before the effective deadline, saturating at zero.
    /// `None` when no deadline is set anywhere in the chain.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.now();
        self.inner
            .effective_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Current time according to this context's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.time_source.now()
    }

    /// Whether this context reads a [`LabClock`].
    #[inline]
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self.inner.time_source, TimeSource::Lab(_))
    }

    /// Start measuring elapsed time on this context's clock.
    #[must_use]
    pub fn stopwatch(&self) -> Stopwatch {
        Stopwatch {
            started: self.now(),
            cx: self.clone(),
        }
    }

    /// `Ok` while the context is live.
    ///
    /// Intended for suspension points:
    /// ```ignore
    /// cx.check()?;
    /// ```
    pub fn check(&self) -> Result<(), CxError> {
        if self.is_cancelled() {
            return Err(CxError::Cancelled);
        }
        if self.is_expired() {
            return Err(CxError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Elapsed-time probe bound to a [`Cx`] clock.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    started: Instant,
    cx: Cx,
}

impl Stopwatch {
    /// Time since the stopwatch was started or last restarted.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.cx.now().saturating_duration_since(self.started)
    }

    /// Whether more than `budget` has elapsed.
    #[must_use]
    pub fn exceeded(&self, budget: Duration) -> bool {
        self.elapsed() > budget
    }

    /// Reset the start point to now.
    pub fn restart(&mut self) {
        self.started = self.cx.now();
    }
}

// ─── CxController ────────────────────────────────────────────────────────────

/// Owner-side handle that cancels a [`Cx`].
#[derive(Debug)]
pub struct CxController {
    inner: Rc<CxInner>,
}

impl CxController {
    /// Cancel the context and every child derived from it.
    pub fn cancel(&self) {
        if !self.inner.cancelled.replace(true) {
            debug!(cx_id = self.inner.id, "cx cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) was called on this controller.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }
}

// ─── CxError ─────────────────────────────────────────────────────────────────

/// Why a context stopped being live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CxError {
    /// Explicitly cancelled.
    Cancelled,
    /// Deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for CxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "context cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for CxError {}
