#![forbid(unsafe_code)]

//! Host scheduler seam for cooperative batching.
//!
//! Batched list mutations hand control back to the host when their time
//! budget runs out. The host decides what "next turn" means through the
//! [`Scheduler`] trait:
//!
//! - [`NextTick`] resumes on the executor's next poll.
//! - [`FrameClock`] resumes after the host calls [`FrameClock::tick`], which
//!   maps naturally onto a game or UI frame loop.
//!
//! Both check the [`Cx`] when they resume, so a cancelled batch never runs
//! another listener after a yield.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::future::{FutureExt, LocalBoxFuture};
use tinyrx_core::cx::{Cx, CxError};

/// "Yield until next turn, honoring a cancellation signal."
pub trait Scheduler {
    /// Suspend the caller until the host's next turn.
    ///
    /// Resolves to `Err` if `cx` is cancelled or expired when the caller
    /// resumes.
    fn yield_frame<'a>(&'a self, cx: &'a Cx) -> LocalBoxFuture<'a, Result<(), CxError>>;
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn yield_frame<'a>(&'a self, cx: &'a Cx) -> LocalBoxFuture<'a, Result<(), CxError>> {
        (**self).yield_frame(cx)
    }
}

// ---------------------------------------------------------------------------
// NextTick
// ---------------------------------------------------------------------------

/// Yields exactly once, then resumes on the next poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextTick;

impl Scheduler for NextTick {
    fn yield_frame<'a>(&'a self, cx: &'a Cx) -> LocalBoxFuture<'a, Result<(), CxError>> {
        async move {
            cx.check()?;
            YieldNow { yielded: false }.await;
            cx.check()
        }
        .boxed_local()
    }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, task: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        task.waker().wake_by_ref();
        Poll::Pending
    }
}

// ---------------------------------------------------------------------------
// FrameClock
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FrameState {
    frame: u64,
    /// One slot per suspended caller; emptied when that caller is dropped.
    waiters: Vec<Option<Waker>>,
}

/// Host-driven frame counter.
///
/// A caller that yields waits for the frame after the one it yielded in.
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    state: Rc<RefCell<FrameState>>,
}

impl FrameClock {
    /// Create a clock at frame 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame number.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.state.borrow().frame
    }

    /// Number of suspended callers waiting for the next frame.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.borrow().waiters.iter().flatten().count()
    }

    /// Advance one frame and wake every suspended caller.
    pub fn tick(&self) {
        let waiters = {
            let mut state = self.state.borrow_mut();
            state.frame += 1;
            std::mem::take(&mut state.waiters)
        };
        for waker in waiters.into_iter().flatten() {
            waker.wake();
        }
    }
}

impl Scheduler for FrameClock {
    fn yield_frame<'a>(&'a self, cx: &'a Cx) -> LocalBoxFuture<'a, Result<(), CxError>> {
        async move {
            cx.check()?;
            NextFrame {
                state: Rc::clone(&self.state),
                target: self.frame() + 1,
                slot: None,
            }
            .await;
            cx.check()
        }
        .boxed_local()
    }
}

struct NextFrame {
    state: Rc<RefCell<FrameState>>,
    target: u64,
    /// Index into `waiters` for the frame this future is waiting on.
    slot: Option<usize>,
}

impl Future for NextFrame {
    type Output = ();

    fn poll(self: Pin<&mut Self>, task: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();
        if state.frame >= this.target {
            this.slot = None;
            return Poll::Ready(());
        }
        // `tick` is the only thing that empties `waiters`, and after a tick
        // this future is ready, so a held slot is still ours.
        match this.slot.and_then(|i| state.waiters.get_mut(i)) {
            Some(Some(waker)) if waker.will_wake(task.waker()) => {}
            Some(entry) => *entry = Some(task.waker().clone()),
            None => {
                this.slot = Some(state.waiters.len());
                state.waiters.push(Some(task.waker().clone()));
            }
        }
        Poll::Pending
    }
}

impl Drop for NextFrame {
    fn drop(&mut self) {
        let Some(index) = self.slot else {
            return;
        };
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        if state.frame < self.target {
            if let Some(entry) = state.waiters.get_mut(index) {
                *entry = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;
    use std::cell::Cell;

    #[test]
    fn next_tick_completes() {
        let (cx, _ctrl) = Cx::background();
        assert_eq!(block_on(NextTick.yield_frame(&cx)), Ok(()));
    }

    #[test]
    fn next_tick_reports_cancellation() {
        let (cx, ctrl) = Cx::background();
        ctrl.cancel();
        assert_eq!(block_on(NextTick.yield_frame(&cx)), Err(CxError::Cancelled));
    }

    #[test]
    fn frame_clock_waits_for_tick() {
        let clock = FrameClock::new();
        let done = Rc::new(Cell::new(false));
        let mut pool = LocalPool::new();

        let task_clock = clock.clone();
        let task_done = Rc::clone(&done);
        pool.spawner()
            .spawn_local(async move {
                let (cx, _ctrl) = Cx::background();
                let result = task_clock.yield_frame(&cx).await;
                assert_eq!(result, Ok(()));
                task_done.set(true);
            })
            .expect("spawn");

        pool.run_until_stalled();
        assert!(!done.get());
        assert_eq!(clock.waiting(), 1);

        clock.tick();
        pool.run_until_stalled();
        assert!(done.get());
        assert_eq!(clock.frame(), 1);
        assert_eq!(clock.waiting(), 0);
    }

    #[test]
    fn frame_clock_checks_cancellation_on_resume() {
        let clock = FrameClock::new();
        let (cx, ctrl) = Cx::background();
        let outcome = Rc::new(Cell::new(None));
        let mut pool = LocalPool::new();

        let task_clock = clock.clone();
        let task_outcome = Rc::clone(&outcome);
        pool.spawner()
            .spawn_local(async move {
                let result = task_clock.yield_frame(&cx).await;
                task_outcome.set(Some(result));
            })
            .expect("spawn");

        pool.run_until_stalled();
        ctrl.cancel();
        clock.tick();
        pool.run_until_stalled();
        assert_eq!(outcome.get(), Some(Err(CxError::Cancelled)));
    }

    #[test]
    fn repeated_polls_hold_one_waiter_slot() {
        let clock = FrameClock::new();
        let (cx, _ctrl) = Cx::background();
        let mut task = Context::from_waker(futures::task::noop_waker_ref());
        let mut pending = clock.yield_frame(&cx);
        for _ in 0..5 {
            assert!(pending.as_mut().poll(&mut task).is_pending());
        }
        assert_eq!(clock.waiting(), 1);

        clock.tick();
        assert_eq!(clock.waiting(), 0);
        assert_eq!(pending.as_mut().poll(&mut task), Poll::Ready(Ok(())));
    }

    #[test]
    fn dropped_waiter_frees_its_slot() {
        let clock = FrameClock::new();
        let (cx, _ctrl) = Cx::background();
        let mut task = Context::from_waker(futures::task::noop_waker_ref());
        let mut first = clock.yield_frame(&cx);
        let mut second = clock.yield_frame(&cx);
        assert!(first.as_mut().poll(&mut task).is_pending());
        assert!(second.as_mut().poll(&mut task).is_pending());
        assert_eq!(clock.waiting(), 2);

        drop(first);
        assert_eq!(clock.waiting(), 1);
        assert!(second.as_mut().poll(&mut task).is_pending());
        assert_eq!(clock.waiting(), 1);
    }

    #[test]
    fn rc_scheduler_forwards() {
        let scheduler: Rc<dyn Scheduler> = Rc::new(NextTick);
        let (cx, _ctrl) = Cx::background();
        assert_eq!(block_on(scheduler.yield_frame(&cx)), Ok(()));
    }
}
