//! Identity allocation for observables.
//!
//! There is no process-wide counter. Whoever composes the reactive graph owns
//! an [`IdGenerator`] and hands it (or a clone) to everything it constructs.
//! Clones share the same counter, so ids stay unique within one generator.

use std::cell::Cell;
use std::rc::Rc;

/// Shared monotonic id source.
#[derive(Clone, Debug, Default)]
pub struct IdGenerator {
    next: Rc<Cell<u64>>,
}

impl IdGenerator {
    /// A generator whose first id is 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator whose first id is `first`.
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Rc::new(Cell::new(first)),
        }
    }

    /// Take the next id.
    pub fn next_id(&self) -> u64 {
        let id = self.next.get();
        self.next.set(id.wrapping_add(1));
        id
    }

    /// The id the next call to [`next_id`](Self::next_id) will return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.get()
    }
}
