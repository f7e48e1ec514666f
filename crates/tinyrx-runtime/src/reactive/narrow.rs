#![forbid(unsafe_code)]

//! Runtime narrowing for kind-filtered listeners.
//!
//! An observable over a polymorphic payload (`Rc<dyn Any>`, an enum of
//! message kinds, ...) can register a listener that only runs when the
//! notified value is of one narrower kind. The payload type states how to
//! look for that kind by implementing [`Narrow<V>`].

use std::any::Any;
use std::rc::Rc;

/// Borrow `self` as a `V`, if it is one.
pub trait Narrow<V> {
    /// `Some` when the runtime value is of kind `V`.
    fn narrow(&self) -> Option<&V>;
}

impl<V: Any> Narrow<V> for Box<dyn Any> {
    fn narrow(&self) -> Option<&V> {
        (**self).downcast_ref::<V>()
    }
}

impl<V: Any> Narrow<V> for Rc<dyn Any> {
    fn narrow(&self) -> Option<&V> {
        (**self).downcast_ref::<V>()
    }
}

impl<V, T: Narrow<V>> Narrow<V> for Option<T> {
    fn narrow(&self) -> Option<&V> {
        self.as_ref().and_then(Narrow::narrow)
    }
}
