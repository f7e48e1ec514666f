#![forbid(unsafe_code)]

//! Core: cancellation context, lab clock, identity allocation, and logging
//! shims shared by the reactive runtime.

pub mod cx;
pub mod ids;
pub mod logging;
