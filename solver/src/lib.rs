//! Iterative code-solving engine.
//!
//! Runs a bounded generate -> evaluate -> improve loop against a problem: a
//! generation pipeline produces candidate programs, an execution harness
//! scores them against the problem's test cases, and feedback from failures
//! is folded into the next attempt's prompt. Sessions, attempts, and the
//! improvement log are durable, so an interrupted session resumes where it
//! left off.
//!
//! `core` holds the deterministic logic (state machine, code extraction,
//! improvement classification); `io` holds the side-effecting boundaries
//! (backends, storage, config); the top-level modules tie them together.

pub mod context;
pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod stream;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
