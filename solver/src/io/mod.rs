//! Side-effecting boundaries: configuration, process spawning, generation and
//! execution backends, durable storage. Isolated from `core` to keep the
//! deterministic logic mockable in tests.

pub mod config;
pub mod evaluator;
pub mod generator;
pub mod problems;
pub mod process;
pub mod store;
