//! Pure, deterministic solver logic.
//!
//! Modules here take values in and return values out. No filesystem, no
//! processes, no clocks beyond explicit `now` parameters.

pub mod classifier;
pub mod extract;
pub mod state;
pub mod testcases;
pub mod types;
