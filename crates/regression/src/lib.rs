//! Regression checking for optimized candidates.
//!
//! A candidate only counts if it compiles and reproduces the unoptimized
//! program's stdout byte for byte on the registered workload. This crate
//! builds both binaries, runs them under a deadline and classifies the
//! result.

pub mod outcome;
pub mod process;
pub mod validator;

pub use outcome::RegressionOutcome;
pub use process::{run_with_timeout, RunOutput};
pub use validator::{Toolchain, Validate, Validator};
