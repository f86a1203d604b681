//! Run orchestration: the generate, validate, measure, evaluate loop.

pub mod cli;
pub mod config;
pub mod controller;
pub mod summary;

pub use config::RunConfig;
pub use controller::Controller;
pub use summary::{RunOutcome, RunSummary};
