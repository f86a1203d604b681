//! Benchmark identities and measurement records for jouletune.
//!
//! This crate defines the registry of benchmark programs a run may target,
//! the validated identifier type used across the workspace, and the persisted
//! store of per-iteration energy/runtime records.

pub mod benchmark;
pub mod record;

pub use benchmark::{BenchmarkId, BenchmarkSpec};
pub use record::{IterationRecord, RecordStore};
