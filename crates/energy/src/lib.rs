//! Energy measurement: sample-log parsing and harness invocation.
//!
//! The measurement harness (RAPL-based on Linux) appends one line per
//! repetition to a shared sample log. This crate parses that log, filters
//! out counter-overflow artifacts, aggregates repetitions into a single
//! record, and drives the harness for baseline and candidate measurements.

pub mod sample;
pub mod sampler;

pub use sample::{aggregate, parse_samples, Aggregate, EnergySample};
pub use sampler::{EnergySampler, HarnessConfig, Measure};
