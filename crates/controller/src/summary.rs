//! Result object describing one finished run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// The target number of successful optimizations was reached.
    Completed,
    /// The unoptimized program failed to compile.
    BaselineBroken,
    /// The iteration cap expired before enough successes.
    IterationCapReached,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::BaselineBroken => "baseline-broken",
            Self::IterationCapReached => "iteration-cap-reached",
        };
        f.write_str(s)
    }
}

/// Counters and outcome of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub benchmark: String,
    pub outcome: RunOutcome,
    /// Loop iterations executed, failed ones included.
    pub iterations: u64,
    /// Candidates that passed regression checks and were measured.
    pub successes: u32,
    /// Compile failures across the whole run, empty generations included.
    pub total_compile_errors: u32,
    /// Successes that directly followed a compile failure iteration.
    pub compile_errors_fixed: u32,
    /// Times generation restarted from the checkpoint.
    pub fallbacks: u32,
}

impl RunSummary {
    pub fn new(benchmark: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            outcome: RunOutcome::Completed,
            iterations: 0,
            successes: 0,
            total_compile_errors: 0,
            compile_errors_fixed: 0,
            fallbacks: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_with_kebab_outcome() {
        let mut summary = RunSummary::new("nbody.gpp-8.c++");
        summary.outcome = RunOutcome::IterationCapReached;
        summary.iterations = 7;
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"iteration-cap-reached\""));
        assert!(json.contains("\"benchmark\":\"nbody.gpp-8.c++\""));
    }
}
