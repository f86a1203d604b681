//! Classified regression outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a regression check concluded about the current candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegressionOutcome {
    /// The unoptimized source no longer compiles. Fatal for the run.
    OriginalCompileFailure,
    /// The candidate failed to compile.
    OptimizedCompileFailure,
    /// The candidate compiled but crashed, overran the deadline, or
    /// produced output that diverges from the original.
    OutputMismatch,
    /// The candidate compiled and reproduced the original's output.
    Success,
}

impl RegressionOutcome {
    /// A fatal outcome ends the whole run, nothing can be retried.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::OriginalCompileFailure)
    }
}

impl fmt::Display for RegressionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OriginalCompileFailure => "original-compile-failure",
            Self::OptimizedCompileFailure => "optimized-compile-failure",
            Self::OutputMismatch => "output-mismatch",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}
