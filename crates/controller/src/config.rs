//! Run configuration.

/// Knobs for one optimization run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Successful optimizations needed before the run completes.
    pub target_successes: u32,
    /// Consecutive compile failures tolerated before generation falls back
    /// to the checkpoint.
    pub max_consecutive_compile_errors: u32,
    /// Hard cap on loop iterations so a never-succeeding model cannot spin
    /// forever.
    pub max_iterations: u64,
    /// Whether a fatal baseline failure still writes the final report.
    pub report_on_fatal: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_successes: 5,
            max_consecutive_compile_errors: 3,
            max_iterations: 50,
            report_on_fatal: false,
        }
    }
}
