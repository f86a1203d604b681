//! File locations used by one optimization run.

use std::path::{Path, PathBuf};

/// Resolves every path a run touches relative to a single root directory.
///
/// Keeping the whole layout behind one type means concurrent runs can
/// isolate themselves by choosing different roots.
#[derive(Debug, Clone)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the unoptimized source, harness Makefile and
    /// optional `input.txt` for one benchmark.
    pub fn benchmark_dir(&self, name: &str) -> PathBuf {
        self.root.join("benchmarks").join(name)
    }

    /// Stdin workload for benchmarks that read one.
    pub fn input_path(&self, name: &str) -> PathBuf {
        self.benchmark_dir(name).join("input.txt")
    }

    /// Directory holding generated candidates and checkpoints.
    pub fn out_dir(&self, name: &str) -> PathBuf {
        self.root.join("out").join(name)
    }

    /// Directory holding compiled regression binaries.
    pub fn bin_dir(&self, name: &str) -> PathBuf {
        self.out_dir(name).join("bin")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Evaluator feedback carried into the next generator prompt.
    pub fn feedback_path(&self) -> PathBuf {
        self.log_dir().join("feedback.txt")
    }

    /// Transcript of the most recent generator prompt.
    pub fn generator_prompt_path(&self) -> PathBuf {
        self.log_dir().join("generator_prompt.txt")
    }

    /// Transcript of the most recent evaluator prompt.
    pub fn evaluator_prompt_path(&self) -> PathBuf {
        self.log_dir().join("evaluator_prompt.txt")
    }

    /// Compiler diagnostics and output diffs from regression checks.
    pub fn validator_log_path(&self) -> PathBuf {
        self.log_dir().join("validator.log")
    }

    /// Append-only sample log written by the measurement harness.
    pub fn sample_log_path(&self, language: &str) -> PathBuf {
        self.log_dir().join(language).join("samples.csv")
    }

    /// Persisted record store for one language.
    pub fn record_store_path(&self, language: &str) -> PathBuf {
        self.log_dir().join(language).join("records.json")
    }

    /// Final report exported when a run finishes.
    pub fn report_path(&self) -> PathBuf {
        self.log_dir().join("report.json")
    }
}
