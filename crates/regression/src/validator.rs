//! Compile-and-compare regression checking.

use anyhow::{bail, Result};
use jouletune_artifacts::{ArtifactStore, RunPaths};
use jouletune_suite::{BenchmarkId, BenchmarkSpec};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::outcome::RegressionOutcome;
use crate::process::{run_with_timeout, RunOutput};

const COMPILE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_DIFF_LINES: usize = 20;

/// Seam between the controller and the regression machinery.
pub trait Validate {
    /// Checks that the unoptimized program compiles and runs, before any
    /// optimization is attempted.
    fn verify_baseline(&mut self) -> Result<RegressionOutcome>;

    /// Full check of the current candidate against the original.
    fn validate(&mut self) -> Result<RegressionOutcome>;
}

/// C++ toolchain used to build both binaries.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compiler: String,
    /// Flags applied to every benchmark, before per-benchmark extras.
    pub base_flags: Vec<String>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: "g++".to_string(),
            base_flags: vec!["-O2".to_string(), "-std=c++17".to_string()],
        }
    }
}

enum Compiled {
    Ok,
    Failed { diagnostics: String },
}

/// Builds original and candidate, runs both on the registered workload and
/// compares stdout byte for byte.
///
/// The original is rebuilt on every check. That costs a few seconds per
/// iteration but means a broken build environment surfaces as
/// `OriginalCompileFailure` instead of a stale reference binary.
pub struct Validator {
    toolchain: Toolchain,
    artifacts: ArtifactStore,
    spec: &'static BenchmarkSpec,
    stdin_path: Option<PathBuf>,
    diagnostics_path: PathBuf,
    run_timeout: Duration,
}

impl Validator {
    pub fn new(paths: &RunPaths, id: &BenchmarkId) -> Self {
        let spec = id.spec();
        let stdin_path = spec.reads_stdin.then(|| paths.input_path(id.name()));
        Self {
            toolchain: Toolchain::default(),
            artifacts: ArtifactStore::new(paths, id),
            spec,
            stdin_path,
            diagnostics_path: paths.validator_log_path(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    fn compile(&self, source: &Path, binary: &Path) -> Result<Compiled> {
        if let Some(parent) = binary.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut cmd = Command::new(&self.toolchain.compiler);
        cmd.args(&self.toolchain.base_flags)
            .arg(source)
            .arg("-o")
            .arg(binary)
            .args(self.spec.extra_flags);
        let out = run_with_timeout(&mut cmd, None, COMPILE_TIMEOUT)?;
        if out.timed_out {
            return Ok(Compiled::Failed {
                diagnostics: format!("compiler timed out after {:?}", COMPILE_TIMEOUT),
            });
        }
        if !out.success {
            let mut diagnostics = String::from_utf8_lossy(&out.stderr).into_owned();
            if diagnostics.trim().is_empty() {
                diagnostics = String::from_utf8_lossy(&out.stdout).into_owned();
            }
            return Ok(Compiled::Failed { diagnostics });
        }
        Ok(Compiled::Ok)
    }

    fn run_binary(&self, binary: &Path) -> Result<RunOutput> {
        let mut cmd = Command::new(binary);
        cmd.args(self.spec.run_args);
        run_with_timeout(&mut cmd, self.stdin_path.as_deref(), self.run_timeout)
    }

    /// Overwrites the validator log so it always describes the most recent
    /// failure, which is what repair prompts are built from.
    fn persist_diagnostics(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.diagnostics_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.diagnostics_path, text)?;
        Ok(())
    }
}

impl Validate for Validator {
    fn verify_baseline(&mut self) -> Result<RegressionOutcome> {
        match self.compile(self.artifacts.original_path(), &self.artifacts.original_bin())? {
            Compiled::Failed { diagnostics } => {
                tracing::error!("unoptimized source fails to compile");
                self.persist_diagnostics(&diagnostics)?;
                return Ok(RegressionOutcome::OriginalCompileFailure);
            }
            Compiled::Ok => {}
        }
        let out = self.run_binary(&self.artifacts.original_bin())?;
        if out.timed_out {
            bail!(
                "unoptimized program exceeded the {:?} run deadline",
                self.run_timeout
            );
        }
        if !out.success {
            bail!(
                "unoptimized program exited with failure: {}",
                tail_lines(&String::from_utf8_lossy(&out.stderr), 20)
            );
        }
        Ok(RegressionOutcome::Success)
    }

    fn validate(&mut self) -> Result<RegressionOutcome> {
        match self.compile(self.artifacts.original_path(), &self.artifacts.original_bin())? {
            Compiled::Failed { diagnostics } => {
                tracing::error!("unoptimized source fails to compile");
                self.persist_diagnostics(&diagnostics)?;
                return Ok(RegressionOutcome::OriginalCompileFailure);
            }
            Compiled::Ok => {}
        }
        match self.compile(self.artifacts.candidate_path(), &self.artifacts.candidate_bin())? {
            Compiled::Failed { diagnostics } => {
                tracing::warn!("candidate fails to compile");
                self.persist_diagnostics(&diagnostics)?;
                return Ok(RegressionOutcome::OptimizedCompileFailure);
            }
            Compiled::Ok => {}
        }

        let reference = self.run_binary(&self.artifacts.original_bin())?;
        if reference.timed_out || !reference.success {
            // The original misbehaving at run time is an environment
            // problem, not a candidate failure.
            bail!(
                "unoptimized binary failed during the regression run: {}",
                tail_lines(&String::from_utf8_lossy(&reference.stderr), 20)
            );
        }

        let candidate = self.run_binary(&self.artifacts.candidate_bin())?;
        if candidate.timed_out {
            self.persist_diagnostics("candidate run exceeded the deadline\n")?;
            return Ok(RegressionOutcome::OutputMismatch);
        }
        if !candidate.success {
            self.persist_diagnostics(&format!(
                "candidate run failed:\n{}",
                tail_lines(&String::from_utf8_lossy(&candidate.stderr), 40)
            ))?;
            return Ok(RegressionOutcome::OutputMismatch);
        }
        if candidate.stdout != reference.stdout {
            self.persist_diagnostics(&diff_summary(&reference.stdout, &candidate.stdout))?;
            return Ok(RegressionOutcome::OutputMismatch);
        }
        Ok(RegressionOutcome::Success)
    }
}

/// Bounded line diff for the validator log.
fn diff_summary(expected: &[u8], actual: &[u8]) -> String {
    let expected = String::from_utf8_lossy(expected);
    let actual = String::from_utf8_lossy(actual);
    let mut out = String::from("candidate output diverges from the original\n");
    let mut shown = 0;
    for (i, (e, a)) in expected.lines().zip(actual.lines()).enumerate() {
        if e != a {
            out.push_str(&format!(
                "line {}:\n  expected: {}\n  actual:   {}\n",
                i + 1,
                e,
                a
            ));
            shown += 1;
            if shown == MAX_DIFF_LINES {
                out.push_str("...\n");
                break;
            }
        }
    }
    let expected_lines = expected.lines().count();
    let actual_lines = actual.lines().count();
    if expected_lines != actual_lines {
        out.push_str(&format!(
            "line counts differ: expected {}, actual {}\n",
            expected_lines, actual_lines
        ));
    }
    out
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
