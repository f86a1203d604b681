//! Harness invocation and per-iteration measurement.

use anyhow::{anyhow, bail, Result};
use jouletune_artifacts::RunPaths;
use jouletune_suite::{BenchmarkId, IterationRecord, RecordStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::sample;

/// Environment variable pointing the harness at the source file to measure.
pub const ARTIFACT_ENV: &str = "JOULETUNE_ARTIFACT";

/// Seam between the controller and the measurement harness.
///
/// Implementations append to the shared sample log, turn the fresh samples
/// into a record, file it in the store and persist the store.
pub trait Measure {
    /// Measures the unoptimized program and fills the store's baseline slot.
    fn measure_baseline(
        &mut self,
        store: &mut RecordStore,
        source: &Path,
    ) -> Result<IterationRecord>;

    /// Measures the current candidate and files it under `iteration`.
    fn measure(
        &mut self,
        store: &mut RecordStore,
        iteration: u32,
        source: &Path,
    ) -> Result<IterationRecord>;
}

/// How to invoke the measurement harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub program: String,
    /// Arguments for measuring the unoptimized program.
    pub baseline_args: Vec<String>,
    /// Arguments for measuring the current candidate.
    pub optimized_args: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            baseline_args: vec!["measure".to_string()],
            optimized_args: vec!["measure_optimized".to_string()],
        }
    }
}

/// Drives the measurement harness and tails its sample log.
///
/// The log is append-only for the lifetime of a run. It is truncated once
/// before the baseline measurement; afterwards a byte cursor separates each
/// measurement's fresh lines from everything already consumed.
pub struct EnergySampler {
    harness: HarnessConfig,
    workdir: PathBuf,
    sample_log: PathBuf,
    store_path: PathBuf,
    cursor: u64,
}

impl EnergySampler {
    pub fn new(paths: &RunPaths, id: &BenchmarkId) -> Self {
        Self {
            harness: HarnessConfig::default(),
            workdir: paths.benchmark_dir(id.name()),
            sample_log: paths.sample_log_path(id.language()),
            store_path: paths.record_store_path(id.language()),
            cursor: 0,
        }
    }

    pub fn with_harness(mut self, harness: HarnessConfig) -> Self {
        self.harness = harness;
        self
    }

    /// Truncates the sample log so the run starts from a clean slate.
    fn reset_log(&mut self) -> Result<()> {
        if let Some(parent) = self.sample_log.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.sample_log, "")?;
        self.cursor = 0;
        Ok(())
    }

    fn run_harness(&self, args: &[String], artifact: &Path) -> Result<()> {
        tracing::info!(
            program = %self.harness.program,
            args = ?args,
            artifact = %artifact.display(),
            "running measurement harness"
        );
        let output = Command::new(&self.harness.program)
            .args(args)
            .env(ARTIFACT_ENV, artifact)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| anyhow!("cannot start harness '{}': {}", self.harness.program, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "measurement harness exited with {}: {}",
                output.status,
                tail_lines(&stderr, 20)
            );
        }
        Ok(())
    }

    /// Reads and parses every line appended since the previous collect.
    fn collect(&mut self) -> Result<Vec<sample::EnergySample>> {
        let data = fs::read(&self.sample_log)
            .map_err(|e| anyhow!("harness left no sample log at {}: {}", self.sample_log.display(), e))?;
        let start = (self.cursor as usize).min(data.len());
        let fresh = String::from_utf8_lossy(&data[start..]).into_owned();
        self.cursor = data.len() as u64;
        Ok(sample::parse_samples(&fresh))
    }

    fn record_from(&mut self, source: &Path) -> Result<IterationRecord> {
        let samples = self.collect()?;
        let agg = sample::aggregate(&samples).ok_or_else(|| {
            anyhow!(
                "no valid samples appended to {}",
                self.sample_log.display()
            )
        })?;
        if agg.discarded > 0 {
            tracing::warn!(
                discarded = agg.discarded,
                retained = agg.retained,
                "dropped samples with negative energy readings"
            );
        }
        let source_code = fs::read_to_string(source)
            .map_err(|e| anyhow!("cannot read measured source {}: {}", source.display(), e))?;
        Ok(IterationRecord {
            source_code,
            avg_energy: agg.avg_energy,
            avg_runtime: agg.avg_runtime,
        })
    }
}

impl Measure for EnergySampler {
    fn measure_baseline(
        &mut self,
        store: &mut RecordStore,
        source: &Path,
    ) -> Result<IterationRecord> {
        self.reset_log()?;
        self.run_harness(&self.harness.baseline_args, source)?;
        let record = self.record_from(source)?;
        tracing::info!(
            avg_energy = record.avg_energy,
            avg_runtime = record.avg_runtime,
            "baseline measured"
        );
        store.set_baseline(record.clone());
        store.save_to_file(&self.store_path)?;
        Ok(record)
    }

    fn measure(
        &mut self,
        store: &mut RecordStore,
        iteration: u32,
        source: &Path,
    ) -> Result<IterationRecord> {
        self.run_harness(&self.harness.optimized_args, source)?;
        let record = self.record_from(source)?;
        tracing::info!(
            iteration,
            avg_energy = record.avg_energy,
            avg_runtime = record.avg_runtime,
            "candidate measured"
        );
        store.insert(iteration, record.clone())?;
        store.save_to_file(&self.store_path)?;
        Ok(record)
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
