//! Per-iteration measurement records and their persisted store.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One measured program variant. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Full source text of the variant that was measured.
    pub source_code: String,
    /// Mean package energy per harness repetition, in joules.
    pub avg_energy: f64,
    /// Mean wall-clock runtime per harness repetition, in seconds.
    pub avg_runtime: f64,
}

/// Measured variants of one benchmark run.
///
/// The unoptimized baseline lives in its own slot; successful optimization
/// rounds occupy indices `0..` with no gaps. The store is persisted as JSON
/// after every measurement so a crashed run leaves its records behind.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordStore {
    baseline: Option<IterationRecord>,
    iterations: BTreeMap<u32, IterationRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from disk, or returns an empty one if the file does
    /// not exist yet.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let store: Self = serde_json::from_str(&data)
            .map_err(|e| anyhow!("corrupt record store {}: {}", path.display(), e))?;
        tracing::debug!(
            path = %path.display(),
            iterations = store.iterations.len(),
            "loaded record store"
        );
        Ok(store)
    }

    /// Persists the store as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn set_baseline(&mut self, record: IterationRecord) {
        self.baseline = Some(record);
    }

    pub fn baseline(&self) -> Option<&IterationRecord> {
        self.baseline.as_ref()
    }

    /// Inserts the record for optimization round `index`.
    ///
    /// Indices must arrive in order starting at zero; a gap or a duplicate
    /// means the caller lost track of its success count.
    pub fn insert(&mut self, index: u32, record: IterationRecord) -> Result<()> {
        let next = self.iterations.len() as u32;
        if index != next {
            bail!(
                "record index {} out of order, next expected index is {}",
                index,
                next
            );
        }
        self.iterations.insert(index, record);
        Ok(())
    }

    pub fn iteration(&self, index: u32) -> Option<&IterationRecord> {
        self.iterations.get(&index)
    }

    /// Number of recorded optimization rounds, excluding the baseline.
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Most recent optimization record, if any.
    pub fn latest(&self) -> Option<(u32, &IterationRecord)> {
        self.iterations.iter().next_back().map(|(i, r)| (*i, r))
    }

    /// Record with the lowest mean energy, baseline included.
    pub fn best(&self) -> Option<&IterationRecord> {
        self.baseline
            .iter()
            .chain(self.iterations.values())
            .min_by(|a, b| {
                a.avg_energy
                    .partial_cmp(&b.avg_energy)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Writes the full store to `path` as the run's final report.
    pub fn export_report(&self, path: &Path) -> Result<()> {
        self.save_to_file(path)?;
        tracing::info!(path = %path.display(), records = self.iterations.len(), "report written");
        Ok(())
    }
}
