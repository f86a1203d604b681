//! Source artifact lifecycle: original, candidate, checkpoint.

use anyhow::{anyhow, Result};
use jouletune_suite::BenchmarkId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::layout::RunPaths;

/// Reads and writes the three source files a run revolves around.
///
/// The original is never modified. The candidate is overwritten by every
/// generation. The checkpoint starts as a copy of the original and is
/// replaced by each candidate that survives regression checks, so it always
/// holds the last variant known to compile and produce correct output.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    original: PathBuf,
    candidate: PathBuf,
    checkpoint: PathBuf,
    bin_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(paths: &RunPaths, id: &BenchmarkId) -> Self {
        let out_dir = paths.out_dir(id.name());
        Self {
            original: paths.benchmark_dir(id.name()).join(id.file_name()),
            candidate: out_dir.join(id.candidate_file_name()),
            checkpoint: out_dir.join(id.checkpoint_file_name()),
            bin_dir: paths.bin_dir(id.name()),
        }
    }

    pub fn original_path(&self) -> &Path {
        &self.original
    }

    pub fn candidate_path(&self) -> &Path {
        &self.candidate
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint
    }

    /// Where compiled regression binaries go.
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn original_bin(&self) -> PathBuf {
        self.bin_dir.join("original")
    }

    pub fn candidate_bin(&self) -> PathBuf {
        self.bin_dir.join("candidate")
    }

    pub fn read_original(&self) -> Result<String> {
        fs::read_to_string(&self.original)
            .map_err(|e| anyhow!("cannot read benchmark source {}: {}", self.original.display(), e))
    }

    pub fn read_candidate(&self) -> Result<String> {
        fs::read_to_string(&self.candidate)
            .map_err(|e| anyhow!("cannot read candidate {}: {}", self.candidate.display(), e))
    }

    pub fn read_checkpoint(&self) -> Result<String> {
        fs::read_to_string(&self.checkpoint)
            .map_err(|e| anyhow!("cannot read checkpoint {}: {}", self.checkpoint.display(), e))
    }

    pub fn has_candidate(&self) -> bool {
        self.candidate.exists()
    }

    /// Overwrites the candidate with freshly generated source.
    pub fn write_candidate(&self, code: &str) -> Result<()> {
        if let Some(parent) = self.candidate.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.candidate, code)?;
        Ok(())
    }

    /// Removes any candidate left behind by an earlier run in the same
    /// root, so the first generation always starts from the original.
    pub fn discard_candidate(&self) -> Result<()> {
        match fs::remove_file(&self.candidate) {
            Ok(()) => {
                tracing::debug!(path = %self.candidate.display(), "stale candidate discarded");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!(
                "cannot discard stale candidate {}: {}",
                self.candidate.display(),
                e
            )),
        }
    }

    /// Seeds the checkpoint with a copy of the original source.
    pub fn stage_checkpoint(&self) -> Result<()> {
        if let Some(parent) = self.checkpoint.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&self.original, &self.checkpoint).map_err(|e| {
            anyhow!(
                "cannot stage checkpoint from {}: {}",
                self.original.display(),
                e
            )
        })?;
        tracing::debug!(path = %self.checkpoint.display(), "checkpoint staged from original");
        Ok(())
    }

    /// Promotes the current candidate to the checkpoint.
    pub fn promote_checkpoint(&self) -> Result<()> {
        fs::copy(&self.candidate, &self.checkpoint).map_err(|e| {
            anyhow!(
                "cannot promote candidate {} to checkpoint: {}",
                self.candidate.display(),
                e
            )
        })?;
        tracing::debug!(path = %self.checkpoint.display(), "checkpoint updated");
        Ok(())
    }
}
