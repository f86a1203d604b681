//! Comparative feedback across measured variants.

use anyhow::Result;
use jouletune_artifacts::RunPaths;
use jouletune_suite::IterationRecord;
use std::fs;
use std::path::PathBuf;

use crate::backend::{ChatMessage, GenerationBackend};

const EVALUATE_SYSTEM: &str = "You are an expert on software energy \
efficiency. Compare the measured program variants and advise on the next \
optimization step.";

/// Turns measured records into advice for the next generator prompt.
pub struct Evaluator {
    backend: Box<dyn GenerationBackend>,
    feedback_path: PathBuf,
    prompt_log: PathBuf,
}

impl Evaluator {
    pub fn new(backend: Box<dyn GenerationBackend>, paths: &RunPaths) -> Self {
        Self {
            backend,
            feedback_path: paths.feedback_path(),
            prompt_log: paths.evaluator_prompt_path(),
        }
    }

    /// Compares baseline, best-so-far and newest records, persists the
    /// model's advice and returns it.
    pub fn evaluate(
        &self,
        baseline: &IterationRecord,
        best: &IterationRecord,
        current: &IterationRecord,
    ) -> Result<String> {
        let prompt = build_prompt(baseline, best, current);
        if let Some(parent) = self.prompt_log.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.prompt_log, &prompt)?;

        let messages = [ChatMessage::system(EVALUATE_SYSTEM), ChatMessage::user(prompt)];
        let feedback = self.backend.generate(&messages, None)?;

        if let Some(parent) = self.feedback_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.feedback_path, &feedback)?;
        tracing::debug!(bytes = feedback.len(), "evaluator feedback persisted");
        Ok(feedback)
    }
}

fn build_prompt(
    baseline: &IterationRecord,
    best: &IterationRecord,
    current: &IterationRecord,
) -> String {
    format!(
        "Three measured variants of the same C++ program are shown below, \
         with mean energy in joules and mean runtime in seconds.\n\n\
         ## Unoptimized program ({:.3} J, {:.3} s)\n```cpp\n{}\n```\n\n\
         ## Lowest-energy variant so far ({:.3} J, {:.3} s)\n```cpp\n{}\n```\n\n\
         ## Newest variant ({:.3} J, {:.3} s)\n```cpp\n{}\n```\n\n\
         Explain which differences between the variants drive the energy \
         numbers, then give short, concrete suggestions for the next \
         optimization of the newest variant.",
        baseline.avg_energy,
        baseline.avg_runtime,
        baseline.source_code,
        best.avg_energy,
        best.avg_runtime,
        best.source_code,
        current.avg_energy,
        current.avg_runtime,
        current.source_code,
    )
}
