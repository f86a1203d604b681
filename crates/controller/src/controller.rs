//! The optimization control loop.

use anyhow::Result;
use jouletune_artifacts::{ArtifactStore, RunPaths};
use jouletune_energy::Measure;
use jouletune_llm::{Evaluator, GeneratedCandidate, Generator};
use jouletune_regression::{RegressionOutcome, Validate};
use jouletune_suite::{BenchmarkId, IterationRecord, RecordStore};
use std::fs;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::summary::{RunOutcome, RunSummary};

/// Drives generate, validate, measure, evaluate rounds until the target
/// number of successes or a stopping condition is reached.
///
/// The validator and sampler sit behind traits so the loop logic can be
/// exercised without a compiler or a measurement harness.
pub struct Controller<V: Validate, M: Measure> {
    id: BenchmarkId,
    config: RunConfig,
    paths: RunPaths,
    artifacts: ArtifactStore,
    generator: Generator,
    evaluator: Evaluator,
    validator: V,
    sampler: M,
    store: RecordStore,
}

impl<V: Validate, M: Measure> Controller<V, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: BenchmarkId,
        config: RunConfig,
        paths: RunPaths,
        artifacts: ArtifactStore,
        generator: Generator,
        evaluator: Evaluator,
        validator: V,
        sampler: M,
    ) -> Self {
        Self {
            id,
            config,
            paths,
            artifacts,
            generator,
            evaluator,
            validator,
            sampler,
            store: RecordStore::new(),
        }
    }

    /// Records collected so far, the baseline included once measured.
    pub fn records(&self) -> &RecordStore {
        &self.store
    }

    /// Executes one full optimization run.
    ///
    /// Infrastructure failures (harness errors, unreadable files, a model
    /// service that stays down) surface as `Err`. Everything the loop knows
    /// how to absorb ends up as counters in the returned summary.
    pub fn run(&mut self) -> Result<RunSummary> {
        let summary = RunSummary::new(self.id.to_string());

        info!(benchmark = %self.id, "verifying unoptimized program");
        if self.validator.verify_baseline()?.is_fatal() {
            return self.abort_broken_baseline(summary, 0);
        }
        // A candidate left behind by an earlier run must not seed round 0.
        self.artifacts.discard_candidate()?;
        self.artifacts.stage_checkpoint()?;
        self.sampler
            .measure_baseline(&mut self.store, self.artifacts.original_path())?;

        self.optimize_loop(summary)
    }

    fn optimize_loop(&mut self, mut summary: RunSummary) -> Result<RunSummary> {
        let mut consecutive_compile_errors: u32 = 0;
        let mut fall_back_next = false;
        let mut last_compile_error: Option<u64> = None;
        let mut iteration: u64 = 0;

        while summary.successes < self.config.target_successes {
            if iteration >= self.config.max_iterations {
                warn!(
                    iterations = iteration,
                    successes = summary.successes,
                    "iteration cap reached"
                );
                summary.outcome = RunOutcome::IterationCapReached;
                break;
            }

            let candidate = self.next_candidate(iteration, &mut fall_back_next, &mut summary)?;
            let Some(candidate) = candidate else {
                // An empty generation is handled like a compile failure,
                // except there is nothing to persist or repair.
                consecutive_compile_errors += 1;
                summary.total_compile_errors += 1;
                last_compile_error = Some(iteration);
                if consecutive_compile_errors >= self.config.max_consecutive_compile_errors {
                    warn!(iteration, "compile error streak, next round regenerates from checkpoint");
                    fall_back_next = true;
                    consecutive_compile_errors = 0;
                }
                iteration += 1;
                continue;
            };

            self.artifacts.write_candidate(&candidate.code)?;
            if !candidate.selected_strategy.is_empty() {
                debug!(iteration, strategy = %candidate.selected_strategy, "strategy selected");
            }

            let outcome = self.validator.validate()?;
            info!(iteration, outcome = %outcome, "candidate checked");

            match outcome {
                RegressionOutcome::OriginalCompileFailure => {
                    return self.abort_broken_baseline(summary, iteration + 1);
                }
                RegressionOutcome::OptimizedCompileFailure => {
                    consecutive_compile_errors += 1;
                    summary.total_compile_errors += 1;
                    last_compile_error = Some(iteration);
                    if consecutive_compile_errors >= self.config.max_consecutive_compile_errors {
                        warn!(
                            iteration,
                            streak = consecutive_compile_errors,
                            "compile error streak, next round regenerates from checkpoint"
                        );
                        fall_back_next = true;
                        consecutive_compile_errors = 0;
                    } else {
                        self.attempt_repair(iteration, &candidate)?;
                    }
                }
                RegressionOutcome::OutputMismatch => {
                    warn!(iteration, "output diverged, next round regenerates from checkpoint");
                    fall_back_next = true;
                }
                RegressionOutcome::Success => {
                    let record = self.sampler.measure(
                        &mut self.store,
                        summary.successes,
                        self.artifacts.candidate_path(),
                    )?;
                    self.refresh_feedback(iteration, &record);
                    self.artifacts.promote_checkpoint()?;
                    summary.successes += 1;
                    if iteration > 0 && last_compile_error == Some(iteration - 1) {
                        summary.compile_errors_fixed += 1;
                    }
                    consecutive_compile_errors = 0;
                    info!(
                        iteration,
                        successes = summary.successes,
                        avg_energy = record.avg_energy,
                        avg_runtime = record.avg_runtime,
                        "optimization round succeeded"
                    );
                }
            }
            iteration += 1;
        }

        summary.iterations = iteration;
        self.store.export_report(&self.paths.report_path())?;
        info!(
            benchmark = %self.id,
            outcome = %summary.outcome,
            iterations = summary.iterations,
            successes = summary.successes,
            compile_errors = summary.total_compile_errors,
            compile_errors_fixed = summary.compile_errors_fixed,
            fallbacks = summary.fallbacks,
            "run finished"
        );
        Ok(summary)
    }

    /// Picks the source for this round and asks the generator for a new
    /// candidate, resolving a pending checkpoint fallback first.
    fn next_candidate(
        &self,
        iteration: u64,
        fall_back_next: &mut bool,
        summary: &mut RunSummary,
    ) -> Result<Option<GeneratedCandidate>> {
        let source = if *fall_back_next {
            *fall_back_next = false;
            summary.fallbacks += 1;
            info!(iteration, "regenerating from the last good checkpoint");
            self.artifacts.read_checkpoint()?
        } else if self.artifacts.has_candidate() {
            self.artifacts.read_candidate()?
        } else {
            self.artifacts.read_original()?
        };
        info!(iteration, "requesting optimized candidate");
        self.generator.optimize(&source, self.read_feedback().as_deref())
    }

    /// One in-place repair between iterations. The repaired code is not
    /// re-checked here, the next round validates whatever it produced.
    fn attempt_repair(&self, iteration: u64, candidate: &GeneratedCandidate) -> Result<()> {
        let diagnostics =
            fs::read_to_string(self.paths.validator_log_path()).unwrap_or_default();
        info!(iteration, "asking for a compile fix");
        match self.generator.repair(&candidate.code, &diagnostics)? {
            Some(repaired) => self.artifacts.write_candidate(&repaired.code)?,
            None => warn!(iteration, "repair produced no code, keeping the broken candidate"),
        }
        Ok(())
    }

    /// Refreshes evaluator feedback after a measured success. A flaky
    /// evaluator never sinks the round, the success already stands.
    fn refresh_feedback(&self, iteration: u64, current: &IterationRecord) {
        let Some(baseline) = self.store.baseline() else {
            warn!(iteration, "baseline record missing, skipping evaluation");
            return;
        };
        let best = self.store.best().unwrap_or(current);
        match self.evaluator.evaluate(baseline, best, current) {
            Ok(_) => debug!(iteration, "evaluator feedback refreshed"),
            Err(e) => warn!(iteration, error = %e, "evaluator failed, keeping previous feedback"),
        }
    }

    fn read_feedback(&self) -> Option<String> {
        match fs::read_to_string(self.paths.feedback_path()) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    fn abort_broken_baseline(
        &self,
        mut summary: RunSummary,
        iterations: u64,
    ) -> Result<RunSummary> {
        error!(benchmark = %self.id, "unoptimized program does not compile, aborting run");
        summary.outcome = RunOutcome::BaselineBroken;
        summary.iterations = iterations;
        if self.config.report_on_fatal {
            self.store.export_report(&self.paths.report_path())?;
        }
        Ok(summary)
    }
}
