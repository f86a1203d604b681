//! End-to-end tests of the optimization loop with scripted components.
//!
//! The generator and evaluator run against a canned chat backend, the
//! validator replays a fixed outcome sequence and the sampler hands out
//! descending energies, so every loop transition is observable without a
//! compiler, a harness or a model service.

use anyhow::{anyhow, Result};
use jouletune_artifacts::{ArtifactStore, RunPaths};
use jouletune_controller::{Controller, RunConfig, RunOutcome};
use jouletune_energy::Measure;
use jouletune_llm::{
    ChatMessage, Evaluator, GenerationBackend, Generator, ResponseFormat,
};
use jouletune_regression::{RegressionOutcome, Validate};
use jouletune_suite::{BenchmarkId, IterationRecord, RecordStore};
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedBackend {
    fn boxed(replies: Vec<String>) -> Box<Self> {
        Box::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        _messages: &[ChatMessage],
        _format: Option<&ResponseFormat>,
    ) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("generation script exhausted"))
    }
}

struct ScriptedValidator {
    baseline: RegressionOutcome,
    outcomes: VecDeque<RegressionOutcome>,
}

impl Validate for ScriptedValidator {
    fn verify_baseline(&mut self) -> Result<RegressionOutcome> {
        Ok(self.baseline)
    }

    fn validate(&mut self) -> Result<RegressionOutcome> {
        self.outcomes
            .pop_front()
            .ok_or_else(|| anyhow!("validation script exhausted"))
    }
}

struct ScriptedSampler {
    energies: VecDeque<f64>,
}

impl Measure for ScriptedSampler {
    fn measure_baseline(
        &mut self,
        store: &mut RecordStore,
        source: &Path,
    ) -> Result<IterationRecord> {
        let record = IterationRecord {
            source_code: fs::read_to_string(source)?,
            avg_energy: 100.0,
            avg_runtime: 10.0,
        };
        store.set_baseline(record.clone());
        Ok(record)
    }

    fn measure(
        &mut self,
        store: &mut RecordStore,
        iteration: u32,
        source: &Path,
    ) -> Result<IterationRecord> {
        let energy = self
            .energies
            .pop_front()
            .ok_or_else(|| anyhow!("measurement script exhausted"))?;
        let record = IterationRecord {
            source_code: fs::read_to_string(source)?,
            avg_energy: energy,
            avg_runtime: energy / 10.0,
        };
        store.insert(iteration, record.clone())?;
        Ok(record)
    }
}

/// Reply the generator parses as structured reasoning carrying `code`.
fn code_reply(code: &str) -> String {
    json!({
        "analysis": "analysis",
        "strategies": [{ "pros": "p", "cons": "c" }],
        "selected_strategy": "strategy",
        "final_code": code
    })
    .to_string()
}

fn empty_reply() -> String {
    code_reply("")
}

struct Harness {
    _dir: tempfile::TempDir,
    paths: RunPaths,
    id: BenchmarkId,
    artifacts: ArtifactStore,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path());
    let id = BenchmarkId::parse("nbody.gpp-8.c++").unwrap();
    let artifacts = ArtifactStore::new(&paths, &id);
    fs::create_dir_all(paths.benchmark_dir(id.name())).unwrap();
    fs::write(artifacts.original_path(), "// original\n").unwrap();
    Harness {
        _dir: dir,
        paths,
        id,
        artifacts,
    }
}

#[allow(clippy::too_many_arguments)]
fn controller(
    h: &Harness,
    config: RunConfig,
    generator_replies: Vec<String>,
    evaluator_replies: Vec<String>,
    baseline: RegressionOutcome,
    outcomes: Vec<RegressionOutcome>,
    energies: Vec<f64>,
) -> Controller<ScriptedValidator, ScriptedSampler> {
    Controller::new(
        h.id,
        config,
        h.paths.clone(),
        h.artifacts.clone(),
        Generator::new(ScriptedBackend::boxed(generator_replies), &h.paths),
        Evaluator::new(ScriptedBackend::boxed(evaluator_replies), &h.paths),
        ScriptedValidator {
            baseline,
            outcomes: outcomes.into(),
        },
        ScriptedSampler {
            energies: energies.into(),
        },
    )
}

#[test]
fn test_mixed_run_reaches_target_successes() {
    let h = harness();
    let config = RunConfig {
        target_successes: 2,
        max_iterations: 10,
        ..RunConfig::default()
    };
    // Iteration 0 succeeds, 1 fails to compile and is repaired, 2 diverges,
    // 3 regenerates from the checkpoint and succeeds.
    let mut c = controller(
        &h,
        config,
        vec![
            code_reply("v1"),
            code_reply("v2"),
            code_reply("v2-repaired"),
            code_reply("v3"),
            code_reply("v4"),
        ],
        vec!["feedback-1".to_string(), "feedback-2".to_string()],
        RegressionOutcome::Success,
        vec![
            RegressionOutcome::Success,
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::OutputMismatch,
            RegressionOutcome::Success,
        ],
        vec![90.0, 80.0],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.total_compile_errors, 1);
    assert_eq!(summary.compile_errors_fixed, 0);
    assert_eq!(summary.fallbacks, 1);

    // Records are gap free and keep the baseline apart.
    let records = c.records();
    assert_eq!(records.baseline().unwrap().avg_energy, 100.0);
    assert_eq!(records.iteration(0).unwrap().avg_energy, 90.0);
    assert_eq!(records.iteration(1).unwrap().avg_energy, 80.0);
    assert_eq!(records.len(), 2);
    assert_eq!(records.best().unwrap().avg_energy, 80.0);

    // The checkpoint holds the last surviving candidate.
    assert_eq!(h.artifacts.read_checkpoint().unwrap(), "v4");
    assert_eq!(h.artifacts.read_candidate().unwrap(), "v4");

    // Epilogue artifacts.
    assert!(h.paths.report_path().exists());
    assert_eq!(
        fs::read_to_string(h.paths.feedback_path()).unwrap(),
        "feedback-2"
    );
}

#[test]
fn test_broken_baseline_aborts_before_any_generation() {
    let h = harness();
    let mut c = controller(
        &h,
        RunConfig::default(),
        vec![],
        vec![],
        RegressionOutcome::OriginalCompileFailure,
        vec![],
        vec![],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::BaselineBroken);
    assert_eq!(summary.iterations, 0);
    assert_eq!(summary.successes, 0);
    // No checkpoint staged, no report by default.
    assert!(!h.artifacts.checkpoint_path().exists());
    assert!(!h.paths.report_path().exists());
}

#[test]
fn test_report_on_fatal_writes_report() {
    let h = harness();
    let config = RunConfig {
        report_on_fatal: true,
        ..RunConfig::default()
    };
    let mut c = controller(
        &h,
        config,
        vec![],
        vec![],
        RegressionOutcome::OriginalCompileFailure,
        vec![],
        vec![],
    );

    let summary = c.run().unwrap();
    assert_eq!(summary.outcome, RunOutcome::BaselineBroken);
    let report = fs::read_to_string(h.paths.report_path()).unwrap();
    assert!(report.contains("baseline"));
}

#[test]
fn test_original_breaking_mid_run_aborts() {
    let h = harness();
    let config = RunConfig {
        target_successes: 5,
        max_iterations: 10,
        ..RunConfig::default()
    };
    let mut c = controller(
        &h,
        config,
        vec![code_reply("v1"), code_reply("v2")],
        vec!["feedback-1".to_string()],
        RegressionOutcome::Success,
        vec![
            RegressionOutcome::Success,
            RegressionOutcome::OriginalCompileFailure,
        ],
        vec![90.0],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::BaselineBroken);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.successes, 1);
}

#[test]
fn test_compile_error_streak_falls_back_to_checkpoint() {
    let h = harness();
    let config = RunConfig {
        target_successes: 1,
        max_iterations: 10,
        ..RunConfig::default()
    };
    // Three straight compile failures: the first two get a repair attempt,
    // the third trips the fallback instead. Iteration 3 then regenerates
    // from the checkpoint and succeeds.
    let mut c = controller(
        &h,
        config,
        vec![
            code_reply("v1"),
            code_reply("v1-repaired"),
            code_reply("v2"),
            code_reply("v2-repaired"),
            code_reply("v3"),
            code_reply("v4"),
        ],
        vec!["feedback-1".to_string()],
        RegressionOutcome::Success,
        vec![
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::Success,
        ],
        vec![85.0],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.total_compile_errors, 3);
    assert_eq!(summary.fallbacks, 1);
    // The success directly followed a compile failure iteration.
    assert_eq!(summary.compile_errors_fixed, 1);
    // No repair was requested after the third failure, so the fallback
    // round consumed the next optimize reply.
    assert_eq!(h.artifacts.read_checkpoint().unwrap(), "v4");
}

#[test]
fn test_streak_restarts_after_fallback() {
    let h = harness();
    let config = RunConfig {
        target_successes: 2,
        max_iterations: 20,
        ..RunConfig::default()
    };
    // After the fallback and a success, a single further compile failure
    // must start a fresh streak of one and get a repair, not trip a second
    // fallback.
    let mut c = controller(
        &h,
        config,
        vec![
            code_reply("v1"),
            code_reply("v1-repaired"),
            code_reply("v2"),
            code_reply("v2-repaired"),
            code_reply("v3"),
            code_reply("v4"),
            code_reply("v5"),
            code_reply("v5-repaired"),
            code_reply("v6"),
        ],
        vec!["feedback-1".to_string(), "feedback-2".to_string()],
        RegressionOutcome::Success,
        vec![
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::Success,
            RegressionOutcome::OptimizedCompileFailure,
            RegressionOutcome::Success,
        ],
        vec![85.0, 80.0],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.iterations, 6);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.total_compile_errors, 4);
    assert_eq!(summary.fallbacks, 1);
    assert_eq!(summary.compile_errors_fixed, 2);
}

#[test]
fn test_empty_generation_counts_toward_streak() {
    let h = harness();
    let config = RunConfig {
        target_successes: 1,
        max_iterations: 10,
        ..RunConfig::default()
    };
    // Three empty generations trip the fallback without ever touching the
    // validator; the fourth round produces real code and succeeds.
    let mut c = controller(
        &h,
        config,
        vec![empty_reply(), empty_reply(), empty_reply(), code_reply("v1")],
        vec!["feedback-1".to_string()],
        RegressionOutcome::Success,
        vec![RegressionOutcome::Success],
        vec![70.0],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.total_compile_errors, 3);
    assert_eq!(summary.fallbacks, 1);
    // Empty generations are never persisted.
    assert_eq!(h.artifacts.read_candidate().unwrap(), "v1");
}

#[test]
fn test_iteration_cap_stops_run() {
    let h = harness();
    let config = RunConfig {
        target_successes: 5,
        max_iterations: 2,
        ..RunConfig::default()
    };
    let mut c = controller(
        &h,
        config,
        vec![code_reply("v1"), code_reply("v2")],
        vec![],
        RegressionOutcome::Success,
        vec![
            RegressionOutcome::OutputMismatch,
            RegressionOutcome::OutputMismatch,
        ],
        vec![],
    );

    let summary = c.run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::IterationCapReached);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.successes, 0);
    assert_eq!(summary.fallbacks, 1);
    // The epilogue still writes the report on a capped run.
    assert!(h.paths.report_path().exists());
}

#[test]
fn test_leftover_candidate_does_not_seed_the_first_generation() {
    let h = harness();
    // An aborted earlier run can leave a known-bad candidate in the out
    // directory. Round 0 must still optimize the original source.
    h.artifacts.write_candidate("// stale leftover\n").unwrap();
    let config = RunConfig {
        target_successes: 1,
        max_iterations: 10,
        ..RunConfig::default()
    };
    let mut c = controller(
        &h,
        config,
        vec![code_reply("v1")],
        vec!["feedback-1".to_string()],
        RegressionOutcome::Success,
        vec![RegressionOutcome::Success],
        vec![90.0],
    );

    c.run().unwrap();

    let transcript = fs::read_to_string(h.paths.generator_prompt_path()).unwrap();
    assert!(transcript.contains("// original"));
    assert!(!transcript.contains("stale leftover"));
    assert_eq!(h.artifacts.read_candidate().unwrap(), "v1");
}

#[test]
fn test_feedback_reaches_the_next_prompt() {
    let h = harness();
    let config = RunConfig {
        target_successes: 2,
        max_iterations: 10,
        ..RunConfig::default()
    };
    let mut c = controller(
        &h,
        config,
        vec![code_reply("v1"), code_reply("v2")],
        vec!["use restrict pointers".to_string(), "done".to_string()],
        RegressionOutcome::Success,
        vec![RegressionOutcome::Success, RegressionOutcome::Success],
        vec![90.0, 85.0],
    );

    c.run().unwrap();

    // The transcript of the last optimize prompt carries the feedback left
    // behind by the first success.
    let transcript = fs::read_to_string(h.paths.generator_prompt_path()).unwrap();
    assert!(transcript.contains("use restrict pointers"));
    assert!(transcript.contains("v1"));
}
