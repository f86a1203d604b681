//! Optimization and repair prompting.

use anyhow::Result;
use jouletune_artifacts::RunPaths;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

use crate::backend::{ChatMessage, GenerationBackend, ResponseFormat};
use crate::prompts;

/// One optimization strategy the model weighed up.
#[derive(Debug, Clone, Deserialize)]
pub struct Strategy {
    #[serde(default, alias = "Pros")]
    pub pros: String,
    #[serde(default, alias = "Cons")]
    pub cons: String,
}

#[derive(Debug, Deserialize)]
struct OptimizationReasoning {
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    strategies: Vec<Strategy>,
    #[serde(default)]
    selected_strategy: String,
    #[serde(default)]
    final_code: String,
}

#[derive(Debug, Deserialize)]
struct ErrorReasoning {
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    final_code: String,
}

/// A generated program variant plus the reasoning that produced it.
///
/// The reasoning fields are empty when the model ignored the structured
/// format and the raw reply was salvaged as code.
#[derive(Debug, Clone)]
pub struct GeneratedCandidate {
    pub analysis: String,
    pub strategies: Vec<Strategy>,
    pub selected_strategy: String,
    pub code: String,
}

/// Produces optimized variants and compile fixes through a chat backend.
pub struct Generator {
    backend: Box<dyn GenerationBackend>,
    prompt_log: PathBuf,
}

impl Generator {
    pub fn new(backend: Box<dyn GenerationBackend>, paths: &RunPaths) -> Self {
        Self {
            backend,
            prompt_log: paths.generator_prompt_path(),
        }
    }

    /// Asks for an optimized variant of `source`.
    ///
    /// Evaluator feedback, when present, is appended to the prompt so the
    /// model can steer by earlier measurements. Returns `None` when the
    /// model produced no usable code.
    pub fn optimize(
        &self,
        source: &str,
        feedback: Option<&str>,
    ) -> Result<Option<GeneratedCandidate>> {
        let mut prompt = format!(
            "{}\n\n```cpp\n{}\n```\n",
            prompts::OPTIMIZE_INSTRUCTIONS,
            source
        );
        if let Some(feedback) = feedback {
            prompt.push_str(&format!("\n{}\n{}\n", prompts::FEEDBACK_PREFACE, feedback));
        }
        self.log_prompt(&prompt)?;

        let messages = [
            ChatMessage::system(prompts::OPTIMIZE_SYSTEM),
            ChatMessage::user(prompt),
        ];
        let content = self.backend.generate(&messages, Some(&optimization_format()))?;

        let candidate = match serde_json::from_str::<OptimizationReasoning>(&content) {
            Ok(reasoning) => GeneratedCandidate {
                analysis: reasoning.analysis,
                strategies: reasoning.strategies,
                selected_strategy: reasoning.selected_strategy,
                code: reasoning.final_code,
            },
            Err(e) => {
                tracing::warn!(error = %e, "reply is not reasoning JSON, salvaging it as raw code");
                raw_candidate(content)
            }
        };
        Ok(finish(candidate))
    }

    /// Asks for a compile fix of `broken` given the compiler diagnostics.
    pub fn repair(
        &self,
        broken: &str,
        diagnostics: &str,
    ) -> Result<Option<GeneratedCandidate>> {
        let prompt = prompts::repair_prompt(broken, diagnostics);
        self.log_prompt(&prompt)?;

        let messages = [
            ChatMessage::system(prompts::REPAIR_SYSTEM),
            ChatMessage::user(prompt),
        ];
        let content = self.backend.generate(&messages, Some(&error_format()))?;

        let candidate = match serde_json::from_str::<ErrorReasoning>(&content) {
            Ok(reasoning) => GeneratedCandidate {
                analysis: reasoning.analysis,
                strategies: Vec::new(),
                selected_strategy: String::new(),
                code: reasoning.final_code,
            },
            Err(e) => {
                tracing::warn!(error = %e, "reply is not reasoning JSON, salvaging it as raw code");
                raw_candidate(content)
            }
        };
        Ok(finish(candidate))
    }

    /// Keeps a transcript of the most recent prompt for debugging runs.
    fn log_prompt(&self, prompt: &str) -> Result<()> {
        if let Some(parent) = self.prompt_log.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.prompt_log, prompt)?;
        Ok(())
    }
}

/// Strips the markdown code fences models like to wrap programs in.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```cpp", "")
        .replace("```c++", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn raw_candidate(content: String) -> GeneratedCandidate {
    GeneratedCandidate {
        analysis: String::new(),
        strategies: Vec::new(),
        selected_strategy: String::new(),
        code: content,
    }
}

fn finish(mut candidate: GeneratedCandidate) -> Option<GeneratedCandidate> {
    candidate.code = strip_code_fences(&candidate.code);
    if candidate.code.is_empty() {
        tracing::warn!("model returned an empty program");
        return None;
    }
    Some(candidate)
}

fn optimization_format() -> ResponseFormat {
    ResponseFormat {
        name: "optimization_reasoning",
        schema: json!({
            "type": "object",
            "properties": {
                "analysis": { "type": "string" },
                "strategies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "pros": { "type": "string" },
                            "cons": { "type": "string" }
                        },
                        "required": ["pros", "cons"],
                        "additionalProperties": false
                    }
                },
                "selected_strategy": { "type": "string" },
                "final_code": { "type": "string" }
            },
            "required": ["analysis", "strategies", "selected_strategy", "final_code"],
            "additionalProperties": false
        }),
    }
}

fn error_format() -> ResponseFormat {
    ResponseFormat {
        name: "error_reasoning",
        schema: json!({
            "type": "object",
            "properties": {
                "analysis": { "type": "string" },
                "final_code": { "type": "string" }
            },
            "required": ["analysis", "final_code"],
            "additionalProperties": false
        }),
    }
}
