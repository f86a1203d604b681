//! Model-backed code generation and evaluation.
//!
//! The generator asks a chat model for optimized program variants and for
//! compile fixes, the evaluator asks it to compare measured variants and
//! produce feedback for the next round. Both sit on top of a backend seam
//! with OpenAI-compatible and Ollama implementations.

pub mod backend;
pub mod evaluator;
pub mod generator;
pub mod prompts;

pub use backend::{backend_for, ChatMessage, GenerationBackend, OllamaBackend, OpenAiBackend, ResponseFormat};
pub use evaluator::Evaluator;
pub use generator::{strip_code_fences, GeneratedCandidate, Generator, Strategy};
