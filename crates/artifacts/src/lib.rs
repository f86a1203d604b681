//! On-disk layout and source artifact lifecycle for a jouletune run.
//!
//! A run is rooted at a single directory: benchmark sources live under
//! `benchmarks/`, generated candidates and checkpoints under `out/`, and
//! prompts, feedback, diagnostics and measurements under `logs/`.

pub mod layout;
pub mod store;

pub use layout::RunPaths;
pub use store::ArtifactStore;
