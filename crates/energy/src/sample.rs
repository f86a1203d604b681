//! Sample-log grammar and aggregation.
//!
//! Each harness repetition appends one line of the form
//! `<name>;<energy>[,<energy>...];<runtime>`. Energy fields are joules per
//! measured domain (package first, then DRAM where available), runtime is
//! seconds. Blank energy fields appear when a domain is unsupported and are
//! dropped before numeric parsing.

use anyhow::{bail, Result};

/// One parsed harness repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySample {
    pub name: String,
    /// Energy readings in joules, blanks already removed.
    pub energy: Vec<f64>,
    /// Wall-clock runtime in seconds.
    pub runtime: f64,
}

impl EnergySample {
    /// RAPL counters wrap around occasionally and the harness reports the
    /// affected repetition with a negative reading. A sample is kept only
    /// if its first two present energy fields are non-negative.
    pub fn is_valid(&self) -> bool {
        let first = match self.energy.first() {
            Some(v) => *v >= 0.0,
            None => false,
        };
        let second = self.energy.get(1).map_or(true, |v| *v >= 0.0);
        first && second
    }
}

/// Aggregated view over the valid samples of one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Mean of the first (package) energy field, rounded to 3 decimals.
    pub avg_energy: f64,
    /// Mean runtime, rounded to 3 decimals.
    pub avg_runtime: f64,
    pub retained: usize,
    pub discarded: usize,
}

/// Parses a single sample line.
pub fn parse_line(line: &str) -> Result<EnergySample> {
    let parts: Vec<&str> = line.split(';').collect();
    if parts.len() != 3 {
        bail!("expected 3 ';'-separated fields, got {}", parts.len());
    }
    let name = parts[0].trim();
    if name.is_empty() {
        bail!("missing sample name");
    }
    let energy = parts[1]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| anyhow::anyhow!("bad energy field '{}'", s))
        })
        .collect::<Result<Vec<f64>>>()?;
    if energy.is_empty() {
        bail!("no energy fields");
    }
    let runtime = parts[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| anyhow::anyhow!("bad runtime field '{}'", parts[2].trim()))?;
    Ok(EnergySample {
        name: name.to_string(),
        energy,
        runtime,
    })
}

/// Parses all well-formed lines of a sample log fragment.
///
/// Malformed lines are logged and skipped so a partially written trailing
/// line cannot sink a whole measurement.
pub fn parse_samples(text: &str) -> Vec<EnergySample> {
    let mut samples = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(sample) => samples.push(sample),
            Err(e) => tracing::warn!(line, error = %e, "skipping malformed sample line"),
        }
    }
    samples
}

/// Filters invalid samples and averages the rest.
///
/// Returns `None` when no valid sample remains, which callers treat as a
/// failed measurement.
pub fn aggregate(samples: &[EnergySample]) -> Option<Aggregate> {
    let valid: Vec<&EnergySample> = samples.iter().filter(|s| s.is_valid()).collect();
    if valid.is_empty() {
        return None;
    }
    let n = valid.len() as f64;
    let energy_sum: f64 = valid.iter().map(|s| s.energy[0]).sum();
    let runtime_sum: f64 = valid.iter().map(|s| s.runtime).sum();
    Some(Aggregate {
        avg_energy: round3(energy_sum / n),
        avg_runtime: round3(runtime_sum / n),
        retained: valid.len(),
        discarded: samples.len() - valid.len(),
    })
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
