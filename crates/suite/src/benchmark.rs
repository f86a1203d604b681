//! Benchmark program registry and identifiers.
//!
//! Programs follow the benchmarks-game naming convention `<name>.<tag>.c++`.
//! Only registered programs are accepted; each registry entry carries the
//! compile and run metadata its regression checks need.

use anyhow::{bail, Result};
use std::fmt;

/// Compile/run metadata for one registered benchmark program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchmarkSpec {
    pub name: &'static str,
    pub tag: &'static str,
    /// Arguments passed to both binaries during regression runs.
    pub run_args: &'static [&'static str],
    /// Extra flags appended after the toolchain's base flags.
    pub extra_flags: &'static [&'static str],
    /// Whether the program reads its workload from `input.txt` on stdin.
    pub reads_stdin: bool,
}

impl BenchmarkSpec {
    /// Full source file name for this registry entry.
    pub fn file_name(&self) -> String {
        format!("{}.{}.c++", self.name, self.tag)
    }
}

/// Every program jouletune knows how to build, run and measure.
pub const REGISTRY: &[BenchmarkSpec] = &[
    BenchmarkSpec {
        name: "binarytrees",
        tag: "gpp-9",
        run_args: &["14"],
        extra_flags: &["-lpthread"],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "chameneosredux",
        tag: "gpp-5",
        run_args: &["60000"],
        extra_flags: &["-lpthread"],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "fannkuchredux",
        tag: "gpp-5",
        run_args: &["10"],
        extra_flags: &[],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "fasta",
        tag: "gpp-5",
        run_args: &["1000000"],
        extra_flags: &[],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "knucleotide",
        tag: "gpp-3",
        run_args: &[],
        extra_flags: &["-lpthread"],
        reads_stdin: true,
    },
    BenchmarkSpec {
        name: "mandelbrot",
        tag: "gpp-6",
        run_args: &["1000"],
        extra_flags: &["-fopenmp"],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "nbody",
        tag: "gpp-8",
        run_args: &["1000000"],
        extra_flags: &[],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "pidigits",
        tag: "gpp-4",
        run_args: &["2000"],
        extra_flags: &["-lgmp", "-lgmpxx"],
        reads_stdin: false,
    },
    BenchmarkSpec {
        name: "regexredux",
        tag: "gpp-3",
        run_args: &[],
        extra_flags: &["-lboost_regex"],
        reads_stdin: true,
    },
    BenchmarkSpec {
        name: "revcomp",
        tag: "gpp-4",
        run_args: &[],
        extra_flags: &[],
        reads_stdin: true,
    },
    BenchmarkSpec {
        name: "spectralnorm",
        tag: "gpp-6",
        run_args: &["1000"],
        extra_flags: &["-fopenmp"],
        reads_stdin: false,
    },
];

/// Validated benchmark identifier of the form `<name>.<tag>.c++`.
///
/// Parsing rejects anything not in [`REGISTRY`], so holding a `BenchmarkId`
/// guarantees the program's metadata is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchmarkId {
    spec: &'static BenchmarkSpec,
}

impl BenchmarkId {
    /// Parses `<name>.<tag>.c++` and checks it against the registry.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 || parts[2] != "c++" {
            bail!(
                "malformed benchmark id '{}', expected <name>.<tag>.c++ (e.g. {})",
                raw,
                REGISTRY[0].file_name()
            );
        }
        let (name, tag) = (parts[0], parts[1]);
        match REGISTRY.iter().find(|s| s.name == name && s.tag == tag) {
            Some(spec) => Ok(Self { spec }),
            None => bail!(
                "unknown benchmark '{}', valid benchmarks are: {}",
                raw,
                valid_ids().join(", ")
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn tag(&self) -> &'static str {
        self.spec.tag
    }

    /// Source language of every registered program.
    pub fn language(&self) -> &'static str {
        "c++"
    }

    /// Registry metadata for this benchmark.
    pub fn spec(&self) -> &'static BenchmarkSpec {
        self.spec
    }

    /// File name of the unoptimized source, e.g. `nbody.gpp-8.c++`.
    pub fn file_name(&self) -> String {
        self.spec.file_name()
    }

    /// File name the current candidate is written under.
    pub fn candidate_file_name(&self) -> String {
        format!("optimized_{}", self.file_name())
    }

    /// File name of the last-known-good checkpoint copy.
    pub fn checkpoint_file_name(&self) -> String {
        format!("{}.compiled.{}.c++", self.spec.name, self.spec.tag)
    }
}

impl fmt::Display for BenchmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.c++", self.spec.name, self.spec.tag)
    }
}

/// All accepted benchmark identifiers, for error messages and help text.
pub fn valid_ids() -> Vec<String> {
    REGISTRY.iter().map(|s| s.file_name()).collect()
}
