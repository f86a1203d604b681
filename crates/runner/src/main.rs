//! The `jouletune` executable.

use anyhow::Result;
use clap::Parser;
use jouletune_controller::cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
