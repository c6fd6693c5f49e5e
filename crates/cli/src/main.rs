//! Command-line entry point for gramforge.

use anyhow::Result;
use clap::Parser;
use gramforge_search::cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
