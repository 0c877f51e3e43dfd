use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod workflows;

fn main() -> Result<ExitCode> {
    let cli = crate::workflows::Cli::parse();
    release_builder::logging::init_logging(cli.verbose);
    crate::workflows::run(cli)
}
