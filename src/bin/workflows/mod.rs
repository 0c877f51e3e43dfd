mod build;
mod cli;
mod info;
mod plan;

pub(crate) use cli::{BuildArgs, Cli, Cmd};

use anyhow::Result;
use std::process::ExitCode;

pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    match cli.cmd {
        Cmd::Build(args) => build::run(args),
        Cmd::Plan { platforms, config } => plan::run(&platforms, config.as_deref()),
        Cmd::Host => info::print_host(),
        Cmd::Platforms => info::print_platforms(),
    }
}
