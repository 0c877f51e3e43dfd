use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "release-builder")]
#[command(about = "Build, package and publish an extension binary for every supported platform")]
pub struct Cli {
    /// Debug logging for this crate (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Build the requested platforms, package them and publish.
    ///
    /// With no platforms, builds everything this host can reach by default:
    /// all four on macos, both linux architectures elsewhere.
    Build(BuildArgs),

    /// Show the targets and strategies a build would use, without building.
    Plan {
        /// Platform tags, e.g. linux_arm64 osx_amd64.
        platforms: Vec<String>,

        /// Configuration file (default: ./release-builder.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the detected host platform.
    Host,

    /// List every platform tag and how this host would build it.
    Platforms,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Platform tags, e.g. linux_arm64 osx_amd64.
    pub platforms: Vec<String>,

    /// Version tag naming the output directory, e.g. v0.1.2.
    #[arg(long, value_name = "VERSION")]
    pub tag: String,

    /// Build and package but do not publish.
    #[arg(long)]
    pub no_upload: bool,

    /// Configuration file (default: ./release-builder.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the output root from the configuration (relative to the
    /// working directory).
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<String>,

    /// Override the publish destination from the configuration.
    #[arg(long, value_name = "DEST")]
    pub destination: Option<String>,

    /// Parallelism hint for each build.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Stream build output to the terminal instead of capturing it.
    #[arg(long)]
    pub stream: bool,
}
