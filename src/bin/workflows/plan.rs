use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;

use release_builder::build::CrossCompileParameters;
use release_builder::config::ReleaseConfig;
use release_builder::preflight::{probe_tools, required_tools};
use release_builder::process::SystemRunner;
use release_builder::{capability_of, describe_host, select_targets, PlatformIdentifier};

pub(crate) fn run(platforms: &[String], config: Option<&Path>) -> Result<ExitCode> {
    let requested = PlatformIdentifier::parse_all(platforms)?;
    let host = describe_host();
    let targets = select_targets(&requested, host);

    println!("host: {host}");
    let mut strategies = Vec::with_capacity(targets.len());
    for target in &targets {
        let strategy = capability_of(*target, host);
        strategies.push(strategy);
        match CrossCompileParameters::derive(*target, host) {
            Some(cross) => println!(
                "  {:<12} {strategy} (cross {} -> {})",
                target.tag(),
                cross.host_triplet, cross.target_triplet
            ),
            None => println!("  {:<12} {strategy}", target.tag()),
        }
    }

    let work_dir = std::env::current_dir()?;
    match ReleaseConfig::load(config, &work_dir) {
        Ok(config) => {
            println!("tools:");
            for tool in probe_tools(&SystemRunner, &required_tools(&config, &strategies, true)) {
                match &tool.found {
                    Some(path) => println!("  {:<12} {} ({})", tool.tool, path.display(), tool.purpose),
                    None => println!("  {:<12} MISSING ({})", tool.tool, tool.purpose),
                }
            }
        }
        Err(e) => println!("tools: not checked ({e:#})"),
    }

    Ok(ExitCode::SUCCESS)
}
