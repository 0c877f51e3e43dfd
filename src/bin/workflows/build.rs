use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::warn;

use release_builder::config::ReleaseConfig;
use release_builder::preflight::{probe_tools, required_tools};
use release_builder::process::SystemRunner;
use release_builder::publish::CommandPublisher;
use release_builder::{
    capability_of, describe_host, run_release, select_targets, PlatformIdentifier,
    ReleasePipeline, ReleaseRequest,
};

use super::BuildArgs;

pub(crate) fn run(args: BuildArgs) -> Result<ExitCode> {
    let work_dir = std::env::current_dir().context("resolving working directory")?;
    let mut config = ReleaseConfig::load(args.config.as_deref(), &work_dir)?;
    if let Some(root) = &args.output_root {
        config
            .set_output_root(root)
            .context("invalid --output-root")?;
    }
    if let Some(destination) = args.destination {
        config.publish.destination = Some(destination);
    }
    if let Some(jobs) = args.jobs {
        config.jobs = Some(jobs as usize);
    }
    config.validate()?;

    let requested = PlatformIdentifier::parse_all(args.platforms.as_slice())?;
    let upload = !args.no_upload;
    let host = describe_host();

    let strategies: Vec<_> = select_targets(&requested, host)
        .into_iter()
        .map(|target| capability_of(target, host))
        .collect();
    for tool in probe_tools(&SystemRunner, &required_tools(&config, &strategies, upload)) {
        if !tool.is_available() {
            warn!(tool = %tool.tool, purpose = tool.purpose, "tool not found on PATH");
        }
    }

    let mut ctx = config.build_context();
    ctx.interactive = args.stream;
    let publisher = CommandPublisher::new(
        &SystemRunner,
        config.publish.sync.clone(),
        config.publish.grant.clone(),
    );
    let pipeline = ReleasePipeline {
        ctx: &ctx,
        container: &config.container,
        output_root: &config.output_root,
        runner: &SystemRunner,
        publisher: &publisher,
    };

    let report = run_release(
        &pipeline,
        host,
        &ReleaseRequest {
            targets: requested,
            version: args.tag,
            upload,
            destination: config.publish.destination.clone(),
        },
    )?;

    for line in report.summary_lines() {
        println!("{line}");
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
