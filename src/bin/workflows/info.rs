use anyhow::Result;
use std::process::ExitCode;

use release_builder::{capability_of, describe_host, PlatformIdentifier};

pub(crate) fn print_host() -> Result<ExitCode> {
    println!("{}", describe_host());
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn print_platforms() -> Result<ExitCode> {
    let host = describe_host();
    for platform in PlatformIdentifier::ALL {
        println!("{:<12} {}", platform.tag(), capability_of(platform, host));
    }
    Ok(ExitCode::SUCCESS)
}
