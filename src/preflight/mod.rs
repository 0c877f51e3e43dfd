//! Preflight checks for external tools.
//!
//! Reports which of the tools a release will shell out to are present on the
//! host. A missing container executor is not fatal here: the affected targets
//! fail individually with `MissingDependency` while the rest still build.
//!
//! ```rust,ignore
//! use release_builder::preflight::{probe_tools, required_tools};
//! use release_builder::process::SystemRunner;
//!
//! for tool in probe_tools(&SystemRunner, &required_tools(&config, &strategies, true)) {
//!     if !tool.is_available() {
//!         println!("{} missing ({})", tool.tool, tool.purpose);
//!     }
//! }
//! ```

use std::path::PathBuf;

use crate::config::ReleaseConfig;
use crate::process::CommandRunner;
use crate::registry::BuildStrategy;

/// One tool a release would invoke, and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: String,
    pub purpose: &'static str,
    pub found: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.found.is_some()
    }
}

/// Tools needed for the given strategies, plus publish tools when uploading.
pub fn required_tools(
    config: &ReleaseConfig,
    strategies: &[BuildStrategy],
    upload: bool,
) -> Vec<(String, &'static str)> {
    let mut tools: Vec<(String, &'static str)> = Vec::new();
    let mut push = |tool: Option<&String>, purpose: &'static str| {
        if let Some(tool) = tool {
            if !tools.iter().any(|(t, _)| t == tool) {
                tools.push((tool.clone(), purpose));
            }
        }
    };

    if strategies.contains(&BuildStrategy::Native) {
        push(config.build_command.first(), "native builds");
    }
    if strategies.contains(&BuildStrategy::Container) {
        push(Some(&config.container.executor), "container builds");
    }
    if upload {
        push(config.publish.sync.first(), "publish sync");
        push(config.publish.grant.first(), "publish grant");
    }
    tools
}

/// Look up every tool without failing.
pub fn probe_tools(runner: &dyn CommandRunner, tools: &[(String, &'static str)]) -> Vec<ToolStatus> {
    tools
        .iter()
        .map(|(tool, purpose)| ToolStatus {
            tool: tool.clone(),
            purpose,
            found: runner.locate(tool),
        })
        .collect()
}
