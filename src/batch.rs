//! Batch orchestration over every requested target.
//!
//! Targets build one at a time: they share a single build directory, and each
//! build already uses the machine's full parallelism. A failing target is
//! recorded and the loop moves on.

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::build::{BuildResult, ErrorKind};
use crate::dispatch::Dispatcher;
use crate::platform::{HostPlatform, PlatformIdentifier};
use crate::registry::BuildStrategy;

/// Final result per requested target.
pub type ResultMap = BTreeMap<PlatformIdentifier, BuildResult>;

/// Build every target and collect one result per distinct target.
pub fn run_all(
    targets: &[PlatformIdentifier],
    host: HostPlatform,
    dispatcher: &Dispatcher<'_>,
) -> ResultMap {
    run_all_with(targets, host, dispatcher, &mut |_| {})
}

/// Like [`run_all`], calling `on_result` right after each target finishes.
///
/// The callback runs while the build directory still holds that target's
/// binary, before the next target clears it.
pub fn run_all_with(
    targets: &[PlatformIdentifier],
    host: HostPlatform,
    dispatcher: &Dispatcher<'_>,
    on_result: &mut dyn FnMut(&BuildResult),
) -> ResultMap {
    let mut results = ResultMap::new();
    let total = targets.len();

    for (i, &target) in targets.iter().enumerate() {
        if results.contains_key(&target) {
            warn!(platform = %target, "target requested more than once; building it once");
            continue;
        }

        info!(platform = %target, "[{}/{}] building", i + 1, total);
        let result = dispatcher.dispatch(target, host);
        match result.error() {
            None => info!(platform = %target, strategy = %result.strategy, "build ok"),
            Some(e) => warn!(platform = %target, strategy = %result.strategy, error = %e, "build failed"),
        }

        on_result(&result);
        results.insert(target, result);
    }

    results
}

/// Counts for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Targets handed to a builder (Native or Container).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed targets that never reached a builder.
    pub unsupported: usize,
}

impl BatchSummary {
    pub fn of(results: &ResultMap) -> Self {
        let mut summary = Self::default();
        for result in results.values() {
            if result.strategy != BuildStrategy::Unsupported {
                summary.attempted += 1;
            }
            match result.error() {
                None => summary.succeeded += 1,
                Some(e) => {
                    summary.failed += 1;
                    if e.kind() == ErrorKind::Unsupported {
                        summary.unsupported += 1;
                    }
                }
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// One line per target followed by a totals line.
pub fn summary_lines(results: &ResultMap) -> Vec<String> {
    let mut lines: Vec<String> = results.values().map(ToString::to_string).collect();
    let s = BatchSummary::of(results);
    lines.push(format!(
        "{} attempted, {} succeeded, {} failed ({} unsupported)",
        s.attempted, s.succeeded, s.failed, s.unsupported
    ));
    lines
}
