//! Publishing the output tree to the remote store.
//!
//! Publish is all-or-nothing: a recursive sync of the whole tree followed by a
//! recursive public-read grant. Nothing here tracks what an earlier run
//! already uploaded.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::build::{chain_message, BuildError};
use crate::process::{CommandRunner, ExternalCommand};

/// Default sync argv; `{source}` and `{destination}` are substituted.
pub const DEFAULT_SYNC: &[&str] = &["gsutil", "-m", "rsync", "-r", "{source}", "{destination}"];

/// Default public-read grant argv.
pub const DEFAULT_GRANT: &[&str] = &["gsutil", "-m", "acl", "ch", "-r", "-u", "AllUsers:R", "{destination}"];

pub trait Publisher {
    /// Sync `output_root` to `destination`, then make it publicly readable.
    fn publish(&self, output_root: &Path, destination: &str) -> Result<(), BuildError>;
}

/// Publisher that shells out to an object-store client.
pub struct CommandPublisher<'a> {
    runner: &'a dyn CommandRunner,
    sync: Vec<String>,
    grant: Vec<String>,
}

impl<'a> CommandPublisher<'a> {
    pub fn new(runner: &'a dyn CommandRunner, sync: Vec<String>, grant: Vec<String>) -> Self {
        Self {
            runner,
            sync,
            grant,
        }
    }

    fn try_publish(&self, output_root: &Path, destination: &str) -> Result<()> {
        if destination.trim().is_empty() {
            bail!("no publish destination configured");
        }
        let files = count_files(output_root)?;
        if files == 0 {
            bail!("nothing to publish under '{}'", output_root.display());
        }

        let source = output_root.display().to_string();
        info!(source = %source, destination, files, "syncing");
        self.command(&self.sync, &source, destination)?
            .error_msg(format!("sync to {destination} failed"))
            .run_checked(self.runner)?;

        info!(destination, "granting public read");
        self.command(&self.grant, &source, destination)?
            .error_msg(format!("public-read grant on {destination} failed"))
            .run_checked(self.runner)?;
        Ok(())
    }

    fn command(&self, template: &[String], source: &str, destination: &str) -> Result<ExternalCommand> {
        let argv: Vec<String> = template
            .iter()
            .map(|arg| arg.replace("{source}", source).replace("{destination}", destination))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            bail!("publish command template is empty");
        };
        if self.runner.locate(program).is_none() {
            bail!("'{program}' not found on PATH");
        }
        Ok(ExternalCommand::new(program.as_str()).args(args.iter().cloned()))
    }
}

impl Publisher for CommandPublisher<'_> {
    fn publish(&self, output_root: &Path, destination: &str) -> Result<(), BuildError> {
        self.try_publish(output_root, destination).map_err(|e| {
            warn!(destination, error = %format!("{e:#}"), "publish failed");
            BuildError::PublishFailure(chain_message(&e))
        })?;
        info!(destination, "published");
        Ok(())
    }
}

fn count_files(root: &Path) -> Result<usize> {
    if !root.is_dir() {
        bail!("output root '{}' does not exist", root.display());
    }
    let mut n = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        if entry.file_type().is_file() {
            n += 1;
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ErrorKind;
    use crate::process::CommandOutput;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct FakeGsutil {
        fail_on: Option<&'static str>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl FakeGsutil {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                fail_on,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for FakeGsutil {
        fn run(&self, cmd: &ExternalCommand) -> anyhow::Result<CommandOutput> {
            self.calls.borrow_mut().push(cmd.args.clone());
            let failed = self.fail_on.is_some_and(|verb| cmd.args.iter().any(|a| a == verb));
            Ok(CommandOutput {
                code: Some(if failed { 1 } else { 0 }),
                stderr: if failed { "AccessDeniedException: 403".into() } else { String::new() },
                ..CommandOutput::default()
            })
        }

        fn locate(&self, program: &str) -> Option<PathBuf> {
            Some(PathBuf::from(program))
        }
    }

    fn default_publisher(runner: &FakeGsutil) -> CommandPublisher<'_> {
        let owned = |argv: &[&str]| -> Vec<String> { argv.iter().map(|s| s.to_string()).collect() };
        CommandPublisher::new(runner, owned(DEFAULT_SYNC), owned(DEFAULT_GRANT))
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("v1/linux_amd64");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("vss0.gz"), b"gz").unwrap();
        tmp
    }

    #[test]
    fn syncs_then_grants() {
        let tmp = tree();
        let runner = FakeGsutil::new(None);

        default_publisher(&runner)
            .publish(tmp.path(), "gs://releases/vss")
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            vec![
                "-m".to_string(),
                "rsync".into(),
                "-r".into(),
                tmp.path().display().to_string(),
                "gs://releases/vss".into(),
            ]
        );
        assert_eq!(calls[1].last().map(String::as_str), Some("gs://releases/vss"));
        assert!(calls[1].contains(&"AllUsers:R".to_string()));
    }

    #[test]
    fn failed_sync_skips_grant() {
        let tmp = tree();
        let runner = FakeGsutil::new(Some("rsync"));

        let err = default_publisher(&runner)
            .publish(tmp.path(), "gs://releases/vss")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PublishFailure);
        assert!(err.diagnostic().contains("AccessDeniedException"));
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn empty_tree_is_refused() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("v1")).unwrap();
        let runner = FakeGsutil::new(None);

        let err = default_publisher(&runner)
            .publish(tmp.path(), "gs://releases/vss")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PublishFailure);
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn custom_templates_are_substituted() {
        let tmp = tree();
        let runner = FakeGsutil::new(None);
        let publisher = CommandPublisher::new(
            &runner,
            vec!["aws".into(), "s3".into(), "sync".into(), "{source}".into(), "{destination}".into()],
            vec!["true".into(), "{destination}".into()],
        );

        publisher.publish(tmp.path(), "s3://bucket/vss").unwrap();
        let calls = runner.calls.borrow();
        assert_eq!(calls[0][2], tmp.path().display().to_string());
        assert_eq!(calls[1], vec!["s3://bucket/vss".to_string()]);
    }
}
