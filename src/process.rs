//! External command execution.
//!
//! Builders and the publisher never touch `std::process` directly. They build
//! an [`ExternalCommand`] and hand it to a [`CommandRunner`], which lets tests
//! swap in a fake that records invocations and fabricates outputs.
//!
//! ```rust,ignore
//! use release_builder::process::{ExternalCommand, SystemRunner};
//!
//! let out = ExternalCommand::new("make")
//!     .args(["loadable", "-j8"])
//!     .current_dir("/src/ext")
//!     .env("CMAKE_OSX_ARCHITECTURES", "x86_64")
//!     .error_msg("make loadable failed")
//!     .run_checked(&SystemRunner)?;
//! ```

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// A fully described process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Stream output to the terminal instead of capturing it.
    pub interactive: bool,
    error_msg: Option<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            interactive: false,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Message used when [`run_checked`](Self::run_checked) sees a failure.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Run and fail on spawn errors or a non-zero exit.
    pub fn run_checked(&self, runner: &dyn CommandRunner) -> Result<CommandOutput> {
        let output = runner.run(self)?;
        if output.success() {
            return Ok(output);
        }

        let headline = self
            .error_msg
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.program));
        bail!(
            "{} (exit: {})\n{}",
            headline,
            output.exit_label(),
            output.diagnostic_tail(20)
        )
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Structured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn exit_label(&self) -> String {
        match self.code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }

    /// Last `lines` lines of stderr (or stdout when stderr is empty).
    pub fn diagnostic_tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.trim_end().lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Executes external commands on behalf of the builders and publisher.
pub trait CommandRunner {
    /// Run to completion. `Err` only for failures to spawn or wait; a non-zero
    /// exit is reported through [`CommandOutput::code`].
    fn run(&self, cmd: &ExternalCommand) -> Result<CommandOutput>;

    /// Resolve `program` on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Runner backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<CommandOutput> {
        debug!(command = %cmd, cwd = ?cmd.cwd, "spawning");

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args).envs(&cmd.env);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        if cmd.interactive {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .with_context(|| format!("running '{}'", cmd.program))?;
            return Ok(CommandOutput {
                code: status.code(),
                ..CommandOutput::default()
            });
        }

        let output = command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("running '{}'", cmd.program))?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Quote a string for a POSIX `sh` script.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}
