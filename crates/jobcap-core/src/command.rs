//! Shell commands as runnable tasks.

use core::fmt;
#[cfg(unix)]
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

use crate::cancel::CancelHandle;
use crate::error::{Result, RunnerError};
use crate::task::Task;

/// Captured result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
    /// Process exit code
    pub exit_code: i32,
}

/// A program invocation that can run as a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ShellCommand {
    /// Invoke `program` directly with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Run a command line through `sh -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(line)
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in the given working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line. For `sh -c` commands this is the inner line.
    pub fn display_line(&self) -> String {
        match self.args.as_slice() {
            [flag, line] if self.program == "sh" && flag == "-c" => line.clone(),
            _ if self.args.is_empty() => self.program.clone(),
            _ => format!("{} {}", self.program, self.args.join(" ")),
        }
    }

    /// Run to completion, killing the child if `cancel` fires first.
    ///
    /// # Errors
    /// Returns [`RunnerError::Io`] if the process cannot be spawned,
    /// [`RunnerError::Cancelled`] if cancelled, and [`RunnerError::Command`] on a
    /// non-zero exit.
    pub async fn run(&self, cancel: &CancelHandle) -> Result<CommandOutput> {
        let line = self.display_line();
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        // `sh -c` lines fork their own children; a fresh group lets cancel reach them.
        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!("Executing command: {line}");
        let child = command.spawn()?;
        let mut group = GroupGuard::new(child.id());

        // Dropping the pending `wait_with_output` future kills the child (kill_on_drop),
        // and dropping the armed guard kills the rest of its group.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            () = cancel.cancelled() => {
                tracing::debug!("Command cancelled: {line}");
                return Err(RunnerError::Cancelled);
            }
        };
        group.disarm();

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::debug!("Command completed with exit code {exit_code}: {line}");

        if output.status.success() {
            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code,
            })
        } else {
            Err(RunnerError::Command {
                command: line,
                code: exit_code,
                stderr: stderr.trim().to_owned(),
            })
        }
    }

    /// Wrap as a task named after the command line. Output is logged, not returned.
    pub fn into_task(self) -> Task {
        let name = self.display_line();
        Task::new(name, move |cancel| async move {
            let output = self.run(&cancel).await?;
            if !output.stdout.trim().is_empty() {
                tracing::info!("[{}] {}", self.display_line(), output.stdout.trim_end());
            }
            Ok(())
        })
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Kills a child's process group when dropped, unless disarmed first.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    const fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    /// The command finished on its own; leave the group alone.
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code, reason = "killpg has no safe wrapper in std or tokio")]
fn kill_process_group(pid: u32) {
    use libc::{SIGKILL, killpg, pid_t};

    let Ok(group) = pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg takes no pointers; a group that is already gone yields ESRCH.
    let status = unsafe { killpg(group, SIGKILL) };
    if status == -1 {
        tracing::debug!(
            "Could not kill process group {group}: {}",
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
