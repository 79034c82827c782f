//! Execution of `git` subprocesses.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use itertools::Itertools;
use log::{debug, warn};
use thiserror::Error;
use wait_timeout::ChildExt;

/// Errors which may occur when running a `git` command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GitError {
    /// The `git` executable could not be spawned at all.
    #[error("failed to execute git {}: {}", subcommand, source)]
    Spawn {
        /// The subcommand that was being executed.
        subcommand: String,
        /// The source of the error.
        #[source]
        source: io::Error,
    },
    /// A `git` command exited with a non-zero status.
    #[error("git {} exited with status {}: {}", args.iter().format(" "), code, stderr)]
    Command {
        /// The arguments passed to `git`.
        args: Vec<String>,
        /// The exit code of the `git` process.
        code: i32,
        /// The captured standard output.
        stdout: String,
        /// The captured standard error.
        stderr: String,
    },
    /// A `git` command did not complete within its allotted time.
    #[error("git {} did not complete within {:?}", args.iter().format(" "), limit)]
    Timeout {
        /// The arguments passed to `git`.
        args: Vec<String>,
        /// The time limit that was exceeded.
        limit: Duration,
    },
}

impl GitError {
    /// A convenience method for constructing a spawn error.
    pub fn subcommand<S>(subcommand: S, source: io::Error) -> Self
    where
        S: Into<String>,
    {
        GitError::Spawn {
            subcommand: subcommand.into(),
            source,
        }
    }

    fn command(args: Vec<String>, code: i32, stdout: &[u8], stderr: &[u8]) -> Self {
        GitError::Command {
            args,
            code,
            stdout: String::from_utf8_lossy(stdout).into(),
            stderr: String::from_utf8_lossy(stderr).into(),
        }
    }

    fn timeout(args: Vec<String>, limit: Duration) -> Self {
        GitError::Timeout {
            args,
            limit,
        }
    }
}

/// A convenience alias for git results.
pub type GitResult<T> = Result<T, GitError>;

/// A context for executing git commands against a repository.
///
/// The context remembers the directory the repository lives in; commands are
/// run with `git -C <dir>` so that callers never have to change the process
/// working directory.
#[derive(Debug, Clone)]
pub struct GitContext {
    workdir: PathBuf,
}

impl GitContext {
    /// Create a context rooted at the given directory.
    pub fn new<P>(workdir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        GitContext {
            workdir: workdir.into(),
        }
    }

    /// Create a context for the process working directory.
    pub fn current_dir() -> Self {
        GitContext::new(".")
    }

    /// The directory the context operates in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Start building a git command.
    pub fn git(&self) -> GitCommand {
        GitCommand::new(self)
    }
}

/// A single git invocation under construction.
pub struct GitCommand<'a> {
    ctx: &'a GitContext,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    envs: Vec<(OsString, OsString)>,
    inherit_stderr: bool,
}

impl<'a> GitCommand<'a> {
    fn new(ctx: &'a GitContext) -> Self {
        GitCommand {
            ctx,
            args: Vec::new(),
            stdin: None,
            timeout: None,
            envs: Vec::new(),
            inherit_stderr: false,
        }
    }

    /// Add an argument.
    pub fn arg<S>(mut self, arg: S) -> Self
    where
        S: AsRef<OsStr>,
    {
        self.args.push(arg.as_ref().into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().into()));
        self
    }

    /// Provide a payload on the command's standard input.
    pub fn stdin<D>(mut self, data: D) -> Self
    where
        D: Into<Vec<u8>>,
    {
        self.stdin = Some(data.into());
        self
    }

    /// Bound the command's execution time.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Set an environment variable for the command.
    pub fn env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.envs.push((key.as_ref().into(), value.as_ref().into()));
        self
    }

    /// Let the command write directly to the console's standard error.
    ///
    /// Intended for commands such as `fetch` and `push` whose progress output
    /// is meant for the user.
    pub fn show_stderr(mut self) -> Self {
        self.inherit_stderr = true;
        self
    }

    /// Run the command, letting its output go to the console.
    pub fn run(self) -> GitResult<()> {
        self.invoke(false, false).map(|_| ())
    }

    /// Run the command, swallowing any failure.
    pub fn try_run(self) {
        let _ = self.invoke(false, true);
    }

    /// Run the command and capture its output, stripped of trailing
    /// whitespace.
    pub fn output(self) -> GitResult<String> {
        self.invoke(true, false)
            .map(|out| strip_output(&out.expect("capturing invocations always produce output")))
    }

    /// Run the command and capture its output verbatim.
    pub fn raw_output(self) -> GitResult<String> {
        self.invoke(true, false)
            .map(|out| out.expect("capturing invocations always produce output"))
    }

    /// Run the command and capture its output, or `None` if it failed.
    pub fn try_output(self) -> Option<String> {
        self.invoke(true, true)
            .ok()
            .flatten()
            .map(|out| strip_output(&out))
    }

    fn display_args(&self) -> Vec<String> {
        let mut all = vec![
            "-C".into(),
            self.ctx.workdir.display().to_string(),
        ];
        all.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        all
    }

    fn invoke(self, capture_stdout: bool, ignore_error: bool) -> GitResult<Option<String>> {
        let display_args = self.display_args();
        debug!(
            target: "apple-llvm/git",
            "$ git {}",
            display_args.iter().format(" "),
        );

        let subcommand = self
            .args
            .first()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<none>".into());

        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.ctx.workdir)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(if self.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::piped()
            });

        let mut child = command
            .spawn()
            .map_err(|err| GitError::subcommand(subcommand.clone(), err))?;

        if let Some(data) = self.stdin.as_ref() {
            let mut handle = child
                .stdin
                .take()
                .expect("a piped stdin should have a handle");
            handle
                .write_all(data)
                .map_err(|err| GitError::subcommand(subcommand.clone(), err))?;
        }

        let (status, stdout, stderr) = if let Some(limit) = self.timeout {
            let status = child
                .wait_timeout(limit)
                .map_err(|err| GitError::subcommand(subcommand.clone(), err))?;
            let status = match status {
                Some(status) => status,
                None => {
                    // Ran out of time; reap the child before giving up.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GitError::timeout(display_args, limit));
                },
            };

            let mut stdout = Vec::new();
            if let Some(mut handle) = child.stdout.take() {
                handle
                    .read_to_end(&mut stdout)
                    .map_err(|err| GitError::subcommand(subcommand.clone(), err))?;
            }
            let mut stderr = Vec::new();
            if let Some(mut handle) = child.stderr.take() {
                handle
                    .read_to_end(&mut stderr)
                    .map_err(|err| GitError::subcommand(subcommand.clone(), err))?;
            }

            (status, stdout, stderr)
        } else {
            let output = child
                .wait_with_output()
                .map_err(|err| GitError::subcommand(subcommand, err))?;
            (output.status, output.stdout, output.stderr)
        };

        if status.success() {
            for line in String::from_utf8_lossy(&stdout).lines() {
                debug!(target: "apple-llvm/git", "STDOUT: {}", line);
            }
            for line in String::from_utf8_lossy(&stderr).lines() {
                debug!(target: "apple-llvm/git", "STDERR: {}", line);
            }

            return Ok(if capture_stdout {
                Some(String::from_utf8_lossy(&stdout).into_owned())
            } else {
                None
            });
        }

        let code = status.code().unwrap_or(-1);
        debug!(target: "apple-llvm/git", "EXIT STATUS: {}", code);

        if ignore_error {
            for line in String::from_utf8_lossy(&stderr).lines() {
                debug!(target: "apple-llvm/git", "STDERR: {}", line);
            }
            return Ok(None);
        }

        for line in String::from_utf8_lossy(&stderr).lines() {
            warn!(target: "apple-llvm/git", "STDERR: {}", line);
        }

        Err(GitError::command(display_args, code, &stdout, &stderr))
    }
}

fn strip_output(output: &str) -> String {
    output.trim_end().into()
}
