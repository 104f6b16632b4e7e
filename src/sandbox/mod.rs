//! Code sandbox for snippets mailed in by senders.
//!
//! Runs a snippet through an interpreter child process and captures
//! everything it printed:
//! - Cleared environment, only an enumerated allowlist is passed through
//! - Closed stdin, fresh empty working directory per run
//! - stdout and stderr share one pipe, so the captured text keeps the order
//!   the snippet printed in; nothing is forwarded to the host console
//!
//! # Accepted risks
//!
//! This is output capture, not isolation. The snippet runs with the
//! privileges of the agent's user: it can read and write anything that user
//! can, open network connections, and spawn processes. No wall-clock limit
//! is enforced, so a snippet that never terminates stalls the batch. Treat
//! every snippet as hostile code executed on the host.

use std::io::{self, PipeReader, PipeWriter, Read};
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Rendered when a snippet ran to completion without printing anything.
pub const NO_OUTPUT_MARKER: &str = "Code executed successfully, but produced no output.";

/// Prefix marking rendered text as a failure rather than snippet output.
pub const ERROR_PREFIX: &str = "Error: ";

/// Environment variables copied from the host when present.
const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "LANG", "LC_ALL", "TZ"];

/// Variables always set for the child, whatever the host has.
const FIXED_ENV: &[(&str, &str)] = &[
    ("PYTHONIOENCODING", "utf-8"),
    ("PYTHONDONTWRITEBYTECODE", "1"),
    // Block-buffered stdout would land after unbuffered stderr in the pipe.
    ("PYTHONUNBUFFERED", "1"),
];

/// Runs a snippet and reports what happened. Never fails: every problem is
/// folded into the returned [`SandboxOutcome`].
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> SandboxOutcome;
}

/// What a snippet produced.
///
/// Both fields may be set when the snippet printed something before failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxOutcome {
    /// Combined stdout and stderr text, in write order.
    pub stdout_text: String,
    /// Failure description, if the snippet did not complete normally.
    pub error: Option<String>,
}

impl SandboxOutcome {
    pub fn success(stdout_text: impl Into<String>) -> Self {
        Self {
            stdout_text: stdout_text.into(),
            error: None,
        }
    }

    pub fn failure(stdout_text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stdout_text: stdout_text.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text shown to the sender. On failure, whatever was printed before
    /// the error comes first.
    pub fn render(&self) -> String {
        match &self.error {
            Some(error) if self.stdout_text.trim().is_empty() => format!("{ERROR_PREFIX}{error}"),
            Some(error) => format!("{}\n{ERROR_PREFIX}{error}", self.stdout_text.trim_end()),
            None if self.stdout_text.is_empty() => NO_OUTPUT_MARKER.to_string(),
            None => self.stdout_text.clone(),
        }
    }
}

/// Everything the child process is given. Nothing else leaks in from the host
/// process except what the OS itself grants the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    /// Interpreter program, resolved through the allowlisted `PATH`.
    pub interpreter: String,
    /// Arguments placed before `-c <snippet>`.
    pub args: Vec<String>,
    /// Host environment variables passed through when set.
    pub env_allowlist: Vec<String>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            // Isolated mode ignores PYTHON* variables and the user site dir,
            // so unbuffered UTF-8 output is asked for with flags instead.
            args: ["-I", "-u", "-X", "utf8"].iter().map(|s| s.to_string()).collect(),
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Subprocess-backed sandbox.
#[derive(Debug, Clone, Default)]
pub struct CodeSandbox {
    policy: SandboxPolicy,
}

impl CodeSandbox {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Execute a snippet and capture its output.
    pub async fn execute(&self, code: &str) -> SandboxOutcome {
        let workdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => return SandboxOutcome::failure("", format!("failed to create working directory: {e}")),
        };
        let (reader, writer) = match output_pipe() {
            Ok(pipe) => pipe,
            Err(e) => return SandboxOutcome::failure("", format!("failed to create output pipe: {e}")),
        };

        // The command owns our copies of the write end; drop it right after
        // spawning so the reader sees EOF once the child exits.
        let spawned = {
            let mut command = self.command(code, workdir.path(), writer);
            command.spawn()
        };
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return SandboxOutcome::failure(
                    "",
                    format!("failed to start interpreter '{}': {e}", self.policy.interpreter),
                );
            }
        };

        let drain = tokio::task::spawn_blocking(move || drain_pipe(reader));
        let status = child.wait().await;
        // Kills the child if waiting failed, which closes the pipe.
        drop(child);

        let captured = match drain.await {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Err(e)) => return SandboxOutcome::failure("", format!("failed to read snippet output: {e}")),
            Err(e) => return SandboxOutcome::failure("", format!("output reader failed: {e}")),
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return SandboxOutcome::failure(captured, format!("failed to wait for interpreter: {e}")),
        };
        debug!(status = %status, output_bytes = captured.len(), "Snippet finished");

        if status.success() {
            SandboxOutcome::success(captured)
        } else {
            let description = describe_failure(&captured, status);
            SandboxOutcome::failure(captured, description)
        }
    }

    fn command(&self, code: &str, workdir: &Path, (stdout, stderr): (PipeWriter, PipeWriter)) -> Command {
        let mut command = Command::new(&self.policy.interpreter);
        command
            .args(&self.policy.args)
            .arg("-c")
            .arg(code)
            .env_clear()
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        for key in &self.policy.env_allowlist {
            if let Some(value) = std::env::var_os(key) {
                command.env(key, value);
            }
        }
        for (key, value) in FIXED_ENV {
            command.env(key, value);
        }
        command
    }
}

/// One pipe with two write ends, for the child's stdout and stderr.
fn output_pipe() -> io::Result<(PipeReader, (PipeWriter, PipeWriter))> {
    let (reader, stdout) = io::pipe()?;
    let stderr = stdout.try_clone()?;
    Ok((reader, (stdout, stderr)))
}

fn drain_pipe(mut reader: PipeReader) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[async_trait]
impl CodeRunner for CodeSandbox {
    async fn run(&self, code: &str) -> SandboxOutcome {
        self.execute(code).await
    }
}

/// Pick a one-line failure description: the last non-empty output line (the
/// exception line of a traceback), else the exit status.
fn describe_failure(output: &str, status: ExitStatus) -> String {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match status.code() {
            Some(code) => format!("process exited with status {code}"),
            None => "process terminated by a signal".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Policy running snippets with `sh -c`, so tests don't need Python.
    fn shell_sandbox() -> CodeSandbox {
        CodeSandbox::new(SandboxPolicy {
            interpreter: "sh".to_string(),
            args: vec![],
            env_allowlist: vec!["PATH".to_string()],
        })
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn captures_stdout() {
        let outcome = shell_sandbox().execute("echo hi").await;
        assert_eq!(outcome, SandboxOutcome::success("hi\n"));
        assert_eq!(outcome.render(), "hi\n");
    }

    #[tokio::test]
    async fn captures_stderr_into_same_buffer() {
        let outcome = shell_sandbox().execute("echo out; echo warn >&2").await;
        assert!(!outcome.is_error());
        assert!(outcome.stdout_text.contains("out"));
        assert!(outcome.stdout_text.contains("warn"));
    }

    #[tokio::test]
    async fn interleaved_streams_keep_write_order() {
        let outcome = shell_sandbox().execute("echo first >&2; echo second").await;
        assert_eq!(outcome.stdout_text, "first\nsecond\n");

        let outcome = shell_sandbox()
            .execute("echo a; echo b >&2; echo c; echo d >&2")
            .await;
        assert_eq!(outcome.stdout_text, "a\nb\nc\nd\n");
    }

    #[tokio::test]
    async fn silent_snippet_renders_marker() {
        let outcome = shell_sandbox().execute("true").await;
        assert!(!outcome.is_error());
        assert_eq!(outcome.render(), NO_OUTPUT_MARKER);
    }

    #[tokio::test]
    async fn failure_is_reported_not_raised() {
        let outcome = shell_sandbox().execute("echo partial; echo 'boom x' >&2; exit 3").await;
        assert_eq!(outcome.error.as_deref(), Some("boom x"));
        // Output printed before the failure is kept.
        assert!(outcome.stdout_text.contains("partial"));
        assert_eq!(outcome.render(), "partial\nboom x\nError: boom x");
    }

    #[tokio::test]
    async fn silent_failure_reports_exit_status() {
        let outcome = shell_sandbox().execute("exit 7").await;
        assert_eq!(outcome.error.as_deref(), Some("process exited with status 7"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_outcome() {
        let sandbox = CodeSandbox::new(SandboxPolicy {
            interpreter: "definitely-not-an-interpreter-4242".to_string(),
            args: vec![],
            env_allowlist: vec![],
        });
        let outcome = sandbox.execute("print(1)").await;
        let error = outcome.error.unwrap();
        assert!(error.contains("failed to start interpreter"));
    }

    #[tokio::test]
    async fn environment_is_limited_to_allowlist() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("MAIL_TRIAGE_SANDBOX_SECRET", "leaked") };

        let outcome = shell_sandbox()
            .execute("echo \"secret=${MAIL_TRIAGE_SANDBOX_SECRET:-unset} enc=$PYTHONIOENCODING\"")
            .await;
        assert_eq!(outcome.stdout_text, "secret=unset enc=utf-8\n");
    }

    #[tokio::test]
    async fn runs_in_fresh_working_directory() {
        let outcome = shell_sandbox().execute("ls -A | wc -l").await;
        assert_eq!(outcome.stdout_text.trim(), "0");
    }

    // Documents the accepted risk: the snippet has the host user's filesystem access.
    #[tokio::test]
    async fn snippet_can_touch_host_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("written-by-snippet");

        let outcome = shell_sandbox()
            .execute(&format!("echo owned > '{}'", target.display()))
            .await;
        assert!(!outcome.is_error());
        assert!(target.exists());
    }

    #[tokio::test]
    async fn python_print_and_raise() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let sandbox = CodeSandbox::default();

        let printed = sandbox.execute("print(\"hi\")").await;
        assert_eq!(printed.render(), "hi\n");

        let silent = sandbox.execute("x = 1 + 1").await;
        assert_eq!(silent.render(), NO_OUTPUT_MARKER);

        let raised = sandbox.execute("raise ValueError(\"x\")").await;
        assert_eq!(raised.error.as_deref(), Some("ValueError: x"));
        assert!(raised.stdout_text.contains("Traceback"));
        assert!(raised.render().ends_with("Error: ValueError: x"));

        let mixed = sandbox
            .execute("import sys\nprint('out')\nprint('err', file=sys.stderr)\nprint('out again')")
            .await;
        assert_eq!(mixed.stdout_text, "out\nerr\nout again\n");
    }

    #[test]
    fn render_keeps_partial_output_before_error() {
        let outcome = SandboxOutcome::failure("partial\n", "ValueError: x");
        assert_eq!(outcome.render(), "partial\nError: ValueError: x");

        let outcome = SandboxOutcome::failure("", "process exited with status 1");
        assert_eq!(outcome.render(), "Error: process exited with status 1");
    }
}
