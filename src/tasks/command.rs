//! # Process-mode targets.
//!
//! A [`CommandSpec`] describes the child process a process-mode task spawns.
//!
//! ## Contract with the child
//! - keyword arguments arrive on **stdin** as one JSON object, then stdin closes;
//! - **stdout** becomes the return value (parsed as JSON, else the trimmed text,
//!   `null` when empty);
//! - a non-zero exit is a failure whose stack field is the captured **stderr**.
//!
//! ## Stopping
//! - cancellation of the run token sends `SIGTERM` (Unix) so the child can exit cleanly;
//! - the kill token (fired by `Task::cleanup` when the child is still alive) kills it.

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::Kwargs;

/// Child process description for process-mode tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Runs the child to completion and maps its outcome.
pub(crate) async fn run_command(
    spec: &CommandSpec,
    kwargs: &Kwargs,
    ctx: CancellationToken,
    kill: CancellationToken,
    on_spawn: impl FnOnce(u32),
) -> Result<Value, TaskError> {
    if spec.program.is_empty() {
        return Err(TaskError::Spawn {
            error: "program is empty".into(),
        });
    }

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &spec.env {
        cmd.env(k, v);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::trace!(program = %spec.program, args = ?spec.args, "spawn");
    let mut child = cmd.spawn().map_err(|e| TaskError::Spawn {
        error: e.to_string(),
    })?;
    if let Some(pid) = child.id() {
        on_spawn(pid);
    }

    let payload = serde_json::to_vec(kwargs).map_err(|e| TaskError::Fatal {
        error: format!("encode kwargs: {e}"),
    })?;
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            // A child that never reads stdin closes the pipe; that is not an error.
            let _ = stdin.write_all(&payload).await;
            let _ = stdin.shutdown().await;
        });
    }
    let stdout = tokio::spawn(read_to_end(child.stdout.take()));
    let stderr = tokio::spawn(read_to_end(child.stderr.take()));

    let mut terminated = false;
    let mut killed = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map_err(|e| TaskError::Spawn { error: format!("wait: {e}") })?;
            }
            _ = ctx.cancelled(), if !terminated => {
                tracing::debug!(program = %spec.program, "cancelled; terminating child");
                terminated = true;
                terminate(&mut child);
            }
            _ = kill.cancelled(), if !killed => {
                tracing::debug!(program = %spec.program, "killing child");
                killed = true;
                let _ = child.start_kill();
            }
        }
    };

    let stdout = stdout.await.unwrap_or_default();
    let stderr = stderr.await.unwrap_or_default();

    if !status.success() {
        return Err(TaskError::Exit {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }
    tracing::debug!(program = %spec.program, "exit success");
    Ok(parse_output(&stdout))
}

fn parse_output(stdout: &str) -> Value {
    let text = stdout.trim();
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

async fn read_to_end<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(id) => {
            let _ = kill(Pid::from_raw(id as i32), Signal::SIGTERM);
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_prefers_json_then_text() {
        assert_eq!(parse_output("  {\"n\": 1}\n"), serde_json::json!({"n": 1}));
        assert_eq!(parse_output("done\n"), Value::String("done".into()));
        assert_eq!(parse_output("\n"), Value::Null);
    }

    #[test]
    fn builder_collects_arguments() {
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .args(["exit 0"])
            .env("A", "1")
            .cwd("/tmp");
        assert_eq!(spec.args, vec!["-c".to_string(), "exit 0".to_string()]);
        assert_eq!(spec.env, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_reads_kwargs_and_reports_failure() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("x".into(), Value::from(7));

        let echo = CommandSpec::new("sh").args(["-c", "cat"]);
        let out = run_command(&echo, &kwargs, CancellationToken::new(), CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"x": 7}));

        let fail = CommandSpec::new("sh").args(["-c", "echo nope >&2; exit 3"]);
        let err = run_command(&fail, &kwargs, CancellationToken::new(), CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::Exit {
                code: Some(3),
                stderr: "nope".into()
            }
        );
    }
}
