//! Bounded subprocess execution.
//!
//! Every run has a wall-clock limit. Stdout and stderr are drained
//! concurrently so a chatty child can never block on a full pipe, and a
//! child that outlives its budget is killed, together with anything it
//! spawned, and reaped before returning.

use crate::error::{ParlanceError, Result};
use crate::process::workspace::TempWorkspace;
use crate::sys;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

const STDERR_SALVAGE_WAIT: Duration = Duration::from_millis(500);

/// Program, arguments and optional stdin for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            working_dir: None,
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

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub program: String,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a non-zero exit into `ProcessFailed`, keeping stderr for diagnostics.
    pub fn into_success(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(ParlanceError::ProcessFailed {
            stderr: self.stderr_text().trim().to_string(),
            program: self.program,
            code: self.exit_code,
        })
    }
}

/// Runs external commands under a timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `spec` to completion or until `timeout` elapses.
    ///
    /// A non-zero exit is not an error here; see [`ProcessOutput::into_success`].
    ///
    /// # Errors
    /// - `ToolNotFound` if the executable does not exist
    /// - `Spawn` for any other launch failure
    /// - `Timeout` if the process (or its output pipes) outlive `timeout`;
    ///   its whole process group is killed first and any stderr written so
    ///   far is kept on the error
    pub async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ProcessOutput> {
        let started = Instant::now();
        let mut child = spawn(spec)?;
        let pid = child.id();

        tracing::debug!(
            program = %spec.program,
            args = ?spec.args,
            pid,
            timeout_ms = timeout.as_millis() as u64,
            "Spawned subprocess"
        );

        let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
        let mut stderr_task = tokio::spawn(drain(child.stderr.take()));
        let stdin_task = match (child.stdin.take(), spec.stdin.clone()) {
            (Some(mut pipe), Some(data)) => Some(tokio::spawn(async move {
                // A child that exits without reading stdin closes the pipe; not an error.
                if let Err(e) = pipe.write_all(&data).await {
                    tracing::debug!(error = %e, "Subprocess stdin closed early");
                }
            })),
            _ => None,
        };
        let abort_stdin = |stdin_task: Option<JoinHandle<()>>| {
            if let Some(task) = stdin_task {
                task.abort();
            }
        };

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                abort_stdin(stdin_task);
                kill_and_reap(&mut child, pid, &spec.program).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ParlanceError::Spawn {
                    program: spec.program.clone(),
                    message: format!("wait failed: {e}"),
                });
            }
            Err(_) => {
                abort_stdin(stdin_task);
                kill_and_reap(&mut child, pid, &spec.program).await;
                stdout_task.abort();
                let stderr = salvage_stderr(stderr_task).await;
                tracing::warn!(
                    program = %spec.program,
                    pid,
                    timeout_ms = timeout.as_millis() as u64,
                    stderr_bytes = stderr.len(),
                    "Subprocess timed out and was killed"
                );
                return Err(timeout_error(&spec.program, started, stderr));
            }
        };

        // The child is gone but a grandchild may still hold the pipes open.
        // Stderr is awaited last so it is still pending if the budget runs out.
        let remaining = timeout.saturating_sub(started.elapsed());
        let drained = tokio::time::timeout(remaining, async {
            let stdout = (&mut stdout_task).await;
            let stderr = (&mut stderr_task).await;
            (stdout, stderr)
        })
        .await;

        abort_stdin(stdin_task);

        let (stdout, stderr) = match drained {
            Ok((Ok(Ok(stdout)), Ok(Ok(stderr)))) => (stdout, stderr),
            Ok(_) => {
                return Err(ParlanceError::Spawn {
                    program: spec.program.clone(),
                    message: "failed to read process output".to_string(),
                });
            }
            Err(_) => {
                signal_group(pid, &spec.program);
                stdout_task.abort();
                let stderr = salvage_stderr(stderr_task).await;
                tracing::warn!(
                    program = %spec.program,
                    pid,
                    "Subprocess output still open after exit; process group killed"
                );
                return Err(timeout_error(&spec.program, started, stderr));
            }
        };

        let output = ProcessOutput {
            program: spec.program.clone(),
            stdout,
            stderr,
            exit_code: status.code(),
            pid,
            elapsed: started.elapsed(),
        };

        tracing::debug!(
            program = %spec.program,
            exit_code = ?output.exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Subprocess finished"
        );

        Ok(output)
    }

    /// Run a command inside a fresh temporary workspace.
    ///
    /// `prepare` writes inputs into the workspace and returns the command;
    /// `collect` reads results while the workspace still exists. The
    /// workspace is removed on every path, success or failure.
    pub async fn run_scoped<T, P, C>(
        &self,
        prefix: &str,
        timeout: Duration,
        prepare: P,
        collect: C,
    ) -> Result<T>
    where
        P: FnOnce(&TempWorkspace) -> Result<CommandSpec>,
        C: FnOnce(&TempWorkspace, ProcessOutput) -> Result<T>,
    {
        let workspace = TempWorkspace::new(prefix)?;
        let result = async {
            let spec = prepare(&workspace)?;
            let output = self.run(&spec, timeout).await?;
            collect(&workspace, output)
        }
        .await;

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove subprocess workspace");
        }
        result
    }
}

fn spawn(spec: &CommandSpec) -> Result<Child> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);
    // Own process group, so a timeout can take down anything the child spawned.
    #[cfg(unix)]
    command.process_group(0);
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ParlanceError::ToolNotFound {
                program: spec.program.clone(),
            }
        } else {
            ParlanceError::Spawn {
                program: spec.program.clone(),
                message: e.to_string(),
            }
        }
    })
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn kill_and_reap(child: &mut Child, pid: Option<u32>, program: &str) {
    signal_group(pid, program);
    if let Err(e) = child.start_kill() {
        tracing::debug!(program, error = %e, "Kill failed (process may have exited)");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(program, error = %e, "Failed to reap killed subprocess");
    }
}

/// SIGKILL the whole process group led by `pid`.
fn signal_group(pid: Option<u32>, program: &str) {
    let Some(pid) = pid else {
        return;
    };
    if let Err(e) = sys::kill_process_group(pid) {
        tracing::debug!(program, pid, error = %e, "Process group kill failed (group may have exited)");
    }
}

/// Whatever the child wrote to stderr before it was killed.
async fn salvage_stderr(task: JoinHandle<std::io::Result<Vec<u8>>>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(STDERR_SALVAGE_WAIT, task).await {
        Ok(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).trim().to_string(),
        _ => {
            abort.abort();
            String::new()
        }
    }
}

fn timeout_error(program: &str, started: Instant, stderr: String) -> ParlanceError {
    ParlanceError::Timeout {
        backend: program.to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let output = SubprocessRunner::new()
            .run(&sh("echo hello; echo oops >&2"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout_text(), "hello\n");
        assert_eq!(output.stderr_text(), "oops\n");
        assert!(output.pid.is_some());
    }

    #[tokio::test]
    async fn pipes_stdin_to_child() {
        let spec = CommandSpec::new("cat").stdin(b"from stdin".to_vec());
        let output = SubprocessRunner::new()
            .run(&spec, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, b"from stdin");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_not_raised() {
        let output = SubprocessRunner::new()
            .run(&sh("echo broken >&2; exit 7"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(7));

        match output.into_success() {
            Err(ParlanceError::ProcessFailed {
                program,
                code,
                stderr,
            }) => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(7));
                assert_eq!(stderr, "broken");
            }
            other => panic!("Expected ProcessFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let result = SubprocessRunner::new()
            .run(
                &CommandSpec::new("parlance-definitely-not-installed"),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(ParlanceError::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn timeout_returns_promptly() {
        let started = Instant::now();
        let result = SubprocessRunner::new()
            .run(&sh("exec sleep 30"), Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(ParlanceError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn working_dir_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("pwd").working_dir(dir.path());
        let output = SubprocessRunner::new()
            .run(&spec, Duration::from_secs(5))
            .await
            .unwrap();
        let reported = PathBuf::from(output.stdout_text().trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn run_scoped_removes_workspace_after_success() {
        let mut seen = None;
        let text = SubprocessRunner::new()
            .run_scoped(
                "parlance-test-",
                Duration::from_secs(5),
                |ws| {
                    seen = Some(ws.path().to_path_buf());
                    std::fs::write(ws.file("in.txt"), b"payload")?;
                    Ok(sh("cat in.txt > out.txt").working_dir(ws.path()))
                },
                |ws, output| {
                    output.into_success()?;
                    Ok(std::fs::read_to_string(ws.file("out.txt"))?)
                },
            )
            .await
            .unwrap();

        assert_eq!(text, "payload");
        assert!(!seen.unwrap().exists());
    }

    #[tokio::test]
    async fn run_scoped_removes_workspace_after_failure() {
        let mut seen = None;
        let result: Result<()> = SubprocessRunner::new()
            .run_scoped(
                "parlance-test-",
                Duration::from_secs(5),
                |ws| {
                    seen = Some(ws.path().to_path_buf());
                    Ok(sh("exit 1"))
                },
                |_, output| output.into_success().map(|_| ()),
            )
            .await;

        assert!(matches!(result, Err(ParlanceError::ProcessFailed { .. })));
        assert!(!seen.unwrap().exists());
    }
}
