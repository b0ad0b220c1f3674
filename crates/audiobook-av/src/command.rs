//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// Every spawned child is killed when its handle is dropped, so a cancelled
/// or timed-out invocation never leaves a process behind.
///
/// # Example
///
/// ```no_run
/// use audiobook_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> audiobook_av::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-of", "json", "-show_streams"])
///     .arg("/books/chapter01.mp3")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<OsString>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<OsString>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::tool_not_found(self.program_name())
        } else {
            Error::tool_failed(self.program_name(), format!("failed to spawn: {e}"))
        }
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program does not exist.
    /// - [`Error::Timeout`] if the process outlives the timeout.
    /// - [`Error::ToolFailed`] if the process exits with a non-zero status
    ///   (message includes stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        self.execute_cancellable(&CancellationToken::new()).await
    }

    /// Like [`ToolCommand::execute`], but the child is killed as soon as
    /// `cancel` fires, returning [`Error::Cancelled`].
    pub async fn execute_cancellable(&self, cancel: &CancellationToken) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = self.command();
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        // Dropping the wait future drops the child, which kills it.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => result,
        };

        let output = match result {
            Ok(output) => output.map_err(|e| {
                Error::tool_failed(
                    program_name.clone(),
                    format!("I/O error waiting for process: {e}"),
                )
            })?,
            Err(_elapsed) => {
                return Err(Error::Timeout {
                    tool: program_name,
                    after: self.timeout,
                })
            }
        };

        let tool_output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(Error::tool_failed(
                program_name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    tool_output.stderr.trim()
                ),
            ));
        }

        Ok(tool_output)
    }

    /// Execute the command, streaming stderr line by line into `on_line`.
    ///
    /// Lines are split on both `\n` and `\r`. Stdout is discarded. If
    /// `cancel` fires while the process runs, the child is killed and
    /// [`Error::Cancelled`] is returned.
    ///
    /// # Errors
    ///
    /// Same as [`ToolCommand::execute`]; the [`Error::ToolFailed`] message
    /// carries the last stderr lines.
    pub async fn execute_with_stderr_callback(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: Option<&CancellationToken>,
    ) -> Result<ExitStatus> {
        let program_name = self.program_name();

        let mut cmd = self.command();
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::tool_failed(program_name.clone(), "stderr was not captured"))?;

        let never = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut lines = SplitLines::new(stderr);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    kill_child(&mut child).await;
                    return Err(Error::Cancelled);
                }
                _ = &mut deadline => {
                    kill_child(&mut child).await;
                    return Err(Error::Timeout { tool: program_name, after: self.timeout });
                }
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            on_line(&line);
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                        None => break,
                    }
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill_child(&mut child).await;
                return Err(Error::Cancelled);
            }
            _ = &mut deadline => {
                kill_child(&mut child).await;
                return Err(Error::Timeout { tool: program_name, after: self.timeout });
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let tail: Vec<String> = tail.into_iter().collect();
            return Err(Error::tool_failed(
                program_name,
                format!("exited with status {}: {}", status, tail.join("\n").trim()),
            ));
        }

        Ok(status)
    }
}

/// Kill the child and reap it.
async fn kill_child(child: &mut Child) {
    #[cfg(feature = "tracing")]
    tracing::debug!("Killing child process {:?}", child.id());

    if let Err(_e) = child.kill().await {
        #[cfg(feature = "tracing")]
        tracing::warn!("Failed to kill child process: {}", _e);
    }
}

/// Line reader that treats both `\n` and `\r` as terminators.
///
/// ffmpeg redraws its statistics line with carriage returns, so a reader
/// that only splits on newlines would see progress only at exit. Empty
/// lines (for example from `\r\n`) are skipped.
pub struct SplitLines<R> {
    reader: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> SplitLines<R> {
    /// Wrap an async reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Read the next non-empty line, or `None` at end of stream.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let rest = self.buf.split_off(pos + 1);
                let mut line = std::mem::replace(&mut self.buf, rest);
                line.pop();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buf);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            let mut chunk = [0u8; 4096];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
