//! Process Executor
//!
//! Spawns long-running processes, runs short commands to completion and
//! polls a probe until it reports success or a deadline passes.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use droid_container_core::{ContainerError, Result};

// About 30 years, the horizon tokio itself uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Render a command for logs and error messages
pub fn command_line<S: AsRef<str>>(command: &[S]) -> String {
    command
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_command<S: AsRef<str>>(command: &[S]) -> Result<(&str, Vec<&str>)> {
    match command.split_first() {
        Some((program, args)) => Ok((program.as_ref(), args.iter().map(AsRef::as_ref).collect())),
        None => Err(ContainerError::ProcessLaunch {
            command: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        }),
    }
}

/// Executes external processes on behalf of the container
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    cancel: CancellationToken,
}

impl ProcessExecutor {
    /// Create an executor with its own cancellation token
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor whose waits stop when `cancel` fires
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Token that interrupts [`schedule_until_true`](Self::schedule_until_true)
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start a process and return as soon as it exists
    ///
    /// The first element of `command` is the executable. Output of the child
    /// is drained in the background and logged.
    pub fn spawn<S: AsRef<str>>(&self, command: &[S]) -> Result<Child> {
        let (program, args) = split_command(command)?;
        debug!("Spawning {}", command_line(command));

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ContainerError::ProcessLaunch {
                command: command_line(command),
                source,
            })?;

        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(name.clone(), "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(name, "stderr", stderr));
        }

        Ok(child)
    }

    /// Run a command to completion and collect its stdout lines
    ///
    /// `env` is laid over the inherited environment. The exit status is
    /// logged but not treated as a failure; callers judge the output.
    pub async fn execute<S: AsRef<str>>(
        &self,
        env: &HashMap<String, String>,
        command: &[S],
    ) -> Result<Vec<String>> {
        let (program, args) = split_command(command)?;
        let line = command_line(command);
        trace!("Executing {}", line);

        let child = Command::new(program)
            .args(&args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ContainerError::ProcessLaunch {
                command: line.clone(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ContainerError::Execution {
                command: line.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{} exited with {}: {}", line, output.status, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Invoke `probe` every `interval` until it returns true or `timeout` passes
    ///
    /// The probe runs immediately, then after each interval. Returns
    /// `Ok(false)` when the deadline passes, without probing at all for a zero
    /// timeout. A failing probe ends the wait with [`ContainerError::Probe`];
    /// cancellation ends it with [`ContainerError::InterruptedWait`].
    pub async fn schedule_until_true<F, Fut>(
        &self,
        mut probe: F,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        if timeout.is_zero() {
            debug!("No time left to poll, giving up immediately");
            return Ok(false);
        }

        let deadline = deadline_after(timeout);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ContainerError::InterruptedWait),
                outcome = probe() => outcome,
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("Probe still running at the deadline, giving up");
                    return Ok(false);
                }
            };

            if outcome.map_err(|e| ContainerError::Probe(Box::new(e)))? {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }

            let nap = interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ContainerError::InterruptedWait),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

/// Deadline `timeout` from now, saturating far in the future
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

async fn forward_output<R>(program: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[{} {}] {}", program, stream, line);
    }
}
