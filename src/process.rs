//! Bounded execution of external programs.
//!
//! Every subprocess goes through [`Invocation`], which enforces a timeout,
//! honours an optional [`CancelToken`], and separates "not installed",
//! "timed out" and "exited non-zero" into distinct errors.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{PilotError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared flag that aborts a running [`Invocation`] when set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so later invocations run normally.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Trimmed stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// A single external program call.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    timeout: Duration,
    cancel: Option<CancelToken>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout,
            cancel: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion. A non-zero exit is returned as output, not an error.
    ///
    /// The timeout covers both the process and the collection of its output,
    /// so a background process still holding the pipes cannot stall the call.
    pub fn run(&self) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        self.check_limits(started)?;
        debug!(program = %self.program, args = ?self.args, "spawning");
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PilotError::ToolMissing {
                program: self.program.clone(),
                source: e,
            },
            _ => PilotError::Io(e),
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child, started)?;
        let output = ProcessOutput {
            status,
            stdout: self.collect(&stdout, started)?,
            stderr: self.collect(&stderr, started)?,
        };
        debug!(program = %self.program, status = %output.status, "finished");
        Ok(output)
    }

    /// Run to completion and treat a non-zero exit as [`PilotError::ToolFailed`].
    pub fn run_checked(&self) -> Result<ProcessOutput> {
        let output = self.run()?;
        if output.success() {
            Ok(output)
        } else {
            Err(PilotError::ToolFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                detail: output.diagnostic(),
            })
        }
    }

    fn wait(&self, child: &mut Child, started: Instant) -> Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Err(e) = self.check_limits(started) {
                kill(child);
                return Err(e);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn collect(&self, pipe: &Receiver<String>, started: Instant) -> Result<String> {
        loop {
            match pipe.recv_timeout(POLL_INTERVAL) {
                Ok(text) => return Ok(text),
                Err(RecvTimeoutError::Disconnected) => return Ok(String::new()),
                Err(RecvTimeoutError::Timeout) => self.check_limits(started)?,
            }
        }
    }

    fn check_limits(&self, started: Instant) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            warn!(program = %self.program, "cancelled");
            return Err(PilotError::Cancelled(self.program.clone()));
        }
        if started.elapsed() >= self.timeout {
            warn!(program = %self.program, timeout = ?self.timeout, "timed out");
            return Err(PilotError::Timeout {
                program: self.program.clone(),
                after: self.timeout,
            });
        }
        Ok(())
    }
}

fn kill(child: &mut Child) {
    // The process may already have exited between the poll and the kill.
    let _ = child.kill();
    let _ = child.wait();
}

/// Read `pipe` to EOF on a background thread and deliver the text once.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SHORT: Duration = Duration::from_secs(10);

    #[test]
    fn captures_stdout_and_status() {
        let out = Invocation::new("sh", SHORT)
            .args(["-c", "echo hello; echo oops >&2; exit 3"])
            .run()
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.diagnostic(), "oops");
    }

    #[test]
    fn run_checked_reports_failure_detail() {
        let err = Invocation::new("sh", SHORT)
            .args(["-c", "echo broken >&2; exit 1"])
            .run_checked()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolFailed);
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn missing_program_is_tool_missing() {
        let err = Invocation::new("definitely-not-a-real-program-xyz", SHORT)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolMissing);
    }

    #[test]
    fn slow_program_times_out() {
        let started = Instant::now();
        let err = Invocation::new("sleep", Duration::from_millis(100))
            .arg("5")
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn background_process_holding_pipes_times_out() {
        let started = Instant::now();
        let err = Invocation::new("sh", Duration::from_secs(1))
            .args(["-c", "sleep 6 & echo hi"])
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn reset_token_allows_later_runs() {
        let token = CancelToken::new();
        token.cancel();
        token.reset();
        let out = Invocation::new("sh", SHORT)
            .args(["-c", "echo again"])
            .cancel_token(token)
            .run_checked()
            .unwrap();
        assert_eq!(out.stdout.trim(), "again");
    }

    #[test]
    fn cancelled_before_exit() {
        let token = CancelToken::new();
        token.cancel();
        let err = Invocation::new("sleep", SHORT)
            .arg("5")
            .cancel_token(token)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let out = Invocation::new("ls", SHORT)
            .current_dir(dir.path())
            .run_checked()
            .unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }
}
