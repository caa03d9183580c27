//! Untrusted code execution boundary.
//!
//! `PythonProcessRunner` hands the source to a fresh interpreter process on
//! stdin. It captures output but adds no sandboxing: the child runs with the
//! server's privileges.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::TutorError;

/// What one run produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOutcome {
    pub stdout: String,
    /// Human-readable fault description, `None` when the code ran cleanly.
    pub fault: Option<String>,
}

impl RunOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            fault: None,
        }
    }

    pub fn faulted(description: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            fault: Some(description.into()),
        }
    }

    pub fn into_result(self) -> Result<String, TutorError> {
        match self.fault {
            Some(description) => Err(TutorError::ExecutionFault(description)),
            None => Ok(self.stdout),
        }
    }
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `source` in an empty namespace and capture its standard output.
    async fn run(&self, source: &str) -> RunOutcome;
}

/// Precedes the fault text on stderr.
const FAULT_MARKER: &str = "<<exercise-tutor fault>>";

/// Reads the learner source from stdin and `exec`s it against a fresh empty
/// dict, so `__name__` resolves to `builtins` and a `__main__` guard is skipped.
/// An exception is reported as its `str()` after `FAULT_MARKER`.
const BOOTSTRAP: &str = "\
import sys
source = sys.stdin.buffer.read().decode('utf-8')
try:
    exec(source, {})
except Exception as e:
    sys.stdout.flush()
    sys.stderr.write('<<exercise-tutor fault>>' + str(e))
    sys.exit(1)
";

pub struct PythonProcessRunner {
    python_bin: String,
    timeout: Duration,
}

impl PythonProcessRunner {
    pub fn new(python_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout,
        }
    }

    async fn run_child(&self, source: &str) -> std::io::Result<Option<std::process::Output>> {
        // -I: isolated mode, no user site-packages or PYTHON* env vars.
        let mut child = Command::new(&self.python_bin)
            .args(["-I", "-c", BOOTSTRAP])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes()).await?;
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl CodeRunner for PythonProcessRunner {
    async fn run(&self, source: &str) -> RunOutcome {
        let output = match self.run_child(source).await {
            Ok(Some(output)) => output,
            Ok(None) => {
                warn!("Code execution exceeded {}s and was killed", self.timeout.as_secs());
                return RunOutcome::faulted(format!(
                    "execution timed out after {} seconds",
                    self.timeout.as_secs()
                ));
            }
            Err(e) => {
                warn!("Failed to run {}: {}", self.python_bin, e);
                return RunOutcome::faulted(format!("could not start {}: {}", self.python_bin, e));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            debug!("Code ran cleanly, {} bytes of output", stdout.len());
            return RunOutcome::success(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let description = fault_description(&stderr).unwrap_or_else(|| match output.status.code() {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        });
        RunOutcome {
            stdout,
            fault: Some(description),
        }
    }
}

/// Text after the last fault marker, verbatim and possibly empty.
///
/// Without a marker the interpreter died on its own; its last stderr line is used.
fn fault_description(stderr: &str) -> Option<String> {
    if let Some(at) = stderr.rfind(FAULT_MARKER) {
        return Some(stderr[at + FAULT_MARKER.len()..].to_string());
    }
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
