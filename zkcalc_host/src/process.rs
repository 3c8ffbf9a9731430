//! Out-of-process toolchain and prover invocations.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::{process::Stdio, time::Duration};
use tokio::process::Command;

#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Everything the child said, stderr first.
    pub fn diagnostics(&self) -> String {
        let mut text = self.stderr.trim_end().to_string();
        if !self.stdout.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(self.stdout.trim_end());
        }
        match self.exit_code {
            Some(code) => format!("{text}\n(exit code {code})"),
            None => format!("{text}\n(terminated by signal)"),
        }
    }
}

/// Runs `cmd` to completion. The child is killed if `timeout` elapses first.
pub async fn run(cmd: &mut Command, what: &str, timeout: Duration) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    tracing::debug!("running {what}: {:?}", cmd.as_std());
    let child = cmd
        .spawn()
        .map_err(|e| Error::ExecutionFailed(format!("failed to start {what}: {e}")))?;
    // dropping the wait future on timeout drops the child, which kills it
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| Error::Timeout {
            what: what.to_string(),
            timeout,
        })??;
    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    })
}

/// Parses the JSON object embedded in `stdout` among log lines: the span from
/// the first line starting with `{` to the last line ending with `}`.
pub fn extract_json_payload<T: DeserializeOwned>(stdout: &str) -> Result<T> {
    let lines: Vec<&str> = stdout.lines().collect();
    let first = lines.iter().position(|l| l.trim_start().starts_with('{'));
    let last = lines.iter().rposition(|l| l.trim_end().ends_with('}'));
    let (first, last) = match (first, last) {
        (Some(first), Some(last)) if first <= last => (first, last),
        _ => {
            return Err(Error::OutputParseError(
                "no JSON object found in process output".to_string(),
            ))
        }
    };
    let span = lines[first..=last].join("\n");
    serde_json::from_str(&span)
        .map_err(|e| Error::OutputParseError(format!("invalid JSON payload: {e}")))
}
