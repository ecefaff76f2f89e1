//! Invokes the external Salesforce CLI binary and parses its JSON output.
//!
//! Uses `tokio::process::Command`'s native argv vector — arguments are
//! never joined into a shell string, so there is no shell-quoting surface
//! to get wrong. `kill_on_drop(false)` is deliberate: an in-flight CLI
//! invocation is allowed to finish even if its caller stops waiting on it,
//! so the org is never left mid-mutation.

use crate::error::{Error, Result};
use serde_json::Value;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Output past this size is truncated rather than buffered without bound.
const MAX_CAPTURE_BYTES: usize = 100 * 1024 * 1024;

pub struct CliExecutor {
    cli_path: String,
}

#[derive(Debug, Clone)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub status_code: Option<i32>,
}

impl CliExecutor {
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    /// Runs the CLI with `args` in `cwd`, capturing stdout/stderr.
    /// Returns the raw output even on a non-zero exit code — callers that
    /// expect JSON should prefer stdout regardless of the exit status,
    /// since the CLI routinely reports structured errors there.
    pub async fn run(&self, args: &[&str], cwd: &str) -> Result<CliOutput> {
        let mut child = Command::new(&self.cli_path)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| Error::Cli(format!("failed to spawn {}: {e}", self.cli_path)))?;

        let mut stdout_pipe = child.stdout.take().expect("piped stdout");
        let mut stderr_pipe = child.stderr.take().expect("piped stderr");

        let (stdout_result, stderr_result, status) = tokio::join!(
            read_capped(&mut stdout_pipe),
            read_capped(&mut stderr_pipe),
            child.wait(),
        );

        let status = status.map_err(|e| Error::Cli(format!("failed to wait on {}: {e}", self.cli_path)))?;
        Ok(CliOutput {
            stdout: stdout_result?,
            stderr: stderr_result?,
            status_code: status.code(),
        })
    }

    /// Runs the CLI and parses stdout as JSON, preferring stdout even on a
    /// non-zero exit. Enriches the error message with both
    /// stdout and stderr tails when parsing fails.
    pub async fn run_json(&self, args: &[&str], cwd: &str) -> Result<Value> {
        let output = self.run(args, cwd).await?;
        match serde_json::from_str::<Value>(&output.stdout) {
            Ok(value) => Ok(value),
            Err(parse_err) => Err(Error::Cli(format!(
                "{parse_err} (exit={:?}); stdout tail: {}; stderr tail: {}",
                output.status_code,
                tail(&output.stdout, 500),
                tail(&output.stderr, 500),
            ))),
        }
    }

    /// `sf org display --json` — the org identity source used during
    /// startup and on token refresh.
    pub async fn display_org(&self, cwd: &str, target_org: Option<&str>) -> Result<Value> {
        let mut args = vec!["org", "display", "--json"];
        if let Some(alias) = target_org {
            args.push("--target-org");
            args.push(alias);
        }
        let parsed = self.run_json(&args, cwd).await?;
        parsed
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Cli("display org response missing result".into()))
    }
}

async fn read_capped(pipe: &mut (impl tokio::io::AsyncRead + Unpin)) -> Result<String> {
    let mut buf = Vec::new();
    pipe.take(MAX_CAPTURE_BYTES as u64)
        .read_to_end(&mut buf)
        .await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn tail(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[s.len() - n..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_json_surfaces_parse_errors_with_context() {
        let exec = CliExecutor::new("echo");
        let result = exec.run_json(&["not json"], ".").await;
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("stdout tail"));
    }

    #[tokio::test]
    async fn run_json_parses_valid_output() {
        let exec = CliExecutor::new("echo");
        let result = exec.run_json(&[r#"{"result": {"id": "1"}}"#], ".").await;
        assert_eq!(result.unwrap()["result"]["id"], "1");
    }
}
