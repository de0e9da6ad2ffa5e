use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Result, TerraformError};

// ─── CommandOutput ────────────────────────────────────────────────────────

/// Captured result of one terraform invocation.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A short failure summary: the last meaningful stderr lines, falling
    /// back to stdout. Terraform prints its diagnostics at the end.
    pub fn error_detail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let tail: Vec<&str> = source
            .lines()
            .filter(|l| !l.trim().is_empty())
            .rev()
            .take(8)
            .collect();
        tail.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

// ─── Subprocess execution ─────────────────────────────────────────────────

/// Run one terraform command to completion in `workdir`.
///
/// stdout and stderr are drained concurrently by background tasks: each line
/// is re-logged through [`log_line`] as it arrives and buffered for the
/// caller. Stdin is closed, so a command that would prompt fails instead of
/// hanging (orchestrated runs always pass `-input=false` / `-auto-approve`).
pub(crate) async fn run_terraform(
    binary: &Path,
    op: &str,
    args: &[String],
    workdir: &Path,
    env: &BTreeMap<String, String>,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(binary);
    cmd.arg(op)
        .args(args)
        .current_dir(workdir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!(
        op,
        workdir = %workdir.display(),
        "running terraform {op} {}",
        args.join(" ")
    );

    let mut child = cmd.spawn().map_err(|e| TerraformError::Spawn(e.to_string()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TerraformError::Spawn("stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TerraformError::Spawn("stderr not captured".into()))?;

    let out_task = tokio::spawn(drain(stdout));
    let err_task = tokio::spawn(drain(stderr));

    let status = child.wait().await?;
    let stdout = out_task.await.unwrap_or_default();
    let stderr = err_task.await.unwrap_or_default();

    Ok(CommandOutput {
        success: status.success(),
        stdout,
        stderr,
    })
}

async fn drain(stream: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut lines = BufReader::new(stream).lines();
    let mut buf = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        log_line(&line);
        buf.push_str(&line);
        buf.push('\n');
    }
    buf
}

/// Re-log a terraform output line at a level matching its content.
fn log_line(line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("error:") {
        tracing::error!("[terraform] {trimmed}");
    } else if lower.contains("warning:") {
        tracing::warn!("[terraform] {trimmed}");
    } else if lower.contains("apply complete!") || lower.contains("destroy complete!") {
        tracing::info!("[terraform] {trimmed}");
    } else {
        tracing::debug!("[terraform] {trimmed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_terraform(dir: &Path, script: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("terraform");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_terraform(
            dir.path(),
            "#!/bin/sh\necho \"Apply complete! Resources: 3 added\"\n",
        );
        let out = run_terraform(&bin, "apply", &[], dir.path(), &BTreeMap::new())
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.stdout.contains("Apply complete!"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_surfaces_stderr_tail() {
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_terraform(
            dir.path(),
            "#!/bin/sh\necho \"Error: bucket already exists\" >&2\nexit 1\n",
        );
        let out = run_terraform(&bin, "apply", &[], dir.path(), &BTreeMap::new())
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.error_detail().contains("bucket already exists"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn env_reaches_the_subprocess() {
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_terraform(dir.path(), "#!/bin/sh\necho \"region=$TF_VAR_region\"\n");
        let env = BTreeMap::from([("TF_VAR_region".to_string(), "us-east-1".to_string())]);
        let out = run_terraform(&bin, "plan", &[], dir.path(), &env)
            .await
            .unwrap();
        assert!(out.stdout.contains("region=us-east-1"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = run_terraform(
            Path::new("/nonexistent/terraform"),
            "init",
            &[],
            dir.path(),
            &BTreeMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TerraformError::Spawn(_)));
    }

    #[test]
    fn error_detail_prefers_stderr() {
        let out = CommandOutput {
            success: false,
            stdout: "noise\n".into(),
            stderr: "Error: broken\n".into(),
        };
        assert_eq!(out.error_detail(), "Error: broken");
    }
}
