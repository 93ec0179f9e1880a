// src/sys/command.rs

use std::ffi::OsStr;
use std::io;
use std::process::Output;
use tokio::process::Command;

use crate::error::{DeployError, DeployResult};

/// Runs `program` to completion and hands back its raw output, whatever the exit status.
pub async fn run<I, S>(program: &str, args: I) -> DeployResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_with_env(program, args, &[]).await
}

pub async fn run_with_env<I, S>(program: &str, args: I, envs: &[(&str, &str)]) -> DeployResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .output()
        .await
        .map_err(|e| DeployError::Spawn { program: program.to_string(), source: e })
}

/// Like [`run`], but a non-zero exit becomes [`DeployError::CommandFailed`].
pub async fn run_checked<I, S>(program: &str, args: I) -> DeployResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program, args).await?;
    ensure_success(program, output)
}

pub fn ensure_success(program: &str, output: Output) -> DeployResult<Output> {
    if output.status.success() {
        return Ok(output);
    }
    Err(DeployError::CommandFailed {
        program: program.to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// True when the program could not be spawned because it isn't installed.
pub fn is_missing_program(err: &DeployError) -> bool {
    matches!(err, DeployError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_checked_success() {
        let output = run_checked("sh", ["-c", "printf hello"]).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello");
    }

    #[tokio::test]
    async fn test_run_checked_reports_exit_code_and_stderr() {
        let err = run_checked("sh", ["-c", "echo broken >&2; exit 3"]).await.unwrap_err();
        match err {
            DeployError::CommandFailed { program, code, stderr } => {
                assert_eq!(program, "sh");
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_detected() {
        let err = run("nginx-deploy-definitely-not-installed", ["--version"]).await.unwrap_err();
        assert!(is_missing_program(&err));
    }

    #[tokio::test]
    async fn test_env_is_passed_through() {
        let output = run_with_env("sh", ["-c", "printf \"$GREETING\""], &[("GREETING", "hi")])
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hi");
    }
}
