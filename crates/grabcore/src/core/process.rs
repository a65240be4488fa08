//! Process execution utilities with timeout support
//!
//! Provides helpers for running short-lived external processes (yt-dlp probe,
//! curl-impersonate, `--version` checks) with configurable timeouts so a hung
//! process never blocks a request.

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::core::error::AppError;

/// Timeout for `--version` checks
pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Run an async Command with a timeout.
///
/// The child is killed when the deadline passes. Returns the process Output on
/// success, or an AppError on timeout/IO failure.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, AppError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(AppError::Io(e)),
        Err(_) => Err(AppError::Timeout(timeout.as_secs())),
    }
}

/// Returns the first line of `<bin> --version`, or None if the tool cannot be run.
pub async fn tool_version(bin: &str) -> Option<String> {
    let output = run_with_timeout(Command::new(bin).arg("--version"), VERSION_CHECK_TIMEOUT)
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tool_version_missing_binary() {
        assert!(tool_version("definitely-not-a-real-binary-grab").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_with_timeout_kills_slow_process() {
        let result = run_with_timeout(Command::new("sleep").arg("5"), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_with_timeout_collects_output() {
        let output = run_with_timeout(Command::new("echo").arg("hello"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }
}
