//! Fetch strategy executor.
//!
//! Runs yt-dlp with the primary (native impersonation) strategy and, if that
//! ends with a non-success status, once more with the fallback strategy
//! (extractor-argument impersonation). Each run gets its own progress monitor
//! on stderr. The executor never returns an error: it always produces a
//! [`FetchOutcome`] with a terminal status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::core::config::Config;
use crate::core::process::tool_version;
use crate::download::artifact::locate_artifact;
use crate::download::builder::{Impersonation, YtDlpCommand};
use crate::download::monitor::{MonitorHandle, MonitorReport};
use crate::download::request::MediaKind;
use crate::download::sink::{notify, UpdateSink};

/// Longest stderr excerpt carried in a failure cause
const MAX_CAUSE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Strategy {
    Primary,
    Fallback,
}

impl Strategy {
    pub fn impersonation(self) -> Impersonation {
        match self {
            Strategy::Primary => Impersonation::Native,
            Strategy::Fallback => Impersonation::ExtractorArgs,
        }
    }

    fn heading(self, title: &str) -> String {
        match self {
            Strategy::Primary => format!("Downloading: {}", title),
            Strategy::Fallback => format!("Downloading (fallback): {}", title),
        }
    }
}

/// Executor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    RunningPrimary,
    PrimaryFailed,
    RunningFallback,
    Success,
    Failed,
}

/// What happened to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEvent {
    /// Launch the next attempt
    Start,
    Succeeded,
    /// Non-success exit; a fallback may still help
    Failed,
    /// Failure the fallback cannot fix
    FailedTerminal,
}

impl FetchState {
    /// Next state, or `None` if `event` makes no sense here.
    pub fn next(self, event: FetchEvent) -> Option<FetchState> {
        use FetchEvent as E;
        use FetchState as S;

        match (self, event) {
            (S::Idle, E::Start) => Some(S::RunningPrimary),
            (S::RunningPrimary, E::Succeeded) => Some(S::Success),
            (S::RunningPrimary, E::Failed) => Some(S::PrimaryFailed),
            (S::RunningPrimary, E::FailedTerminal) => Some(S::Failed),
            (S::PrimaryFailed, E::Start) => Some(S::RunningFallback),
            (S::RunningFallback, E::Succeeded) => Some(S::Success),
            (S::RunningFallback, E::Failed | E::FailedTerminal) => Some(S::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FetchState::Success | FetchState::Failed)
    }

    pub fn running(self) -> Option<Strategy> {
        match self {
            FetchState::RunningPrimary => Some(Strategy::Primary),
            FetchState::RunningFallback => Some(Strategy::Fallback),
            _ => None,
        }
    }
}

/// Everything the executor needs to know about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub url: String,
    /// Where yt-dlp should write; the artifact may end up with another extension
    pub output_path: PathBuf,
    pub media_kind: MediaKind,
    /// yt-dlp format id for video, audio quality (e.g. `320K`) for audio
    pub format_id: String,
    pub container: String,
    /// Shown in progress updates
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Arguments did not validate
    #[error("invalid command: {0}")]
    Invalid(String),

    /// The binary could not be started
    #[error("could not start yt-dlp: {0}")]
    Launch(String),

    #[error("yt-dlp exited with {}", describe_exit(.code, .stderr_tail))]
    Exit { code: Option<i32>, stderr_tail: Option<String> },

    #[error("yt-dlp timed out after {0}s")]
    TimedOut(u64),

    /// Exit 0 but no file at the expected path or any alternate extension
    #[error("yt-dlp finished but wrote no file")]
    NoOutput,
}

impl FetchFailure {
    /// Whether running the other strategy could still help.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, FetchFailure::Exit { .. } | FetchFailure::TimedOut(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FetchFailure::Exit { code, .. } => *code,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Success { artifact: PathBuf },
    Failed { cause: FetchFailure },
}

/// Record of one subprocess run.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub strategy: Strategy,
    pub command_args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub monitor: MonitorReport,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: FetchStatus,
    /// One or two entries, primary first
    pub attempts: Vec<FetchAttempt>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success { .. })
    }
}

/// Seam between the orchestrator and the subprocess machinery.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, plan: &FetchPlan, sink: Arc<dyn UpdateSink>) -> FetchOutcome;
}

/// yt-dlp backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchExecutor {
    ytdlp_bin: String,
    /// aria2c binary when the accelerator is enabled and installed
    accelerator: Option<String>,
    cookies_file: Option<PathBuf>,
    proxy: Option<String>,
    timeout: Duration,
    drain: Duration,
}

impl FetchExecutor {
    /// Build from config with an already known accelerator.
    pub fn new(config: &Config, accelerator: Option<String>) -> Self {
        Self {
            ytdlp_bin: config.ytdlp_bin.clone(),
            accelerator,
            cookies_file: config.existing_cookies_file().map(Path::to_path_buf),
            proxy: config.proxy.clone(),
            timeout: config.fetch_timeout(),
            drain: config.monitor_drain(),
        }
    }

    /// Build from config, probing for aria2c when the accelerator is enabled.
    pub async fn detect(config: &Config) -> Self {
        let accelerator = if config.use_accelerator {
            match tool_version(&config.aria2c_bin).await {
                Some(_) => Some(config.aria2c_bin.clone()),
                None => {
                    log::warn!("aria2c not available, using built-in downloader");
                    None
                }
            }
        } else {
            None
        };
        Self::new(config, accelerator)
    }

    pub fn uses_accelerator(&self) -> bool {
        self.accelerator.is_some()
    }

    /// Argument list for `strategy`, URL last.
    pub fn command_args(&self, plan: &FetchPlan, strategy: Strategy) -> Result<Vec<String>, FetchFailure> {
        let cmd = YtDlpCommand::new(&plan.url).output(&plan.output_path);
        let cmd = match plan.media_kind {
            MediaKind::Video => cmd.video(&plan.format_id, &plan.container),
            MediaKind::Audio => cmd.audio(&plan.container, &plan.format_id),
        };
        cmd.impersonation(strategy.impersonation())
            .accelerator(self.accelerator.as_deref())
            .cookies(self.cookies_file.as_deref())
            .proxy(self.proxy.as_deref())
            .build()
            .map(|args| args.into_args())
            .map_err(|e| FetchFailure::Invalid(e.to_string()))
    }

    async fn run_attempt(
        &self,
        plan: &FetchPlan,
        strategy: Strategy,
        sink: &Arc<dyn UpdateSink>,
    ) -> (FetchAttempt, Result<PathBuf, FetchFailure>) {
        let started_at = Utc::now();
        let mut attempt = FetchAttempt {
            strategy,
            command_args: Vec::new(),
            started_at,
            exit_code: None,
            monitor: MonitorReport::default(),
        };

        let args = match self.command_args(plan, strategy) {
            Ok(args) => args,
            Err(e) => return (attempt, Err(e)),
        };
        attempt.command_args = args.clone();

        log::info!("Running yt-dlp ({}) for {}", strategy, plan.url);
        log::debug!("{} {}", self.ytdlp_bin, args.join(" "));

        let mut child = match Command::new(&self.ytdlp_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to start {}: {}", self.ytdlp_bin, e);
                return (attempt, Err(FetchFailure::Launch(e.to_string())));
            }
        };

        let monitor = child
            .stderr
            .take()
            .map(|stderr| MonitorHandle::spawn(stderr, Arc::clone(sink), strategy.heading(&plan.title)));

        let waited: Result<ExitStatus, FetchFailure> = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(FetchFailure::Exit {
                code: None,
                stderr_tail: Some(e.to_string()),
            }),
            Err(_) => {
                log::warn!("yt-dlp ({}) timed out after {:?}, killing", strategy, self.timeout);
                if let Err(e) = child.kill().await {
                    log::error!("Failed to kill yt-dlp: {}", e);
                }
                Err(FetchFailure::TimedOut(self.timeout.as_secs()))
            }
        };

        if let Some(monitor) = monitor {
            attempt.monitor = monitor.stop(self.drain).await;
        }

        let status = match waited {
            Ok(status) => status,
            Err(failure) => return (attempt, Err(failure)),
        };
        attempt.exit_code = status.code();

        if !status.success() {
            let stderr_tail = attempt.monitor.error_hint().map(|hint| truncate(hint, MAX_CAUSE_CHARS));
            log::warn!(
                "yt-dlp ({}) exited with {:?}: {}",
                strategy,
                status.code(),
                stderr_tail.as_deref().unwrap_or("no stderr")
            );
            return (
                attempt,
                Err(FetchFailure::Exit {
                    code: status.code(),
                    stderr_tail,
                }),
            );
        }

        match locate_artifact(&plan.output_path).await {
            Some(path) => (attempt, Ok(path)),
            None => {
                log::error!("yt-dlp ({}) exited 0 but {} is missing", strategy, plan.output_path.display());
                (attempt, Err(FetchFailure::NoOutput))
            }
        }
    }
}

#[async_trait]
impl Fetcher for FetchExecutor {
    async fn fetch(&self, plan: &FetchPlan, sink: Arc<dyn UpdateSink>) -> FetchOutcome {
        let mut state = FetchState::Idle;
        let mut attempts = Vec::with_capacity(2);
        let mut last_failure = FetchFailure::Launch("no attempt was made".to_string());

        while let Some(next) = state.next(FetchEvent::Start) {
            state = next;
            let Some(strategy) = state.running() else { break };

            if strategy == Strategy::Fallback {
                notify(sink.as_ref(), "⚠️ First method failed, retrying with fallback…").await;
            }

            let (attempt, result) = self.run_attempt(plan, strategy, &sink).await;
            attempts.push(attempt);

            let event = match result {
                Ok(artifact) => {
                    log::info!("yt-dlp ({}) produced {}", strategy, artifact.display());
                    return FetchOutcome {
                        status: FetchStatus::Success { artifact },
                        attempts,
                    };
                }
                Err(failure) if failure.allows_fallback() => {
                    last_failure = failure;
                    FetchEvent::Failed
                }
                Err(failure) => {
                    last_failure = failure;
                    FetchEvent::FailedTerminal
                }
            };

            state = state.next(event).unwrap_or(FetchState::Failed);
            if state.is_terminal() {
                break;
            }
        }

        FetchOutcome {
            status: FetchStatus::Failed { cause: last_failure },
            attempts,
        }
    }
}

fn describe_exit(code: &Option<i32>, stderr_tail: &Option<String>) -> String {
    let mut text = match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    };
    if let Some(tail) = stderr_tail {
        text.push_str(": ");
        text.push_str(tail);
    }
    text
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}
