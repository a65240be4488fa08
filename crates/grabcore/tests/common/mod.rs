//! Shared fixtures for grabcore integration tests
//!
//! - [`MockFetcher`]: writes a file of a chosen size or reports a failure
//! - [`MockUploader`]: records what it was asked to send
//! - helpers for configs, sessions and fake yt-dlp scripts

#![allow(dead_code)]

use async_trait::async_trait;
use grabcore::download::executor::{FetchAttempt, FetchFailure, FetchOutcome, FetchPlan, FetchStatus, Fetcher, Strategy};
use grabcore::download::monitor::MonitorReport;
use grabcore::download::sink::UpdateSink;
use grabcore::download::upload::{DeliveryMode, Uploader};
use grabcore::storage::session::{Session, SessionStore};
use grabcore::Config;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tokio::sync::Mutex;

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = pretty_env_logger::try_init();
    });
}

pub const REQUESTER: i64 = 424242;
pub const SESSION: &str = "abc12";

/// Config rooted in `dir`, with no cookies and short timeouts.
pub fn test_config(dir: &Path) -> Config {
    Config {
        download_dir: dir.to_path_buf(),
        cookies_file: None,
        use_accelerator: false,
        fetch_timeout_secs: 30,
        monitor_drain_ms: 500,
        ..Config::default()
    }
}

pub async fn store_session(config: &Config, title: &str, custom_name: Option<&str>) -> Session {
    let session = Session::new(
        REQUESTER,
        SESSION,
        "https://example.com/watch?v=1",
        custom_name.map(str::to_string),
        serde_json::json!({ "title": title, "duration": 60 }),
    );
    SessionStore::new(&config.download_dir).put(&session).await.unwrap();
    session
}

pub fn session_file(config: &Config) -> PathBuf {
    config.download_dir.join(format!("{}{}.json", REQUESTER, SESSION))
}

/// Directories under `root`, i.e. working areas that were not cleaned up.
pub fn leftover_dirs(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Write this many bytes to the plan's output path
    Produce(u64),
    Fail(FetchFailure),
}

pub struct MockFetcher {
    behavior: MockBehavior,
    pub plans: Mutex<Vec<FetchPlan>>,
}

impl MockFetcher {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            plans: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, plan: &FetchPlan, sink: Arc<dyn UpdateSink>) -> FetchOutcome {
        self.plans.lock().await.push(plan.clone());
        let _ = sink.update("mock progress").await;

        let attempt = FetchAttempt {
            strategy: Strategy::Primary,
            command_args: vec![plan.url.clone()],
            started_at: chrono::Utc::now(),
            exit_code: Some(0),
            monitor: MonitorReport::default(),
        };

        let status = match &self.behavior {
            MockBehavior::Produce(size) => {
                let file = std::fs::File::create(&plan.output_path).unwrap();
                file.set_len(*size).unwrap();
                FetchStatus::Success {
                    artifact: plan.output_path.clone(),
                }
            }
            MockBehavior::Fail(cause) => FetchStatus::Failed { cause: cause.clone() },
        };

        FetchOutcome {
            status,
            attempts: vec![attempt],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub requester_id: i64,
    pub path: PathBuf,
    pub title: String,
    pub mode: DeliveryMode,
    /// Whether the file was on disk while the upload ran
    pub existed: bool,
}

pub struct MockUploader {
    fail: bool,
    pub calls: Mutex<Vec<UploadCall>>,
}

impl MockUploader {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, requester_id: i64, path: &Path, title: &str, mode: DeliveryMode) -> Result<(), String> {
        self.calls.lock().await.push(UploadCall {
            requester_id,
            path: path.to_path_buf(),
            title: title.to_string(),
            mode,
            existed: path.is_file(),
        });
        if self.fail {
            Err("Bad Request: file too big".to_string())
        } else {
            Ok(())
        }
    }
}

/// Fake yt-dlp: exits `primary` when called with `--impersonate`, `fallback`
/// otherwise. On exit 0 it writes a small file at the `-o` path.
/// Each call appends `primary` or `fallback` to `calls.log` next to the script.
#[cfg(unix)]
pub fn fake_ytdlp(dir: &Path, primary: i32, fallback: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin_dir = dir.join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();
    let path = bin_dir.join("yt-dlp");
    let body = format!(
        r#"#!/bin/sh
out=""
prev=""
mode=fallback
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  [ "$a" = "--impersonate" ] && mode=primary
  prev="$a"
done
echo "$mode" >> "{log}"
if [ "$mode" = primary ]; then code={primary}; else code={fallback}; fi
echo "[download]  10.0% of 2.00KiB at 1.00KiB/s ETA 00:02" >&2
if [ "$code" -ne 0 ]; then
  echo "ERROR: [generic] Unable to download webpage: HTTP Error 403: Forbidden" >&2
  exit "$code"
fi
echo "[download] 100.0% of 2.00KiB at 1.00KiB/s ETA 00:00" >&2
head -c 2048 /dev/zero > "$out"
exit 0
"#,
        log = bin_dir.join("calls.log").display(),
        primary = primary,
        fallback = fallback,
    );
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
pub fn fake_calls(script: &Path) -> Vec<String> {
    let log = script.with_file_name("calls.log");
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
