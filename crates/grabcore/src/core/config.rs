//! Runtime configuration
//!
//! A single [`Config`] value is built once at startup and handed to every component
//! that needs it (executor, orchestrator, probe, resolver). Nothing reads the
//! environment after that point.
//!
//! Sources, later ones win:
//! 1. built-in defaults ([`Config::default`])
//! 2. an optional TOML file (`grab.toml` or the path given with `--config`)
//! 3. environment variables prefixed with `GRAB_` (e.g. `GRAB_YTDLP_BIN=/usr/local/bin/yt-dlp`)

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::AppResult;

/// Default TOML file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "grab.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "GRAB_";

/// Telegram local Bot API limit, 2000 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2000 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// yt-dlp binary name or path
    pub ytdlp_bin: String,
    /// aria2c binary name or path, used as external downloader when present
    pub aria2c_bin: String,
    /// Set to false to never use aria2c even if it is installed
    pub use_accelerator: bool,
    /// Netscape cookies file passed with `--cookies` when it exists
    pub cookies_file: Option<PathBuf>,
    /// Upstream proxy passed with `--proxy`
    pub proxy: Option<String>,
    /// Root for session files and per-request working areas
    pub download_dir: PathBuf,
    /// Artifacts larger than this are not uploaded
    pub max_upload_bytes: u64,
    /// Deadline for a single fetch attempt
    pub fetch_timeout_secs: u64,
    /// How long the monitor may keep draining stderr after the process exited
    pub monitor_drain_ms: u64,
    /// Deadline for the `yt-dlp -j` probe
    pub probe_timeout_secs: u64,
    /// Redirect resolver binary (curl-impersonate)
    pub resolver_bin: String,
    /// Deadline for the redirect resolver
    pub resolver_timeout_secs: u64,
    /// Case-insensitive URL fragments that route a link through the redirect resolver
    pub redirect_patterns: Vec<String>,
    /// Session files older than this are swept
    pub session_ttl_secs: u64,
    /// Interval between session sweeps
    pub sweep_interval_secs: u64,
    /// Log file path
    pub log_file: PathBuf,
    /// Log level: error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".to_string(),
            aria2c_bin: "aria2c".to_string(),
            use_accelerator: true,
            cookies_file: Some(PathBuf::from("cookies.txt")),
            proxy: None,
            download_dir: PathBuf::from("./DOWNLOADS"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fetch_timeout_secs: 3600,
            monitor_drain_ms: 2000,
            probe_timeout_secs: 120,
            resolver_bin: "curl-impersonate-chrome".to_string(),
            resolver_timeout_secs: 20,
            redirect_patterns: vec![
                "get_stream".to_string(),
                "getstream".to_string(),
                "okcdn".to_string(),
                "redirect".to_string(),
            ],
            session_ttl_secs: 6 * 3600,
            sweep_interval_secs: 15 * 60,
            log_file: PathBuf::from("grab.log"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and `GRAB_*` env vars.
    ///
    /// When `path` is `None` the default `grab.toml` is used if present; a missing
    /// file is not an error.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let file = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config: Config = Self::figment(&file).extract()?;
        Ok(config.expanded())
    }

    /// The provider chain, exposed so tests can layer extra values on top.
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Expand `~` in every path field.
    pub fn expanded(mut self) -> Self {
        self.download_dir = expand_path(&self.download_dir);
        self.log_file = expand_path(&self.log_file);
        self.cookies_file = self.cookies_file.as_deref().map(expand_path);
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn monitor_drain(&self) -> Duration {
        Duration::from_millis(self.monitor_drain_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Cookies file, only if it actually exists on disk
    pub fn existing_cookies_file(&self) -> Option<&Path> {
        self.cookies_file.as_deref().filter(|p| p.is_file())
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
