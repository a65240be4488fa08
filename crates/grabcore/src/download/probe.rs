//! URL probing: `yt-dlp -j` metadata, session creation and the quality menu.

use rand::RngExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::core::config::Config;
use crate::core::error::{AppError, AppResult};
use crate::core::process::run_with_timeout;
use crate::core::utils::{format_bytes, format_duration_ms};
use crate::download::request::{encode_callback, MediaKind, MAX_CALLBACK_DATA_BYTES};
use crate::storage::session::{Session, SessionStore};

/// Length of generated session tokens
pub const SESSION_TOKEN_LEN: usize = 5;

/// Audio qualities always offered, as (label, yt-dlp audio quality)
pub const AUDIO_QUALITIES: &[(&str, &str)] = &[("64k", "64K"), ("128k", "128K"), ("320k", "320K")];

/// Callback data of the button that dismisses the menu
pub const CLOSE_CALLBACK: &str = "close";

const TOKEN_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random alphanumeric session token.
pub fn session_token() -> String {
    let mut rng = rand::rng();
    (0..SESSION_TOKEN_LEN)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Split `url | custom name` as typed by the user.
///
/// Returns `None` when the text does not start with an http(s) link.
pub fn parse_user_input(text: &str) -> Option<(String, Option<String>)> {
    let mut parts = text.splitn(2, '|').map(str::trim);
    let url = parts.next().filter(|u| u.starts_with("http://") || u.starts_with("https://"))?;
    let custom_name = parts.next().filter(|n| !n.is_empty()).map(str::to_string);
    Some((url.to_string(), custom_name))
}

/// One button of the quality menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityOption {
    pub label: String,
    pub callback_data: String,
}

impl QualityOption {
    pub fn kind(&self) -> Option<MediaKind> {
        self.callback_data.split('|').next()?.parse().ok()
    }
}

#[derive(Debug, Clone)]
struct VideoFormat {
    selector: String,
    ext: String,
    height: u64,
    size: u64,
}

/// Buttons for a probed URL: a 1080p entry when there is one, the best
/// (tallest) video, then the fixed MP3 qualities.
///
/// Video-only formats are paired with the first audio-only format.
pub fn quality_options(metadata: &Value, session_id: &str) -> Vec<QualityOption> {
    let formats = metadata
        .get("formats")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let best_audio = formats
        .iter()
        .find(|f| str_field(f, "vcodec") == Some("none") && str_field(f, "acodec").is_some_and(|a| a != "none"))
        .and_then(|f| str_field(f, "format_id"));

    let mut hd: Option<VideoFormat> = None;
    let mut best: Option<VideoFormat> = None;

    for f in formats {
        if str_field(f, "vcodec") == Some("none") {
            continue;
        }
        let Some(format_id) = str_field(f, "format_id") else { continue };

        let selector = match best_audio {
            Some(audio) if str_field(f, "acodec") == Some("none") => format!("{}+{}", format_id, audio),
            _ => format_id.to_string(),
        };
        let height = f.get("height").and_then(Value::as_u64).unwrap_or(0);
        let candidate = VideoFormat {
            selector,
            ext: str_field(f, "ext").unwrap_or("mp4").to_string(),
            height,
            size: f
                .get("filesize")
                .and_then(Value::as_u64)
                .or_else(|| f.get("filesize_approx").and_then(Value::as_u64))
                .unwrap_or(0),
        };

        if height == 1080 && hd.is_none() {
            hd = Some(candidate.clone());
        }
        if best.as_ref().is_none_or(|b| height > b.height) {
            best = Some(candidate);
        }
    }

    let mut options = Vec::new();
    if let Some(f) = hd {
        options.push(QualityOption {
            label: format!("🔥 1080p • {} • {}", f.ext.to_uppercase(), size_label(f.size)),
            callback_data: encode_callback(MediaKind::Video, &f.selector, &f.ext, session_id),
        });
    }
    if let Some(f) = best {
        options.push(QualityOption {
            label: format!("📹 Best ({}p) • {} • {}", f.height, f.ext.to_uppercase(), size_label(f.size)),
            callback_data: encode_callback(MediaKind::Video, &f.selector, &f.ext, session_id),
        });
    }
    for (label, quality) in AUDIO_QUALITIES {
        options.push(QualityOption {
            label: format!("🎵 mp3 {}", label),
            callback_data: encode_callback(MediaKind::Audio, quality, "mp3", session_id),
        });
    }

    options.retain(|o| {
        let fits = o.callback_data.len() <= MAX_CALLBACK_DATA_BYTES;
        if !fits {
            log::warn!("Dropping quality option with oversized callback data: {}", o.callback_data);
        }
        fits
    });
    options
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn size_label(size: u64) -> String {
    if size == 0 {
        "? MB".to_string()
    } else {
        format_bytes(size)
    }
}

/// Menu heading: title and duration.
pub fn describe(metadata: &Value) -> String {
    let title = str_field(metadata, "title").unwrap_or("Video");
    let duration = metadata
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| *d > 0.0)
        .map(|d| format_duration_ms((d * 1000.0) as u64))
        .unwrap_or_else(|| "Unknown".to_string());
    format!("📹 {}\n⏱ {}\n\nSelect quality:", title, duration)
}

/// Result of probing a URL for a user.
#[derive(Debug, Clone)]
pub struct ProbedSession {
    pub session: Session,
    pub options: Vec<QualityOption>,
}

/// Runs `yt-dlp -j` and records the result as a session.
#[derive(Debug, Clone)]
pub struct Prober {
    ytdlp_bin: String,
    cookies_file: Option<PathBuf>,
    proxy: Option<String>,
    timeout: Duration,
    sessions: SessionStore,
}

impl Prober {
    pub fn new(config: &Config) -> Self {
        Self {
            ytdlp_bin: config.ytdlp_bin.clone(),
            cookies_file: config.existing_cookies_file().map(Path::to_path_buf),
            proxy: config.proxy.clone(),
            timeout: config.probe_timeout(),
            sessions: SessionStore::new(&config.download_dir),
        }
    }

    pub fn probe_args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-warnings",
            "--allow-dynamic-mpd",
            "--no-check-certificate",
            "--extractor-args",
            "generic:impersonate=",
            "-j",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args.push(url.to_string());
        args
    }

    /// Metadata JSON for `url` (first line of yt-dlp's stdout).
    pub async fn probe_url(&self, url: &str) -> AppResult<Value> {
        let args = self.probe_args(url);
        log::info!("Probing {}", url);
        log::debug!("{} {}", self.ytdlp_bin, args.join(" "));

        let output = run_with_timeout(Command::new(&self.ytdlp_bin).args(&args), self.timeout).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| l.starts_with("ERROR"))
                .or_else(|| stderr.lines().last())
                .unwrap_or("no output");
            return Err(AppError::Process(format!(
                "yt-dlp -j exited with {:?}: {}",
                output.status.code(),
                reason.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| AppError::Process("yt-dlp -j printed nothing".to_string()))?;
        Ok(serde_json::from_str(first)?)
    }

    /// Probe `url`, store a fresh session and build the quality menu.
    pub async fn start_session(
        &self,
        requester_id: i64,
        url: &str,
        custom_name: Option<String>,
    ) -> AppResult<ProbedSession> {
        let metadata = self.probe_url(url).await?;
        let session = Session::new(requester_id, &session_token(), url, custom_name, metadata);
        self.sessions
            .put(&session)
            .await
            .map_err(|e| AppError::Process(format!("could not store session: {}", e)))?;

        let options = quality_options(&session.metadata, &session.session_id);
        log::info!(
            "Session {} for {}: {} option(s) for {:?}",
            session.session_id,
            requester_id,
            options.len(),
            session.title()
        );
        Ok(ProbedSession { session, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::request::CallbackChoice;
    use crate::storage::session::validate_session_id;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata() -> Value {
        json!({
            "title": "Clip",
            "duration": 125.0,
            "formats": [
                {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2", "ext": "m4a"},
                {"format_id": "18", "vcodec": "avc1", "acodec": "mp4a", "ext": "mp4", "height": 360, "filesize": 1048576},
                {"format_id": "137", "vcodec": "avc1", "acodec": "none", "ext": "mp4", "height": 1080},
                {"format_id": "401", "vcodec": "av01", "acodec": "none", "ext": "webm", "height": 2160, "filesize_approx": 734003200}
            ]
        })
    }

    #[test]
    fn test_session_token_shape() {
        for _ in 0..50 {
            let token = session_token();
            assert_eq!(token.len(), SESSION_TOKEN_LEN);
            assert!(validate_session_id(&token).is_ok());
        }
    }

    #[test]
    fn test_parse_user_input() {
        assert_eq!(
            parse_user_input("https://x.test/v | My Song "),
            Some(("https://x.test/v".to_string(), Some("My Song".to_string())))
        );
        assert_eq!(parse_user_input("https://x.test/v"), Some(("https://x.test/v".to_string(), None)));
        assert_eq!(parse_user_input("https://x.test/v |  "), Some(("https://x.test/v".to_string(), None)));
        assert_eq!(parse_user_input("hello"), None);
        assert_eq!(parse_user_input("ftp://x.test"), None);
    }

    #[test]
    fn test_quality_options() {
        let options = quality_options(&metadata(), "ab123");
        let data: Vec<&str> = options.iter().map(|o| o.callback_data.as_str()).collect();
        assert_eq!(
            data,
            vec![
                "video|137+140|mp4|ab123",
                "video|401+140|webm|ab123",
                "audio|64K|mp3|ab123",
                "audio|128K|mp3|ab123",
                "audio|320K|mp3|ab123",
            ]
        );
        assert!(options[1].label.contains("2160p"));
        assert!(options[1].label.contains("700.0 MB"));
        assert!(options[0].label.contains("? MB"));
        for o in &options {
            assert!(CallbackChoice::parse(&o.callback_data).is_ok(), "{}", o.callback_data);
        }
        assert_eq!(options[2].kind(), Some(MediaKind::Audio));
    }

    #[test]
    fn test_quality_options_without_formats() {
        let options = quality_options(&json!({"title": "x"}), "ab123");
        assert_eq!(options.len(), AUDIO_QUALITIES.len());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&metadata()), "📹 Clip\n⏱ 2:05\n\nSelect quality:");
        assert!(describe(&json!({})).contains("Unknown"));
    }

    #[test]
    fn test_probe_args() {
        let config = Config {
            cookies_file: None,
            proxy: Some("http://proxy:3128".to_string()),
            ..Config::default()
        };
        let args = Prober::new(&config).probe_args("https://x.test/v");
        assert!(args.windows(2).any(|w| w[0] == "--extractor-args" && w[1] == "generic:impersonate="));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "http://proxy:3128"));
        assert!(!args.contains(&"--cookies".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://x.test/v"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_session_with_fake_ytdlp() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("yt-dlp");
        std::fs::write(
            &bin,
            "#!/bin/sh\necho '{\"title\": \"Fake\", \"formats\": []}'\necho '{\"title\": \"second\"}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config {
            ytdlp_bin: bin.to_string_lossy().into_owned(),
            cookies_file: None,
            download_dir: dir.path().join("sessions"),
            ..Config::default()
        };
        let probed = Prober::new(&config)
            .start_session(9, "https://x.test/v", Some("Name".to_string()))
            .await
            .unwrap();

        assert_eq!(probed.session.title(), Some("Fake"));
        let stored = SessionStore::new(dir.path().join("sessions"))
            .get(9, &probed.session.session_id)
            .await
            .unwrap();
        assert_eq!(stored.custom_name.as_deref(), Some("Name"));
        assert_eq!(probed.options.len(), AUDIO_QUALITIES.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_failure_carries_error_line() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("yt-dlp");
        std::fs::write(&bin, "#!/bin/sh\necho 'ERROR: Unsupported URL' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config {
            ytdlp_bin: bin.to_string_lossy().into_owned(),
            cookies_file: None,
            ..Config::default()
        };
        let err = Prober::new(&config).probe_url("https://x.test/v").await.unwrap_err();
        assert!(err.to_string().contains("Unsupported URL"));
    }
}
