use thiserror::Error;

use crate::core::utils::format_bytes;
use crate::storage::session::SessionError;

/// Everything that can stop a download request.
///
/// Each variant is reported to the user exactly once, by the orchestrator,
/// using [`DownloadError::user_message`].
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Callback data or session id that does not decode
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No session file for this button (already used, swept, or never stored)
    #[error("session expired")]
    SessionExpired,

    /// Session file exists but cannot be read back
    #[error("session corrupt: {0}")]
    SessionCorrupt(String),

    /// Both strategies failed, or the first failure was terminal
    #[error("fetch failed (exit code {exit_code:?}): {reason}")]
    FetchFailed { exit_code: Option<i32>, reason: String },

    /// yt-dlp exited cleanly but nothing was written
    #[error("downloaded file not found")]
    ArtifactMissing,

    #[error("file is {size} bytes, limit is {limit}")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Scratch directory could not be created
    #[error("working area: {0}")]
    WorkingArea(String),
}

impl DownloadError {
    /// Short category name for logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            DownloadError::InvalidRequest(_) => "invalid_request",
            DownloadError::SessionExpired => "session_expired",
            DownloadError::SessionCorrupt(_) => "session_corrupt",
            DownloadError::FetchFailed { .. } => "fetch_failed",
            DownloadError::ArtifactMissing => "artifact_missing",
            DownloadError::SizeLimitExceeded { .. } => "size_limit",
            DownloadError::UploadFailed(_) => "upload_failed",
            DownloadError::WorkingArea(_) => "working_area",
        }
    }

    /// Text shown in the chat
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::InvalidRequest(_) => "❌ This button is not valid. Send the link again.".to_string(),
            DownloadError::SessionExpired => "⌛ This selection has expired. Send the link again.".to_string(),
            DownloadError::SessionCorrupt(_) => "❌ Could not read this selection. Send the link again.".to_string(),
            DownloadError::FetchFailed { exit_code, reason } => match exit_code {
                Some(code) => format!("❌ Download failed (code {}).\n{}", code, reason),
                None => format!("❌ Download failed.\n{}", reason),
            },
            DownloadError::ArtifactMissing => "❌ Download finished but the file was not found.".to_string(),
            DownloadError::SizeLimitExceeded { size, limit } => format!(
                "❌ The file is too large: {} (limit {}).",
                format_bytes(*size),
                format_bytes(*limit)
            ),
            DownloadError::UploadFailed(_) => "❌ Could not send the file. Try again later.".to_string(),
            DownloadError::WorkingArea(_) => "❌ Server storage problem. Try again later.".to_string(),
        }
    }
}

impl From<SessionError> for DownloadError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound { .. } => DownloadError::SessionExpired,
            SessionError::InvalidId(id) => DownloadError::InvalidRequest(format!("session id {:?}", id)),
            SessionError::Corrupt { .. } | SessionError::Io(_) => DownloadError::SessionCorrupt(err.to_string()),
        }
    }
}
