//! Download request decoded from a quality-button press.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::download::error::DownloadError;
use crate::storage::session::validate_session_id;

/// Separator between callback data fields
pub const CALLBACK_SEPARATOR: char = '|';

/// Telegram caps callback data at 64 bytes
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// What the user asked for. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub session_id: String,
    pub requester_id: i64,
    pub source_url: String,
    pub desired_format_id: String,
    pub container: String,
    pub media_kind: MediaKind,
    pub custom_name: Option<String>,
}

/// The part of a request carried by the button itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackChoice {
    pub media_kind: MediaKind,
    pub format_id: String,
    pub container: String,
    pub session_id: String,
}

impl CallbackChoice {
    /// Parse `{video|audio}|{formatId}|{ext}|{sessionId}`.
    ///
    /// # Example
    ///
    /// ```
    /// use grabcore::download::request::{CallbackChoice, MediaKind};
    ///
    /// let choice = CallbackChoice::parse("audio|320K|mp3|ab12c").unwrap();
    /// assert_eq!(choice.media_kind, MediaKind::Audio);
    /// assert_eq!(choice.session_id, "ab12c");
    /// ```
    pub fn parse(data: &str) -> Result<Self, DownloadError> {
        let parts: Vec<&str> = data.split(CALLBACK_SEPARATOR).collect();
        let [kind, format_id, container, session_id] = parts.as_slice() else {
            return Err(DownloadError::InvalidRequest(format!("expected 4 fields in {:?}", data)));
        };

        let media_kind: MediaKind = kind
            .parse()
            .map_err(|_| DownloadError::InvalidRequest(format!("unknown media kind {:?}", kind)))?;

        if format_id.is_empty() || !format_id.chars().all(is_format_char) {
            return Err(DownloadError::InvalidRequest(format!("bad format id {:?}", format_id)));
        }
        if container.is_empty() || !container.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DownloadError::InvalidRequest(format!("bad container {:?}", container)));
        }
        validate_session_id(session_id).map_err(|e| DownloadError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            media_kind,
            format_id: format_id.to_string(),
            container: container.to_lowercase(),
            session_id: session_id.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        encode_callback(self.media_kind, &self.format_id, &self.container, &self.session_id)
    }
}

/// yt-dlp format ids look like `137`, `hls-720p`, `299+140` or `320K`
fn is_format_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')
}

pub fn encode_callback(kind: MediaKind, format_id: &str, container: &str, session_id: &str) -> String {
    format!(
        "{kind}{sep}{format_id}{sep}{container}{sep}{session_id}",
        sep = CALLBACK_SEPARATOR
    )
}

impl DownloadRequest {
    pub fn new(requester_id: i64, choice: CallbackChoice, source_url: &str, custom_name: Option<String>) -> Self {
        Self {
            session_id: choice.session_id,
            requester_id,
            source_url: source_url.to_string(),
            desired_format_id: choice.format_id,
            container: choice.container,
            media_kind: choice.media_kind,
            custom_name: custom_name.filter(|n| !n.trim().is_empty()),
        }
    }

    /// File extension of the finished artifact
    pub fn extension(&self) -> &str {
        &self.container
    }
}
