//! Hand-off of a finished artifact to the chat transport.

use async_trait::async_trait;
use std::path::Path;

use crate::download::request::MediaKind;

/// How the transport should present the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryMode {
    Video,
    Audio,
    /// Plain file attachment
    Document,
}

impl From<MediaKind> for DeliveryMode {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => DeliveryMode::Video,
            MediaKind::Audio => DeliveryMode::Audio,
        }
    }
}

/// Delivers a file to the requester. Implemented by the bot crate.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Send `path` to `requester_id`. The error string is for logs only.
    async fn upload(&self, requester_id: i64, path: &Path, title: &str, mode: DeliveryMode) -> Result<(), String>;
}
