//! Update sink: where user-visible status text goes.
//!
//! In the bot this edits the chat message that carried the quality keyboard;
//! the CLI logs to stdout. Failures are never fatal to a download.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Error returned by a sink; callers log it and carry on.
#[derive(Debug, thiserror::Error)]
#[error("update sink failed: {0}")]
pub struct SinkError(pub String);

#[async_trait]
pub trait UpdateSink: Send + Sync {
    /// Replace the status text shown to the user.
    async fn update(&self, text: &str) -> Result<(), SinkError>;
}

/// Sink that writes every update to the log; used by the CLI `fetch` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl UpdateSink for LogSink {
    async fn update(&self, text: &str) -> Result<(), SinkError> {
        for line in text.lines() {
            log::info!("{}", line);
        }
        Ok(())
    }
}

/// Sink that remembers every update; handy for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    updates: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn updates(&self) -> Vec<String> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl UpdateSink for RecordingSink {
    async fn update(&self, text: &str) -> Result<(), SinkError> {
        self.updates.lock().await.push(text.to_string());
        Ok(())
    }
}

/// Log a failed sink update without propagating it.
pub async fn notify(sink: &dyn UpdateSink, text: &str) {
    if let Err(e) = sink.update(text).await {
        log::warn!("Status update dropped: {}", e);
    }
}
