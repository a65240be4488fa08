//! Request orchestration: from a pressed quality button to a delivered file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::utils::{format_bytes, sanitize_filename, FALLBACK_FILE_NAME};
use crate::download::artifact::{WorkingArea, ALTERNATE_EXTENSIONS};
use crate::download::error::DownloadError;
use crate::download::executor::{FetchFailure, FetchOutcome, FetchPlan, FetchStatus, Fetcher, Strategy};
use crate::download::request::{CallbackChoice, DownloadRequest};
use crate::download::resolver::{needs_resolution, UrlResolver};
use crate::download::sink::{notify, UpdateSink};
use crate::download::upload::{DeliveryMode, Uploader};
use crate::storage::session::SessionStore;

/// What a successful run delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub file_name: String,
    pub size: u64,
    pub mode: DeliveryMode,
    /// Strategy of the attempt that produced the file
    pub strategy: Strategy,
}

pub struct Orchestrator {
    config: Config,
    sessions: SessionStore,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn UrlResolver>,
    uploader: Arc<dyn Uploader>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<dyn UrlResolver>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let sessions = SessionStore::new(&config.download_dir);
        Self {
            config,
            sessions,
            fetcher,
            resolver,
            uploader,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one quality-button press.
    ///
    /// Any error is reported to `sink` exactly once before it is returned; the
    /// caller only needs the result for logging.
    pub async fn run(
        &self,
        requester_id: i64,
        callback_data: &str,
        sink: Arc<dyn UpdateSink>,
    ) -> Result<Delivery, DownloadError> {
        match self.process(requester_id, callback_data, &sink).await {
            Ok(delivery) => {
                notify(sink.as_ref(), &format!("✅ Sent {} ({})", delivery.file_name, format_bytes(delivery.size))).await;
                Ok(delivery)
            }
            Err(e) => {
                log::error!("Download for {} failed [{}]: {}", requester_id, e.subcategory(), e);
                notify(sink.as_ref(), &e.user_message()).await;
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        requester_id: i64,
        callback_data: &str,
        sink: &Arc<dyn UpdateSink>,
    ) -> Result<Delivery, DownloadError> {
        let choice = CallbackChoice::parse(callback_data)?;
        let session = self.sessions.get(requester_id, &choice.session_id).await?;
        let title = session.title().unwrap_or(FALLBACK_FILE_NAME).to_string();
        let request = DownloadRequest::new(requester_id, choice, &session.source_url, session.custom_name.clone());

        let file_name = final_file_name(&request, &title);
        let url = self.resolve_url(&request.source_url).await;

        let area = WorkingArea::create(&self.config.download_dir, requester_id)
            .await
            .map_err(|e| DownloadError::WorkingArea(e.to_string()))?;

        log::info!(
            "Download {} for {}: {} as {} ({} {})",
            request.session_id,
            requester_id,
            url,
            file_name,
            request.media_kind,
            request.desired_format_id
        );
        notify(sink.as_ref(), &format!("⏳ Preparing {}…", file_name)).await;

        let plan = FetchPlan {
            url,
            output_path: area.file(&file_name),
            media_kind: request.media_kind,
            format_id: request.desired_format_id.clone(),
            container: request.container.clone(),
            title: title.clone(),
        };
        let outcome = self.fetcher.fetch(&plan, Arc::clone(sink)).await;

        let upload_title = request.custom_name.as_deref().unwrap_or(&title);
        let result = self.deliver(&request, outcome, upload_title, sink).await;
        area.cleanup().await;

        let delivery = result?;
        if let Err(e) = self.sessions.delete(requester_id, &request.session_id).await {
            log::warn!("Failed to remove session {}: {}", request.session_id, e);
        }
        Ok(delivery)
    }

    async fn resolve_url(&self, url: &str) -> String {
        if needs_resolution(url, &self.config.redirect_patterns) {
            self.resolver.resolve(url).await
        } else {
            url.to_string()
        }
    }

    /// Steps that need the working area alive: artifact checks and upload.
    async fn deliver(
        &self,
        request: &DownloadRequest,
        outcome: FetchOutcome,
        title: &str,
        sink: &Arc<dyn UpdateSink>,
    ) -> Result<Delivery, DownloadError> {
        let strategy = outcome
            .attempts
            .last()
            .map(|a| a.strategy)
            .unwrap_or(Strategy::Primary);

        let artifact = match outcome.status {
            FetchStatus::Success { artifact } => artifact,
            FetchStatus::Failed { cause } => return Err(fetch_error(cause)),
        };

        let size = match fs_err::tokio::metadata(&artifact).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                log::error!("Artifact vanished before upload: {}", e);
                return Err(DownloadError::ArtifactMissing);
            }
        };

        let limit = self.config.max_upload_bytes;
        if size > limit {
            log::warn!("Artifact {} is {} bytes, over the {} byte limit", artifact.display(), size, limit);
            return Err(DownloadError::SizeLimitExceeded { size, limit });
        }

        let mode = DeliveryMode::from(request.media_kind);
        notify(sink.as_ref(), &format!("📤 Uploading {}…", format_bytes(size))).await;
        self.uploader
            .upload(request.requester_id, &artifact, title, mode)
            .await
            .map_err(DownloadError::UploadFailed)?;

        Ok(Delivery {
            file_name: file_name_of(&artifact),
            size,
            mode,
            strategy,
        })
    }
}

fn fetch_error(cause: FetchFailure) -> DownloadError {
    match cause {
        FetchFailure::NoOutput => DownloadError::ArtifactMissing,
        other => DownloadError::FetchFailed {
            exit_code: other.exit_code(),
            reason: other.to_string(),
        },
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name the artifact should get.
///
/// A custom name is used as given, with the container extension appended
/// unless it already ends in a media extension. Otherwise `{title}_{format}.{ext}`.
/// Either way the result is sanitized.
pub fn final_file_name(request: &DownloadRequest, title: &str) -> String {
    let ext = request.extension();
    let raw = match request.custom_name.as_deref().map(str::trim) {
        Some(name) if has_media_extension(name, ext) => name.to_string(),
        Some(name) => format!("{}.{}", name, ext),
        None => format!("{}_{}.{}", title, request.desired_format_id, ext),
    };
    sanitize_filename(&raw)
}

fn has_media_extension(name: &str, ext: &str) -> bool {
    PathBuf::from(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext) || ALTERNATE_EXTENSIONS.iter().any(|alt| e.eq_ignore_ascii_case(alt)))
        .unwrap_or(false)
}
