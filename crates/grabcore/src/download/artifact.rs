//! Per-request scratch directory and artifact lookup.

use std::path::{Path, PathBuf};

/// Extensions yt-dlp may end up writing instead of the requested container,
/// tried in this order.
pub const ALTERNATE_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "m4a", "mp3", "opus", "ogg"];

/// Scratch directory owned by exactly one request.
///
/// Call [`WorkingArea::cleanup`] on the way out. If the owner never gets
/// there (early return, panic) the directory is removed on drop instead.
#[derive(Debug)]
pub struct WorkingArea {
    path: PathBuf,
    removed: bool,
}

impl WorkingArea {
    /// Create `{root}/{requester_id}-{uuid}`.
    pub async fn create(root: &Path, requester_id: i64) -> std::io::Result<Self> {
        let path = root.join(format!("{}-{}", requester_id, uuid::Uuid::new_v4().simple()));
        fs_err::tokio::create_dir_all(&path).await?;
        log::debug!("Working area created: {}", path.display());
        Ok(Self { path, removed: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory and everything in it.
    pub async fn cleanup(mut self) {
        self.removed = true;
        match fs_err::tokio::remove_dir_all(&self.path).await {
            Ok(()) => log::debug!("Working area removed: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove working area: {}", e),
        }
    }
}

impl Drop for WorkingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Working area removed on drop: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove working area {}: {}", self.path.display(), e),
        }
    }
}

/// Find what yt-dlp actually wrote for `expected`.
///
/// Returns `expected` when it exists, else the first existing file with the
/// same base name and one of [`ALTERNATE_EXTENSIONS`].
pub async fn locate_artifact(expected: &Path) -> Option<PathBuf> {
    if is_file(expected).await {
        return Some(expected.to_path_buf());
    }

    let current = expected.extension().and_then(|e| e.to_str());
    for ext in ALTERNATE_EXTENSIONS.iter().filter(|ext| Some(**ext) != current) {
        let candidate = expected.with_extension(ext);
        if is_file(&candidate).await {
            log::info!(
                "Artifact found with different extension: {} -> {}",
                expected.display(),
                candidate.display()
            );
            return Some(candidate);
        }
    }
    None
}

async fn is_file(path: &Path) -> bool {
    fs_err::tokio::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}
