//! File-backed session store.
//!
//! A session links the quality keyboard a user sees to the probed metadata of
//! the URL they sent. One JSON file per session at
//! `{dir}/{requester_id}{session_id}.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Longest session token accepted
pub const MAX_SESSION_ID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub requester_id: i64,
    pub created_at: DateTime<Utc>,
    pub source_url: String,
    #[serde(default)]
    pub custom_name: Option<String>,
    /// yt-dlp `-j` output, kept as is
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn new(
        requester_id: i64,
        session_id: &str,
        source_url: &str,
        custom_name: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            requester_id,
            created_at: Utc::now(),
            source_url: source_url.to_string(),
            custom_name,
            metadata,
        }
    }

    /// Title from the probed metadata, if any
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get("title")
            .and_then(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {session_id} of {requester_id} not found")]
    NotFound { requester_id: i64, session_id: String },

    #[error("session file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid session id: {0:?}")]
    InvalidId(String),

    #[error("session IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session ids are short alphanumeric tokens; anything else could escape the store directory.
pub fn validate_session_id(session_id: &str) -> Result<(), SessionError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id.chars().all(|c| c.is_ascii_alphanumeric());
    if ok {
        Ok(())
    } else {
        Err(SessionError::InvalidId(session_id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, requester_id: i64, session_id: &str) -> Result<PathBuf, SessionError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}{}.json", requester_id, session_id)))
    }

    /// Write the session atomically: temp file in the same directory, then rename.
    pub async fn put(&self, session: &Session) -> Result<PathBuf, SessionError> {
        let path = self.path_for(session.requester_id, &session.session_id)?;
        fs_err::tokio::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(session).map_err(|e| SessionError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        fs_err::tokio::write(&tmp, &json).await?;
        if let Err(e) = fs_err::tokio::rename(&tmp, &path).await {
            let _ = fs_err::tokio::remove_file(&tmp).await;
            return Err(e.into());
        }

        log::debug!("Session {} stored at {}", session.session_id, path.display());
        Ok(path)
    }

    pub async fn get(&self, requester_id: i64, session_id: &str) -> Result<Session, SessionError> {
        let path = self.path_for(requester_id, session_id)?;

        let raw = match fs_err::tokio::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound {
                    requester_id,
                    session_id: session_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let session: Session = serde_json::from_slice(&raw).map_err(|e| SessionError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if session.requester_id != requester_id || session.session_id != session_id {
            return Err(SessionError::Corrupt {
                path,
                reason: "session does not belong to this requester".to_string(),
            });
        }
        Ok(session)
    }

    /// Remove the session file. Missing files are fine.
    pub async fn delete(&self, requester_id: i64, session_id: &str) -> Result<(), SessionError> {
        let path = self.path_for(requester_id, session_id)?;
        match fs_err::tokio::remove_file(&path).await {
            Ok(()) => {
                log::debug!("Session file removed: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete session files older than `ttl`. Returns how many were removed.
    ///
    /// Age comes from `created_at`; unreadable files fall back to their mtime.
    /// Other files in the directory are left alone.
    pub async fn sweep_expired(&self, ttl: Duration) -> Result<usize, SessionError> {
        let mut entries = match fs_err::tokio::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_session_file(&path) {
                continue;
            }

            let created_at = match fs_err::tokio::read(&path).await {
                Ok(raw) => match serde_json::from_slice::<Session>(&raw) {
                    Ok(session) => Some(session.created_at),
                    Err(_) => modified_at(&path).await,
                },
                Err(_) => continue,
            };

            let Some(created_at) = created_at else { continue };
            if now.signed_duration_since(created_at) < ttl {
                continue;
            }

            match fs_err::tokio::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove expired session: {}", e),
            }
        }

        if removed > 0 {
            log::info!("Removed {} expired session file(s) from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

/// `{digits}{alnum}.json`, the shape [`SessionStore::path_for`] produces.
fn is_session_file(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return false;
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let stem = stem.strip_prefix('-').unwrap_or(stem);
    stem.starts_with(|c: char| c.is_ascii_digit()) && stem.chars().all(|c| c.is_ascii_alphanumeric())
}

async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let meta = fs_err::tokio::metadata(path).await.ok()?;
    let modified: SystemTime = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session(requester_id: i64, id: &str) -> Session {
        Session::new(
            requester_id,
            id,
            "https://example.com/v/1",
            Some("My clip".to_string()),
            json!({"title": "Clip", "duration": 12}),
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let s = session(42, "abc12");

        let path = store.put(&s).await.unwrap();
        assert_eq!(path, dir.path().join("42abc12.json"));

        let loaded = store.get(42, "abc12").await.unwrap();
        assert_eq!(loaded, s);
        assert_eq!(loaded.title(), Some("Clip"));

        store.delete(42, "abc12").await.unwrap();
        assert!(!path.exists());
        // idempotent
        store.delete(42, "abc12").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.put(&session(1, "tok1")).await.unwrap();
        store.put(&session(1, "tok1")).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["1tok1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let err = store.get(7, "nope1").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { requester_id: 7, .. }));
    }

    #[tokio::test]
    async fn test_get_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(dir.path().join("7bad01.json"), b"{not json").unwrap();
        let err = store.get(7, "bad01").await.unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_get_rejects_other_requesters_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        // "1" + "23abc" and "12" + "3abc" share a file name
        store.put(&session(1, "23abc")).await.unwrap();
        let err = store.get(12, "3abc").await.unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_rejects_traversal_ids() {
        let store = SessionStore::new("/tmp");
        for id in ["../x", "a/b", "", "ab.c", "абв"] {
            let err = store.get(1, id).await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidId(_)), "{:?}", id);
        }
        assert!(validate_session_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let mut old = session(5, "old01");
        old.created_at = Utc::now() - chrono::Duration::hours(10);
        store.put(&old).await.unwrap();
        store.put(&session(5, "new01")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let removed = store.sweep_expired(Duration::from_secs(6 * 3600)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(5, "new01").await.is_ok());
        assert!(matches!(store.get(5, "old01").await, Err(SessionError::NotFound { .. })));
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_sweep_uses_mtime_for_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(dir.path().join("9broken.json"), b"???").unwrap();

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.sweep_expired(Duration::ZERO).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent"));
        assert_eq!(store.sweep_expired(Duration::ZERO).await.unwrap(), 0);
    }

    #[test]
    fn test_is_session_file() {
        assert!(is_session_file(Path::new("/d/42abc.json")));
        assert!(is_session_file(Path::new("/d/-100123abc.json")));
        assert!(!is_session_file(Path::new("/d/42abc.json.1.tmp")));
        assert!(!is_session_file(Path::new("/d/config.json")));
        assert!(!is_session_file(Path::new("/d/42abc.txt")));
    }
}
