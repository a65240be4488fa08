//! Grab - download-session engine for a chat media bot
//!
//! Turns a URL into a delivered media file: probes it with yt-dlp, remembers
//! the probe in a short-lived session, and when the user picks a quality runs
//! yt-dlp (with a fallback strategy), follows its progress and hands the
//! result to an uploader.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, process helpers and utilities
//! - `storage`: Session files
//! - `download`: Probing, fetching, progress and orchestration

pub mod core;
pub mod download;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, Config};
pub use download::{DownloadError, Orchestrator};
pub use storage::SessionStore;
