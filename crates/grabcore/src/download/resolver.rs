//! CDN redirect resolution.
//!
//! Some hosts hand out `get_stream`-style links that bounce through several
//! redirects, and yt-dlp writes an empty file if it follows them itself. These
//! links are resolved up front with a browser-impersonating curl.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use crate::core::process::run_with_timeout;

#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Final URL after redirects. Never fails: returns `url` unchanged when it cannot resolve.
    async fn resolve(&self, url: &str) -> String;
}

/// Does `url` contain one of `patterns` (case-insensitive)?
pub fn needs_resolution(url: &str, patterns: &[String]) -> bool {
    let url = url.to_lowercase();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| url.contains(&p.to_lowercase()))
}

/// Value of the last `Location:` header in a `curl -I -L` dump.
pub fn last_location(headers: &str) -> Option<String> {
    headers
        .lines()
        .rev()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim().eq_ignore_ascii_case("location").then(|| value.trim().to_string())
        })
        .find(|v| !v.is_empty())
}

/// Runs `curl-impersonate-chrome -I -L <url>` and reads the redirect chain.
#[derive(Debug, Clone)]
pub struct CurlRedirectResolver {
    bin: String,
    timeout: Duration,
}

impl CurlRedirectResolver {
    pub fn new(bin: &str, timeout: Duration) -> Self {
        Self {
            bin: bin.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl UrlResolver for CurlRedirectResolver {
    async fn resolve(&self, url: &str) -> String {
        let output = match run_with_timeout(Command::new(&self.bin).args(["-I", "-L", url]), self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Redirect resolver failed for {}: {}", url, e);
                return url.to_string();
            }
        };

        match last_location(&String::from_utf8_lossy(&output.stdout)) {
            Some(location) => {
                log::info!("Resolved redirect: {} -> {}", url, location);
                location
            }
            None => {
                log::debug!("No redirect for {}", url);
                url.to_string()
            }
        }
    }
}

/// Resolver that leaves every URL alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

#[async_trait]
impl UrlResolver for NoopResolver {
    async fn resolve(&self, url: &str) -> String {
        url.to_string()
    }
}
