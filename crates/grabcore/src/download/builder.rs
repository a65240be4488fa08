//! Typed yt-dlp command line.
//!
//! Provides a fluent API for assembling the arguments of one fetch attempt.
//! Nothing is launched until [`YtDlpCommand::build`] has validated the whole
//! combination.

use std::path::{Path, PathBuf};
use url::Url;

use crate::core::error::{AppError, AppResult};

/// Flags every fetch attempt carries. `--quiet --progress` keeps progress
/// lines and moves them to stderr.
const COMMON_FLAGS: &[&str] = &[
    "--no-warnings",
    "--no-playlist",
    "--no-check-certificate",
    "--allow-dynamic-mpd",
    "--newline",
    "--quiet",
    "--progress",
];

const ARIA2C_ARGS: &str = "aria2c:-x 16 -s 16 -k 1M";
const BUILTIN_FRAGMENTS: &str = "4";
const RETRIES: &str = "10";

const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// How the fetch tool disguises its TLS/HTTP fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impersonation {
    /// `--impersonate chrome`
    Native,
    /// `--extractor-args generic:impersonate=`
    ExtractorArgs,
}

impl Impersonation {
    fn flag(self) -> (&'static str, &'static str) {
        match self {
            Impersonation::Native => ("--impersonate", "chrome"),
            Impersonation::ExtractorArgs => ("--extractor-args", "generic:impersonate="),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormatSelection {
    Video { format_id: String, container: String },
    Audio { container: String, quality: String },
}

/// Builder for one yt-dlp invocation.
///
/// # Example
///
/// ```
/// use grabcore::download::builder::{Impersonation, YtDlpCommand};
///
/// let args = YtDlpCommand::new("https://example.com/watch?v=1")
///     .output("/tmp/out/clip.mp4")
///     .video("137", "mp4")
///     .impersonation(Impersonation::Native)
///     .build()
///     .unwrap()
///     .into_args();
/// assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct YtDlpCommand {
    url: String,
    output: Option<PathBuf>,
    formats: Vec<FormatSelection>,
    impersonations: Vec<Impersonation>,
    accelerator: Option<String>,
    cookies: Option<PathBuf>,
    proxy: Option<String>,
}

impl YtDlpCommand {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Output path template passed to `-o`.
    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    /// Video with the given format id, merged with the best audio into `container`.
    pub fn video(mut self, format_id: &str, container: &str) -> Self {
        self.formats.push(FormatSelection::Video {
            format_id: format_id.to_string(),
            container: container.to_string(),
        });
        self
    }

    /// Audio only, extracted to `container` at `quality` (e.g. `320K`).
    pub fn audio(mut self, container: &str, quality: &str) -> Self {
        self.formats.push(FormatSelection::Audio {
            container: container.to_string(),
            quality: quality.to_string(),
        });
        self
    }

    pub fn impersonation(mut self, mode: Impersonation) -> Self {
        self.impersonations.push(mode);
        self
    }

    /// Hand the transfer to aria2c at `bin`; `None` keeps the built-in downloader.
    pub fn accelerator(mut self, bin: Option<&str>) -> Self {
        self.accelerator = bin.map(str::to_string);
        self
    }

    pub fn cookies(mut self, file: Option<&Path>) -> Self {
        self.cookies = file.map(Path::to_path_buf);
        self
    }

    pub fn proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.map(str::to_string);
        self
    }

    /// Validate and produce the ordered argument list.
    pub fn build(self) -> AppResult<YtDlpArgs> {
        let url = Url::parse(&self.url).map_err(|e| AppError::Validation(format!("bad url {:?}: {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!("unsupported url scheme: {}", url.scheme())));
        }

        let output = match self.output {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return Err(AppError::Validation("output path is required".to_string())),
        };

        let format = match self.formats.as_slice() {
            [one] => one.clone(),
            [] => return Err(AppError::Validation("no format selected".to_string())),
            _ => return Err(AppError::Validation("more than one format selected".to_string())),
        };

        if self.impersonations.len() > 1 {
            return Err(AppError::Validation("conflicting impersonation modes".to_string()));
        }

        if let Some(proxy) = &self.proxy {
            validate_proxy(proxy)?;
        }

        let mut flags: Vec<(String, Option<String>)> = COMMON_FLAGS.iter().map(|f| (f.to_string(), None)).collect();
        let mut push = |flag: &str, value: Option<&str>| flags.push((flag.to_string(), value.map(str::to_string)));

        // -o takes an output template; a literal % has to be doubled
        push("-o", Some(output.to_string_lossy().replace('%', "%%").as_str()));

        match &format {
            FormatSelection::Video { format_id, container } => {
                let selector = if format_id.contains('+') {
                    format!("{}/best", format_id)
                } else {
                    format!("{}+bestaudio/best", format_id)
                };
                push("-f", Some(selector.as_str()));
                push("--merge-output-format", Some(container.as_str()));
            }
            FormatSelection::Audio { container, quality } => {
                push("-x", None);
                push("--audio-format", Some(container.as_str()));
                push("--audio-quality", Some(quality.as_str()));
            }
        }

        match &self.accelerator {
            Some(bin) => {
                push("--external-downloader", Some(bin.as_str()));
                push("--external-downloader-args", Some(ARIA2C_ARGS));
            }
            None => push("--concurrent-fragments", Some(BUILTIN_FRAGMENTS)),
        }
        push("--retries", Some(RETRIES));
        push("--fragment-retries", Some(RETRIES));

        if let Some(cookies) = &self.cookies {
            push("--cookies", Some(&*cookies.to_string_lossy()));
        }
        if let Some(proxy) = &self.proxy {
            push("--proxy", Some(proxy.as_str()));
        }
        if let Some(mode) = self.impersonations.first() {
            let (flag, value) = mode.flag();
            push(flag, Some(value));
        }

        Ok(YtDlpArgs {
            flags,
            url: self.url,
        })
    }
}

fn validate_proxy(proxy: &str) -> AppResult<()> {
    let parsed = Url::parse(proxy).map_err(|e| AppError::Validation(format!("bad proxy url: {}", e)))?;
    if PROXY_SCHEMES.contains(&parsed.scheme()) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("unsupported proxy scheme: {}", parsed.scheme())))
    }
}

/// Validated arguments: ordered flags plus the positional URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpArgs {
    flags: Vec<(String, Option<String>)>,
    url: String,
}

impl YtDlpArgs {
    pub fn flags(&self) -> &[(String, Option<String>)] {
        &self.flags
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Value of the first occurrence of `flag`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(f, _)| f == flag)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|(f, _)| f == flag)
    }

    /// Flat argv, URL last.
    pub fn into_args(self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.flags.len() * 2 + 1);
        for (flag, value) in self.flags {
            args.push(flag);
            args.extend(value);
        }
        args.push(self.url);
        args
    }
}
