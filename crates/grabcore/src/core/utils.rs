/// Name used when sanitizing leaves nothing behind
pub const FALLBACK_FILE_NAME: &str = "video";

/// Maximum file name length in characters, extension included
pub const MAX_FILE_NAME_CHARS: usize = 200;

/// Extensions longer than this are treated as part of the base name
const MAX_EXTENSION_CHARS: usize = 16;

/// Sequences replaced with `_`. `..` goes last so that `a/..` style input
/// cannot survive as a traversal component.
const DISALLOWED: &[&str] = &["/", "\\", "<", ">", ":", "\"", "|", "?", "*", ";", "=", "&", ".."];

/// Makes a user- or metadata-supplied name safe to use as a single path component.
///
/// - control characters are dropped
/// - path separators, shell/wildcard characters and `..` become `_`
/// - the result is trimmed and truncated to [`MAX_FILE_NAME_CHARS`] characters,
///   keeping the extension
/// - an empty result becomes [`FALLBACK_FILE_NAME`]
///
/// # Example
///
/// ```
/// use grabcore::core::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("a/b\\c??.mp4"), "a_b_c__.mp4");
/// assert_eq!(sanitize_filename(""), "video");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let mut result: String = name.chars().filter(|c| !c.is_control()).collect();
    for bad in DISALLOWED {
        result = result.replace(bad, "_");
    }
    let mut result = result.trim().to_string();

    if result.chars().count() > MAX_FILE_NAME_CHARS {
        let (base, ext) = split_extension(&result);
        let keep = MAX_FILE_NAME_CHARS - ext.chars().count();
        let base: String = base.chars().take(keep).collect();
        // a dot left at the cut would touch the extension dot
        result = format!("{}{}", base.trim_end_matches('.'), ext);
    }

    if result.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        result
    }
}

/// Splits `name.ext` into (`name`, `.ext`). Leading dots and oversized extensions don't count.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && name[pos..].chars().count() <= MAX_EXTENSION_CHARS => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Format byte count for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// Format a millisecond duration as `m:ss` or `h:mm:ss`
pub fn format_duration_ms(millis: u64) -> String {
    let seconds = millis / 1000;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
