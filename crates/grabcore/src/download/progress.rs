//! yt-dlp progress line parsing
//!
//! The only place that knows the textual shape of yt-dlp's progress output.
//! Everything downstream works with [`ProgressSample`].

use lazy_regex::{lazy_regex, Lazy, Regex};

/// `[download]  45.2% of ~10.00MiB at 500.00KiB/s ETA 00:10`
static STRICT: Lazy<Regex> = lazy_regex!(
    r"\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<size>\d+(?:\.\d+)?)\s*(?P<size_unit>[A-Za-z]+)\s+at\s+(?P<speed>\d+(?:\.\d+)?)\s*(?P<speed_unit>[A-Za-z]+)/s"
);

/// Same three fields in order, anything in between.
static LOOSE: Lazy<Regex> = lazy_regex!(
    r"(?P<pct>\d+(?:\.\d+)?)%.*?(?P<size>\d+(?:\.\d+)?)\s*(?P<size_unit>[A-Za-z]+).*?(?P<speed>\d+(?:\.\d+)?)\s*(?P<speed_unit>[A-Za-z]+)/s"
);

/// One progress reading taken from a yt-dlp output line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// 0.0 ..= 100.0
    pub percent_complete: f64,
    pub total_bytes: u64,
    /// Derived from the percentage, never above `total_bytes`
    pub downloaded_bytes: u64,
    pub speed_bytes_per_sec: f64,
    /// Remaining bytes at the current speed; 0 when speed is unknown
    pub eta_millis: u64,
}

impl ProgressSample {
    pub fn new(percent_complete: f64, total_bytes: u64, speed_bytes_per_sec: f64) -> Self {
        let percent_complete = percent_complete.clamp(0.0, 100.0);
        let downloaded_bytes = ((total_bytes as f64) * percent_complete / 100.0) as u64;
        let downloaded_bytes = downloaded_bytes.min(total_bytes);
        let remaining = total_bytes - downloaded_bytes;
        let eta_millis = if speed_bytes_per_sec > 0.0 {
            (remaining as f64 / speed_bytes_per_sec * 1000.0) as u64
        } else {
            0
        };

        Self {
            percent_complete,
            total_bytes,
            downloaded_bytes,
            speed_bytes_per_sec,
            eta_millis,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent_complete >= 100.0
    }
}

/// Parses progress from a yt-dlp output line.
///
/// Tries the strict `[download]` layout first, then the loose one.
/// Returns `None` when neither matches or a number does not parse; a sample
/// is never partially filled.
///
/// # Example
///
/// ```
/// use grabcore::download::progress::parse_progress;
///
/// let sample = parse_progress("[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05").unwrap();
/// assert_eq!(sample.total_bytes, 10 * 1024 * 1024);
/// assert_eq!(sample.downloaded_bytes, 5 * 1024 * 1024);
/// ```
pub fn parse_progress(line: &str) -> Option<ProgressSample> {
    let caps = STRICT.captures(line).or_else(|| LOOSE.captures(line))?;

    let percent = caps.name("pct")?.as_str().parse::<f64>().ok()?;
    let size = caps.name("size")?.as_str().parse::<f64>().ok()?;
    let speed = caps.name("speed")?.as_str().parse::<f64>().ok()?;
    let size_unit = unit_multiplier(caps.name("size_unit")?.as_str());
    let speed_unit = unit_multiplier(caps.name("speed_unit")?.as_str());

    if !percent.is_finite() || !size.is_finite() || !speed.is_finite() {
        return None;
    }

    let total_bytes = (size * size_unit) as u64;
    let speed_bytes_per_sec = speed * speed_unit;

    log::trace!(
        "Progress parsed: {:.1}% of {} bytes at {:.0} B/s",
        percent,
        total_bytes,
        speed_bytes_per_sec
    );

    Some(ProgressSample::new(percent, total_bytes, speed_bytes_per_sec))
}

/// Binary multiplier for yt-dlp size units.
///
/// Anything other than KiB/MiB/GiB (including plain `B`) counts as bytes.
fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}
