//! Progress monitor for a running yt-dlp process.
//!
//! Reads the child's stderr until the stream closes or the owner cancels,
//! turns progress lines into throttled status updates and keeps a short tail
//! of everything else for error reporting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::utils::{format_bytes, format_duration_ms};
use crate::download::progress::{parse_progress, ProgressSample};
use crate::download::sink::UpdateSink;

/// Always emit after this long without an update
pub const MAX_SILENCE: Duration = Duration::from_secs(10);
/// Minimum spacing between updates driven by percentage changes
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);
/// Percentage points that justify an update after [`MIN_INTERVAL`]
pub const MIN_PERCENT_STEP: f64 = 5.0;
/// Non-progress stderr lines kept for error messages
pub const TAIL_LINES: usize = 200;

/// Decides which samples reach the sink.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    last_emit: Instant,
    last_percent: f64,
}

impl Throttle {
    pub fn new(start: Instant) -> Self {
        Self {
            last_emit: start,
            last_percent: 0.0,
        }
    }

    pub fn should_emit(&self, sample: &ProgressSample, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_emit);
        sample.is_complete()
            || elapsed >= MAX_SILENCE
            || (elapsed >= MIN_INTERVAL && sample.percent_complete - self.last_percent >= MIN_PERCENT_STEP)
    }

    pub fn record(&mut self, sample: &ProgressSample, now: Instant) {
        self.last_emit = now;
        self.last_percent = sample.percent_complete;
    }
}

/// What the monitor saw by the time it stopped.
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub lines_read: usize,
    pub samples: usize,
    pub updates_sent: usize,
    pub sink_failures: usize,
    pub last_sample: Option<ProgressSample>,
    /// Last non-progress lines, oldest first
    pub tail: Vec<String>,
    /// True when the loop ended because of cancellation rather than end of stream
    pub cancelled: bool,
}

impl MonitorReport {
    /// Last line that looks like a yt-dlp error, or the last line at all.
    pub fn error_hint(&self) -> Option<&str> {
        self.tail
            .iter()
            .rev()
            .find(|l| l.starts_with("ERROR"))
            .or_else(|| self.tail.last())
            .map(String::as_str)
    }
}

/// A spawned monitor task together with its cancellation token.
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<MonitorReport>,
}

impl MonitorHandle {
    /// Spawn a monitor over `reader` on the current runtime.
    pub fn spawn<R>(reader: R, sink: Arc<dyn UpdateSink>, heading: String) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { monitor_stream(reader, sink.as_ref(), &heading, &token).await });
        Self { cancel, join }
    }

    /// Let the monitor drain what is left for up to `grace`, then cancel it and wait.
    ///
    /// Never fails: a panicked monitor task yields an empty report.
    pub async fn stop(mut self, grace: Duration) -> MonitorReport {
        if let Ok(joined) = tokio::time::timeout(grace, &mut self.join).await {
            return joined.unwrap_or_else(|e| {
                log::error!("Progress monitor task failed: {}", e);
                MonitorReport::default()
            });
        }

        log::debug!("Progress monitor still reading after {:?}, cancelling", grace);
        self.cancel.cancel();
        self.join.await.unwrap_or_else(|e| {
            log::error!("Progress monitor task failed: {}", e);
            MonitorReport::default()
        })
    }
}

/// Read `reader` until end of stream or cancellation, forwarding throttled progress to `sink`.
pub async fn monitor_stream<R>(
    reader: R,
    sink: &dyn UpdateSink,
    heading: &str,
    cancel: &CancellationToken,
) -> MonitorReport
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut throttle = Throttle::new(Instant::now());
    let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
    let mut report = MonitorReport::default();

    'read: loop {
        let segment = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break 'read;
            }
            segment = segments.next_segment() => segment,
        };

        let bytes = match segment {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break 'read,
            Err(e) => {
                log::warn!("Stopped reading yt-dlp stderr: {}", e);
                break 'read;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        // yt-dlp without --newline rewrites the same line with \r
        for line in text.split('\r').map(str::trim).filter(|l| !l.is_empty()) {
            report.lines_read += 1;

            let Some(sample) = parse_progress(line) else {
                log::debug!("yt-dlp stderr: {}", line);
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
                continue;
            };

            report.samples += 1;
            report.last_sample = Some(sample);

            let now = Instant::now();
            if !throttle.should_emit(&sample, now) {
                continue;
            }
            throttle.record(&sample, now);

            let rendered = render_progress(heading, &sample);
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break 'read;
                }
                sent = sink.update(&rendered) => sent,
            };
            match sent {
                Ok(()) => report.updates_sent += 1,
                Err(e) => {
                    report.sink_failures += 1;
                    log::warn!("Progress update not delivered: {}", e);
                }
            }
        }
    }

    if report.cancelled {
        log::debug!("Progress monitor cancelled after {} lines", report.lines_read);
    }
    report.tail = tail.into_iter().collect();
    report
}

/// Human-readable progress block.
///
/// ```text
/// ⬇️ Downloading: Some title
/// [█████░░░░░] 50.0%
/// 5.0 MB / 10.0 MB
/// ⚡ 1.0 MB/s · ETA 0:05
/// ```
pub fn render_progress(heading: &str, sample: &ProgressSample) -> String {
    let speed_mbs = sample.speed_bytes_per_sec / (1024.0 * 1024.0);
    let speed = format_bytes(sample.speed_bytes_per_sec.max(0.0) as u64);
    let eta = if sample.eta_millis > 0 {
        format_duration_ms(sample.eta_millis)
    } else {
        "?".to_string()
    };

    format!(
        "⬇️ {}\n{} {:.1}%\n{} / {}\n{} {}/s · ETA {}",
        heading,
        progress_bar(sample.percent_complete),
        sample.percent_complete,
        format_bytes(sample.downloaded_bytes),
        format_bytes(sample.total_bytes),
        speed_emoji(speed_mbs),
        speed,
        eta,
    )
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 10.0).round()) as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(10 - filled))
}

fn speed_emoji(speed_mbs: f64) -> &'static str {
    if speed_mbs < 1.0 {
        "🐌"
    } else if speed_mbs < 5.0 {
        "⚡"
    } else if speed_mbs < 20.0 {
        "🚀"
    } else {
        "💨"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::sink::{RecordingSink, SinkError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample(percent: f64) -> ProgressSample {
        ProgressSample::new(percent, 1000, 100.0)
    }

    #[test]
    fn test_throttle_holds_small_early_changes() {
        let start = Instant::now();
        let throttle = Throttle::new(start);
        assert!(!throttle.should_emit(&sample(3.0), start + Duration::from_secs(1)));
        // enough percent but not enough time
        assert!(!throttle.should_emit(&sample(40.0), start + Duration::from_secs(4)));
    }

    #[test]
    fn test_throttle_percent_step_after_min_interval() {
        let start = Instant::now();
        let throttle = Throttle::new(start);
        assert!(throttle.should_emit(&sample(5.0), start + Duration::from_secs(5)));
        assert!(!throttle.should_emit(&sample(4.9), start + Duration::from_secs(6)));
    }

    #[test]
    fn test_throttle_max_silence() {
        let start = Instant::now();
        let throttle = Throttle::new(start);
        assert!(throttle.should_emit(&sample(0.5), start + Duration::from_secs(10)));
    }

    #[test]
    fn test_throttle_completion_always_emits() {
        let start = Instant::now();
        let mut throttle = Throttle::new(start);
        throttle.record(&sample(99.0), start);
        assert!(throttle.should_emit(&sample(100.0), start));
    }

    #[test]
    fn test_throttle_record_resets_baseline() {
        let start = Instant::now();
        let mut throttle = Throttle::new(start);
        let later = start + Duration::from_secs(6);
        throttle.record(&sample(20.0), later);
        assert!(!throttle.should_emit(&sample(30.0), later + Duration::from_secs(1)));
        assert!(throttle.should_emit(&sample(30.0), later + Duration::from_secs(5)));
        assert!(!throttle.should_emit(&sample(22.0), later + Duration::from_secs(5)));
    }

    #[test]
    fn test_render_progress() {
        let text = render_progress("Downloading: clip", &ProgressSample::new(50.0, 10 * 1024 * 1024, 1024.0 * 1024.0));
        assert!(text.starts_with("⬇️ Downloading: clip\n"));
        assert!(text.contains("[█████░░░░░] 50.0%"));
        assert!(text.contains("5.0 MB / 10.0 MB"));
        assert!(text.contains("1.0 MB/s"));
        assert!(text.contains("ETA 0:05"));
    }

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0.0), "[░░░░░░░░░░]");
        assert_eq!(progress_bar(100.0), "[██████████]");
        assert_eq!(progress_bar(250.0), "[██████████]");
    }

    #[tokio::test]
    async fn test_monitor_emits_completion_and_keeps_tail() {
        let input: &[u8] = b"[youtube] abc: Downloading webpage\n\
            [download]   1.0% of 10.00MiB at 1.00MiB/s ETA 00:09\n\
            [download] 100.0% of 10.00MiB at 1.00MiB/s ETA 00:00\n\
            ERROR: something odd\n";
        let sink = RecordingSink::new();
        let report = monitor_stream(input, &sink, "Downloading: x", &CancellationToken::new()).await;

        assert_eq!(report.lines_read, 4);
        assert_eq!(report.samples, 2);
        // 1% is throttled, 100% always goes out
        assert_eq!(report.updates_sent, 1);
        assert!(!report.cancelled);
        assert_eq!(report.error_hint(), Some("ERROR: something odd"));
        assert_eq!(report.tail.len(), 2);

        let updates = sink.updates().await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].contains("100.0%"));
    }

    #[tokio::test]
    async fn test_monitor_splits_carriage_returns() {
        let input: &[u8] = b"[download]  10.0% of 1.00MiB at 1.00MiB/s\r[download] 100.0% of 1.00MiB at 1.00MiB/s\n";
        let sink = RecordingSink::new();
        let report = monitor_stream(input, &sink, "x", &CancellationToken::new()).await;
        assert_eq!(report.samples, 2);
        assert_eq!(report.last_sample.map(|s| s.percent_complete), Some(100.0));
    }

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UpdateSink for FailingSink {
        async fn update(&self, _text: &str) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SinkError("message to edit not found".to_string()))
        }
    }

    #[tokio::test]
    async fn test_monitor_survives_sink_failures() {
        let input: &[u8] = b"[download] 100.0% of 1.00MiB at 1.00MiB/s\n\
            [download] 100.0% of 1.00MiB at 1.00MiB/s\n\
            [download] 100.0% of 1.00MiB at 1.00MiB/s\n";
        let sink = FailingSink { calls: AtomicUsize::new(0) };
        let report = monitor_stream(input, &sink, "x", &CancellationToken::new()).await;

        assert_eq!(report.samples, 3);
        assert_eq!(report.sink_failures, 3);
        assert_eq!(report.updates_sent, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_blocked_read_cleanly() {
        // writer half kept alive so the stream never reaches EOF
        let (reader, _writer) = tokio::io::duplex(64);
        let sink: Arc<dyn UpdateSink> = Arc::new(RecordingSink::new());
        let handle = MonitorHandle::spawn(reader, sink, "x".to_string());

        let report = handle.stop(Duration::from_millis(50)).await;
        assert!(report.cancelled);
        assert_eq!(report.lines_read, 0);
    }

    #[tokio::test]
    async fn test_stop_after_eof_is_not_cancelled() {
        let input: &'static [u8] = b"[download] 100.0% of 1.00MiB at 1.00MiB/s\n";
        let sink = RecordingSink::new();
        let handle = MonitorHandle::spawn(input, Arc::new(sink.clone()), "x".to_string());

        let report = handle.stop(Duration::from_secs(5)).await;
        assert!(!report.cancelled);
        assert_eq!(report.updates_sent, 1);
        assert_eq!(sink.updates().await.len(), 1);
    }
}
