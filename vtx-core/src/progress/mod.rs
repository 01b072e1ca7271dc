use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Overall state of a progress-tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Initialized,
    Started,
    Processing,
    Completed,
}

/// A single progress snapshot, emitted on the update channel and written to
/// the optional progress file in JSON mode.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub percentage: f64,
    pub step: String,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
}

/// Serialization mode for the progress file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressFileFormat {
    /// The file holds only the percentage, formatted to two decimals.
    Text,
    /// The file holds the full serialized [`ProgressEvent`].
    Json,
}

struct FileSink {
    path: PathBuf,
    format: ProgressFileFormat,
}

struct ReporterState {
    total: i64,
    current: i64,
    event: ProgressEvent,
    throttle: Option<Duration>,
    last_emit: Option<Instant>,
    sink: Option<FileSink>,
    tx: Option<mpsc::Sender<ProgressEvent>>,
    rx: Option<mpsc::Receiver<ProgressEvent>>,
}

/// Tracks a monotonic counter against a known total and fans snapshots out
/// to an update channel and an optional file sink.
///
/// One mutex guards every state mutation together with the decision to
/// emit, so concurrent writers never interleave a stale snapshot. All
/// side effects are best-effort: a full channel drops the event and a
/// failed file write is logged, never propagated.
pub struct ProgressReporter {
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ReporterState {
                total: 0,
                current: 0,
                event: ProgressEvent {
                    status: ProgressStatus::Initialized,
                    percentage: 0.0,
                    step: String::new(),
                    stage: String::new(),
                    timestamp: Utc::now(),
                },
                throttle: None,
                last_emit: None,
                sink: None,
                tx: Some(tx),
                rx: Some(rx),
            }),
        }
    }

    /// Minimum interval between channel emissions. `start` and `complete`
    /// bypass it.
    pub fn with_throttle(self, interval: Duration) -> Self {
        self.state.lock().unwrap().throttle = Some(interval);
        self
    }

    /// Overwrite `path` with the current state on every transition.
    pub fn with_progress_file(self, path: impl Into<PathBuf>, format: ProgressFileFormat) -> Self {
        self.state.lock().unwrap().sink = Some(FileSink {
            path: path.into(),
            format,
        });
        self
    }

    /// Hands out the single consumer end of the update channel. The stream
    /// is finite: it closes after `complete()`.
    pub fn updates(&self) -> Option<mpsc::Receiver<ProgressEvent>> {
        self.state.lock().unwrap().rx.take()
    }

    /// Latest snapshot, for callers that poll instead of subscribing.
    pub fn snapshot(&self) -> ProgressEvent {
        self.state.lock().unwrap().event.clone()
    }

    pub fn start(&self, total: i64) {
        let mut state = self.state.lock().unwrap();
        state.total = total;
        state.current = 0;
        state.event.status = ProgressStatus::Started;
        state.event.percentage = 0.0;
        state.event.timestamp = Utc::now();
        Self::emit(&mut state, true);
    }

    pub fn update(&self, current: i64, step: &str, stage: &str) {
        let mut state = self.state.lock().unwrap();
        let clamped = if state.total > 0 {
            current.clamp(0, state.total)
        } else {
            current.max(0)
        };
        state.current = clamped;
        state.event.percentage = percentage(clamped, state.total);
        state.event.step = step.to_string();
        state.event.stage = stage.to_string();
        state.event.status = ProgressStatus::Processing;
        state.event.timestamp = Utc::now();
        Self::emit(&mut state, false);
    }

    pub fn increment(&self, step: &str, stage: &str) {
        let current = self.state.lock().unwrap().current;
        self.update(current + 1, step, stage);
    }

    /// Finalizes the run: current is forced to total, percentage to 100,
    /// the final event is emitted unconditionally and the update channel is
    /// closed. No emission is valid afterwards.
    pub fn complete(&self) {
        let mut state = self.state.lock().unwrap();
        state.current = state.total;
        state.event.percentage = 100.0;
        state.event.status = ProgressStatus::Completed;
        state.event.timestamp = Utc::now();
        Self::emit(&mut state, true);
        state.tx = None;
    }

    fn emit(state: &mut ReporterState, force: bool) {
        if let Some(sink) = &state.sink {
            write_sink(sink, &state.event);
        }

        if !force {
            if let (Some(throttle), Some(last)) = (state.throttle, state.last_emit) {
                if last.elapsed() < throttle {
                    return;
                }
            }
        }
        state.last_emit = Some(Instant::now());
        if let Some(tx) = &state.tx {
            // Lossy on backpressure, like the event channels elsewhere in
            // the pipeline. The final completed event is the last attempt.
            let _ = tx.try_send(state.event.clone());
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn percentage(current: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (current as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

fn write_sink(sink: &FileSink, event: &ProgressEvent) {
    let contents = match sink.format {
        ProgressFileFormat::Text => format!("{:.2}", event.percentage),
        ProgressFileFormat::Json => match serde_json::to_string(event) {
            Ok(json) => json,
            Err(error) => {
                warn!(target: "progress", %error, "failed to serialize progress event");
                return;
            }
        },
    };
    if let Err(error) = std::fs::write(&sink.path, contents) {
        warn!(target: "progress", path = %sink.path.display(), %error, "failed to write progress file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_pure_and_clamped() {
        assert_eq!(percentage(0, 100), 0.0);
        assert_eq!(percentage(55, 100), 55.0);
        assert_eq!(percentage(250, 100), 100.0);
        assert_eq!(percentage(10, 0), 0.0);
    }

    #[test]
    fn update_is_idempotent_for_same_current() {
        let reporter = ProgressReporter::new();
        reporter.start(200);
        reporter.update(50, "transcoding", "pass one");
        let first = reporter.snapshot();
        reporter.update(50, "transcoding", "pass one");
        let second = reporter.snapshot();
        assert_eq!(first.percentage, second.percentage);
        assert_eq!(second.percentage, 25.0);
    }

    #[test]
    fn update_with_zero_total_reports_zero() {
        let reporter = ProgressReporter::new();
        reporter.update(42, "transcoding", "warming up");
        assert_eq!(reporter.snapshot().percentage, 0.0);
        assert_eq!(reporter.snapshot().status, ProgressStatus::Processing);
    }

    #[test]
    fn update_clamps_current_to_total() {
        let reporter = ProgressReporter::new();
        reporter.start(100);
        reporter.update(500, "transcoding", "overshoot");
        assert_eq!(reporter.snapshot().percentage, 100.0);
    }

    #[test]
    fn complete_forces_full_percentage() {
        let reporter = ProgressReporter::new();
        reporter.start(1000);
        reporter.update(10, "transcoding", "early");
        reporter.complete();
        let event = reporter.snapshot();
        assert_eq!(event.percentage, 100.0);
        assert_eq!(event.status, ProgressStatus::Completed);
    }

    #[test]
    fn increment_advances_by_one() {
        let reporter = ProgressReporter::new();
        reporter.start(4);
        reporter.increment("downloading", "chunk");
        reporter.increment("downloading", "chunk");
        assert_eq!(reporter.snapshot().percentage, 50.0);
    }

    #[tokio::test]
    async fn channel_closes_after_complete() {
        let reporter = ProgressReporter::new();
        let mut updates = reporter.updates().expect("receiver available once");
        assert!(reporter.updates().is_none());

        reporter.start(2);
        reporter.update(1, "transcoding", "half");
        reporter.complete();

        let mut statuses = Vec::new();
        while let Some(event) = updates.recv().await {
            statuses.push(event.status);
        }
        assert_eq!(statuses.first(), Some(&ProgressStatus::Started));
        assert_eq!(statuses.last(), Some(&ProgressStatus::Completed));
    }

    #[test]
    fn text_sink_writes_bare_percentage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        let reporter = ProgressReporter::new()
            .with_progress_file(&path, ProgressFileFormat::Text);
        reporter.start(100);
        reporter.update(55, "transcoding", "middle");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "55.00");
        reporter.complete();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "100.00");
    }

    #[test]
    fn json_sink_writes_full_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let reporter = ProgressReporter::new()
            .with_progress_file(&path, ProgressFileFormat::Json);
        reporter.start(10);
        reporter.update(5, "downloading", "Downloading file");
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "processing");
        assert_eq!(value["percentage"], 50.0);
        assert_eq!(value["step"], "downloading");
        assert_eq!(value["stage"], "Downloading file");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn sink_failure_does_not_panic_or_propagate() {
        let reporter = ProgressReporter::new().with_progress_file(
            "/nonexistent-dir/progress.txt",
            ProgressFileFormat::Text,
        );
        reporter.start(10);
        reporter.update(5, "transcoding", "half");
        reporter.complete();
        assert_eq!(reporter.snapshot().percentage, 100.0);
    }
}
