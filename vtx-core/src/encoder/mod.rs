//! Encoder subprocess lifecycle shared by the adaptive and single-output
//! paths: spawn with piped stderr, one reader task relaying lines to the
//! log and scraping progress, then a join of both the reader and the
//! process exit before anything is returned.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{codes, ErrorKind, Result, StructuredError};
use crate::progress::ProgressReporter;

/// How many trailing stderr lines are kept for failure classification.
const DIAGNOSTIC_TAIL_LINES: usize = 64;

/// Progress extraction mode for the stderr stream.
pub(crate) enum ProgressParser {
    /// `frame=  123` counters against a known total frame count.
    Frames { total: i64, stage: &'static str },
    /// `time=HH:MM:SS.ss` wall-clock position against the source duration.
    Timecode { total_seconds: f64 },
}

/// Runs the encoder to completion under the cancellation token.
///
/// Exactly one reader consumes stderr; its buffered tail is used to refine
/// a non-zero exit into a more specific error before falling back to
/// `fallback_kind`/`fallback_code`. On cancellation the child is killed and
/// still awaited.
pub(crate) async fn run_encoder(
    binary: &str,
    args: &[String],
    progress: Option<(Arc<ProgressReporter>, ProgressParser)>,
    cancel: &CancellationToken,
    fallback_kind: ErrorKind,
    fallback_message: &str,
    fallback_code: i32,
) -> Result<()> {
    debug!(target: "ffmpeg", command = %format!("{} {}", binary, args.join(" ")), "executing encoder");

    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StructuredError::coded(
                ErrorKind::MissingCodec,
                codes::MISSING_DEPENDENCY,
                format!("{binary} not found"),
            )
        } else {
            StructuredError::wrap(&err, fallback_kind, "Failed to start encoder", fallback_code)
        }
    })?;

    let stderr = child.stderr.take().ok_or_else(|| {
        StructuredError::new(fallback_kind, "Failed to capture encoder stderr", "", fallback_code)
    })?;
    let reader = tokio::spawn(consume_stderr(stderr, progress));

    let waited = tokio::select! {
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };
    let status = match waited {
        Some(status) => status.map_err(|err| {
            StructuredError::wrap(&err, fallback_kind, "Failed to wait for encoder", fallback_code)
        })?,
        // cancelled: kill the child but still await its exit and the reader
        None => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let _ = reader.await;
            return Err(StructuredError::new(
                fallback_kind,
                "Encoder process cancelled",
                binary.to_string(),
                fallback_code,
            ));
        }
    };

    // the reader reaches end-of-file once the child closes its stderr, so
    // this join cannot hang and no buffered progress is discarded
    let tail = reader.await.unwrap_or_default();

    if !status.success() {
        return Err(classify_exit(
            &tail,
            status.code(),
            fallback_kind,
            fallback_message,
            fallback_code,
        ));
    }
    Ok(())
}

async fn consume_stderr(
    stderr: ChildStderr,
    progress: Option<(Arc<ProgressReporter>, ProgressParser)>,
) -> Vec<String> {
    let frame_pattern = Regex::new(r"frame=\s*(\d+)").expect("valid frame pattern");
    let time_pattern = Regex::new(r"time=(\d+):(\d+):(\d+\.\d+)").expect("valid time pattern");

    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "ffmpeg", "{line}");

        match &progress {
            Some((reporter, ProgressParser::Frames { total, stage })) if *total > 0 => {
                if let Some(captures) = frame_pattern.captures(&line) {
                    if let Ok(frame) = captures[1].parse::<i64>() {
                        reporter.update(frame, "transcoding", stage);
                    }
                }
            }
            Some((reporter, ProgressParser::Timecode { total_seconds })) if *total_seconds > 0.0 => {
                if let Some(captures) = time_pattern.captures(&line) {
                    let hours: i64 = captures[1].parse().unwrap_or(0);
                    let minutes: i64 = captures[2].parse().unwrap_or(0);
                    let seconds: f64 = captures[3].parse().unwrap_or(0.0);
                    let elapsed = (hours * 3600 + minutes * 60) as f64 + seconds;
                    reporter.update(
                        elapsed as i64,
                        "transcoding",
                        &format!("Processing: {hours:02}:{minutes:02}:{seconds:05.2}"),
                    );
                }
            }
            _ => {}
        }

        if tail.len() == DIAGNOSTIC_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect()
}

/// Inspects the diagnostic tail for phrases the encoder is known to print.
/// Matching is best-effort against the deployed ffmpeg build; an
/// unrecognized failure still yields the categorized fallback error.
fn classify_exit(
    tail: &[String],
    exit_code: Option<i32>,
    fallback_kind: ErrorKind,
    fallback_message: &str,
    fallback_code: i32,
) -> StructuredError {
    let text = tail.join("\n");

    if text.contains("Unknown encoder") {
        return StructuredError::coded(ErrorKind::MissingCodec, codes::CODEC_NOT_FOUND, text);
    }
    if text.contains("Cannot allocate memory") || text.contains("out of memory") {
        return StructuredError::coded(ErrorKind::Memory, codes::OUT_OF_MEMORY, text);
    }
    if text.contains("Invalid data") || text.contains("could not find codec parameters") {
        return StructuredError::coded(ErrorKind::InvalidFormat, codes::CORRUPTED_FILE, text);
    }

    let details = match exit_code {
        Some(code) => format!("exit code {code}: {text}"),
        None => format!("terminated by signal: {text}"),
    };
    StructuredError::new(fallback_kind, fallback_message, details, fallback_code)
}
