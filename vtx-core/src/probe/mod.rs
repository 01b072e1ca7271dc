use std::path::PathBuf;

use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{codes, ErrorKind, Result, StructuredError};

/// Detected source metadata. `duration` is best-effort: 0.0 means unknown
/// and callers using it for progress estimation must cope with that.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Wraps the metadata-inspection binary (ffprobe).
#[derive(Debug, Clone)]
pub struct Prober {
    binary: PathBuf,
}

impl Prober {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Resolution and duration of the input, from ffprobe's JSON output.
    /// Fails when no video stream is present or its dimensions are unset;
    /// a missing duration is not an error.
    pub async fn video_info(&self, input: &str, cancel: &CancellationToken) -> Result<VideoInfo> {
        let mut command = Command::new(&self.binary);
        command
            .kill_on_drop(true)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(input);

        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StructuredError::new(
                    ErrorKind::System,
                    "Resolution probe cancelled",
                    input,
                    1,
                ));
            }
            output = command.output() => output,
        };

        let output = output.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StructuredError::coded(
                    ErrorKind::MissingCodec,
                    codes::MISSING_DEPENDENCY,
                    format!("{} not found", self.binary.display()),
                )
            } else {
                StructuredError::wrap(&err, ErrorKind::System, "Failed to run ffprobe", 2)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StructuredError::coded(
                ErrorKind::InvalidFormat,
                codes::CORRUPTED_FILE,
                stderr.trim().to_string(),
            ));
        }

        parse_video_info(&output.stdout)
    }

    /// Packet count of the first video stream, used as the progress total
    /// for frame-based encodes. Returns 0 on any failure.
    pub async fn total_frames(&self, input: &str) -> i64 {
        let result = Command::new(&self.binary)
            .kill_on_drop(true)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-count_packets")
            .arg("-show_entries")
            .arg("stream=nb_read_packets")
            .arg("-of")
            .arg("csv=p=0")
            .arg(input)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .trim()
                .parse()
                .unwrap_or(0),
            Ok(output) => {
                debug!(target: "probe", input, status = ?output.status.code(), "frame count probe failed");
                0
            }
            Err(error) => {
                debug!(target: "probe", input, %error, "frame count probe failed");
                0
            }
        }
    }

    /// Container duration in seconds. Returns 0.0 on any failure.
    pub async fn duration_seconds(&self, input: &str) -> f64 {
        let result = Command::new(&self.binary)
            .kill_on_drop(true)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(input)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .trim()
                .parse()
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

fn parse_video_info(stdout: &[u8]) -> Result<VideoInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|err| StructuredError::wrap(&err, ErrorKind::System, "Failed to parse ffprobe output", 3))?;

    let video = parsed
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            StructuredError::coded(
                ErrorKind::InvalidFormat,
                codes::INVALID_FILE_FORMAT,
                "no video stream found",
            )
        })?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(StructuredError::coded(
                ErrorKind::InvalidFormat,
                codes::INVALID_FILE_FORMAT,
                "video stream reports no resolution",
            ));
        }
    };

    let duration = parsed
        .format
        .duration
        .as_deref()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo { width, height, duration })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_video_stream_and_duration() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_video_info(json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert!((info.duration - 12.48).abs() < 1e-9);
    }

    #[test]
    fn missing_duration_is_not_an_error() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 640, "height": 360}]}"#;
        let info = parse_video_info(json).unwrap();
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn audio_only_input_is_rejected() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let err = parse_video_info(json).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFormat);
        assert_eq!(err.code, codes::INVALID_FILE_FORMAT);
    }

    #[test]
    fn unset_dimensions_are_rejected() {
        let json = br#"{"streams": [{"codec_type": "video"}], "format": {}}"#;
        let err = parse_video_info(json).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFormat);
    }

    #[test]
    fn garbage_output_is_a_system_error() {
        let err = parse_video_info(b"not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::System);
    }
}
