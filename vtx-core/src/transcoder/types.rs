use std::path::PathBuf;

use crate::hls::PlaylistType;
use crate::ladder::{default_ladder, QualityTier};

/// Output kind of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// Adaptive ladder: manifests and segments under the output directory.
    #[default]
    Hls,
    /// One MP4 file at the output path.
    Mp4,
}

/// Immutable configuration for one orchestration run, validated when the
/// [`Transcoder`](super::Transcoder) is constructed. The ladder is the one
/// field replaced internally when auto detection runs, and only on the
/// run-local copy.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// Local path, or URL when the input is remote.
    pub input_path: String,
    /// Where remote inputs are downloaded before processing.
    pub download_dir: PathBuf,
    pub allow_overwrite: bool,
    /// Directory for HLS output, full file path for MP4 output.
    pub output_path: PathBuf,
    pub output_type: OutputType,
    pub hls_segment_duration: u32,
    pub hls_playlist_type: PlaylistType,
    pub hls_resolutions: Vec<QualityTier>,
    /// Probe the source and derive the ladder instead of using
    /// `hls_resolutions`. HLS output only.
    pub use_auto_resolutions: bool,
    /// Pass the URL straight to the encoder instead of downloading first.
    pub stream_from_url: bool,
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
    /// Extra arguments forwarded verbatim to the encoder.
    pub extra_args: Vec<String>,
}

impl TranscodeOptions {
    pub fn new(input_path: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            download_dir: PathBuf::from("downloads"),
            allow_overwrite: false,
            output_path: output_path.into(),
            output_type: OutputType::default(),
            hls_segment_duration: 10,
            hls_playlist_type: PlaylistType::default(),
            hls_resolutions: default_ladder(),
            use_auto_resolutions: false,
            stream_from_url: false,
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_segment_duration(mut self, seconds: u32) -> Self {
        self.hls_segment_duration = seconds;
        self
    }

    pub fn with_playlist_type(mut self, playlist_type: PlaylistType) -> Self {
        self.hls_playlist_type = playlist_type;
        self
    }

    pub fn with_resolutions(mut self, resolutions: Vec<QualityTier>) -> Self {
        self.hls_resolutions = resolutions;
        self
    }

    pub fn with_auto_resolutions(mut self, enabled: bool) -> Self {
        self.use_auto_resolutions = enabled;
        self
    }

    pub fn with_stream_from_url(mut self, enabled: bool) -> Self {
        self.stream_from_url = enabled;
        self
    }

    pub fn with_ffmpeg_binary(mut self, binary: impl Into<String>) -> Self {
        self.ffmpeg_binary = binary.into();
        self
    }

    pub fn with_ffprobe_binary(mut self, binary: impl Into<String>) -> Self {
        self.ffprobe_binary = binary.into();
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}
