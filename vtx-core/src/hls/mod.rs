use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::encoder::{run_encoder, ProgressParser};
use crate::error::{ErrorKind, Result, StructuredError};
use crate::ladder::{default_ladder, QualityTier};
use crate::probe::Prober;
use crate::progress::ProgressReporter;

pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

const DEFAULT_SEGMENT_DURATION: u32 = 10;

/// HLS playlist type passed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaylistType {
    #[default]
    Vod,
    Event,
}

impl PlaylistType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistType::Vod => "vod",
            PlaylistType::Event => "event",
        }
    }
}

/// Settings for one adaptive-stream generation.
#[derive(Debug, Clone)]
pub struct HlsOptions {
    pub input: String,
    pub output_dir: PathBuf,
    pub segment_duration: u32,
    pub playlist_type: PlaylistType,
    pub resolutions: Vec<QualityTier>,
    pub master_playlist: String,
    pub segment_format: String,
    pub ffmpeg_binary: String,
    pub extra_args: Vec<String>,
}

impl HlsOptions {
    pub fn new(input: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            segment_duration: DEFAULT_SEGMENT_DURATION,
            playlist_type: PlaylistType::default(),
            resolutions: default_ladder(),
            master_playlist: MASTER_PLAYLIST_NAME.to_string(),
            segment_format: "mpegts".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Splits one input into N scaled variants plus a master manifest by
/// driving a single encoder invocation.
pub struct HlsGenerator {
    options: HlsOptions,
    prober: Prober,
    progress: Option<Arc<ProgressReporter>>,
}

impl HlsGenerator {
    pub fn new(options: HlsOptions, prober: Prober, progress: Option<Arc<ProgressReporter>>) -> Self {
        Self { options, prober, progress }
    }

    /// Runs the encoder and returns the master playlist path once it is
    /// confirmed on disk.
    pub async fn create(&self, cancel: &CancellationToken) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.options.output_dir)
            .await
            .map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::System, "Failed to create output directory", 1)
            })?;

        for index in 0..self.options.resolutions.len() {
            let stream_dir = self.options.output_dir.join(format!("stream_{index}"));
            tokio::fs::create_dir_all(&stream_dir).await.map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::Hls, "Failed to create stream directory", 2)
            })?;
        }

        let args = self.build_args();

        // total is best-effort: estimation failure suppresses progress but
        // never blocks the transcode
        let progress = match &self.progress {
            Some(reporter) => {
                let total = self.prober.total_frames(&self.options.input).await;
                if total > 0 {
                    reporter.start(total);
                } else {
                    debug!(target: "hls", input = %self.options.input, "frame estimation unavailable, progress suppressed");
                }
                Some((
                    Arc::clone(reporter),
                    ProgressParser::Frames { total, stage: "Creating HLS stream" },
                ))
            }
            None => None,
        };

        run_encoder(
            &self.options.ffmpeg_binary,
            &args,
            progress,
            cancel,
            ErrorKind::Hls,
            "FFmpeg command failed",
            5,
        )
        .await?;

        if let Some(reporter) = &self.progress {
            reporter.complete();
        }

        let master_path = self.options.output_dir.join(&self.options.master_playlist);
        if !master_path.exists() {
            return Err(StructuredError::new(
                ErrorKind::Hls,
                "Master playlist was not created",
                self.options.output_dir.display().to_string(),
                7,
            ));
        }

        info!(target: "hls", master_playlist = %master_path.display(), "HLS generation completed");
        Ok(master_path)
    }

    /// Encoder argument vector, in fixed order: input, filter graph,
    /// per-tier stream options, HLS muxer flags, variant stream map,
    /// passthrough extra args, per-tier output pattern.
    fn build_args(&self) -> Vec<String> {
        let resolutions = &self.options.resolutions;
        let mut args = vec![
            "-i".to_string(),
            self.options.input.clone(),
            "-filter_complex".to_string(),
            build_filter_graph(resolutions),
        ];

        for (index, tier) in resolutions.iter().enumerate() {
            args.extend([
                "-map".to_string(),
                format!("[v{index}out]"),
                format!("-c:v:{index}"),
                "libx264".to_string(),
                format!("-b:v:{index}"),
                tier.video_bitrate.clone(),
                format!("-maxrate:v:{index}"),
                tier.max_bitrate.clone(),
                format!("-bufsize:v:{index}"),
                tier.buffer_size.clone(),
            ]);
            args.extend([
                "-map".to_string(),
                "a:0".to_string(),
                format!("-c:a:{index}"),
                "aac".to_string(),
                format!("-b:a:{index}"),
                tier.audio_bitrate.clone(),
                "-ac".to_string(),
                "2".to_string(),
            ]);
        }

        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.options.segment_duration.to_string(),
            "-hls_playlist_type".to_string(),
            self.options.playlist_type.as_str().to_string(),
            "-hls_flags".to_string(),
            "independent_segments".to_string(),
            "-hls_segment_type".to_string(),
            self.options.segment_format.clone(),
            "-hls_segment_filename".to_string(),
            self.options
                .output_dir
                .join("stream_%v/data%03d.ts")
                .to_string_lossy()
                .to_string(),
            "-master_pl_name".to_string(),
            self.options.master_playlist.clone(),
        ]);

        let stream_map = resolutions
            .iter()
            .enumerate()
            .map(|(index, _)| format!("v:{index},a:{index}"))
            .collect::<Vec<_>>()
            .join(" ");
        args.push("-var_stream_map".to_string());
        args.push(stream_map);

        args.extend(self.options.extra_args.iter().cloned());

        args.push(
            self.options
                .output_dir
                .join("stream_%v/playlist.m3u8")
                .to_string_lossy()
                .to_string(),
        );

        args
    }
}

/// Filter graph splitting the decoded video into one scaled branch per tier.
fn build_filter_graph(resolutions: &[QualityTier]) -> String {
    let mut filter = format!("[0:v]split={}", resolutions.len());
    for index in 0..resolutions.len() {
        filter.push_str(&format!("[v{index}]"));
    }
    for (index, tier) in resolutions.iter().enumerate() {
        filter.push_str(&format!(
            "; [v{index}]scale=w={}:h={}[v{index}out]",
            tier.width, tier.height
        ));
    }
    filter
}
