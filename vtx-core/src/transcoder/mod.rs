mod types;

use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::downloader::{DownloadRequest, Downloader};
use crate::encoder::{run_encoder, ProgressParser};
use crate::error::{codes, ErrorKind, Result, StructuredError};
use crate::hls::{HlsGenerator, HlsOptions};
use crate::ladder::{format_ladder, generate_auto_ladder, QualityTier};
use crate::probe::Prober;
use crate::progress::ProgressReporter;

pub use types::{OutputType, TranscodeOptions};

/// Container extensions accepted for local inputs.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "mpeg", "mpg", "m4v", "3gp", "ts", "mts",
    "m2ts",
];

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_DOWNLOAD_SPACE_BYTES: u64 = 500 * 1024 * 1024;
const MAX_TIER_WIDTH: u32 = 7680;
const MAX_TIER_HEIGHT: u32 = 4320;
const MIN_TIER_WIDTH: u32 = 128;
const MIN_TIER_HEIGHT: u32 = 96;

/// Top-level orchestrator for one transcoding run: resolves the input,
/// optionally derives the ladder, preflights the encoder and dispatches to
/// the adaptive or single-output path. Single-attempt semantics; retries
/// belong to the caller.
pub struct Transcoder {
    options: TranscodeOptions,
    progress: Option<Arc<ProgressReporter>>,
    downloader: Option<Downloader>,
    client: Client,
    prober: Prober,
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .field("downloader", &self.downloader.is_some())
            .finish_non_exhaustive()
    }
}

impl Transcoder {
    /// Builds a transcoder with default dependencies. A fetcher is provided
    /// automatically when the input is remote and streaming is off.
    pub fn new(options: TranscodeOptions, progress: Option<Arc<ProgressReporter>>) -> Result<Self> {
        let downloader = if is_remote_url(&options.input_path) && !options.stream_from_url {
            Some(Downloader::new()?)
        } else {
            None
        };
        Self::with_deps(options, progress, downloader)
    }

    /// Builds a transcoder with an injected fetcher. Remote non-streaming
    /// input without a fetcher is a configuration error here, not at run
    /// time.
    pub fn with_deps(
        options: TranscodeOptions,
        progress: Option<Arc<ProgressReporter>>,
        downloader: Option<Downloader>,
    ) -> Result<Self> {
        if options.input_path.is_empty() {
            return Err(StructuredError::new(
                ErrorKind::Validation,
                "Input path is required",
                "",
                1,
            ));
        }
        if options.output_path.as_os_str().is_empty() {
            return Err(StructuredError::new(
                ErrorKind::Validation,
                "Output path is required",
                "",
                2,
            ));
        }
        if is_remote_url(&options.input_path) && !options.stream_from_url && downloader.is_none() {
            return Err(StructuredError::new(
                ErrorKind::Validation,
                "Downloader dependency is required for remote inputs when streaming is disabled",
                "",
                3,
            ));
        }

        let client = Client::builder()
            .user_agent("vtx-core/0.1")
            .build()
            .map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::Network, "Failed to build HTTP client", 0)
            })?;
        let prober = Prober::new(&options.ffprobe_binary);

        Ok(Self {
            options,
            progress,
            downloader,
            client,
            prober,
        })
    }

    /// Executes the run and returns the primary output: the master
    /// playlist for HLS, the output file for MP4.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PathBuf> {
        if cancel.is_cancelled() {
            return Err(StructuredError::new(
                ErrorKind::System,
                "Transcoding run cancelled",
                "",
                0,
            ));
        }

        let input = self.resolve_input(cancel).await?;

        // ladder auto-detection mutates a run-local copy only
        let mut ladder = self.options.hls_resolutions.clone();
        if self.options.use_auto_resolutions && self.options.output_type == OutputType::Hls {
            info!(target: "transcoder", input = %input, "detecting source resolution for auto ladder");
            let video = self.prober.video_info(&input, cancel).await?;
            info!(
                target: "transcoder",
                width = video.width,
                height = video.height,
                duration = video.duration,
                "source resolution detected"
            );
            ladder = generate_auto_ladder(video.width, video.height);
            info!(target: "transcoder", ladder = %format_ladder(&ladder), "using auto ladder");
        }

        match self.options.output_type {
            OutputType::Hls => {
                validate_ladder(&ladder)?;
                self.preflight_encoder().await?;
                info!(
                    target: "transcoder",
                    input = %input,
                    output = %self.options.output_path.display(),
                    "creating HLS adaptive streams"
                );
                let mut hls_options =
                    HlsOptions::new(input, self.options.output_path.clone());
                hls_options.segment_duration = self.options.hls_segment_duration;
                hls_options.playlist_type = self.options.hls_playlist_type;
                hls_options.resolutions = ladder;
                hls_options.ffmpeg_binary = self.options.ffmpeg_binary.clone();
                hls_options.extra_args = self.options.extra_args.clone();
                let generator =
                    HlsGenerator::new(hls_options, self.prober.clone(), self.progress.clone());
                generator.create(cancel).await
            }
            OutputType::Mp4 => {
                self.preflight_encoder().await?;
                info!(
                    target: "transcoder",
                    input = %input,
                    output = %self.options.output_path.display(),
                    "transcoding to MP4"
                );
                self.transcode_to_mp4(&input, cancel).await
            }
        }
    }

    /// Resolves the configured input into something the encoder can read:
    /// the URL itself (streaming), the local path (after validation), or
    /// the downloaded file path.
    async fn resolve_input(&self, cancel: &CancellationToken) -> Result<String> {
        if is_remote_url(&self.options.input_path) {
            if self.options.stream_from_url {
                return self.check_stream_reachable(cancel).await;
            }
            return self.download_input(cancel).await;
        }
        self.validate_local_input()?;
        Ok(self.options.input_path.clone())
    }

    fn validate_local_input(&self) -> Result<()> {
        let path = Path::new(&self.options.input_path);
        let metadata = match path.metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StructuredError::coded(
                    ErrorKind::FileNotFound,
                    codes::FILE_NOT_FOUND,
                    self.options.input_path.clone(),
                ));
            }
            Err(err) => {
                return Err(StructuredError::wrap(
                    &err,
                    ErrorKind::System,
                    "Failed to inspect input file",
                    4,
                ));
            }
        };

        if metadata.is_dir() {
            return Err(StructuredError::new(
                ErrorKind::InvalidFormat,
                "Input path is a directory, not a file",
                self.options.input_path.clone(),
                codes::INVALID_FILE_FORMAT,
            ));
        }

        match std::fs::File::open(path) {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(StructuredError::coded(
                    ErrorKind::Permission,
                    codes::READ_PERMISSION_DENIED,
                    self.options.input_path.clone(),
                ));
            }
            Err(err) => {
                return Err(StructuredError::wrap(
                    &err,
                    ErrorKind::System,
                    "Failed to open input file",
                    4,
                ));
            }
        }

        if metadata.len() == 0 {
            return Err(StructuredError::new(
                ErrorKind::InvalidFormat,
                "Input file is empty",
                self.options.input_path.clone(),
                codes::CORRUPTED_FILE,
            ));
        }

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StructuredError::coded(
                ErrorKind::InvalidFormat,
                codes::UNSUPPORTED_FILE_FORMAT,
                format!("extension: .{extension}"),
            ));
        }

        Ok(())
    }

    /// Lightweight reachability probe before handing the URL to the
    /// encoder. Failures are split into distinct network codes; a
    /// non-video content type is rejected outright.
    async fn check_stream_reachable(&self, cancel: &CancellationToken) -> Result<String> {
        let url = &self.options.input_path;
        info!(target: "transcoder", %url, "streaming directly from URL");

        let send = self.client.head(url).timeout(REACHABILITY_TIMEOUT).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StructuredError::new(
                    ErrorKind::System,
                    "Transcoding run cancelled",
                    url.clone(),
                    0,
                ));
            }
            response = send => response.map_err(|err| classify_reachability_error(&err))?,
        };

        if response.status().as_u16() >= 400 {
            return Err(StructuredError::coded(
                ErrorKind::Network,
                codes::NETWORK_SERVER_UNAVAILABLE,
                format!("Server returned status code {}", response.status().as_u16()),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("video/") && !content_type.contains("application/octet-stream")
        {
            return Err(StructuredError::coded(
                ErrorKind::InvalidFormat,
                codes::INVALID_FILE_FORMAT,
                format!("Content-Type: {content_type}"),
            ));
        }

        Ok(url.clone())
    }

    async fn download_input(&self, cancel: &CancellationToken) -> Result<String> {
        let downloader = self.downloader.as_ref().ok_or_else(|| {
            // unreachable when construction validated the dependency
            StructuredError::new(
                ErrorKind::System,
                "Downloader is required but not available",
                "",
                10,
            )
        })?;

        info!(target: "transcoder", url = %self.options.input_path, "downloading remote input before transcoding");

        let parsed = Url::parse(&self.options.input_path).map_err(|err| {
            StructuredError::wrap(&err, ErrorKind::Validation, "Invalid input URL", 5)
        })?;
        let file_name = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("download_{}.mp4", Utc::now().timestamp()));

        tokio::fs::create_dir_all(&self.options.download_dir)
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::PermissionDenied {
                    StructuredError::wrap(
                        &err,
                        ErrorKind::Permission,
                        crate::error::message_for(codes::WRITE_PERMISSION_DENIED),
                        codes::WRITE_PERMISSION_DENIED,
                    )
                } else {
                    StructuredError::wrap(
                        &err,
                        ErrorKind::System,
                        "Failed to create download directory",
                        6,
                    )
                }
            })?;

        if let Some(available) = available_disk_space(&self.options.download_dir) {
            if available < MIN_DOWNLOAD_SPACE_BYTES {
                return Err(StructuredError::coded(
                    ErrorKind::DiskSpace,
                    codes::DISK_SPACE_INSUFFICIENT,
                    format!("available: {available} bytes"),
                ));
            }
        }

        let request = DownloadRequest::new(
            self.options.input_path.clone(),
            self.options.download_dir.join(file_name),
        )
        .with_overwrite(self.options.allow_overwrite);

        let downloaded = downloader
            .download(&request, self.progress.as_deref(), cancel)
            .await
            .map_err(refine_download_error)?;

        Ok(downloaded.to_string_lossy().to_string())
    }

    /// Verifies the encoder binary responds and carries the codecs this
    /// pipeline hard-depends on, before any real subprocess work begins.
    async fn preflight_encoder(&self) -> Result<()> {
        let version = tokio::process::Command::new(&self.options.ffmpeg_binary)
            .arg("-version")
            .output()
            .await
            .map_err(|err| {
                StructuredError::wrap(
                    &err,
                    ErrorKind::MissingCodec,
                    crate::error::message_for(codes::MISSING_DEPENDENCY),
                    codes::MISSING_DEPENDENCY,
                )
            })?;
        if !version.status.success() {
            return Err(StructuredError::coded(
                ErrorKind::MissingCodec,
                codes::MISSING_DEPENDENCY,
                String::from_utf8_lossy(&version.stderr).trim().to_string(),
            ));
        }
        if let Some(first_line) = String::from_utf8_lossy(&version.stdout).lines().next() {
            debug!(target: "transcoder", version = first_line, "encoder preflight");
        }

        let codecs = tokio::process::Command::new(&self.options.ffmpeg_binary)
            .arg("-codecs")
            .output()
            .await
            .map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::System, "Failed to query FFmpeg codecs", 20)
            })?;
        let codecs_text = String::from_utf8_lossy(&codecs.stdout);

        if !codecs_text.contains("libx264") {
            return Err(StructuredError::coded(
                ErrorKind::MissingCodec,
                codes::CODEC_NOT_FOUND,
                "codec libx264 not found",
            ));
        }
        if !codecs_text.contains("aac") {
            return Err(StructuredError::coded(
                ErrorKind::MissingCodec,
                codes::CODEC_NOT_SUPPORTED,
                "codec aac not found",
            ));
        }
        Ok(())
    }

    async fn transcode_to_mp4(&self, input: &str, cancel: &CancellationToken) -> Result<PathBuf> {
        let output_path = &self.options.output_path;
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    if err.kind() == std::io::ErrorKind::PermissionDenied {
                        StructuredError::wrap(
                            &err,
                            ErrorKind::Permission,
                            crate::error::message_for(codes::WRITE_PERMISSION_DENIED),
                            codes::WRITE_PERMISSION_DENIED,
                        )
                    } else {
                        StructuredError::wrap(
                            &err,
                            ErrorKind::System,
                            "Failed to create output directory",
                            10,
                        )
                    }
                })?;
            }
        }

        if output_path.exists() && !self.options.allow_overwrite {
            return Err(StructuredError::new(
                ErrorKind::InvalidOutputPath,
                "Output file already exists and overwrite is not allowed",
                output_path.display().to_string(),
                codes::INVALID_OUTPUT_PATH,
            ));
        }

        let mut args = vec![
            "-i".to_string(),
            input.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            "22".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ];
        args.extend(self.options.extra_args.iter().cloned());
        args.push("-y".to_string());
        args.push(output_path.to_string_lossy().to_string());

        let total_seconds = self.prober.duration_seconds(input).await;
        let progress = match &self.progress {
            Some(reporter) => {
                if total_seconds > 0.0 {
                    reporter.start(total_seconds as i64);
                } else {
                    debug!(target: "transcoder", input, "duration unavailable, progress suppressed");
                }
                Some((Arc::clone(reporter), ProgressParser::Timecode { total_seconds }))
            }
            None => None,
        };

        run_encoder(
            &self.options.ffmpeg_binary,
            &args,
            progress,
            cancel,
            ErrorKind::Transcoding,
            "FFmpeg process failed",
            13,
        )
        .await?;

        if let Some(reporter) = &self.progress {
            reporter.complete();
        }

        if !output_path.exists() {
            return Err(StructuredError::new(
                ErrorKind::Transcoding,
                "Output file was not created",
                output_path.display().to_string(),
                14,
            ));
        }

        info!(target: "transcoder", output = %output_path.display(), "transcoding completed successfully");
        Ok(output_path.clone())
    }
}

/// Strict URL-ness test: only well-formed http/https URLs count as remote;
/// anything else, malformed URLs included, is treated as a local path.
pub fn is_remote_url(input: &str) -> bool {
    matches!(Url::parse(input), Ok(url) if matches!(url.scheme(), "http" | "https"))
}

/// Absolute bounds check for every ladder tier, each violation with its own
/// code so callers can tell them apart.
fn validate_ladder(ladder: &[QualityTier]) -> Result<()> {
    for tier in ladder {
        let dimensions = format!("{}x{}", tier.width, tier.height);
        if tier.width == 0 || tier.height == 0 {
            return Err(StructuredError::coded(
                ErrorKind::UnsupportedResolution,
                codes::INVALID_RESOLUTION,
                format!("invalid resolution: {dimensions}"),
            ));
        }
        if tier.width > MAX_TIER_WIDTH || tier.height > MAX_TIER_HEIGHT {
            return Err(StructuredError::coded(
                ErrorKind::UnsupportedResolution,
                codes::RESOLUTION_TOO_HIGH,
                format!("resolution too high: {dimensions}"),
            ));
        }
        if tier.width < MIN_TIER_WIDTH || tier.height < MIN_TIER_HEIGHT {
            return Err(StructuredError::coded(
                ErrorKind::UnsupportedResolution,
                codes::RESOLUTION_TOO_LOW,
                format!("resolution too low: {dimensions}"),
            ));
        }
    }
    Ok(())
}

fn classify_reachability_error(err: &reqwest::Error) -> StructuredError {
    if err.is_timeout() {
        return StructuredError::coded(
            ErrorKind::Network,
            codes::NETWORK_TIMEOUT,
            err.to_string(),
        );
    }

    // best-effort inspection of the error chain; connection failure is the
    // documented fallback
    let mut text = err.to_string().to_lowercase();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push(' ');
        text.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    if text.contains("dns") || text.contains("lookup") || text.contains("resolve") {
        return StructuredError::coded(
            ErrorKind::Network,
            codes::NETWORK_DNS_FAILURE,
            err.to_string(),
        );
    }
    StructuredError::coded(
        ErrorKind::Network,
        codes::NETWORK_CONNECTION_FAILED,
        err.to_string(),
    )
}

/// Upgrades a generic fetch failure to a more specific category when its
/// details carry a recognizable cause. Unrecognized errors pass through.
fn refine_download_error(err: StructuredError) -> StructuredError {
    if err.kind != ErrorKind::Download {
        return err;
    }
    let details = err.details.to_lowercase();
    if details.contains("permission denied") {
        return StructuredError::coded(
            ErrorKind::Permission,
            codes::WRITE_PERMISSION_DENIED,
            err.details,
        );
    }
    if details.contains("no space") {
        return StructuredError::coded(
            ErrorKind::DiskSpace,
            codes::DISK_SPACE_INSUFFICIENT,
            err.details,
        );
    }
    if details.contains("timed out") || details.contains("timeout") {
        return StructuredError::coded(ErrorKind::Network, codes::NETWORK_TIMEOUT, err.details);
    }
    if details.contains("connection") || details.contains("connect") {
        return StructuredError::coded(
            ErrorKind::Network,
            codes::NETWORK_CONNECTION_FAILED,
            err.details,
        );
    }
    err
}

#[cfg(unix)]
fn available_disk_space(path: &Path) -> Option<u64> {
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => Some(stat.blocks_available() as u64 * stat.fragment_size() as u64),
        Err(error) => {
            warn!(target: "transcoder", path = %path.display(), %error, "free-space check unavailable");
            None
        }
    }
}

#[cfg(not(unix))]
fn available_disk_space(_path: &Path) -> Option<u64> {
    None
}
