use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vtx_core::error::{ErrorKind, StructuredError};
use vtx_core::{
    load_vtx_config, tier_for_resolution, OutputType, PlaylistType, ProgressFileFormat,
    ProgressReporter, QualityTier, TranscodeOptions, Transcoder,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Adaptive video transcoding control interface", long_about = None)]
pub struct Cli {
    /// Input file path or URL
    #[arg(short, long)]
    pub input: String,
    /// Output directory (hls) or file path (mp4)
    #[arg(short, long)]
    pub output: PathBuf,
    /// Output type
    #[arg(short = 't', long = "type", value_enum, default_value_t = OutputKind::Hls)]
    pub output_type: OutputKind,
    /// Require the input to be a remote URL instead of a local path
    #[arg(long)]
    pub remote: bool,
    /// Pass a remote URL straight to the encoder instead of downloading it
    #[arg(long)]
    pub stream: bool,
    /// Directory for downloaded remote inputs
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    /// Allow overwriting existing files
    #[arg(long)]
    pub overwrite: bool,
    /// HLS segment duration in seconds
    #[arg(long)]
    pub hls_segment_duration: Option<u32>,
    /// HLS playlist type
    #[arg(long, value_enum)]
    pub hls_playlist_type: Option<PlaylistKind>,
    /// Explicit ladder tiers as WxH, comma separated (e.g. 1280x720,854x480)
    #[arg(long, value_delimiter = ',')]
    pub resolutions: Vec<String>,
    /// Probe the source and derive the ladder automatically
    #[arg(long)]
    pub auto_resolutions: bool,
    /// Path to the ffmpeg binary
    #[arg(long)]
    pub ffmpeg: Option<String>,
    /// Path to the ffprobe binary
    #[arg(long)]
    pub ffprobe: Option<String>,
    /// Extra parameter passed through to ffmpeg (repeatable)
    #[arg(long = "ffmpeg-param")]
    pub ffmpeg_params: Vec<String>,
    /// File overwritten with the progress state on every update
    #[arg(long)]
    pub progress_file: Option<PathBuf>,
    /// Progress file format
    #[arg(long, value_enum, default_value_t = ProgressKind::Text)]
    pub progress_format: ProgressKind,
    /// TOML file with defaults for the flags above
    #[arg(long, default_value = "vtx.toml")]
    pub config: PathBuf,
    /// Failure rendering on stderr
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputKind {
    Hls,
    Mp4,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlaylistKind {
    Vod,
    Event,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProgressKind {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn parse_resolution(spec: &str) -> Result<QualityTier, StructuredError> {
    let parsed = spec
        .split_once('x')
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
    match parsed {
        Some((width, height)) => Ok(tier_for_resolution(width, height)),
        None => Err(StructuredError::new(
            ErrorKind::Validation,
            "Invalid resolution specification, expected WxH",
            spec.to_string(),
            6,
        )),
    }
}

fn build_options(cli: &Cli) -> Result<TranscodeOptions, StructuredError> {
    let config = load_vtx_config(&cli.config).map_err(|err| {
        StructuredError::new(
            ErrorKind::Validation,
            "Failed to load configuration",
            err.to_string(),
            4,
        )
    })?;
    let defaults = config.transcode;

    if cli.remote && !vtx_core::is_remote_url(&cli.input) {
        return Err(StructuredError::new(
            ErrorKind::Validation,
            "Input was marked remote but is not an http(s) URL",
            cli.input.clone(),
            5,
        ));
    }

    let playlist_type = match cli.hls_playlist_type {
        Some(PlaylistKind::Vod) => PlaylistType::Vod,
        Some(PlaylistKind::Event) => PlaylistType::Event,
        None if defaults.hls_playlist_type == "event" => PlaylistType::Event,
        None => PlaylistType::Vod,
    };

    let mut options = TranscodeOptions::new(cli.input.clone(), cli.output.clone())
        .with_output_type(match cli.output_type {
            OutputKind::Hls => OutputType::Hls,
            OutputKind::Mp4 => OutputType::Mp4,
        })
        .with_overwrite(cli.overwrite)
        .with_download_dir(
            cli.download_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&defaults.download_dir)),
        )
        .with_segment_duration(
            cli.hls_segment_duration
                .unwrap_or(defaults.hls_segment_duration),
        )
        .with_playlist_type(playlist_type)
        .with_auto_resolutions(cli.auto_resolutions)
        .with_stream_from_url(cli.stream)
        .with_ffmpeg_binary(cli.ffmpeg.clone().unwrap_or(defaults.ffmpeg_binary))
        .with_ffprobe_binary(cli.ffprobe.clone().unwrap_or(defaults.ffprobe_binary))
        .with_extra_args(cli.ffmpeg_params.clone());

    if !cli.resolutions.is_empty() {
        let ladder = cli
            .resolutions
            .iter()
            .map(|spec| parse_resolution(spec))
            .collect::<Result<Vec<_>, _>>()?;
        options = options.with_resolutions(ladder);
    }

    Ok(options)
}

pub async fn run(cli: Cli) -> Result<(), StructuredError> {
    let options = build_options(&cli)?;

    let mut reporter = ProgressReporter::new();
    if let Some(path) = &cli.progress_file {
        let format = match cli.progress_format {
            ProgressKind::Text => ProgressFileFormat::Text,
            ProgressKind::Json => ProgressFileFormat::Json,
        };
        reporter = reporter.with_progress_file(path, format);
    }
    let reporter = Arc::new(reporter);

    let mut updates = reporter.updates().expect("fresh reporter");
    let drain = tokio::spawn(async move {
        while let Some(event) = updates.recv().await {
            info!(
                target: "progress",
                percentage = event.percentage,
                step = %event.step,
                stage = %event.stage,
                status = ?event.status,
                "transcoding progress"
            );
        }
    });

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "vtxctl", "received interrupt, shutting down");
            signal_token.cancel();
        }
    });

    info!(
        target: "vtxctl",
        input = %cli.input,
        output = %cli.output.display(),
        kind = ?cli.output_type,
        "starting transcoder"
    );

    let transcoder = Transcoder::new(options, Some(Arc::clone(&reporter)))?;
    let result = transcoder.run(&cancel).await;
    // release every reporter handle so the drain task sees the channel close
    drop(transcoder);
    drop(reporter);
    let _ = drain.await;

    match result {
        Ok(output_path) => {
            info!(target: "vtxctl", output = %output_path.display(), "transcoding completed successfully");
            match cli.format {
                OutputFormat::Text => println!("{}", output_path.display()),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "output_path": output_path.display().to_string() })
                ),
            }
            Ok(())
        }
        Err(err) => {
            error!(
                target: "vtxctl",
                kind = %err.kind,
                code = err.code,
                details = %err.details,
                "transcoding failed"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resolution_specs_parse_to_tiers() {
        let tier = parse_resolution("1280x720").unwrap();
        assert_eq!((tier.width, tier.height), (1280, 720));
        assert_eq!(tier.video_bitrate, "5000k");

        assert!(parse_resolution("1280").is_err());
        assert!(parse_resolution("axb").is_err());
    }

    #[test]
    fn remote_flag_requires_a_real_url() {
        let cli = Cli::parse_from([
            "vtxctl",
            "-i",
            "/local/clip.mp4",
            "-o",
            "out",
            "--remote",
            "--config",
            "/nonexistent/vtx.toml",
        ]);
        let err = build_options(&cli).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::parse_from([
            "vtxctl",
            "-i",
            "in.mp4",
            "-o",
            "out",
            "--hls-segment-duration",
            "4",
            "--resolutions",
            "640x360",
            "--config",
            "/nonexistent/vtx.toml",
        ]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.hls_segment_duration, 4);
        assert_eq!(options.hls_resolutions.len(), 1);
        assert_eq!(options.hls_resolutions[0].width, 640);
        assert_eq!(options.ffmpeg_binary, "ffmpeg");
    }
}
