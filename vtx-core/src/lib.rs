pub mod config;
pub mod downloader;
mod encoder;
pub mod error;
pub mod hls;
pub mod ladder;
pub mod probe;
pub mod progress;
pub mod transcoder;

pub use config::{load_vtx_config, ConfigError, VtxConfig};
pub use downloader::{DownloadRequest, Downloader};
pub use error::{codes, ErrorKind, Result, StructuredError};
pub use hls::{HlsGenerator, HlsOptions, PlaylistType, MASTER_PLAYLIST_NAME};
pub use ladder::{
    default_ladder, format_ladder, generate_auto_ladder, tier_for_resolution, QualityTier,
};
pub use probe::{Prober, VideoInfo};
pub use progress::{ProgressEvent, ProgressFileFormat, ProgressReporter, ProgressStatus};
pub use transcoder::{is_remote_url, OutputType, TranscodeOptions, Transcoder};
