use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Defaults loaded from an optional `vtx.toml`, overridden by CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VtxConfig {
    pub transcode: TranscodeSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscodeSection {
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
    pub download_dir: String,
    pub hls_segment_duration: u32,
    pub hls_playlist_type: String,
}

impl Default for VtxConfig {
    fn default() -> Self {
        Self {
            transcode: TranscodeSection::default(),
        }
    }
}

impl Default for TranscodeSection {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            download_dir: "downloads".to_string(),
            hls_segment_duration: 10,
            hls_playlist_type: "vod".to_string(),
        }
    }
}

/// Loads configuration from `path`. A missing file yields the defaults;
/// an unreadable or malformed file is an error.
pub fn load_vtx_config<P: AsRef<Path>>(path: P) -> Result<VtxConfig, ConfigError> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(VtxConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_vtx_config("/nonexistent/vtx.toml").unwrap();
        assert_eq!(config.transcode.ffmpeg_binary, "ffmpeg");
        assert_eq!(config.transcode.hls_segment_duration, 10);
        assert_eq!(config.transcode.hls_playlist_type, "vod");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtx.toml");
        std::fs::write(
            &path,
            "[transcode]\nffmpeg_binary = \"/opt/ffmpeg/bin/ffmpeg\"\nhls_segment_duration = 6\n",
        )
        .unwrap();
        let config = load_vtx_config(&path).unwrap();
        assert_eq!(config.transcode.ffmpeg_binary, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.transcode.hls_segment_duration, 6);
        assert_eq!(config.transcode.download_dir, "downloads");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtx.toml");
        std::fs::write(&path, "[transcode\n???").unwrap();
        assert!(matches!(
            load_vtx_config(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
