use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Category of a [`StructuredError`]. Serialized as the stable wire string
/// (`network_error`, `download_error`, ...), so callers can match on it
/// without string comparison on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[serde(rename = "network_error")]
    Network,
    #[serde(rename = "disk_space_error")]
    DiskSpace,
    #[serde(rename = "file_not_found_error")]
    FileNotFound,
    #[serde(rename = "invalid_file_format_error")]
    InvalidFormat,
    #[serde(rename = "permission_error")]
    Permission,
    #[serde(rename = "memory_error")]
    Memory,
    #[serde(rename = "codec_not_found_error")]
    MissingCodec,
    #[serde(rename = "invalid_output_path_error")]
    InvalidOutputPath,
    #[serde(rename = "unsupported_resolution_error")]
    UnsupportedResolution,
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "system_error")]
    System,
    #[serde(rename = "download_error")]
    Download,
    #[serde(rename = "transcoding_error")]
    Transcoding,
    #[serde(rename = "hls_error")]
    Hls,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::DiskSpace => "disk_space_error",
            ErrorKind::FileNotFound => "file_not_found_error",
            ErrorKind::InvalidFormat => "invalid_file_format_error",
            ErrorKind::Permission => "permission_error",
            ErrorKind::Memory => "memory_error",
            ErrorKind::MissingCodec => "codec_not_found_error",
            ErrorKind::InvalidOutputPath => "invalid_output_path_error",
            ErrorKind::UnsupportedResolution => "unsupported_resolution_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::System => "system_error",
            ErrorKind::Download => "download_error",
            ErrorKind::Transcoding => "transcoding_error",
            ErrorKind::Hls => "hls_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable numeric codes, partitioned by category. Validation/System/
/// Download/Transcoding/Hls errors use small locally-scoped codes at the
/// construction site instead of a shared range.
pub mod codes {
    // network_error (1000-1099)
    pub const NETWORK_CONNECTION_FAILED: i32 = 1000;
    pub const NETWORK_TIMEOUT: i32 = 1001;
    pub const NETWORK_DNS_FAILURE: i32 = 1002;
    pub const NETWORK_SERVER_UNAVAILABLE: i32 = 1003;

    // disk_space_error (1100-1199)
    pub const DISK_SPACE_INSUFFICIENT: i32 = 1100;
    pub const DISK_QUOTA_EXCEEDED: i32 = 1101;
    pub const DISK_WRITE_FAILED: i32 = 1102;

    // file_not_found_error (1200-1299)
    pub const FILE_NOT_FOUND: i32 = 1200;
    pub const FILE_NOT_ACCESSIBLE: i32 = 1201;
    pub const DIRECTORY_NOT_FOUND: i32 = 1202;

    // invalid_file_format_error (1300-1399)
    pub const INVALID_FILE_FORMAT: i32 = 1300;
    pub const UNSUPPORTED_FILE_FORMAT: i32 = 1301;
    pub const CORRUPTED_FILE: i32 = 1302;

    // permission_error (1400-1499)
    pub const PERMISSION_DENIED: i32 = 1400;
    pub const READ_PERMISSION_DENIED: i32 = 1401;
    pub const WRITE_PERMISSION_DENIED: i32 = 1402;

    // memory_error (1500-1599)
    pub const OUT_OF_MEMORY: i32 = 1500;
    pub const MEMORY_ALLOCATION_FAILED: i32 = 1501;

    // codec_not_found_error (1600-1699)
    pub const CODEC_NOT_FOUND: i32 = 1600;
    pub const CODEC_NOT_SUPPORTED: i32 = 1601;
    pub const MISSING_DEPENDENCY: i32 = 1602;

    // invalid_output_path_error (1700-1799)
    pub const INVALID_OUTPUT_PATH: i32 = 1700;
    pub const OUTPUT_PATH_NOT_ACCESSIBLE: i32 = 1701;
    pub const OUTPUT_DIRECTORY_CREATION_FAILED: i32 = 1702;

    // unsupported_resolution_error (1800-1899)
    pub const UNSUPPORTED_RESOLUTION: i32 = 1800;
    pub const INVALID_RESOLUTION: i32 = 1801;
    pub const RESOLUTION_TOO_HIGH: i32 = 1802;
    pub const RESOLUTION_TOO_LOW: i32 = 1803;
}

/// Canonical human-readable message for a ranged error code.
pub fn message_for(code: i32) -> &'static str {
    match code {
        codes::NETWORK_CONNECTION_FAILED => {
            "Network error while reaching the resource. Check your connection and retry."
        }
        codes::NETWORK_TIMEOUT => "Network timeout exceeded. Check your connection and retry.",
        codes::NETWORK_DNS_FAILURE => "DNS resolution failed. Check the server address and retry.",
        codes::NETWORK_SERVER_UNAVAILABLE => "Server unavailable. Try again later.",
        codes::DISK_SPACE_INSUFFICIENT => {
            "Insufficient disk space to process the file. Free up space and retry."
        }
        codes::DISK_QUOTA_EXCEEDED => "Disk quota exceeded. Free up space or adjust your quota.",
        codes::DISK_WRITE_FAILED => "Failed to write to disk. Check permissions and free space.",
        codes::FILE_NOT_FOUND => "File not found. Check the path and that the file is accessible.",
        codes::FILE_NOT_ACCESSIBLE => "File not accessible. Check permissions and that it exists.",
        codes::DIRECTORY_NOT_FOUND => "Directory not found. Check the path.",
        codes::INVALID_FILE_FORMAT => {
            "Invalid file format. Only common video containers are supported."
        }
        codes::UNSUPPORTED_FILE_FORMAT => {
            "Unsupported file format. Use one of the supported containers."
        }
        codes::CORRUPTED_FILE => "The file appears to be corrupted. Check its integrity.",
        codes::PERMISSION_DENIED => {
            "Permission denied. Check read/write permissions on the file or directory."
        }
        codes::READ_PERMISSION_DENIED => "Read permission denied. Check the file permissions.",
        codes::WRITE_PERMISSION_DENIED => {
            "Write permission denied. Check the destination directory permissions."
        }
        codes::OUT_OF_MEMORY => "Not enough memory to process the file.",
        codes::MEMORY_ALLOCATION_FAILED => "Memory allocation failed. Close other processes.",
        codes::CODEC_NOT_FOUND => "Required codec not found. Make sure it is installed.",
        codes::CODEC_NOT_SUPPORTED => "Codec not supported on this platform.",
        codes::MISSING_DEPENDENCY => "Required dependency not found. Check the FFmpeg install.",
        codes::INVALID_OUTPUT_PATH => "Output path is invalid or inaccessible.",
        codes::OUTPUT_PATH_NOT_ACCESSIBLE => {
            "Output path not accessible. Check permissions and that the directory exists."
        }
        codes::OUTPUT_DIRECTORY_CREATION_FAILED => {
            "Failed to create output directory. Check permissions."
        }
        codes::UNSUPPORTED_RESOLUTION => "Unsupported video resolution.",
        codes::INVALID_RESOLUTION => "Invalid video resolution. Use a valid resolution.",
        codes::RESOLUTION_TOO_HIGH => "Video resolution too high. Use a smaller resolution.",
        codes::RESOLUTION_TOO_LOW => "Video resolution too low. Use a larger resolution.",
        _ => "Unknown error.",
    }
}

/// Error type returned by every fallible operation in this crate.
///
/// Carries a category, a stable numeric code, a concise message and the
/// underlying failure text (when one exists) in `details`, so a caller can
/// render either a terse message or a full diagnostic without inspecting
/// free-form text.
#[derive(Debug, Clone, Error, Serialize)]
#[error("[{kind}] {message}: {details}")]
pub struct StructuredError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub code: i32,
}

impl StructuredError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        details: impl Into<String>,
        code: i32,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: details.into(),
            timestamp: Utc::now(),
            code,
        }
    }

    /// Builds an error whose `details` is the display text of `source`.
    pub fn wrap(
        source: &dyn std::error::Error,
        kind: ErrorKind,
        message: impl Into<String>,
        code: i32,
    ) -> Self {
        Self::new(kind, message, source.to_string(), code)
    }

    /// Convenience for errors whose message comes from the code table.
    pub fn coded(kind: ErrorKind, code: i32, details: impl Into<String>) -> Self {
        Self::new(kind, message_for(code), details, code)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

pub type Result<T> = std::result::Result<T, StructuredError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_message_details() {
        let err = StructuredError::new(ErrorKind::Download, "HTTP request failed", "Status: 404", 4);
        assert_eq!(
            err.to_string(),
            "[download_error] HTTP request failed: Status: 404"
        );
    }

    #[test]
    fn wrap_captures_source_text() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StructuredError::wrap(
            &io,
            ErrorKind::Permission,
            message_for(codes::READ_PERMISSION_DENIED),
            codes::READ_PERMISSION_DENIED,
        );
        assert_eq!(err.kind, ErrorKind::Permission);
        assert_eq!(err.code, codes::READ_PERMISSION_DENIED);
        assert_eq!(err.details, "denied");
    }

    #[test]
    fn json_uses_wire_type_names() {
        let err = StructuredError::coded(ErrorKind::Network, codes::NETWORK_TIMEOUT, "");
        let value: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
        assert_eq!(value["type"], "network_error");
        assert_eq!(value["code"], 1001);
        // empty details are omitted from the serialized form
        assert!(value.get("details").is_none());
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn code_ranges_stay_partitioned() {
        assert!((1000..1100).contains(&codes::NETWORK_SERVER_UNAVAILABLE));
        assert!((1100..1200).contains(&codes::DISK_WRITE_FAILED));
        assert!((1200..1300).contains(&codes::DIRECTORY_NOT_FOUND));
        assert!((1300..1400).contains(&codes::CORRUPTED_FILE));
        assert!((1400..1500).contains(&codes::WRITE_PERMISSION_DENIED));
        assert!((1500..1600).contains(&codes::MEMORY_ALLOCATION_FAILED));
        assert!((1600..1700).contains(&codes::MISSING_DEPENDENCY));
        assert!((1700..1800).contains(&codes::OUTPUT_DIRECTORY_CREATION_FAILED));
        assert!((1800..1900).contains(&codes::RESOLUTION_TOO_LOW));
    }

    #[test]
    fn unknown_code_has_fallback_message() {
        assert_eq!(message_for(9999), "Unknown error.");
    }
}
