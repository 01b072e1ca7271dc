use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{codes, ErrorKind, Result, StructuredError};
use crate::progress::ProgressReporter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Immutable description of one fetch. A new request value is built per
/// download; nothing is reconfigured in place between fetches.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_path: PathBuf,
    pub timeout: Duration,
    pub allow_overwrite: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_path: output_path.into(),
            timeout: DEFAULT_TIMEOUT,
            allow_overwrite: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }
}

/// Streams remote resources to local storage. Holds only the shared HTTP
/// client; everything per-fetch travels in the [`DownloadRequest`].
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("vtx-core/0.1")
            .build()
            .map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::Network, "Failed to build HTTP client", 0)
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Downloads `request.url` to `request.output_path`.
    ///
    /// An existing destination with overwrite disallowed is returned as-is
    /// without touching the network. Byte counts are relayed to the
    /// reporter when the response declares a content length; the reporter
    /// is never completed here, its lifecycle belongs to the caller.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        progress: Option<&ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::System, "Failed to create output directory", 1)
            })?;
        }

        if request.output_path.exists() && !request.allow_overwrite {
            info!(
                target: "downloader",
                path = %request.output_path.display(),
                "file already exists, skipping download"
            );
            return Ok(request.output_path.clone());
        }

        info!(target: "downloader", url = %request.url, path = %request.output_path.display(), "starting download");

        let send = self
            .client
            .get(&request.url)
            .timeout(request.timeout)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled_error(request)),
            response = send => response.map_err(|err| classify_transfer_error(&err, 3))?,
        };

        if !response.status().is_success() {
            return Err(StructuredError::new(
                ErrorKind::Download,
                "HTTP request failed",
                format!("Status: {}", response.status()),
                4,
            ));
        }

        let content_length = response.content_length().unwrap_or(0) as i64;
        if content_length > 0 {
            if let Some(reporter) = progress {
                reporter.start(content_length);
            }
        }

        let mut file = fs::File::create(&request.output_path).await.map_err(|err| {
            StructuredError::wrap(&err, ErrorKind::System, "Failed to create output file", 5)
        })?;

        let mut stream = response.bytes_stream();
        let mut read: i64 = 0;
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled_error(request)),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let data = chunk.map_err(|err| classify_transfer_error(&err, 6))?;
            file.write_all(&data).await.map_err(|err| {
                StructuredError::wrap(&err, ErrorKind::Download, "Failed to write file", 6)
            })?;
            read += data.len() as i64;
            if content_length > 0 {
                if let Some(reporter) = progress {
                    reporter.update(read, "downloading", "Downloading file");
                }
            }
        }

        file.flush().await.map_err(|err| {
            StructuredError::wrap(&err, ErrorKind::Download, "Failed to write file", 6)
        })?;

        debug!(target: "downloader", bytes = read, "download finished");
        Ok(request.output_path.clone())
    }
}

fn cancelled_error(request: &DownloadRequest) -> StructuredError {
    StructuredError::new(
        ErrorKind::Download,
        "Download cancelled",
        request.url.clone(),
        7,
    )
}

fn classify_transfer_error(err: &reqwest::Error, fallback_code: i32) -> StructuredError {
    if err.is_timeout() {
        StructuredError::wrap(
            err,
            ErrorKind::Network,
            crate::error::message_for(codes::NETWORK_TIMEOUT),
            codes::NETWORK_TIMEOUT,
        )
    } else {
        StructuredError::wrap(err, ErrorKind::Download, "Failed to download file", fallback_code)
    }
}
