//! Remote source retrieval

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::runtime::Handle;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Download failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches a remote source into a local directory
pub trait SourceFetcher: Send + Sync {
    /// Download `url` into `dest_dir`, returning the local file path
    ///
    /// Implementations reuse a previously downloaded file for the same URL.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Plain HTTP(S) download of direct audio links
///
/// Runs its requests on the given tokio runtime; `fetch` must be called
/// from a blocking context (e.g. inside `spawn_blocking`).
pub struct HttpFetcher {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpFetcher {
    pub fn new(runtime: Handle) -> Self {
        Self {
            client: reqwest::Client::new(),
            runtime,
        }
    }
}

/// Local file name for a URL: its last path segment, sanitized
pub fn file_name_for_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches(['.', '_']).is_empty() || !sanitized.contains('.') {
        format!(
            "{}.audio",
            replay_common::fingerprint::bytes_fingerprint(url.as_bytes())
        )
    } else {
        sanitized
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(file_name_for_url(url));
        if dest.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            tracing::info!(url, path = %dest.display(), "Reusing downloaded source");
            return Ok(dest);
        }

        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let bytes = self.runtime.block_on(async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(request_error)?
                .error_for_status()
                .map_err(request_error)?;
            response.bytes().await.map_err(request_error)
        })?;

        // Write then rename so a partial download is never reused
        let partial = dest.with_extension("part");
        std::fs::write(&partial, &bytes)?;
        std::fs::rename(&partial, &dest)?;

        tracing::info!(url, path = %dest.display(), bytes = bytes.len(), "Downloaded source");
        Ok(dest)
    }
}
