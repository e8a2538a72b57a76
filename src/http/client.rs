//! HTTP client for single-shot downloads.

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use std::io::Write;

use super::status::{classify_send_error, classify_status};

/// Thin wrapper over a reqwest `Client` that classifies failures.
///
/// Requests are attempted exactly once. Whether to try again is up to the
/// caller, based on [`crate::error::ProvisionError::is_retryable`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Streams the body at `url` into the writer returned by `create_writer`.
    ///
    /// The writer is only created once the server has answered with a
    /// success status, so a failed request leaves nothing behind.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(url, &e))?;

        if let Some(err) = classify_status(url, response.status()) {
            return Err(err.into());
        }

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_send_error(url, &e))?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }
}
