use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

/// Downloads `url` into `dest`, which must live in the scratch workspace.
///
/// `dest` is created only after the server answered successfully, so a
/// missing asset or a refused connection leaves no file behind.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn fetch<R: Runtime>(
    runtime: &R,
    http_client: &HttpClient,
    url: &str,
    dest: &Path,
) -> Result<u64> {
    info!("Downloading file from {}...", url);

    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(dest)
                .with_context(|| format!("Failed to create download file at {:?}", dest))
        })
        .await?;

    info!("Download complete ({} bytes).", bytes);
    Ok(bytes)
}
