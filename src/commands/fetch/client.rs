//! Blocking HTTP helpers for toolchain downloads.

use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, Response};
use tempfile::NamedTempFile;
use tracing::debug;

pub(crate) const USER_AGENT: &str = concat!("quartermaster/", env!("CARGO_PKG_VERSION"));

/// Maximum time to establish a TCP connection.
pub(crate) const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Total request timeout for small text resources (mirror lists, signatures).
pub(crate) const HTTP_TEXT_TIMEOUT_SECS: u64 = 30;
/// Total request timeout for toolchain archives, which run to hundreds of
/// megabytes on slow mirrors.
pub(crate) const HTTP_ARTIFACT_TIMEOUT_SECS: u64 = 15 * 60;

/// Size cap for text resources; a mirror list or signature bigger than this
/// is garbage.
pub(crate) const MAX_TEXT_SIZE: u64 = 1024 * 1024;

/// Build a blocking client with the given total request timeout.
pub(crate) fn create_http_client(request_timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(request_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")
}

/// Treat any non-2xx response as a failure, with the status in the message.
pub(crate) fn validate_response_status(response: &Response, context: &str) -> Result<()> {
    if !response.status().is_success() {
        let status = response.status();
        bail!(
            "{}: HTTP {} - {}",
            context,
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        );
    }
    Ok(())
}

/// GET a small text resource with the size cap enforced while streaming.
pub(crate) fn fetch_text(client: &Client, url: &str, context: &str) -> Result<String> {
    debug!(url, "fetching text resource");
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("{context}: request failed"))?;
    validate_response_status(&response, context)?;

    let mut bytes = Vec::new();
    let mut reader = response.take(MAX_TEXT_SIZE + 1);
    reader
        .read_to_end(&mut bytes)
        .with_context(|| format!("{context}: failed to read response body"))?;
    if bytes.len() as u64 > MAX_TEXT_SIZE {
        bail!("{context}: response exceeds {MAX_TEXT_SIZE} byte limit");
    }
    String::from_utf8(bytes).with_context(|| format!("{context}: response is not UTF-8"))
}

/// GET a resource and stream it into a uniquely-named private temp file in
/// `dir`. The file is deleted automatically unless the caller persists it.
pub(crate) fn download_to_temp(client: &Client, url: &str, dir: &Path) -> Result<NamedTempFile> {
    debug!(url, "downloading");
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("Request failed for {url}"))?;
    validate_response_status(&response, "Download failed")?;

    let mut temp = NamedTempFile::new_in(dir).context("Failed to create download temp file")?;
    let written = io::copy(&mut response, temp.as_file_mut())
        .with_context(|| format!("Transfer failed for {url}"))?;
    debug!(url, bytes = written, "download complete");
    Ok(temp)
}
