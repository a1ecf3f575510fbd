use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::info;

use crate::provider::{ensure_success, ProviderError};

#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Last path segment of a URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    // drop the host part
    let (_, path) = path.split_once('/')?;
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Parse a source URL, only http and https can be downloaded.
pub fn parse_source_url(url: &str) -> Result<Url, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidSource {
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme {}", other))),
    }
}

/// Fetch a remote audio source into memory.
pub async fn download_audio(
    http: &reqwest::Client,
    url: &str,
) -> Result<DownloadedAudio, ProviderError> {
    let source = parse_source_url(url)?;
    info!("Starting download from URL: {}", url);

    let response = http.get(source).send().await?;
    let response = ensure_success(response).await?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = response.bytes().await?.to_vec();

    info!("Download completed: {} bytes", data.len());
    Ok(DownloadedAudio {
        file_name: file_name_from_url(url).unwrap_or_else(|| "audio".to_string()),
        content_type,
        data,
    })
}
