use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::BackendError;

/// Per-request timeout for backend API calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on an API response body.
pub(crate) const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

pub(crate) fn client() -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("newsdedup/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Send a request with the API timeout and reject non-2xx answers.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, BackendError> {
    let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
        .await
        .map_err(|_| BackendError::Timeout)?
        .map_err(BackendError::Network)?;

    if !response.status().is_success() {
        return Err(BackendError::HttpStatus(response.status().as_u16()));
    }
    Ok(response)
}

/// Read a JSON body, refusing anything larger than [`MAX_RESPONSE_SIZE`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BackendError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(BackendError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BackendError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BackendError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
