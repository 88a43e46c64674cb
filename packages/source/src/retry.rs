//! HTTP retry helpers for transient errors.
//!
//! Fetchers go through [`send_json`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every census request
//! gets exponential backoff on timeouts, connection resets, server
//! errors, and rate limiting.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait
/// before giving up is 62 seconds.
const MAX_RETRIES: u32 = 5;

/// Maximum number of full re-fetch attempts when the response body
/// cannot be decoded (truncated JSON, garbled response).
const MAX_BODY_RETRIES: u32 = 3;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// What to do with a response of a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    Accept,
    Retry,
    Fail,
}

/// Classifies a status code: 429 and 5xx are retried, other 4xx are
/// permanent.
fn classify(status: reqwest::StatusCode) -> StatusAction {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusAction::Retry
    } else if status.is_client_error() {
        StatusAction::Fail
    } else {
        StatusAction::Accept
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// If the response arrives but its body is not valid JSON, the whole
/// request is re-fetched up to [`MAX_BODY_RETRIES`] times, each going
/// through the connection-level retry loop again.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body cannot be
/// parsed as JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send_inner(&build_request, MAX_RETRIES).await?;
        let url = response.url().to_string();
        let status = response.status();

        let outcome = match response.text().await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                log::warn!(
                    "JSON parse failed for {url} (status {status}, {} bytes): {e}\n  \
                     body preview: {preview}",
                    text.len()
                );
                SourceError::Json(e)
            }),
            Err(e) => {
                log::warn!("Response body read failed for {url} (status {status}): {e}");
                Err(SourceError::Http(e))
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(_) if body_attempt < MAX_BODY_RETRIES => {
                body_attempt += 1;
                let delay = Duration::from_secs(1u64 << body_attempt);
                log::warn!("  body retry {body_attempt}/{MAX_BODY_RETRIES} in {delay:?}...");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!("Giving up on {url} after {MAX_BODY_RETRIES} body retries");
                return Err(e);
            }
        }
    }
}

/// Core retry loop.
///
/// Sends the request built by `build_request`, retrying on transient
/// errors up to `max_retries` times with exponential backoff. Returns
/// the successful [`reqwest::Response`].
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                match classify(status) {
                    StatusAction::Accept => return Ok(response),
                    StatusAction::Retry if attempt < max_retries => {
                        log::warn!("  HTTP {status}");
                        attempt += 1;
                    }
                    StatusAction::Retry => {
                        return Err(SourceError::Service {
                            message: format!("HTTP {status} after {max_retries} retries"),
                        });
                    }
                    StatusAction::Fail => {
                        return Err(SourceError::Service {
                            message: format!("HTTP {status}"),
                        });
                    }
                }
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
