//! Direct `GeoJSON` URL fetcher.
//!
//! Fetches a standard `GeoJSON` `FeatureCollection` from any URL that
//! returns it directly.

use crate::{SourceError, retry};

/// Fetches all features from a direct `GeoJSON` URL.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the response has no
/// `features` array.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<serde_json::Value>, SourceError> {
    let json = retry::send_json(|| client.get(url)).await?;

    let features = json["features"]
        .as_array()
        .ok_or_else(|| SourceError::Service {
            message: "No features array in GeoJSON response".to_string(),
        })?;

    Ok(features.clone())
}
