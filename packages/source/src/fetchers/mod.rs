//! Fetcher dispatch and implementations for different service types.
//!
//! Each fetcher downloads raw `GeoJSON` features from a census income
//! service.

pub mod arcgis;
pub mod geojson_url;

use crate::{IncomeFetcherConfig, IncomeSource, SourceError};

/// Fetches raw `GeoJSON` features from the source's service.
///
/// # Errors
///
/// Returns [`SourceError`] if the HTTP request or response parsing
/// fails.
pub async fn fetch_features(
    client: &reqwest::Client,
    source: &IncomeSource,
) -> Result<Vec<serde_json::Value>, SourceError> {
    match &source.fetcher {
        IncomeFetcherConfig::Arcgis {
            url,
            out_fields,
            page_size,
        } => arcgis::fetch(client, url, out_fields, *page_size).await,
        IncomeFetcherConfig::GeojsonUrl { url } => geojson_url::fetch(client, url).await,
    }
}
