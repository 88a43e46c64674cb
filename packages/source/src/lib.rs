#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census income polygon sources.
//!
//! Downloads income-by-area polygons from `ArcGIS` `FeatureServer`
//! endpoints (or plain `GeoJSON` URLs) as raw `GeoJSON` features. Sources
//! are defined as TOML files embedded at compile time. All network
//! retry policy lives here; the enrichment pipeline only ever sees the
//! materialized feature list.

pub mod fetchers;
pub mod registry;
pub mod retry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while fetching income data.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with an error payload or unusable body.
    #[error("Service error: {message}")]
    Service {
        /// Description of what went wrong.
        message: String,
    },
}

/// An income polygon source, deserialized from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeSource {
    /// Unique source identifier (e.g., `"acs_median_income"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Spatial reference of the returned geometry.
    pub crs: String,
    /// Fetcher configuration.
    pub fetcher: IncomeFetcherConfig,
}

/// How to fetch income polygons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomeFetcherConfig {
    /// `ArcGIS` `FeatureServer` or `MapServer` query endpoint.
    ///
    /// Requests `where=1=1&outFields=...&f=geojson&returnGeometry=true`
    /// and pages with `resultOffset`.
    Arcgis {
        /// Base query URL (up to `.../query`).
        url: String,
        /// Attribute fields to request. Empty requests all (`*`).
        #[serde(default)]
        out_fields: Vec<String>,
        /// Records per page (default: 2000).
        page_size: Option<u32>,
    },
    /// Direct `GeoJSON` URL returning a `FeatureCollection`.
    GeojsonUrl {
        /// Full URL.
        url: String,
    },
}

/// Raw features downloaded from a source, with their declared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomeDownload {
    /// Spatial reference of the geometry.
    pub crs: String,
    /// `GeoJSON` feature objects.
    pub features: Vec<serde_json::Value>,
}

impl IncomeDownload {
    /// Wraps the features in a `GeoJSON` `FeatureCollection` value.
    #[must_use]
    pub fn into_feature_collection(self) -> serde_json::Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": self.features,
        })
    }
}

/// Downloads every feature of `source`.
///
/// An empty result is returned as-is; deciding what an empty layer
/// means is up to the caller.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after retries or the
/// response cannot be parsed.
pub async fn fetch_income(
    client: &reqwest::Client,
    source: &IncomeSource,
) -> Result<IncomeDownload, SourceError> {
    log::info!("Fetching income polygons from {} ({})", source.id, source.name);

    let features = fetchers::fetch_features(client, source).await?;

    log::info!("{}: fetched {} features", source.id, features.len());
    if features.is_empty() {
        log::warn!("{}: source returned no features", source.id);
    }

    Ok(IncomeDownload {
        crs: source.crs.clone(),
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_wraps_into_feature_collection() {
        let download = IncomeDownload {
            crs: "EPSG:4326".to_string(),
            features: vec![serde_json::json!({ "type": "Feature", "properties": {} })],
        };
        let fc = download.into_feature_collection();
        assert_eq!(fc["type"], "FeatureCollection");
        assert_eq!(fc["features"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn geojson_url_source_parses() {
        let source: IncomeSource = toml::from_str(
            r#"
            id = "local"
            name = "Local file server"
            crs = "EPSG:4269"

            [fetcher]
            type = "geojson_url"
            url = "http://localhost:8000/tracts.geojson"
            "#,
        )
        .unwrap();
        assert_eq!(
            source.fetcher,
            IncomeFetcherConfig::GeojsonUrl {
                url: "http://localhost:8000/tracts.geojson".to_string()
            }
        );
    }
}
