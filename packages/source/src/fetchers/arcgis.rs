//! `ArcGIS` `FeatureServer` / `MapServer` fetcher.
//!
//! Queries an `ArcGIS` REST endpoint with `f=geojson` to get standard
//! `GeoJSON` output. Pages through services with transfer limits via
//! `resultOffset` / `resultRecordCount`.

use crate::{SourceError, retry};

/// Records requested per page when the source does not say.
const DEFAULT_PAGE_SIZE: u32 = 2000;

/// Builds the query URL for one page.
#[must_use]
pub fn query_url(base_url: &str, out_fields: &[String], page_size: u32, offset: u64) -> String {
    let fields = if out_fields.is_empty() {
        "*".to_string()
    } else {
        out_fields.join(",")
    };

    format!(
        "{base_url}\
         ?where=1%3D1\
         &outFields={fields}\
         &f=geojson\
         &returnGeometry=true\
         &resultRecordCount={page_size}\
         &resultOffset={offset}"
    )
}

/// Returns `true` if the service signals more records past this page.
///
/// `f=geojson` responses carry the flag under `properties`; Esri JSON
/// carries it at the top level. A full page is also taken as a signal,
/// since some services omit the flag entirely.
#[must_use]
pub fn has_more_pages(page: &serde_json::Value, returned: usize, page_size: u32) -> bool {
    let exceeded = page["exceededTransferLimit"]
        .as_bool()
        .or_else(|| page["properties"]["exceededTransferLimit"].as_bool())
        .unwrap_or(false);
    exceeded || u64::try_from(returned).is_ok_and(|n| n >= u64::from(page_size))
}

/// Fetches all features from an `ArcGIS` query endpoint.
///
/// # Errors
///
/// Returns [`SourceError`] if a request fails after retries, the
/// service reports an error, or a page lacks a `features` array.
pub async fn fetch(
    client: &reqwest::Client,
    base_url: &str,
    out_fields: &[String],
    page_size: Option<u32>,
) -> Result<Vec<serde_json::Value>, SourceError> {
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let mut all_features = Vec::new();
    let mut offset = 0u64;

    loop {
        let url = query_url(base_url, out_fields, page_size, offset);
        let json = retry::send_json(|| client.get(&url)).await?;

        if let Some(error) = json.get("error") {
            return Err(SourceError::Service {
                message: format!(
                    "ArcGIS API error: {}",
                    error["message"].as_str().unwrap_or("unknown error")
                ),
            });
        }

        let features = json["features"]
            .as_array()
            .ok_or_else(|| SourceError::Service {
                message: "No features array in ArcGIS response".to_string(),
            })?;

        if features.is_empty() {
            break;
        }

        all_features.extend(features.iter().cloned());
        log::debug!(
            "ArcGIS page at offset {offset}: {} features ({} total)",
            features.len(),
            all_features.len()
        );

        if !has_more_pages(&json, features.len(), page_size) {
            break;
        }

        offset += features.len() as u64;
    }

    Ok(all_features)
}
