#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Store income enrichment pipeline.
//!
//! Takes a layer of store points and a layer of census income polygons,
//! reprojects both into a common projected reference, buffers each
//! store, joins the buffers against the income polygons, averages the
//! detected income field per buffer, and flags stores whose average
//! meets a threshold.
//!
//! The stages live in their own modules and can be used independently;
//! [`pipeline::run_pipeline`] chains them. [`layer`] converts between
//! `GeoJSON` and the model types for the collaborators on either side.

pub mod buffer;
pub mod field;
pub mod filter;
pub mod join;
pub mod layer;
pub mod normalize;
pub mod pipeline;

use store_income_enrich_models::config::EnrichConfig;
use store_income_spatial::crs::Crs;
use thiserror::Error;

pub use pipeline::run_pipeline;

/// Annotated default configuration, embedded at compile time.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Errors that abort an enrichment run.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// A layer declares no spatial reference and no default is configured.
    #[error("Layer '{layer}' has no spatial reference and no default is configured")]
    MissingReference {
        /// Name of the offending layer.
        layer: String,
    },

    /// No attribute of the income layer matches any candidate name.
    #[error(
        "No income field found: candidates [{}] matched none of [{}]",
        .candidates.join(", "),
        .available.join(", ")
    )]
    FieldNotFound {
        /// Candidates that were tried, in priority order.
        candidates: Vec<String>,
        /// Attribute names that were inspected.
        available: Vec<String>,
    },

    /// A spatial reference could not be parsed, is unsupported, or a
    /// coordinate could not be projected.
    #[error("Reprojection failed: {message}")]
    ReprojectionFailure {
        /// Description of what went wrong.
        message: String,
    },

    /// The layers reached the join in different references.
    #[error("Spatial reference mismatch: buffers in {buffers}, income areas in {income}")]
    CrsMismatch {
        /// Reference of the buffer layer.
        buffers: Crs,
        /// Reference of the income layer.
        income: Crs,
    },

    /// Configuration values are out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the first invalid value.
        message: String,
    },

    /// An input document is not a usable layer.
    #[error("Layer error: {message}")]
    Layer {
        /// Description of what went wrong.
        message: String,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// Configuration TOML could not be parsed.
    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<geojson::Error> for EnrichError {
    fn from(e: geojson::Error) -> Self {
        Self::GeoJson(Box::new(e))
    }
}

/// Parses a TOML configuration document and validates it.
///
/// Missing keys fall back to [`EnrichConfig::default`].
///
/// # Errors
///
/// Returns [`EnrichError::Toml`] for malformed TOML and
/// [`EnrichError::InvalidConfig`] for out-of-range values.
pub fn parse_config(text: &str) -> Result<EnrichConfig, EnrichError> {
    let config: EnrichConfig = toml::from_str(text)?;
    config
        .validate()
        .map_err(|message| EnrichError::InvalidConfig { message })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_config_matches_defaults() {
        let config = parse_config(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config, EnrichConfig::default());
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(parse_config("").unwrap(), EnrichConfig::default());
    }

    #[test]
    fn out_of_range_config_is_rejected() {
        let err = parse_config("buffer_radius_miles = -1.0").unwrap_err();
        assert!(matches!(err, EnrichError::InvalidConfig { .. }), "{err}");
    }

    #[test]
    fn field_not_found_message_lists_names() {
        let err = EnrichError::FieldNotFound {
            candidates: vec!["=B19013_001E".to_string()],
            available: vec!["GEOID".to_string(), "NAME".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No income field found: candidates [=B19013_001E] matched none of [GEOID, NAME]"
        );
    }
}
