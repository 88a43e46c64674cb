//! Pipeline configuration, deserialized from TOML.
//!
//! Every field has a serde default so a partial (or empty) file is
//! valid. The assumed spatial reference for layers that declare none is
//! an explicit field here rather than a fallback inside projection code.

use serde::{Deserialize, Serialize};

/// Statute mile in metres.
pub const METERS_PER_MILE: f64 = 1609.344;

/// Reference assumed for layers without one: GeoJSON's WGS 84.
pub const DEFAULT_CRS: &str = "EPSG:4326";

/// Projection used for buffering and joining.
pub const DEFAULT_WORKING_CRS: &str = "EPSG:3857";

/// One entry in the prioritized income field candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldCandidate {
    /// Case-insensitive equality with `name`.
    Exact {
        /// Attribute name to match.
        name: String,
    },
    /// Every fragment appears as a case-insensitive substring and the
    /// name is not a margin-of-error column.
    Contains {
        /// Required substrings.
        fragments: Vec<String>,
    },
}

impl FieldCandidate {
    /// Convenience constructor for [`FieldCandidate::Exact`].
    #[must_use]
    pub fn exact(name: &str) -> Self {
        Self::Exact {
            name: name.to_string(),
        }
    }

    /// Convenience constructor for [`FieldCandidate::Contains`].
    #[must_use]
    pub fn contains(fragments: &[&str]) -> Self {
        Self::Contains {
            fragments: fragments.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Returns `true` if `attribute` satisfies this candidate.
    #[must_use]
    pub fn matches(&self, attribute: &str) -> bool {
        match self {
            Self::Exact { name } => attribute.eq_ignore_ascii_case(name),
            Self::Contains { fragments } => {
                let lower = attribute.to_ascii_lowercase();
                !fragments.is_empty()
                    && fragments
                        .iter()
                        .all(|f| lower.contains(&f.to_ascii_lowercase()))
                    && !is_margin_of_error(&lower)
            }
        }
    }
}

/// Returns `true` for ACS margin-of-error column names: anything
/// mentioning `moe` or `margin`, and variable codes ending in `_NNNM`
/// (e.g. `B19013_001M`). Expects a lowercased name.
fn is_margin_of_error(lower: &str) -> bool {
    if lower.contains("moe") || lower.contains("margin") {
        return true;
    }
    match lower.as_bytes() {
        [.., b'_', d1, d2, d3, b'm'] => [d1, d2, d3].iter().all(|d| d.is_ascii_digit()),
        _ => false,
    }
}

impl std::fmt::Display for FieldCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact { name } => write!(f, "={name}"),
            Self::Contains { fragments } => write!(f, "~{}", fragments.join("+")),
        }
    }
}

/// ACS median household income naming conventions, highest priority first.
#[must_use]
pub fn default_field_candidates() -> Vec<FieldCandidate> {
    vec![
        FieldCandidate::exact("B19013_001E"),
        FieldCandidate::exact("MEDIAN_HOUSEHOLD_INCOME"),
        FieldCandidate::exact("B19053_001E"),
        FieldCandidate::contains(&["median", "income"]),
        FieldCandidate::contains(&["b19013"]),
    ]
}

/// Tunable parameters of one enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Buffer radius in statute miles.
    pub buffer_radius_miles: f64,
    /// Minimum aggregate income for a store to qualify.
    pub income_threshold: f64,
    /// Income attribute candidates, checked in order.
    pub income_field_candidates: Vec<FieldCandidate>,
    /// Reference assigned to layers that declare none. Empty disables
    /// the assumption.
    pub default_crs: Option<String>,
    /// Projected reference used for buffering and joining.
    pub working_crs: String,
    /// Vertices in each buffer polygon.
    pub buffer_segments: usize,
    /// Store property used as identifier when a feature has no `id`.
    pub store_id_field: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            buffer_radius_miles: 3.0,
            income_threshold: 100_000.0,
            income_field_candidates: default_field_candidates(),
            default_crs: Some(DEFAULT_CRS.to_string()),
            working_crs: DEFAULT_WORKING_CRS.to_string(),
            buffer_segments: 64,
            store_id_field: "id".to_string(),
        }
    }
}

impl EnrichConfig {
    /// Assumed reference for undeclared layers, if enabled.
    #[must_use]
    pub fn default_crs(&self) -> Option<&str> {
        self.default_crs
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Buffer radius in metres.
    #[must_use]
    pub fn buffer_radius_meters(&self) -> f64 {
        self.buffer_radius_miles * METERS_PER_MILE
    }

    /// Checks value ranges, returning a description of the first problem.
    ///
    /// # Errors
    ///
    /// Returns a message if the radius is not positive and finite, the
    /// threshold is not finite, fewer than 8 segments are requested, or
    /// the candidate list is empty.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.buffer_radius_miles.is_finite() && self.buffer_radius_miles > 0.0) {
            return Err(format!(
                "buffer_radius_miles must be positive, got {}",
                self.buffer_radius_miles
            ));
        }
        if !self.income_threshold.is_finite() {
            return Err(format!(
                "income_threshold must be finite, got {}",
                self.income_threshold
            ));
        }
        if self.buffer_segments < 8 {
            return Err(format!(
                "buffer_segments must be at least 8, got {}",
                self.buffer_segments
            ));
        }
        if self.income_field_candidates.is_empty() {
            return Err("income_field_candidates must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EnrichConfig::default();
        assert!((config.buffer_radius_miles - 3.0).abs() < f64::EPSILON);
        assert!((config.income_threshold - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(config.default_crs(), Some("EPSG:4326"));
        assert!((config.buffer_radius_meters() - 4828.032).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_default_crs_disables_assumption() {
        let config = EnrichConfig {
            default_crs: Some("  ".to_string()),
            ..EnrichConfig::default()
        };
        assert_eq!(config.default_crs(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: EnrichConfig = toml::from_str(
            r#"
            income_threshold = 85000.0

            [[income_field_candidates]]
            type = "exact"
            name = "MHI"

            [[income_field_candidates]]
            type = "contains"
            fragments = ["household", "income"]
            "#,
        )
        .unwrap();

        assert!((config.income_threshold - 85_000.0).abs() < f64::EPSILON);
        assert!((config.buffer_radius_miles - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.working_crs, DEFAULT_WORKING_CRS);
        assert_eq!(
            config.income_field_candidates,
            vec![
                FieldCandidate::exact("MHI"),
                FieldCandidate::contains(&["household", "income"]),
            ]
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            EnrichConfig {
                buffer_radius_miles: 0.0,
                ..EnrichConfig::default()
            },
            EnrichConfig {
                buffer_radius_miles: f64::NAN,
                ..EnrichConfig::default()
            },
            EnrichConfig {
                income_threshold: f64::INFINITY,
                ..EnrichConfig::default()
            },
            EnrichConfig {
                buffer_segments: 4,
                ..EnrichConfig::default()
            },
            EnrichConfig {
                income_field_candidates: Vec::new(),
                ..EnrichConfig::default()
            },
        ];
        for config in &bad {
            assert!(config.validate().is_err(), "accepted {config:?}");
        }
    }

    #[test]
    fn candidate_matching() {
        let exact = FieldCandidate::exact("B19013_001E");
        assert!(exact.matches("b19013_001e"));
        assert!(!exact.matches("B19013_001EX"));

        let contains = FieldCandidate::contains(&["median", "income"]);
        assert!(contains.matches("B19013_median_income_est"));
        assert!(contains.matches("MedianHouseholdIncome"));
        assert!(!contains.matches("median_age"));
        assert!(!contains.matches("median_income_moe"));
        assert!(!contains.matches("MedianIncomeMargin"));

        let code = FieldCandidate::contains(&["b19013"]);
        assert!(code.matches("B19013_001E"));
        assert!(!code.matches("B19013_001M"));
        assert!(!code.matches("b19013_001m"));
        assert!(FieldCandidate::exact("B19013_001M").matches("B19013_001M"));

        assert!(!FieldCandidate::Contains { fragments: vec![] }.matches("anything"));
    }
}
