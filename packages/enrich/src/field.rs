//! Income field auto-detection.
//!
//! Census income services name the median household income column
//! differently across releases (`B19013_001E`, `MEDIAN_HOUSEHOLD_INCOME`,
//! `B19013_median_income_est`, ...). Detection walks a prioritized
//! candidate list and returns the first attribute that matches, or a
//! typed error. It never falls back to an arbitrary numeric column.

use std::collections::BTreeSet;

use store_income_enrich_models::{IncomeArea, config::FieldCandidate};

use crate::EnrichError;

/// Sorted, deduplicated attribute names across all income areas.
#[must_use]
pub fn income_schema(areas: &[IncomeArea]) -> Vec<String> {
    areas
        .iter()
        .flat_map(|area| area.attributes.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect()
}

/// Selects the income attribute from `attributes`.
///
/// Candidates are tried in order; within a candidate, attributes are
/// tried in the order given.
///
/// # Errors
///
/// Returns [`EnrichError::FieldNotFound`] if no attribute matches any
/// candidate.
pub fn detect_income_field<S: AsRef<str>>(
    attributes: &[S],
    candidates: &[FieldCandidate],
) -> Result<String, EnrichError> {
    for candidate in candidates {
        if let Some(name) = attributes
            .iter()
            .map(AsRef::as_ref)
            .find(|name| candidate.matches(name))
        {
            log::info!("Detected income field '{name}' (candidate {candidate})");
            return Ok(name.to_string());
        }
    }

    Err(EnrichError::FieldNotFound {
        candidates: candidates.iter().map(ToString::to_string).collect(),
        available: attributes.iter().map(|s| s.as_ref().to_string()).collect(),
    })
}
