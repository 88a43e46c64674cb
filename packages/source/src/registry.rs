//! Compile-time registry of income polygon sources.
//!
//! Each entry is a `(name, toml_content)` pair embedded via `include_str!`.
//! Adding a new source requires creating a TOML file in `sources/` and
//! adding a corresponding entry here.

use crate::IncomeSource;

/// Number of registered income sources. Enforced by a test.
#[cfg(test)]
const EXPECTED_SOURCE_COUNT: usize = 1;

/// Embedded TOML source definitions.
const SOURCE_TOMLS: &[(&str, &str)] = &[(
    "acs_median_income",
    include_str!("../sources/acs_median_income.toml"),
)];

/// Returns all registered income sources.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_sources() -> Vec<IncomeSource> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse income source '{name}': {e}"))
        })
        .collect()
}

/// Looks up a registered source by id.
#[must_use]
pub fn find_source(id: &str) -> Option<IncomeSource> {
    all_sources().into_iter().find(|source| source.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IncomeFetcherConfig;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_sources() {
        let sources = all_sources();
        assert_eq!(
            sources.len(),
            EXPECTED_SOURCE_COUNT,
            "Expected {EXPECTED_SOURCE_COUNT} income sources, found {}. \
             Update EXPECTED_SOURCE_COUNT after adding/removing sources.",
            sources.len()
        );
    }

    #[test]
    fn source_ids_are_unique() {
        let mut seen = BTreeSet::new();
        for source in &all_sources() {
            assert!(seen.insert(source.id.clone()), "Duplicate income source ID: {}", source.id);
        }
    }

    #[test]
    fn arcgis_sources_point_at_query_endpoints() {
        for source in &all_sources() {
            assert!(!source.name.is_empty(), "Source {} has empty name", source.id);
            assert!(!source.crs.is_empty(), "Source {} has empty crs", source.id);
            if let IncomeFetcherConfig::Arcgis { url, .. } = &source.fetcher {
                assert!(
                    url.ends_with("/query"),
                    "Source {} ArcGIS URL must end in /query: {url}",
                    source.id
                );
            }
        }
    }

    #[test]
    fn finds_default_source() {
        let source = find_source("acs_median_income").unwrap();
        assert_eq!(source.crs, "EPSG:4326");
        assert!(find_source("nope").is_none());
    }
}
