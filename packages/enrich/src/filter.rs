//! Income threshold filter.
//!
//! A store qualifies only when its aggregate is defined and at least the
//! cutoff. Missing aggregates are excluded outright.

use store_income_enrich_models::{EnrichedStore, IncomeAggregate};

/// Returns `true` if `aggregate` is defined and `>= cutoff`.
#[must_use]
pub fn qualifies(aggregate: &IncomeAggregate, cutoff: f64) -> bool {
    aggregate.meets(cutoff)
}

/// Stores whose aggregate meets `cutoff`, in input order.
///
/// An empty result is a valid outcome.
#[must_use]
pub fn select_qualifying(stores: &[EnrichedStore], cutoff: f64) -> Vec<&EnrichedStore> {
    let selected: Vec<&EnrichedStore> = stores
        .iter()
        .filter(|store| qualifies(&store.aggregate, cutoff))
        .collect();

    if selected.is_empty() && !stores.is_empty() {
        log::warn!("No stores meet the income threshold of {cutoff}");
    } else {
        log::info!(
            "{} of {} stores meet the income threshold of {cutoff}",
            selected.len(),
            stores.len()
        );
    }

    selected
}
