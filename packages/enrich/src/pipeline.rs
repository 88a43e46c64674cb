//! End-to-end enrichment run.
//!
//! Stages run strictly in order: validate config, normalize both layers
//! into the working projection, detect the income field, buffer the
//! stores, join and aggregate, filter, and project the qualifying
//! buffers back to WGS 84 for display. Fatal errors abort the run; an
//! empty income layer only degrades every aggregate to missing.

use store_income_enrich_models::{
    EnrichWarning, EnrichedStore, EnrichmentOutput, IncomeArea, JoinResult, Layer,
    QualifyingBuffer, Store, config::EnrichConfig,
};
use store_income_spatial::crs::{self, Crs};

use crate::{EnrichError, buffer, field, filter, join, normalize};

/// Runs the full enrichment over `stores` and `income`.
///
/// # Errors
///
/// Returns [`EnrichError`] if the configuration is invalid, a layer has
/// no usable spatial reference, projection fails, or no income field
/// can be detected in a non-empty income layer.
pub fn run_pipeline(
    stores: &Layer<Store>,
    income: &Layer<IncomeArea>,
    config: &EnrichConfig,
) -> Result<EnrichmentOutput, EnrichError> {
    config
        .validate()
        .map_err(|message| EnrichError::InvalidConfig { message })?;

    log::info!(
        "Enriching {} stores against {} income areas",
        stores.len(),
        income.len()
    );

    let working = normalize::working_crs(&config.working_crs)?;
    let stores = normalize::normalize_stores(stores, config.default_crs(), working)?;
    let income = normalize::normalize_income(income, config.default_crs(), working)?;

    let mut warnings = Vec::new();
    let income_field = if income.records.is_empty() {
        log::warn!(
            "Income layer '{}' is empty, every aggregate will be missing",
            income.name
        );
        warnings.push(EnrichWarning::EmptyUpstreamData);
        None
    } else {
        let schema = field::income_schema(&income.records);
        Some(field::detect_income_field(
            &schema,
            &config.income_field_candidates,
        )?)
    };

    let buffers = buffer::buffer_stores(&stores, config)?;
    let joins = join::join_all(&buffers, stores.crs, &income, income_field.as_deref())?;

    let enriched = stores
        .records
        .iter()
        .zip(&joins)
        .map(|(store, join)| enrich_store(store, join, working, config.income_threshold))
        .collect::<Result<Vec<_>, _>>()?;

    let selected = filter::select_qualifying(&enriched, config.income_threshold);

    let qualifying_buffers = buffers
        .iter()
        .zip(&enriched)
        .filter_map(|(buffer, store)| {
            let aggregate = store.aggregate.value().filter(|_| store.qualifies)?;
            Some(
                crs::reproject(&buffer.polygon, working, Crs::Wgs84)
                    .map(|polygon| QualifyingBuffer {
                        store_id: store.id.clone(),
                        polygon,
                        aggregate,
                        tract_count: store.tract_count,
                    })
                    .map_err(|e| EnrichError::ReprojectionFailure {
                        message: format!("buffer of store {}: {e}", store.id),
                    }),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug_assert_eq!(selected.len(), qualifying_buffers.len());

    Ok(EnrichmentOutput {
        enriched,
        qualifying_buffers,
        income_field,
        threshold: config.income_threshold,
        warnings,
    })
}

fn enrich_store(
    store: &Store,
    join: &JoinResult,
    working: Crs,
    cutoff: f64,
) -> Result<EnrichedStore, EnrichError> {
    let geographic = crs::transform(working, Crs::Wgs84, store.location.0).map_err(|e| {
        EnrichError::ReprojectionFailure {
            message: format!("store {}: {e}", store.id),
        }
    })?;

    Ok(EnrichedStore {
        id: store.id.clone(),
        lon: geographic.x,
        lat: geographic.y,
        aggregate: join.aggregate,
        tract_count: join.tract_count(),
        valued_count: join.valued_count,
        qualifies: filter::qualifies(&join.aggregate, cutoff),
        attributes: store.attributes.clone(),
    })
}
