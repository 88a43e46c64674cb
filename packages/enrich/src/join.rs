//! Buffer/income-area spatial join and per-buffer income aggregation.
//!
//! Each buffer is matched to every income area whose polygon intersects
//! it, boundary contact included. Areas are not clipped and not
//! weighted by overlap: an area's full value counts once toward the
//! unweighted mean of every buffer it touches.

use store_income_enrich_models::{Buffer, IncomeAggregate, IncomeArea, JoinResult};
use store_income_spatial::AreaIndex;
use store_income_spatial::crs::Crs;

use crate::EnrichError;
use crate::normalize::Normalized;

/// ACS annotation values published in estimate columns in place of data
/// (e.g. `-666666666` for "estimate could not be computed").
const ACS_SENTINELS: [f64; 7] = [
    -111_111_111.0,
    -222_222_222.0,
    -333_333_333.0,
    -555_555_555.0,
    -666_666_666.0,
    -888_888_888.0,
    -999_999_999.0,
];

/// Usable income value of `area`'s `field`, if any.
///
/// Absent, null, boolean, non-numeric, non-finite, and ACS sentinel
/// values are all unusable.
#[must_use]
pub fn income_value(area: &IncomeArea, field: &str) -> Option<f64> {
    area.attributes
        .get(field)?
        .as_number()
        .filter(|v| !ACS_SENTINELS.contains(v))
}

/// Unweighted mean of `values`, or [`IncomeAggregate::Missing`] when
/// there are none.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean<I>(values: I) -> IncomeAggregate
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        IncomeAggregate::Missing
    } else {
        IncomeAggregate::Mean(sum / count as f64)
    }
}

/// Joins one buffer against the index and aggregates `field`.
///
/// With `field == None` (empty income layer) the aggregate is missing.
#[must_use]
pub fn join_buffer(
    buffer: &Buffer,
    index: &AreaIndex<'_>,
    areas: &[IncomeArea],
    field: Option<&str>,
) -> JoinResult {
    let area_indices = index.intersecting(&buffer.polygon);

    let values: Vec<f64> = field.map_or_else(Vec::new, |field| {
        area_indices
            .iter()
            .filter_map(|&i| income_value(&areas[i], field))
            .collect()
    });

    let aggregate = mean(values.iter().copied());

    log::debug!(
        "Store {}: {} intersecting areas, {} valued, aggregate {aggregate:?}",
        buffer.store_id,
        area_indices.len(),
        values.len()
    );

    JoinResult {
        store_id: buffer.store_id.clone(),
        area_indices,
        valued_count: values.len(),
        aggregate,
    }
}

/// Joins every buffer against the income layer, one result per buffer
/// in buffer order.
///
/// # Errors
///
/// Returns [`EnrichError::CrsMismatch`] if the buffers and the income
/// layer are not in the same reference.
pub fn join_all(
    buffers: &[Buffer],
    buffer_crs: Crs,
    income: &Normalized<IncomeArea>,
    field: Option<&str>,
) -> Result<Vec<JoinResult>, EnrichError> {
    if buffer_crs != income.crs {
        return Err(EnrichError::CrsMismatch {
            buffers: buffer_crs,
            income: income.crs,
        });
    }

    let index = AreaIndex::build(income.records.iter().map(|area| &area.geometry));

    let results: Vec<JoinResult> = buffers
        .iter()
        .map(|buffer| join_buffer(buffer, &index, &income.records, field))
        .collect();

    let matched = results.iter().filter(|r| !r.area_indices.is_empty()).count();
    let defined = results.iter().filter(|r| !r.aggregate.is_missing()).count();
    log::info!(
        "Joined {} buffers against {} income areas: {matched} intersect, {defined} have an aggregate",
        buffers.len(),
        index.len()
    );

    Ok(results)
}
