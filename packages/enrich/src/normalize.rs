//! Spatial reference assignment and reprojection of input layers.
//!
//! A layer without a declared reference gets the configured default;
//! a layer with one keeps it. Both layers are then projected into the
//! working reference, which must have linear units for buffering.

use store_income_enrich_models::{IncomeArea, Layer, Store};
use store_income_spatial::crs::{Crs, CrsError, reproject};

use crate::EnrichError;

/// A layer whose records are expressed in a known reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    /// Layer name carried over from the input.
    pub name: String,
    /// Reference of every record's geometry.
    pub crs: Crs,
    /// Records in input order.
    pub records: Vec<T>,
}

/// Determines a layer's source reference.
///
/// # Errors
///
/// Returns [`EnrichError::MissingReference`] if the layer declares none
/// and `default` is `None`, or [`EnrichError::ReprojectionFailure`] if
/// the chosen reference cannot be parsed.
pub fn resolve_crs(
    layer: &str,
    declared: Option<&str>,
    default: Option<&str>,
) -> Result<Crs, EnrichError> {
    let reference = match declared.map(str::trim).filter(|s| !s.is_empty()) {
        Some(reference) => reference,
        None => {
            let assumed = default.ok_or_else(|| EnrichError::MissingReference {
                layer: layer.to_string(),
            })?;
            log::info!("Layer '{layer}' declares no spatial reference, assuming {assumed}");
            assumed
        }
    };

    reference
        .parse()
        .map_err(|e: CrsError| reprojection_failure(layer, &e))
}

/// Parses the working reference and checks that it is projected.
///
/// # Errors
///
/// Returns [`EnrichError::ReprojectionFailure`] if the reference cannot
/// be parsed or has angular units.
pub fn working_crs(reference: &str) -> Result<Crs, EnrichError> {
    let crs: Crs = reference
        .parse()
        .map_err(|e: CrsError| reprojection_failure("working reference", &e))?;
    if !crs.is_projected() {
        return Err(EnrichError::ReprojectionFailure {
            message: format!("working reference {crs} is geographic; buffering needs linear units"),
        });
    }
    Ok(crs)
}

/// Assigns a reference to the store layer and projects it into `target`.
///
/// # Errors
///
/// See [`resolve_crs`]; also fails if any store cannot be projected.
pub fn normalize_stores(
    layer: &Layer<Store>,
    default: Option<&str>,
    target: Crs,
) -> Result<Normalized<Store>, EnrichError> {
    normalize_layer(layer, default, target, |store, from, to| {
        Ok(Store {
            location: reproject(&store.location, from, to)?,
            ..store.clone()
        })
    })
}

/// Assigns a reference to the income layer and projects it into `target`.
///
/// # Errors
///
/// See [`resolve_crs`]; also fails if any polygon cannot be projected.
pub fn normalize_income(
    layer: &Layer<IncomeArea>,
    default: Option<&str>,
    target: Crs,
) -> Result<Normalized<IncomeArea>, EnrichError> {
    normalize_layer(layer, default, target, |area, from, to| {
        Ok(IncomeArea {
            geometry: reproject(&area.geometry, from, to)?,
            attributes: area.attributes.clone(),
        })
    })
}

fn normalize_layer<T, F>(
    layer: &Layer<T>,
    default: Option<&str>,
    target: Crs,
    project: F,
) -> Result<Normalized<T>, EnrichError>
where
    F: Fn(&T, Crs, Crs) -> Result<T, CrsError>,
{
    // An empty layer has nothing to project, so an absent reference is
    // harmless. A declared-but-invalid one is still reported.
    if layer.is_empty() && layer.crs.is_none() {
        log::debug!("Layer '{}' is empty, skipping reference assignment", layer.name);
        return Ok(Normalized {
            name: layer.name.clone(),
            crs: target,
            records: Vec::new(),
        });
    }

    let source = resolve_crs(&layer.name, layer.crs.as_deref(), default)?;

    let records = layer
        .records
        .iter()
        .map(|record| project(record, source, target))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| reprojection_failure(&layer.name, &e))?;

    log::info!(
        "Projected {} records of '{}' from {source} to {target}",
        records.len(),
        layer.name
    );

    Ok(Normalized {
        name: layer.name.clone(),
        crs: target,
        records,
    })
}

fn reprojection_failure(layer: &str, e: &CrsError) -> EnrichError {
    EnrichError::ReprojectionFailure {
        message: format!("{layer}: {e}"),
    }
}
