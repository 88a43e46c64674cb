#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Store, income area, and enrichment result types.
//!
//! These types describe the two input layers (store points and census
//! income polygons), the intermediate buffer/join records, and the
//! enriched output handed to map rendering. Geometry uses `geo` types;
//! attribute values are an explicit sum type so that "no data" never
//! collapses into a numeric zero.

pub mod config;

use std::collections::BTreeMap;
use std::fmt;

use geo::{MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

/// A single attribute value from a feature's property table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Explicit null or absent value.
    Null,
    /// Boolean property.
    Bool(bool),
    /// Numeric property.
    Number(f64),
    /// String property.
    Text(String),
}

impl AttributeValue {
    /// Returns the value as a finite number, parsing numeric text.
    ///
    /// Booleans, nulls, non-numeric text, and non-finite numbers yield
    /// `None`.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Null | Self::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Returns `true` for [`AttributeValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Property table of a feature, keyed by attribute name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A retail store location.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    /// Store identifier, unique within a layer.
    pub id: String,
    /// Point location in the layer's spatial reference.
    pub location: Point<f64>,
    /// Remaining feature properties, passed through to the output.
    pub attributes: Attributes,
}

/// A census income polygon (tract or block group).
#[derive(Debug, Clone, PartialEq)]
pub struct IncomeArea {
    /// Polygon boundary in the layer's spatial reference.
    pub geometry: MultiPolygon<f64>,
    /// Attribute table, one entry of which holds median household income.
    pub attributes: Attributes,
}

/// A homogeneous set of records sharing one spatial reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    /// Human-readable layer name used in logs and errors.
    pub name: String,
    /// Declared spatial reference (e.g. `"EPSG:4326"`), if any.
    pub crs: Option<String>,
    /// Records in input order.
    pub records: Vec<T>,
}

impl<T> Layer<T> {
    /// Creates a layer with no declared spatial reference.
    #[must_use]
    pub fn new(name: impl Into<String>, records: Vec<T>) -> Self {
        Self {
            name: name.into(),
            crs: None,
            records,
        }
    }

    /// Sets the declared spatial reference.
    #[must_use]
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Number of records in the layer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the layer has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Income aggregate over the areas joined to one buffer.
///
/// `Missing` means no usable data was found. It is never equal to any
/// numeric value and never satisfies a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IncomeAggregate {
    /// No intersecting areas, or none with a usable income value.
    Missing,
    /// Unweighted arithmetic mean of the usable values.
    Mean(f64),
}

impl IncomeAggregate {
    /// Returns the mean, or `None` if missing.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        match self {
            Self::Missing => None,
            Self::Mean(v) => Some(*v),
        }
    }

    /// Returns `true` if the aggregate is [`IncomeAggregate::Missing`].
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns `true` if the aggregate is defined and `>= cutoff`.
    #[must_use]
    pub fn meets(&self, cutoff: f64) -> bool {
        self.value().is_some_and(|v| v >= cutoff)
    }
}

/// Fixed-radius polygon around one store, in the working projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    /// Identifier of the owning store.
    pub store_id: String,
    /// Store location the buffer is centered on.
    pub center: Point<f64>,
    /// Ground radius in metres.
    pub radius: f64,
    /// Buffer polygon.
    pub polygon: Polygon<f64>,
}

/// Income areas matched to one buffer and their aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinResult {
    /// Identifier of the store owning the buffer.
    pub store_id: String,
    /// Indices into the income layer of every intersecting area, ascending.
    pub area_indices: Vec<usize>,
    /// Number of intersecting areas that contributed a usable value.
    pub valued_count: usize,
    /// Mean of the detected income field.
    pub aggregate: IncomeAggregate,
}

impl JoinResult {
    /// Number of intersecting areas, regardless of value usability.
    #[must_use]
    pub fn tract_count(&self) -> usize {
        self.area_indices.len()
    }
}

/// A store with its buffer aggregate and qualification flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedStore {
    /// Store identifier.
    pub id: String,
    /// WGS 84 longitude.
    pub lon: f64,
    /// WGS 84 latitude.
    pub lat: f64,
    /// Buffer income aggregate.
    pub aggregate: IncomeAggregate,
    /// Number of income areas intersecting the buffer.
    pub tract_count: usize,
    /// Number of those areas with a usable income value.
    pub valued_count: usize,
    /// `true` when the aggregate is defined and meets the threshold.
    pub qualifies: bool,
    /// Original store properties.
    pub attributes: Attributes,
}

/// Buffer polygon of a qualifying store, in WGS 84.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifyingBuffer {
    /// Identifier of the owning store.
    pub store_id: String,
    /// Buffer polygon in WGS 84.
    pub polygon: Polygon<f64>,
    /// Defined aggregate income (always meets the threshold).
    pub aggregate: f64,
    /// Number of income areas intersecting the buffer.
    pub tract_count: usize,
}

/// Non-fatal conditions recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnrichWarning {
    /// The income layer had no records; every aggregate is missing.
    EmptyUpstreamData,
    /// Store features that could not be used were dropped at load time.
    SkippedStores {
        /// Number of dropped features.
        count: usize,
    },
    /// Income features that could not be used were dropped at load time.
    SkippedIncomeAreas {
        /// Number of dropped features.
        count: usize,
    },
}

impl fmt::Display for EnrichWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyUpstreamData => {
                f.write_str("income layer is empty; all aggregates are missing")
            }
            Self::SkippedStores { count } => write!(f, "skipped {count} unusable store features"),
            Self::SkippedIncomeAreas { count } => {
                write!(f, "skipped {count} unusable income features")
            }
        }
    }
}

/// Everything produced by one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutput {
    /// One entry per input store, in input order.
    pub enriched: Vec<EnrichedStore>,
    /// Buffers of qualifying stores, in input order.
    pub qualifying_buffers: Vec<QualifyingBuffer>,
    /// Income attribute used for aggregation, if the income layer was
    /// non-empty.
    pub income_field: Option<String>,
    /// Threshold applied by the filter.
    pub threshold: f64,
    /// Non-fatal conditions encountered.
    pub warnings: Vec<EnrichWarning>,
}

impl EnrichmentOutput {
    /// Stores whose aggregate met the threshold.
    pub fn qualifying(&self) -> impl Iterator<Item = &EnrichedStore> {
        self.enriched.iter().filter(|s| s.qualifies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_number_parses_numeric_text() {
        assert_eq!(AttributeValue::Number(5.0).as_number(), Some(5.0));
        assert_eq!(
            AttributeValue::Text(" 85000 ".to_string()).as_number(),
            Some(85_000.0)
        );
        assert_eq!(AttributeValue::Text("N/A".to_string()).as_number(), None);
        assert_eq!(AttributeValue::Null.as_number(), None);
        assert_eq!(AttributeValue::Bool(true).as_number(), None);
        assert_eq!(AttributeValue::Number(f64::NAN).as_number(), None);
        assert_eq!(AttributeValue::Number(f64::INFINITY).as_number(), None);
    }

    #[test]
    fn missing_aggregate_never_meets_threshold() {
        assert!(!IncomeAggregate::Missing.meets(0.0));
        assert!(!IncomeAggregate::Missing.meets(f64::NEG_INFINITY));
        assert!(IncomeAggregate::Mean(100_000.0).meets(100_000.0));
        assert!(!IncomeAggregate::Mean(99_999.0).meets(100_000.0));
    }

    #[test]
    fn missing_is_distinct_from_zero() {
        assert_ne!(IncomeAggregate::Missing, IncomeAggregate::Mean(0.0));
        assert_eq!(IncomeAggregate::Missing.value(), None);
        assert_eq!(IncomeAggregate::Mean(0.0).value(), Some(0.0));
    }

    #[test]
    fn layer_with_crs() {
        let layer: Layer<Store> = Layer::new("stores", Vec::new()).with_crs("EPSG:4326");
        assert_eq!(layer.crs.as_deref(), Some("EPSG:4326"));
        assert!(layer.is_empty());
    }
}
