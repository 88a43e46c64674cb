#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for buffer/area intersection.
//!
//! Builds an R-tree over income area bounding boxes once per run and
//! answers "which areas intersect this polygon" queries with an envelope
//! pre-filter followed by an exact `geo` intersection test. Also hosts
//! the spatial reference and projection support in [`crs`].

pub mod crs;

use geo::{BoundingRect, Intersects, MultiPolygon, Polygon};
use rstar::{AABB, RTree, RTreeObject};

/// An area polygon stored in the R-tree with its position in the layer.
struct AreaEntry<'a> {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: &'a MultiPolygon<f64>,
}

impl RTreeObject for AreaEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over a borrowed slice of area polygons.
///
/// Indices returned by queries refer to positions in the slice passed
/// to [`AreaIndex::build`].
pub struct AreaIndex<'a> {
    areas: RTree<AreaEntry<'a>>,
}

impl<'a> AreaIndex<'a> {
    /// Bulk-loads the index from polygons in layer order.
    ///
    /// Polygons without a bounding box (empty geometries) are left out;
    /// they cannot intersect anything.
    #[must_use]
    pub fn build<I>(polygons: I) -> Self
    where
        I: IntoIterator<Item = &'a MultiPolygon<f64>>,
    {
        let mut skipped = 0usize;
        let entries: Vec<AreaEntry<'a>> = polygons
            .into_iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                let Some(envelope) = compute_envelope(polygon) else {
                    skipped += 1;
                    return None;
                };
                Some(AreaEntry {
                    index,
                    envelope,
                    polygon,
                })
            })
            .collect();

        if skipped > 0 {
            log::warn!("Left {skipped} empty area geometries out of the spatial index");
        }

        let areas = RTree::bulk_load(entries);
        log::debug!("Loaded {} areas into spatial index", areas.size());

        Self { areas }
    }

    /// Number of indexed areas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.areas.size()
    }

    /// Returns `true` if nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.size() == 0
    }

    /// Indices of every area whose polygon intersects `polygon`,
    /// ascending.
    ///
    /// Boundary contact counts as intersection.
    #[must_use]
    pub fn intersecting(&self, polygon: &Polygon<f64>) -> Vec<usize> {
        let Some(query_env) = polygon.bounding_rect().map(|rect| {
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
        }) else {
            return Vec::new();
        };

        let mut hits: Vec<usize> = self
            .areas
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(polygon))
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
