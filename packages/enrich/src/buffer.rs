//! Fixed-radius buffer polygons around store points.
//!
//! Vertices are placed on the WGS 84 ellipsoid along geodesics from the
//! store and then projected, so a buffer covers the true ground radius
//! in any working projection.

use geo::{Coord, Destination, Geodesic, LineString, Point, Polygon};
use store_income_enrich_models::{Buffer, Store, config::EnrichConfig};
use store_income_spatial::crs::{Crs, CrsError};

use crate::EnrichError;
use crate::normalize::Normalized;

/// Ring of `segments` points `radius_m` ground metres from `center`
/// (WGS 84 degrees), clockwise from due north.
///
/// Longitudes are kept continuous with the center so a ring crossing
/// the antimeridian does not wrap around the globe.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn geodesic_ring(center: Point<f64>, radius_m: f64, segments: usize) -> Vec<Coord<f64>> {
    (0..segments)
        .map(|i| {
            let bearing = 360.0 * i as f64 / segments as f64;
            let mut c = Geodesic.destination(center, bearing, radius_m).0;
            if c.x - center.x() > 180.0 {
                c.x -= 360.0;
            } else if c.x - center.x() < -180.0 {
                c.x += 360.0;
            }
            c
        })
        .collect()
}

/// Buffers one store located in `crs` by `radius_m` ground metres.
///
/// # Errors
///
/// Returns [`EnrichError::ReprojectionFailure`] if the store cannot be
/// taken to WGS 84 or a vertex cannot be projected back into `crs`.
pub fn buffer_store(
    store: &Store,
    crs: Crs,
    radius_m: f64,
    segments: usize,
) -> Result<Buffer, EnrichError> {
    let failure = |e: CrsError| EnrichError::ReprojectionFailure {
        message: format!("buffer of store {}: {e}", store.id),
    };

    let center = Point(crs.to_geographic(store.location.0).map_err(failure)?);
    let ring = geodesic_ring(center, radius_m, segments)
        .into_iter()
        .map(|c| crs.from_geographic(c))
        .collect::<Result<Vec<_>, _>>()
        .map_err(failure)?;

    Ok(Buffer {
        store_id: store.id.clone(),
        center: store.location,
        radius: radius_m,
        polygon: Polygon::new(LineString::from(ring), Vec::new()),
    })
}

/// Buffers every store of a normalized layer, one buffer per store, in
/// input order.
///
/// # Errors
///
/// Propagates the first [`buffer_store`] failure.
pub fn buffer_stores(
    stores: &Normalized<Store>,
    config: &EnrichConfig,
) -> Result<Vec<Buffer>, EnrichError> {
    let radius_m = config.buffer_radius_meters();
    let buffers = stores
        .records
        .iter()
        .map(|store| buffer_store(store, stores.crs, radius_m, config.buffer_segments))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "Built {} buffers of {} mi in {}",
        buffers.len(),
        config.buffer_radius_miles,
        stores.crs
    );

    Ok(buffers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{BoundingRect, Contains, Distance};
    use store_income_enrich_models::Attributes;
    use store_income_spatial::crs::transform;

    const THREE_MILES_M: f64 = 3.0 * 1609.344;

    /// DC, Seattle, Anchorage, Honolulu.
    const PLACES: [(&str, f64, f64); 4] = [
        ("dc", -77.0365, 38.8977),
        ("seattle", -122.3321, 47.6062),
        ("anchorage", -149.9003, 61.2181),
        ("honolulu", -157.8583, 21.3069),
    ];

    fn projected_store(id: &str, lon: f64, lat: f64, crs: Crs) -> Store {
        let c = transform(Crs::Wgs84, crs, Coord { x: lon, y: lat }).unwrap();
        Store {
            id: id.to_string(),
            location: Point(c),
            attributes: Attributes::new(),
        }
    }

    fn projected(crs: Crs, p: Point<f64>) -> Point<f64> {
        Point(transform(Crs::Wgs84, crs, p.0).unwrap())
    }

    #[test]
    fn ring_is_closed_with_requested_vertices() {
        let store = projected_store("s", -77.0, 38.9, Crs::WebMercator);
        let buffer = buffer_store(&store, Crs::WebMercator, THREE_MILES_M, 16).unwrap();
        let ring = buffer.polygon.exterior();
        assert!(ring.is_closed());
        assert_eq!(ring.0.len(), 17);
        assert_eq!(buffer.store_id, "s");
        assert_eq!(buffer.center, store.location);
        assert!((buffer.radius - THREE_MILES_M).abs() < f64::EPSILON);
    }

    #[test]
    fn vertices_lie_at_ground_radius_in_every_projection() {
        for crs in [Crs::WebMercator, Crs::ConusAlbers] {
            for (name, lon, lat) in PLACES {
                let store = projected_store(name, lon, lat, crs);
                let buffer = buffer_store(&store, crs, THREE_MILES_M, 64).unwrap();
                let center = Point::new(lon, lat);
                for vertex in &buffer.polygon.exterior().0 {
                    let geographic = Point(transform(crs, Crs::Wgs84, *vertex).unwrap());
                    let d = Geodesic.distance(center, geographic);
                    assert!(
                        (d - THREE_MILES_M).abs() < 0.5,
                        "{crs} {name}: vertex {d} m from store"
                    );
                }
            }
        }
    }

    #[test]
    fn membership_at_radius_boundary_outside_conus() {
        for crs in [Crs::ConusAlbers, Crs::WebMercator] {
            for (name, lon, lat) in PLACES {
                let store = projected_store(name, lon, lat, crs);
                let buffer = buffer_store(&store, crs, THREE_MILES_M, 64).unwrap();
                let center = Point::new(lon, lat);
                assert!(buffer.polygon.contains(&store.location));

                // Bearings offset from the vertices probe the chords too.
                for step in 0..36 {
                    let bearing = f64::from(step).mul_add(10.0, 2.5);
                    let inside = Geodesic.destination(center, bearing, THREE_MILES_M * 0.99);
                    let outside = Geodesic.destination(center, bearing, THREE_MILES_M * 1.01);
                    assert!(
                        buffer.polygon.contains(&projected(crs, inside)),
                        "{crs} {name}: 0.99r not inside at {bearing}"
                    );
                    assert!(
                        !buffer.polygon.contains(&projected(crs, outside)),
                        "{crs} {name}: 1.01r inside at {bearing}"
                    );
                }
            }
        }
    }

    #[test]
    fn mercator_footprint_stretches_with_latitude() {
        let store = projected_store("north", 10.0, 60.0, Crs::WebMercator);
        let buffer = buffer_store(&store, Crs::WebMercator, THREE_MILES_M, 64).unwrap();
        let rect = buffer.polygon.bounding_rect().unwrap();
        let stretch = rect.width() / (2.0 * THREE_MILES_M);
        assert!((stretch - 2.0).abs() < 0.02, "stretch {stretch}");
    }

    #[test]
    fn ring_near_antimeridian_stays_local() {
        let ring = geodesic_ring(Point::new(179.99, 0.0), THREE_MILES_M, 8);
        assert!(ring.iter().all(|c| (c.x - 179.99).abs() < 0.1), "{ring:?}");
    }

    #[test]
    fn one_buffer_per_store_in_order() {
        let stores = Normalized {
            name: "stores".to_string(),
            crs: Crs::WebMercator,
            records: vec![
                projected_store("a", -77.0, 38.9, Crs::WebMercator),
                projected_store("b", -77.0, 38.9, Crs::WebMercator),
                projected_store("c", -90.0, 30.0, Crs::WebMercator),
            ],
        };
        let buffers = buffer_stores(&stores, &EnrichConfig::default()).unwrap();
        let ids: Vec<&str> = buffers.iter().map(|b| b.store_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(buffers[0], Buffer { store_id: "a".to_string(), ..buffers[1].clone() });
    }

    #[test]
    fn buffering_is_deterministic() {
        let store = projected_store("s", -87.6, 41.9, Crs::ConusAlbers);
        let a = buffer_store(&store, Crs::ConusAlbers, THREE_MILES_M, 64).unwrap();
        let b = buffer_store(&store, Crs::ConusAlbers, THREE_MILES_M, 64).unwrap();
        assert_eq!(a, b);
    }
}
