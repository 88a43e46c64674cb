//! Conversion between `GeoJSON` feature collections and model layers.
//!
//! Input side: reads store points and income polygons out of a
//! `FeatureCollection`, taking the declared reference from the legacy
//! `crs` member when present. Unusable features are skipped and
//! counted rather than failing the load.
//!
//! Output side: renders the enrichment result as the three WGS 84
//! layers a map viewer consumes (store points, qualifying buffers,
//! income areas).

use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use store_income_enrich_models::{
    AttributeValue, Attributes, EnrichmentOutput, IncomeArea, Layer, Store,
};
use store_income_spatial::crs::Crs;

use crate::EnrichError;
use crate::normalize;

/// A layer read from `GeoJSON` plus the number of features dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedLayer<T> {
    /// Usable records.
    pub layer: Layer<T>,
    /// Features without usable geometry.
    pub skipped: usize,
}

/// Parses `text` as a `FeatureCollection`.
///
/// A lone `Feature` is wrapped into a one-element collection.
///
/// # Errors
///
/// Returns [`EnrichError::GeoJson`] for invalid `GeoJSON` and
/// [`EnrichError::Layer`] for a bare geometry.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection, EnrichError> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(feature) => Ok(collection(vec![feature])),
        GeoJson::Geometry(_) => Err(EnrichError::Layer {
            message: "expected a FeatureCollection, found a bare geometry".to_string(),
        }),
    }
}

/// Reference named by the collection's legacy `crs` member, if any.
#[must_use]
pub fn declared_crs(fc: &FeatureCollection) -> Option<String> {
    fc.foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Reads store points from `fc`.
///
/// The identifier is the feature `id`, else the `id_field` property,
/// else `store-<n>` where `n` is the feature's position.
#[must_use]
pub fn stores_from_features(name: &str, fc: &FeatureCollection, id_field: &str) -> LoadedLayer<Store> {
    let mut skipped = 0usize;
    let records: Vec<Store> = fc
        .features
        .iter()
        .enumerate()
        .filter_map(|(i, feature)| {
            let store = store_from_feature(i, feature, id_field);
            if store.is_none() {
                log::warn!("{name}: skipping feature {i} without point geometry");
                skipped += 1;
            }
            store
        })
        .collect();

    log::info!("{name}: loaded {} stores ({skipped} skipped)", records.len());
    loaded(name, fc, records, skipped)
}

/// Reads income polygons from `fc`.
#[must_use]
pub fn income_from_features(name: &str, fc: &FeatureCollection) -> LoadedLayer<IncomeArea> {
    let mut skipped = 0usize;
    let records: Vec<IncomeArea> = fc
        .features
        .iter()
        .enumerate()
        .filter_map(|(i, feature)| {
            let area = income_area_from_feature(feature);
            if area.is_none() {
                log::warn!("{name}: skipping feature {i} without polygon geometry");
                skipped += 1;
            }
            area
        })
        .collect();

    log::info!("{name}: loaded {} income areas ({skipped} skipped)", records.len());
    loaded(name, fc, records, skipped)
}

/// Every enriched store as a point feature.
///
/// Properties are the original store attributes plus `store_id`,
/// `avg_median_income` (null when missing), `tract_count`,
/// `valued_count`, and `qualifies`.
#[must_use]
pub fn store_points_collection(output: &EnrichmentOutput) -> FeatureCollection {
    let features = output
        .enriched
        .iter()
        .map(|store| {
            let mut properties = properties_from_attributes(&store.attributes);
            properties.insert("store_id".to_string(), JsonValue::from(store.id.clone()));
            properties.insert(
                "avg_median_income".to_string(),
                store.aggregate.value().map_or(JsonValue::Null, number),
            );
            properties.insert("tract_count".to_string(), JsonValue::from(store.tract_count));
            properties.insert("valued_count".to_string(), JsonValue::from(store.valued_count));
            properties.insert("qualifies".to_string(), JsonValue::from(store.qualifies));

            let point = geo::Point::new(store.lon, store.lat);
            feature(&store.id, Value::from(&point), properties)
        })
        .collect();
    collection(features)
}

/// Buffer polygons of qualifying stores.
///
/// Empty when nothing qualifies; viewers then show store points only.
#[must_use]
pub fn qualifying_buffers_collection(output: &EnrichmentOutput) -> FeatureCollection {
    let features = output
        .qualifying_buffers
        .iter()
        .map(|buffer| {
            let mut properties = JsonObject::new();
            properties.insert("store_id".to_string(), JsonValue::from(buffer.store_id.clone()));
            properties.insert("avg_median_income".to_string(), number(buffer.aggregate));
            properties.insert("tract_count".to_string(), JsonValue::from(buffer.tract_count));
            properties.insert("threshold".to_string(), number(output.threshold));
            feature(&buffer.store_id, Value::from(&buffer.polygon), properties)
        })
        .collect();
    collection(features)
}

/// The income layer reprojected to WGS 84 with its attributes.
///
/// # Errors
///
/// Returns [`EnrichError`] if the layer's reference cannot be resolved
/// or its polygons cannot be projected.
pub fn income_areas_collection(
    layer: &Layer<IncomeArea>,
    default_crs: Option<&str>,
) -> Result<FeatureCollection, EnrichError> {
    let geographic = normalize::normalize_income(layer, default_crs, Crs::Wgs84)?;
    let features = geographic
        .records
        .iter()
        .map(|area| Feature {
            bbox: None,
            geometry: Some(Geometry::new(area_geometry(&area.geometry))),
            id: None,
            properties: Some(properties_from_attributes(&area.attributes)),
            foreign_members: None,
        })
        .collect();
    Ok(collection(features))
}

/// Single-part areas are written back as `Polygon`.
fn area_geometry(geometry: &geo::MultiPolygon<f64>) -> Value {
    match geometry.0.as_slice() {
        [polygon] => Value::from(polygon),
        _ => Value::from(geometry),
    }
}

fn loaded<T>(name: &str, fc: &FeatureCollection, records: Vec<T>, skipped: usize) -> LoadedLayer<T> {
    LoadedLayer {
        layer: Layer {
            name: name.to_string(),
            crs: declared_crs(fc),
            records,
        },
        skipped,
    }
}

fn store_from_feature(index: usize, feature: &Feature, id_field: &str) -> Option<Store> {
    let location = match to_geo(feature)? {
        geo::Geometry::Point(p) => p,
        geo::Geometry::MultiPoint(mp) if mp.0.len() == 1 => mp.0[0],
        _ => return None,
    };

    let attributes = attributes_from_properties(feature.properties.as_ref());

    let id = match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => feature
            .properties
            .as_ref()
            .and_then(|props| props.get(id_field))
            .and_then(|v| match v {
                JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| format!("store-{index}")),
    };

    Some(Store {
        id,
        location,
        attributes,
    })
}

fn income_area_from_feature(feature: &Feature) -> Option<IncomeArea> {
    let geometry = match to_geo(feature)? {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => geo::MultiPolygon(vec![p]),
        _ => return None,
    };

    Some(IncomeArea {
        geometry,
        attributes: attributes_from_properties(feature.properties.as_ref()),
    })
}

fn to_geo(feature: &Feature) -> Option<geo::Geometry<f64>> {
    let geometry = feature.geometry.clone()?;
    geo::Geometry::<f64>::try_from(geometry).ok()
}

fn attributes_from_properties(properties: Option<&JsonObject>) -> Attributes {
    properties
        .map(|props| {
            props
                .iter()
                .map(|(key, value)| (key.clone(), attribute_from_json(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn attribute_from_json(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Number),
        JsonValue::String(s) => AttributeValue::Text(s.clone()),
        other => AttributeValue::Text(other.to_string()),
    }
}

fn properties_from_attributes(attributes: &Attributes) -> JsonObject {
    attributes
        .iter()
        .map(|(key, value)| {
            let json = match value {
                AttributeValue::Null => JsonValue::Null,
                AttributeValue::Bool(b) => JsonValue::Bool(*b),
                AttributeValue::Number(n) => number(*n),
                AttributeValue::Text(s) => JsonValue::String(s.clone()),
            };
            (key.clone(), json)
        })
        .collect()
}

fn number(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

fn feature(id: &str, value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(Id::String(id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use store_income_enrich_models::{
        EnrichWarning, EnrichedStore, IncomeAggregate, QualifyingBuffer,
    };

    const STORES: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } },
        "features": [
            { "type": "Feature", "id": "s-1",
              "geometry": { "type": "Point", "coordinates": [-77.0, 38.9] },
              "properties": { "name": "Downtown" } },
            { "type": "Feature",
              "geometry": { "type": "Point", "coordinates": [-77.1, 38.8] },
              "properties": { "id": 42, "name": "Uptown" } },
            { "type": "Feature",
              "geometry": { "type": "MultiPoint", "coordinates": [[-77.2, 38.7]] },
              "properties": null },
            { "type": "Feature",
              "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] },
              "properties": {} },
            { "type": "Feature", "geometry": null, "properties": {} }
        ]
    }"#;

    const INCOME: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature",
              "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] },
              "properties": { "GEOID": "11001000100", "B19013_001E": 95000, "flag": true, "note": null } },
            { "type": "Feature",
              "geometry": { "type": "MultiPolygon",
                            "coordinates": [[[[2,2],[3,2],[3,3],[2,2]]], [[[4,4],[5,4],[5,5],[4,4]]]] },
              "properties": { "GEOID": "11001000200", "B19013_001E": "-666666666" } },
            { "type": "Feature",
              "geometry": { "type": "Point", "coordinates": [0, 0] },
              "properties": { "GEOID": "bad" } }
        ]
    }"#;

    #[test]
    fn reads_stores_with_ids_and_crs() {
        let fc = parse_feature_collection(STORES).unwrap();
        let loaded = stores_from_features("stores", &fc, "id");

        assert_eq!(loaded.skipped, 2);
        assert_eq!(
            loaded.layer.crs.as_deref(),
            Some("urn:ogc:def:crs:OGC:1.3:CRS84")
        );

        let ids: Vec<&str> = loaded.layer.records.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["s-1", "42", "store-2"]);

        let first = &loaded.layer.records[0];
        assert_eq!(first.location, geo::Point::new(-77.0, 38.9));
        assert_eq!(
            first.attributes.get("name"),
            Some(&AttributeValue::Text("Downtown".to_string()))
        );
        assert!(loaded.layer.records[2].attributes.is_empty());
    }

    #[test]
    fn reads_income_polygons() {
        let fc = parse_feature_collection(INCOME).unwrap();
        let loaded = income_from_features("income", &fc);

        assert_eq!(loaded.skipped, 1);
        assert_eq!(loaded.layer.crs, None);
        assert_eq!(loaded.layer.records.len(), 2);

        let first = &loaded.layer.records[0];
        assert_eq!(first.geometry.0.len(), 1);
        assert_eq!(
            first.attributes.get("B19013_001E"),
            Some(&AttributeValue::Number(95_000.0))
        );
        assert_eq!(first.attributes.get("flag"), Some(&AttributeValue::Bool(true)));
        assert_eq!(first.attributes.get("note"), Some(&AttributeValue::Null));
        assert_eq!(loaded.layer.records[1].geometry.0.len(), 2);
    }

    #[test]
    fn single_feature_is_wrapped() {
        let fc = parse_feature_collection(
            r#"{ "type": "Feature", "geometry": { "type": "Point", "coordinates": [1, 2] }, "properties": {} }"#,
        )
        .unwrap();
        assert_eq!(fc.features.len(), 1);
    }

    #[test]
    fn bare_geometry_and_garbage_are_rejected() {
        assert!(matches!(
            parse_feature_collection(r#"{ "type": "Point", "coordinates": [1, 2] }"#),
            Err(EnrichError::Layer { .. })
        ));
        assert!(matches!(
            parse_feature_collection("not json"),
            Err(EnrichError::GeoJson(_))
        ));
    }

    fn sample_output() -> EnrichmentOutput {
        let store = |id: &str, aggregate, qualifies| EnrichedStore {
            id: id.to_string(),
            lon: -77.0,
            lat: 38.9,
            aggregate,
            tract_count: 2,
            valued_count: 2,
            qualifies,
            attributes: Attributes::from([(
                "name".to_string(),
                AttributeValue::Text(id.to_uppercase()),
            )]),
        };
        EnrichmentOutput {
            enriched: vec![
                store("a", IncomeAggregate::Mean(120_000.0), true),
                store("b", IncomeAggregate::Missing, false),
            ],
            qualifying_buffers: vec![QualifyingBuffer {
                store_id: "a".to_string(),
                polygon: polygon![
                    (x: -77.05, y: 38.85),
                    (x: -76.95, y: 38.85),
                    (x: -76.95, y: 38.95),
                    (x: -77.05, y: 38.95),
                    (x: -77.05, y: 38.85),
                ],
                aggregate: 120_000.0,
                tract_count: 2,
            }],
            income_field: Some("B19013_001E".to_string()),
            threshold: 100_000.0,
            warnings: vec![EnrichWarning::SkippedStores { count: 1 }],
        }
    }

    #[test]
    fn store_points_carry_aggregate_or_null() {
        let fc = store_points_collection(&sample_output());
        assert_eq!(fc.features.len(), 2);

        let a = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(a["store_id"], "a");
        assert_eq!(a["avg_median_income"], 120_000.0);
        assert_eq!(a["qualifies"], true);
        assert_eq!(a["name"], "A");

        let b = fc.features[1].properties.as_ref().unwrap();
        assert_eq!(b["avg_median_income"], JsonValue::Null);
        assert_eq!(b["qualifies"], false);
    }

    #[test]
    fn qualifying_buffers_become_polygons() {
        let fc = qualifying_buffers_collection(&sample_output());
        assert_eq!(fc.features.len(), 1);
        let feature = &fc.features[0];
        assert!(matches!(
            feature.geometry.as_ref().map(|g| &g.value),
            Some(Value::Polygon(_))
        ));
        assert_eq!(feature.properties.as_ref().unwrap()["threshold"], 100_000.0);
    }

    #[test]
    fn empty_selection_yields_empty_buffer_layer() {
        let mut output = sample_output();
        output.qualifying_buffers.clear();
        assert!(qualifying_buffers_collection(&output).features.is_empty());
        assert_eq!(store_points_collection(&output).features.len(), 2);
    }

    #[test]
    fn income_areas_are_reprojected_to_wgs84() {
        let fc = parse_feature_collection(INCOME).unwrap();
        let loaded = income_from_features("income", &fc);
        let projected = crate::normalize::normalize_income(
            &loaded.layer,
            Some("EPSG:4326"),
            Crs::WebMercator,
        )
        .unwrap();
        let mercator_layer = Layer {
            name: "income".to_string(),
            crs: Some("EPSG:3857".to_string()),
            records: projected.records,
        };

        let out = income_areas_collection(&mercator_layer, None).unwrap();
        assert_eq!(out.features.len(), 2);
        let Some(Value::Polygon(rings)) = out.features[0].geometry.as_ref().map(|g| g.value.clone())
        else {
            panic!("expected a polygon");
        };
        for position in &rings[0] {
            assert!(
                position.iter().all(|v| v.abs() < 1e-9 || (v - 1.0).abs() < 1e-9),
                "unexpected position {position:?}"
            );
        }
        assert!(matches!(
            out.features[1].geometry.as_ref().map(|g| &g.value),
            Some(Value::MultiPolygon(parts)) if parts.len() == 2
        ));
    }
}
