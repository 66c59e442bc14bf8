//! Sketch summary computation served by the bundled function.

use std::collections::BTreeMap;

use geoprocessing::FeatureSet;
use serde::Serialize;
use serde_json::Value;

/// Feature count, geometry type histogram, and bounding box of a sketch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SketchSummary {
    pub feature_count: usize,
    pub geometry_types: BTreeMap<String, usize>,
    /// `[min_x, min_y, max_x, max_y]`; absent when no coordinates exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
}

pub fn summarize(features: &FeatureSet) -> SketchSummary {
    let mut geometry_types = BTreeMap::new();
    for kind in features.geometry_types() {
        *geometry_types.entry(kind.to_string()).or_insert(0) += 1;
    }

    let mut bbox: Option<[f64; 4]> = None;
    for feature in features.features() {
        if let Some(geometry) = feature.get("geometry") {
            extend_bbox(geometry, &mut bbox);
        }
    }

    SketchSummary {
        feature_count: features.len(),
        geometry_types,
        bbox,
    }
}

fn extend_bbox(geometry: &Value, bbox: &mut Option<[f64; 4]>) {
    if let Some(members) = geometry.get("geometries").and_then(Value::as_array) {
        for member in members {
            extend_bbox(member, bbox);
        }
        return;
    }
    if let Some(coordinates) = geometry.get("coordinates") {
        visit_positions(coordinates, bbox);
    }
}

/// Walks nested coordinate arrays down to `[x, y, ...]` positions.
fn visit_positions(value: &Value, bbox: &mut Option<[f64; 4]>) {
    let Some(items) = value.as_array() else {
        return;
    };
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => {
            let b = bbox.get_or_insert([x, y, x, y]);
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        },
        _ => {
            for item in items {
                visit_positions(item, bbox);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn summarizes_collection() {
        let features = FeatureSet::from_geojson(json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-1.0, 0.0], [2.0, 0.0], [2.0, 3.0], [-1.0, 0.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Point", "coordinates": [5.0, -4.0] }
                }
            ]
        }))
        .unwrap();

        let summary = summarize(&features);
        assert_eq!(summary.feature_count, 2);
        assert_eq!(summary.geometry_types.get("Polygon"), Some(&1));
        assert_eq!(summary.geometry_types.get("Point"), Some(&1));
        assert_eq!(summary.bbox, Some([-1.0, -4.0, 5.0, 3.0]));
    }

    #[test]
    fn geometry_collection_members_count_toward_bbox() {
        let features = FeatureSet::from_geojson(json!({
            "type": "GeometryCollection",
            "geometries": [
                { "type": "Point", "coordinates": [1.0, 1.0] },
                { "type": "LineString", "coordinates": [[0.0, 0.0], [4.0, 2.0]] }
            ]
        }))
        .unwrap();
        assert_eq!(summarize(&features).bbox, Some([0.0, 0.0, 4.0, 2.0]));
    }

    #[test]
    fn empty_collection_has_no_bbox() {
        let features =
            FeatureSet::from_geojson(json!({ "type": "FeatureCollection", "features": [] }))
                .unwrap();
        let summary = summarize(&features);
        assert_eq!(summary.feature_count, 0);
        assert_eq!(summary.bbox, None);
    }
}
