use crate::{
    carto::datum::{Bounds, LonLat},
    error::{RavenError, Result},
};
use geo::{
    algorithm::{area::Area, bounding_rect::BoundingRect, contains::Contains},
    MultiPolygon, Point, Polygon,
};
use geojson::{feature::Id, Feature, GeoJson, Geometry, Value as GeoValue};
use log::trace;
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, fs, path::Path};

/// a drainage area with its geometry and attributes
#[derive(Clone, Debug)]
pub struct Basin {
    /// `HYBAS_ID` for hydrobasins, `HRU_ID` or feature position otherwise
    pub id: u64,
    /// id of the basin this one drains into, if any
    pub next_down: Option<u64>,
    /// id of the outlet basin of the whole river system
    pub main_bas: Option<u64>,
    pub geometry: MultiPolygon<f64>,
    pub attributes: BTreeMap<String, f64>,
    pub labels: BTreeMap<String, String>,
}

impl Basin {
    pub fn new(id: u64, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            next_down: None,
            main_bas: None,
            geometry,
            attributes: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.geometry.bounding_rect().map(Bounds::from)
    }

    /// planar area in squared coordinate units
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    pub fn contains(&self, point: &LonLat) -> bool {
        let point = Point::from(*point);
        self.geometry.0.iter().any(|polygon| polygon.contains(&point))
    }
}

/* # geojson */

fn closed_rings(polygon: Polygon<f64>) -> Result<Polygon<f64>> {
    // rings are closed on construction, a triangle needs four positions
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        if ring.0.len() < 4 {
            return Err(RavenError::Geometry(format!(
                "ring has {} positions, needs at least 4",
                ring.0.len()
            )));
        }
    }
    Ok(polygon)
}

pub fn geometry_from_geojson(geometry: Geometry) -> Result<MultiPolygon<f64>> {
    let polygons = match geometry.value {
        value @ GeoValue::Polygon(_) => vec![Polygon::<f64>::try_from(value)?],
        value @ GeoValue::MultiPolygon(_) => MultiPolygon::<f64>::try_from(value)?.0,
        other => {
            let kind = match other {
                GeoValue::Point(_) => "Point",
                GeoValue::MultiPoint(_) => "MultiPoint",
                GeoValue::LineString(_) => "LineString",
                GeoValue::MultiLineString(_) => "MultiLineString",
                _ => "GeometryCollection",
            };
            return Err(RavenError::Geometry(format!(
                "unsupported geometry type {}",
                kind
            )));
        }
    };
    Ok(MultiPolygon(
        polygons
            .into_iter()
            .map(closed_rings)
            .collect::<Result<Vec<_>>>()?,
    ))
}

fn id_value(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.).map(|v| v as u64)),
        JsonValue::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn basin_from_feature(feature: Feature, position: usize) -> Result<Basin> {
    let id_property = |key: &str| feature.property(key).and_then(id_value);
    let id = id_property("HYBAS_ID")
        .or_else(|| id_property("HRU_ID"))
        .or_else(|| match &feature.id {
            Some(Id::Number(number)) => id_value(&JsonValue::Number(number.clone())),
            Some(Id::String(text)) => text.parse().ok(),
            None => None,
        })
        .unwrap_or(position as u64 + 1);
    let next_down = id_property("NEXT_DOWN").filter(|&down| down != 0);
    let main_bas = id_property("MAIN_BAS");

    let geometry = feature
        .geometry
        .ok_or_else(|| RavenError::Geometry(format!("feature {} has no geometry", id)))?;
    let mut basin = Basin::new(id, geometry_from_geojson(geometry)?);
    basin.next_down = next_down;
    basin.main_bas = main_bas;
    for (key, value) in feature.properties.into_iter().flatten() {
        match value {
            JsonValue::Number(number) => {
                if let Some(number) = number.as_f64() {
                    basin.attributes.insert(key, number);
                }
            }
            JsonValue::String(text) => {
                basin.labels.insert(key, text);
            }
            _ => {}
        }
    }
    Ok(basin)
}

/// decode a GeoJSON feature collection (or single feature) into basins
pub fn basins_from_geojson(text: &str) -> Result<Vec<Basin>> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .enumerate()
            .map(|(position, feature)| basin_from_feature(feature, position))
            .collect(),
        GeoJson::Feature(feature) => Ok(vec![basin_from_feature(feature, 0)?]),
        GeoJson::Geometry(_) => Err(RavenError::Geometry(
            "expected a Feature or FeatureCollection".into(),
        )),
    }
}

pub fn load_basins(path: &Path) -> Result<Vec<Basin>> {
    trace!("loading basins from {}", path.display());
    basins_from_geojson(&fs::read_to_string(path)?)
}

/* # queries */

/// first basin whose geometry contains the point
pub fn feature_contains<'a>(point: &LonLat, basins: &'a [Basin]) -> Result<&'a Basin> {
    basins
        .iter()
        .find(|basin| basin.contains(point))
        .ok_or_else(|| {
            RavenError::NotFound(format!(
                "no feature contains point ({}, {})",
                point.lon, point.lat
            ))
        })
}

/// bounding box of the first feature, or of all of them
pub fn get_bbox(basins: &[Basin], all_features: bool) -> Result<Bounds> {
    let mut bounds = basins.iter().filter_map(Basin::bounds);
    let first = bounds
        .next()
        .ok_or_else(|| RavenError::Geometry("no feature has a bounding box".into()))?;
    if all_features {
        Ok(bounds.fold(first, |acc, b| acc.merge(&b)))
    } else {
        Ok(first)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use float_eq::assert_float_eq;

    pub fn square(lon0: f64, lat0: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Bounds::new(lon0, lat0, lon0 + side, lat0 + side).polygon()])
    }

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
                },
                "properties": {"HYBAS_ID": 7120034520, "NEXT_DOWN": 7120034530, "MAIN_BAS": 7120034530, "SUB_AREA": 12.5, "PFAF_ID": "7725"}
            },
            {
                "type": "Feature",
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[1, 0], [3, 0], [3, 2], [1, 2], [1, 0]]]]
                },
                "properties": {"HYBAS_ID": 7120034530, "NEXT_DOWN": 0, "MAIN_BAS": 7120034530, "SUB_AREA": 40.0}
            }
        ]
    }"#;

    #[test]
    fn decode_collection() {
        let basins = basins_from_geojson(COLLECTION).unwrap();
        assert_eq!(basins.len(), 2);
        assert_eq!(basins[0].id, 7120034520);
        assert_eq!(basins[0].next_down, Some(7120034530));
        assert_eq!(basins[1].next_down, None);
        assert_eq!(basins[0].labels["PFAF_ID"], "7725");
        assert_float_eq!(basins[1].attribute("SUB_AREA").unwrap(), 40.0, abs <= 1e-12);
        assert_float_eq!(basins[1].area(), 4.0, abs <= 1e-12);
    }

    #[test]
    fn decode_rejects_points() {
        let text = r#"{"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]}, "properties": {}}"#;
        assert!(matches!(
            basins_from_geojson(text),
            Err(RavenError::Geometry(_))
        ));
    }

    #[test]
    fn decode_feature_ids() {
        let text = r#"{"type": "Feature", "id": "42", "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}, "properties": null}"#;
        let basins = basins_from_geojson(text).unwrap();
        assert_eq!(basins[0].id, 42);
        assert!(basins[0].attributes.is_empty());
        assert!(matches!(
            basins_from_geojson(r#"{"type": "Point", "coordinates": [0, 0]}"#),
            Err(RavenError::Geometry(_))
        ));
        assert!(matches!(
            basins_from_geojson("{\"type\": \"Feature\""),
            Err(RavenError::GeoJson(_))
        ));
    }

    #[test]
    fn decode_rejects_open_ring() {
        let text = r#"{"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [0, 0]]]}, "properties": {}}"#;
        assert!(basins_from_geojson(text).is_err());
    }

    #[test]
    fn contains_point() {
        let basins = basins_from_geojson(COLLECTION).unwrap();
        assert_eq!(
            feature_contains(&LonLat::new(2., 1.), &basins).unwrap().id,
            7120034530
        );
        assert!(matches!(
            feature_contains(&LonLat::new(5., 5.), &basins),
            Err(RavenError::NotFound(_))
        ));
    }

    #[test]
    fn bounding_boxes() {
        let basins = basins_from_geojson(COLLECTION).unwrap();
        assert_eq!(get_bbox(&basins, false).unwrap().tuple(), (0., 0., 1., 1.));
        assert_eq!(get_bbox(&basins, true).unwrap().tuple(), (0., 0., 3., 2.));
        assert!(get_bbox(&[], true).is_err());
    }
}
