use crate::{
    carto::{
        basin::{basins_from_geojson, Basin},
        datum::{Bounds, LonLat},
    },
    error::{RavenError, Result},
    services::client::Ows,
    vars::HYBAS_DOMAINS,
};
use log::info;

/// area of interest used to pick a hydrobasins domain
#[derive(Clone, Copy, Debug)]
pub enum Region {
    Point(LonLat),
    Box(Bounds),
}

/// hydrobasins domain (`na` or `ar`) covering the region
pub fn select_hybas_domain(region: Region) -> Result<&'static str> {
    HYBAS_DOMAINS
        .iter()
        .find(|(_, lon0, lat0, lon1, lat1)| {
            let domain = Bounds::new(*lon0, *lat0, *lon1, *lat1);
            match region {
                Region::Point(point) => domain.contains_point(&point),
                Region::Box(bounds) => domain.contains(&bounds),
            }
        })
        .map(|(name, ..)| *name)
        .ok_or_else(|| RavenError::NotFound(format!("no hydrobasins domain covers {:?}", region)))
}

pub fn hybas_layer(prefix: &str, domain: &str, level: u8) -> String {
    format!("{}_{}_lev{:02}", prefix, domain, level)
}

fn feature_query(layer: String, filter: String) -> Vec<(&'static str, String)> {
    vec![
        ("service", "WFS".to_string()),
        ("version", "1.0.0".to_string()),
        ("request", "GetFeature".to_string()),
        ("typeName", layer),
        ("outputFormat", "application/json".to_string()),
        ("srsName", "EPSG:4326".to_string()),
        ("CQL_FILTER", filter),
    ]
}

pub fn location_query(layer: String, point: &LonLat) -> Vec<(&'static str, String)> {
    feature_query(
        layer,
        format!("CONTAINS(the_geom, POINT({} {}))", point.lon, point.lat),
    )
}

pub fn attribute_query(layer: String, attribute: &str, value: &str) -> Vec<(&'static str, String)> {
    let value = match value.parse::<f64>() {
        Ok(_) => value.to_string(),
        Err(_) => format!("'{}'", value.replace('\'', "''")),
    };
    feature_query(layer, format!("{}={}", attribute, value))
}

/// the hydrobasins feature containing a location
pub fn get_hydrobasins_location_wfs(
    ows: &Ows,
    point: &LonLat,
    domain: &str,
    level: u8,
) -> Result<Vec<Basin>> {
    let layer = hybas_layer(&ows.hybas_layer, domain, level);
    info!("locating ({}, {}) in {}", point.lon, point.lat, layer);
    let body = ows.get(&ows.wfs_url, &location_query(layer, point))?;
    basins_from_geojson(&String::from_utf8_lossy(&body))
}

/// every hydrobasins feature whose attribute equals the value
pub fn get_hydrobasins_attributes_wfs(
    ows: &Ows,
    attribute: &str,
    value: &str,
    domain: &str,
    level: u8,
) -> Result<Vec<Basin>> {
    let layer = hybas_layer(&ows.hybas_layer, domain, level);
    info!("fetching {} where {} = {}", layer, attribute, value);
    let body = ows.get(&ows.wfs_url, &attribute_query(layer, attribute, value))?;
    basins_from_geojson(&String::from_utf8_lossy(&body))
}
