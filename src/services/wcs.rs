use crate::{
    carto::datum::Bounds,
    error::{RavenError, Result},
    services::client::Ows,
    vars::WCS_VERSION,
};
use log::{info, trace};
use ord_subset::OrdSubsetIterExt;
use std::io::Cursor;
use tiff::{
    decoder::{ifd::Value, Decoder, DecodingResult},
    tags::Tag,
};

/// GDAL's ASCII nodata tag
const GDAL_NODATA: u16 = 42113;

pub fn coverage_query(bounds: &Bounds, layer: &str) -> Vec<(&'static str, String)> {
    let (lon0, lat0, lon1, lat1) = bounds.tuple();
    vec![
        ("service", "WCS".to_string()),
        ("version", WCS_VERSION.to_string()),
        ("request", "GetCoverage".to_string()),
        ("coverageId", layer.to_string()),
        ("format", "image/tiff".to_string()),
        ("subset", format!("Long({},{})", lon0, lon1)),
        ("subset", format!("Lat({},{})", lat0, lat1)),
    ]
}

/// GeoTIFF subset of a coverage over the bounding box
pub fn get_raster_wcs(ows: &Ows, bounds: &Bounds, layer: &str) -> Result<Vec<u8>> {
    info!("fetching {} over {:?}", layer, bounds.tuple());
    ows.get(&ows.wcs_url, &coverage_query(bounds, layer))
}

/// elevation model subset over the bounding box
pub fn get_dem_wcs(ows: &Ows, bounds: &Bounds) -> Result<Vec<u8>> {
    get_raster_wcs(ows, bounds, &ows.dem_layer)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RasterStats {
    pub width: u32,
    pub height: u32,
    /// pixels holding data
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

fn samples(result: DecodingResult) -> Result<Vec<f64>> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RavenError::Service(
                "unsupported raster sample type".into(),
            ))
        }
    })
}

/// nodata value GDAL recorded in the GeoTIFF, if any
pub fn raster_nodata(bytes: &[u8]) -> Result<Option<f64>> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    Ok(match decoder.find_tag(Tag::Unknown(GDAL_NODATA))? {
        Some(Value::Ascii(text)) => text.trim_end_matches('\0').trim().parse().ok(),
        _ => None,
    })
}

/// pixel statistics of a single band GeoTIFF, skipping `nodata` and NaN
pub fn raster_stats(bytes: &[u8], nodata: Option<f64>) -> Result<RasterStats> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    trace!("decoding {}x{} raster", width, height);

    let values = samples(decoder.read_image()?)?
        .into_iter()
        .filter(|v| !v.is_nan() && Some(*v) != nodata)
        .collect::<Vec<f64>>();
    if values.is_empty() {
        return Err(RavenError::InsufficientData {
            needed: 1,
            found: 0,
        });
    }

    Ok(RasterStats {
        width,
        height,
        count: values.len(),
        min: *values.iter().ord_subset_min().unwrap_or(&f64::NAN),
        max: *values.iter().ord_subset_max().unwrap_or(&f64::NAN),
        mean: values.iter().sum::<f64>() / values.len() as f64,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use float_eq::assert_float_eq;
    use tiff::encoder::{colortype, TiffEncoder};

    fn encode(width: u32, height: u32, data: &[u16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        TiffEncoder::new(&mut cursor)
            .unwrap()
            .write_image::<colortype::Gray16>(width, height, data)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn query_subsets() {
        let query = coverage_query(&Bounds::new(-124., 54., -123., 55.), "dem");
        assert!(query.contains(&("subset", "Long(-124,-123)".into())));
        assert!(query.contains(&("subset", "Lat(54,55)".into())));
        assert!(query.contains(&("coverageId", "dem".into())));
    }

    #[test]
    fn stats_of_raster() {
        let bytes = encode(2, 2, &[800, 900, 1000, 1100]);
        let stats = raster_stats(&bytes, None).unwrap();
        assert_eq!((stats.width, stats.height), (2, 2));
        assert_eq!(stats.count, 4);
        assert_float_eq!(stats.min, 800., abs <= 1e-9);
        assert_float_eq!(stats.max, 1100., abs <= 1e-9);
        assert_float_eq!(stats.mean, 950., abs <= 1e-9);
    }

    #[test]
    fn stats_skip_nodata() {
        let bytes = encode(2, 2, &[0, 900, 0, 1100]);
        let stats = raster_stats(&bytes, Some(0.)).unwrap();
        assert_eq!(stats.count, 2);
        assert_float_eq!(stats.mean, 1000., abs <= 1e-9);
    }

    #[test]
    fn nodata_from_gdal_tag() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
            let mut image = encoder.new_image::<colortype::Gray16>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::Unknown(GDAL_NODATA), "0")
                .unwrap();
            image.write_data(&[0u16, 900, 0, 1100]).unwrap();
        }
        let bytes = cursor.into_inner();
        assert_eq!(raster_nodata(&bytes).unwrap(), Some(0.));
        let stats = raster_stats(&bytes, raster_nodata(&bytes).unwrap()).unwrap();
        assert_float_eq!(stats.mean, 1000., abs <= 1e-9);

        assert_eq!(raster_nodata(&encode(1, 1, &[5])).unwrap(), None);
    }

    #[test]
    fn stats_of_empty_raster() {
        let bytes = encode(1, 1, &[0]);
        assert!(matches!(
            raster_stats(&bytes, Some(0.)),
            Err(RavenError::InsufficientData { .. })
        ));
    }

    #[test]
    fn garbage_is_not_a_raster() {
        assert!(raster_stats(b"not a tiff", None).is_err());
    }
}
