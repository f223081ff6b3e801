/* # services */

pub const WFS_URL: &str = "http://boreas.ouranos.ca/geoserver/wfs";
pub const WCS_URL: &str = "http://boreas.ouranos.ca/geoserver/ows";
pub const WCS_VERSION: &str = "2.0.1";
pub const DEM_LAYER: &str = "public:EarthEnv_DEM90_NorthAmerica";
pub const HYBAS_LAYER: &str = "public:USGS_HydroBASINS"; // suffixed with domain and level
pub const HYBAS_LEVEL: u8 = 12;
pub const HTTP_TIMEOUT: u64 = 60; // seconds

/* ## hydrobasins domains */

// (name, lon0, lat0, lon1, lat1)
pub const HYBAS_DOMAINS: [(&str, f64, f64, f64, f64); 2] = [
    ("na", -137.77, 5.16, -52.61, 62.73),
    ("ar", -180.0, 51.17, 179.99, 83.63),
];

/* ## aggregation */

pub const AGG_MIN: [&str; 3] = ["COAST", "DIST_MAIN", "DIST_SINK"];
pub const AGG_SUM: [&str; 2] = ["SUB_AREA", "LAKE"];

/* # processes */

pub const MAX_PARALLEL_PROCESSES: usize = 2; // upper bound on parameter sets per request
pub const WORKDIR: &str = "raven-runs";
pub const RAVEN_BINARY: &str = "raven";
pub const OSTRICH_BINARY: &str = "ostrich";

/* # statistics */

pub const MK_ALPHA: f64 = 0.05; // default significance level
pub const MK_MIN_SAMPLES: usize = 3; // fewer and the test is meaningless
pub const MK_WARN_SAMPLES: usize = 10; // fewer and the normal approximation is poor

/* # regionalization */

pub const REG_SIZE: usize = 5; // donors used by idw methods
pub const REG_MIN_NSE: f64 = 0.6; // donors calibrated worse than this are ignored
pub const EARTH_RADIUS: f64 = 6371.0; // kilometers
