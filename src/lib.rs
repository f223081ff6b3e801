pub mod config;
pub mod error;
pub mod regionalization;
pub mod units;
pub mod vars;

pub mod carto {
    pub mod basin;
    pub mod coords;
    pub mod datum;
    pub mod drainage;
    pub mod gridweights;
}

pub mod imaging {
    pub mod colour;
    pub mod graphs;
    pub mod plot;
}

pub mod services {
    pub mod client;
    pub mod wcs;
    pub mod wfs;
}

pub mod stats {
    pub mod diagnostics;
    pub mod distributions;
    pub mod mann_kendall;
    pub mod timeseries;
}

pub mod wps {
    pub mod engine;
    pub mod io;
    pub mod params;
    pub mod process;
    pub mod registry;
    pub mod request;
    pub mod response;
    pub mod templates;
}
