use crate::vars::MAX_PARALLEL_PROCESSES;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    String,
    Float,
    Integer,
    DateTime,
    /// a file passed by reference
    File,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Float => "float",
            Kind::Integer => "integer",
            Kind::DateTime => "dateTime",
            Kind::File => "file",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputSpec {
    pub identifier: &'static str,
    pub title: &'static str,
    pub abstract_: &'static str,
    pub kind: Kind,
    pub min_occurs: usize,
    pub max_occurs: usize,
    pub default: Option<&'static str>,
    /// accepted literal values, any when empty
    pub allowed: &'static [&'static str],
}

impl InputSpec {
    const fn literal(identifier: &'static str, title: &'static str, kind: Kind) -> Self {
        Self {
            identifier,
            title,
            abstract_: "",
            kind,
            min_occurs: 0,
            max_occurs: 1,
            default: None,
            allowed: &[],
        }
    }

    pub fn required(&self) -> bool {
        self.min_occurs > 0 && self.default.is_none()
    }
}

/* # forcing */

pub const TS: InputSpec = InputSpec {
    abstract_: "NetCDF file or files storing daily forcing: precipitation, minimum and \
                maximum temperature, potential evapotranspiration and observed streamflow",
    min_occurs: 1,
    max_occurs: 100,
    ..InputSpec::literal("ts", "Input time series files", Kind::File)
};

pub const NC_SPEC: InputSpec = InputSpec {
    abstract_: "JSON object mapping Raven forcing names to netCDF variables, \
                e.g. {\"TEMP_MAX\": {\"name\": \"tmax\"}}",
    max_occurs: 100,
    ..InputSpec::literal("nc_spec", "netCDF variable specifications", Kind::String)
};

pub const NC_INDEX: InputSpec = InputSpec {
    abstract_: "Station index in the netCDF files",
    max_occurs: 100,
    default: Some("1"),
    ..InputSpec::literal("nc_index", "netCDF station index", Kind::Integer)
};

/* # simulation period */

pub const START_DATE: InputSpec = InputSpec {
    abstract_: "Start date of the simulation",
    ..InputSpec::literal("start_date", "Simulation start date", Kind::DateTime)
};

pub const END_DATE: InputSpec = InputSpec {
    abstract_: "End date of the simulation, ignored when a duration is given",
    ..InputSpec::literal("end_date", "Simulation end date", Kind::DateTime)
};

pub const DURATION: InputSpec = InputSpec {
    abstract_: "Number of simulated days",
    ..InputSpec::literal("duration", "Simulation duration", Kind::Integer)
};

pub const RUN_NAME: InputSpec = InputSpec {
    abstract_: "Prefix of the output file names",
    default: Some("raven"),
    ..InputSpec::literal("run_name", "Simulation run name", Kind::String)
};

pub const NAME: InputSpec = InputSpec {
    default: Some("watershed"),
    ..InputSpec::literal("name", "Watershed name", Kind::String)
};

/* # watershed */

pub const AREA: InputSpec = InputSpec {
    abstract_: "Watershed area in km²",
    ..InputSpec::literal("area", "Watershed area", Kind::Float)
};

pub const LATITUDE: InputSpec = InputSpec {
    abstract_: "Watershed centroid latitude in decimal degrees",
    ..InputSpec::literal("latitude", "Latitude", Kind::Float)
};

pub const LONGITUDE: InputSpec = InputSpec {
    abstract_: "Watershed centroid longitude in decimal degrees",
    ..InputSpec::literal("longitude", "Longitude", Kind::Float)
};

pub const ELEVATION: InputSpec = InputSpec {
    abstract_: "Watershed mean elevation in meters",
    ..InputSpec::literal("elevation", "Elevation", Kind::Float)
};

pub const HRUS: InputSpec = InputSpec {
    abstract_: "JSON file listing hydrological response units, each with area, \
                elevation, latitude and longitude; replaces the single watershed inputs",
    ..InputSpec::literal("hrus", "Hydrological response units", Kind::File)
};

/* # model options */

pub const EVAPORATION: InputSpec = InputSpec {
    default: Some("PET_OUDIN"),
    allowed: &[
        "PET_OUDIN",
        "PET_HARGREAVES_1985",
        "PET_PRIESTLEY_TAYLOR",
        "PET_PENMAN_MONTEITH",
        "PET_DATA",
    ],
    ..InputSpec::literal("evaporation", "Evapotranspiration method", Kind::String)
};

pub const RAIN_SNOW_FRACTION: InputSpec = InputSpec {
    default: Some("RAINSNOW_DINGMAN"),
    allowed: &[
        "RAINSNOW_DINGMAN",
        "RAINSNOW_HBV",
        "RAINSNOW_UBCWM",
        "RAINSNOW_HSPF",
        "RAINSNOW_DATA",
    ],
    ..InputSpec::literal("rain_snow_fraction", "Rain snow partitioning", Kind::String)
};

pub const RVC: InputSpec = InputSpec {
    abstract_: "Raven initial conditions file, e.g. the solution of a previous run",
    ..InputSpec::literal("rvc", "Initial conditions", Kind::File)
};

pub const PARAMS: InputSpec = InputSpec {
    abstract_: "Comma separated list of model parameters, one set per run, \
                defaults to the model's reference parameters",
    max_occurs: MAX_PARALLEL_PROCESSES,
    ..InputSpec::literal("params", "Model parameters", Kind::String)
};

/* # calibration */

pub const ALGORITHM: InputSpec = InputSpec {
    default: Some("DDS"),
    allowed: &["DDS", "SCEUA"],
    ..InputSpec::literal("algorithm", "Calibration algorithm", Kind::String)
};

pub const MAX_ITERATIONS: InputSpec = InputSpec {
    abstract_: "Budget of model evaluations",
    default: Some("50"),
    ..InputSpec::literal("max_iterations", "Maximum iterations", Kind::Integer)
};

pub const LOWER_BOUNDS: InputSpec = InputSpec {
    abstract_: "Comma separated lower bounds of the calibrated parameters",
    ..InputSpec::literal("lowerBounds", "Lower bounds", Kind::String)
};

pub const UPPER_BOUNDS: InputSpec = InputSpec {
    abstract_: "Comma separated upper bounds of the calibrated parameters",
    ..InputSpec::literal("upperBounds", "Upper bounds", Kind::String)
};

pub const RANDOM_SEED: InputSpec = InputSpec {
    abstract_: "Seed of the calibration search",
    ..InputSpec::literal("random_seed", "Random seed", Kind::Integer)
};

pub const RANDOM_NUMBERS: InputSpec = InputSpec {
    abstract_: "File of pregenerated random numbers making calibration reproducible",
    ..InputSpec::literal("random_numbers", "Random numbers", Kind::File)
};

/// inputs of every simulation process
pub const SIMULATION: [InputSpec; 17] = [
    TS,
    NC_SPEC,
    PARAMS,
    START_DATE,
    END_DATE,
    NC_INDEX,
    DURATION,
    RUN_NAME,
    NAME,
    HRUS,
    AREA,
    LATITUDE,
    LONGITUDE,
    ELEVATION,
    EVAPORATION,
    RAIN_SNOW_FRACTION,
    RVC,
];

/// inputs added by calibration processes
pub const CALIBRATION: [InputSpec; 6] = [
    ALGORITHM,
    MAX_ITERATIONS,
    LOWER_BOUNDS,
    UPPER_BOUNDS,
    RANDOM_SEED,
    RANDOM_NUMBERS,
];

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identifiers_are_unique() {
        let ids = SIMULATION
            .iter()
            .chain(CALIBRATION.iter())
            .map(|spec| spec.identifier)
            .collect::<HashSet<&str>>();
        assert_eq!(ids.len(), SIMULATION.len() + CALIBRATION.len());
    }

    #[test]
    fn only_forcing_is_required() {
        let required = SIMULATION
            .iter()
            .chain(CALIBRATION.iter())
            .filter(|spec| spec.required())
            .map(|spec| spec.identifier)
            .collect::<Vec<&str>>();
        assert_eq!(required, vec!["ts"]);
    }

    #[test]
    fn defaults_are_allowed() {
        for spec in SIMULATION.iter().chain(CALIBRATION.iter()) {
            if let (Some(default), false) = (spec.default, spec.allowed.is_empty()) {
                assert!(spec.allowed.contains(&default), "{}", spec.identifier);
            }
        }
    }
}
