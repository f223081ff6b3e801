use crate::{
    error::{RavenError, Result},
    wps::{params::Model, process::Process},
};

pub const RAVEN_GR4J_CEMANEIGE: Process = Process {
    identifier: "raven-gr4j-cemaneige",
    title: "Raven GR4J + CEMANEIGE hydrological model",
    abstract_: "Simulate daily streamflow with the GR4J rainfall-runoff model coupled to the \
                CemaNeige snow routine, as emulated by Raven",
    model: Model::Gr4jCn,
    calibration: false,
};

pub const RAVEN_HMETS: Process = Process {
    identifier: "raven-hmets",
    title: "Raven HMETS hydrological model",
    abstract_: "Simulate daily streamflow with the HMETS model as emulated by Raven",
    model: Model::Hmets,
    calibration: false,
};

pub const OSTRICH_GR4J_CEMANEIGE: Process = Process {
    identifier: "ostrich-gr4j-cemaneige",
    title: "Calibrate GR4J + CEMANEIGE with Ostrich",
    abstract_: "Search GR4J + CEMANEIGE parameters maximizing the Nash-Sutcliffe efficiency \
                of the Raven simulation against observed streamflow",
    model: Model::Gr4jCn,
    calibration: true,
};

pub const OSTRICH_HMETS: Process = Process {
    identifier: "ostrich-hmets",
    title: "Calibrate HMETS with Ostrich",
    abstract_: "Search HMETS parameters maximizing the Nash-Sutcliffe efficiency of the \
                Raven simulation against observed streamflow",
    model: Model::Hmets,
    calibration: true,
};

pub fn processes() -> [Process; 4] {
    [
        RAVEN_GR4J_CEMANEIGE,
        RAVEN_HMETS,
        OSTRICH_GR4J_CEMANEIGE,
        OSTRICH_HMETS,
    ]
}

pub fn find(identifier: &str) -> Result<Process> {
    processes()
        .into_iter()
        .find(|process| process.identifier == identifier)
        .ok_or_else(|| RavenError::NotFound(format!("process {}", identifier)))
}
