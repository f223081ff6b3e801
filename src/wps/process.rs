use crate::{
    config::Config,
    error::{RavenError, Result},
    stats::diagnostics::Diagnostics,
    wps::{
        engine::{expect_artifact, Engine, Job, Program},
        io::{InputSpec, CALIBRATION, SIMULATION},
        params::{Model, ParamSet},
        request::{Inputs, Value},
        templates::{self, fill, param_names, param_values, templates, tied},
    },
};
use chrono::{Duration, NaiveDateTime, Utc};
use log::{info, trace, warn};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/* # outputs */

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputSpec {
    pub identifier: &'static str,
    pub title: &'static str,
    pub mime: &'static str,
    /// given inline instead of by reference
    pub literal: bool,
}

pub const HYDROGRAPH: OutputSpec = OutputSpec {
    identifier: "hydrograph",
    title: "Hydrograph time series",
    mime: "text/csv",
    literal: false,
};

pub const STORAGE: OutputSpec = OutputSpec {
    identifier: "storage",
    title: "Watershed storage time series",
    mime: "text/csv",
    literal: false,
};

pub const SOLUTION: OutputSpec = OutputSpec {
    identifier: "solution",
    title: "Final state variables, usable as initial conditions",
    mime: "application/octet-stream",
    literal: false,
};

pub const DIAGNOSTICS: OutputSpec = OutputSpec {
    identifier: "diagnostics",
    title: "Performance diagnostics against observed streamflow",
    mime: "text/csv",
    literal: false,
};

pub const CALIBPARAMS: OutputSpec = OutputSpec {
    identifier: "calibparams",
    title: "Calibrated parameters, comma separated",
    mime: "text/plain",
    literal: true,
};

pub const CALIBRATION_RESULTS: OutputSpec = OutputSpec {
    identifier: "CalibrationResults",
    title: "Ostrich calibration report",
    mime: "text/plain",
    literal: false,
};

/// artifacts of one engine run
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub dir: PathBuf,
    /// parameters simulated, or found by calibration
    pub params: ParamSet,
    pub files: BTreeMap<&'static str, PathBuf>,
    pub literals: BTreeMap<&'static str, String>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Outputs {
    pub identifier: &'static str,
    pub runs: Vec<Run>,
}

/* # inputs decoded for the templates */

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Hru {
    #[serde(default)]
    pub hru_id: Option<u64>,
    pub area: f64,
    pub elevation: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
struct NcVar {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default = "unit_scale")]
    scale: f64,
    #[serde(default)]
    offset: f64,
    /// index into the `ts` files
    #[serde(default)]
    file: usize,
}

fn unit_scale() -> f64 {
    1.0
}

// (raven forcing, netCDF variable, units)
const FORCINGS: [(&str, &str, &str); 5] = [
    ("TEMP_MAX", "tasmax", "C"),
    ("TEMP_MIN", "tasmin", "C"),
    ("PRECIP", "pr", "mm/d"),
    ("PET", "evspsbl", "mm/d"),
    ("HYDROGRAPH", "qobs", "m3/s"),
];

#[derive(Clone, Debug, PartialEq)]
struct Forcing {
    forcing: String,
    var: String,
    units: String,
    scale: f64,
    offset: f64,
    file: PathBuf,
}

fn forcings(inputs: &Inputs, ts: &[&Path]) -> Result<Vec<Forcing>> {
    let mut spec = FORCINGS
        .iter()
        .filter(|(forcing, _, _)| *forcing != "PET")
        .map(|(forcing, var, _)| {
            (
                forcing.to_string(),
                NcVar {
                    name: Some(var.to_string()),
                    units: None,
                    scale: 1.0,
                    offset: 0.0,
                    file: 0,
                },
            )
        })
        .collect::<BTreeMap<String, NcVar>>();
    for text in inputs.literals("nc_spec") {
        let update = serde_json::from_str::<BTreeMap<String, Option<NcVar>>>(text)
            .map_err(|e| RavenError::validation("nc_spec", e.to_string()))?;
        for (forcing, var) in update {
            match var {
                Some(var) => spec.insert(forcing, var),
                None => spec.remove(&forcing),
            };
        }
    }

    spec.into_iter()
        .map(|(forcing, var)| -> Result<Forcing> {
            let file = ts.get(var.file).ok_or_else(|| {
                RavenError::validation(
                    "nc_spec",
                    format!("{} refers to ts file {} of {}", forcing, var.file, ts.len()),
                )
            })?;
            let default = FORCINGS.iter().find(|(f, _, _)| *f == forcing);
            Ok(Forcing {
                var: var
                    .name
                    .or_else(|| default.map(|(_, v, _)| v.to_string()))
                    .ok_or_else(|| {
                        RavenError::validation("nc_spec", format!("{} has no variable name", forcing))
                    })?,
                units: var
                    .units
                    .or_else(|| default.map(|(_, _, u)| u.to_string()))
                    .unwrap_or_else(|| "none".to_string()),
                scale: var.scale,
                offset: var.offset,
                file: fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf()),
                forcing,
            })
        })
        .collect()
}

fn hrus(inputs: &Inputs) -> Result<Vec<Hru>> {
    let hrus = match inputs.file("hrus") {
        Some(path) => serde_json::from_str::<Vec<Hru>>(&fs::read_to_string(path)?)
            .map_err(|e| RavenError::validation("hrus", e.to_string()))?,
        None => {
            let required = |id: &str| -> Result<f64> {
                inputs
                    .float(id)?
                    .ok_or_else(|| RavenError::Missing(id.to_string()))
            };
            vec![Hru {
                hru_id: Some(1),
                area: required("area")?,
                elevation: required("elevation")?,
                latitude: required("latitude")?,
                longitude: required("longitude")?,
            }]
        }
    };
    if hrus.is_empty() {
        return Err(RavenError::validation("hrus", "no response units"));
    }
    if let Some(hru) = hrus.iter().find(|hru| hru.area <= 0.) {
        return Err(RavenError::validation(
            "area",
            format!("{} km² is not a watershed area", hru.area),
        ));
    }
    Ok(hrus)
}

/// simulation period from the start date and either a duration or an end date
fn period(inputs: &Inputs) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let start = inputs
        .datetime("start_date")?
        .ok_or_else(|| RavenError::Missing("start_date".into()))?;
    let end = match (inputs.integer("duration")?, inputs.datetime("end_date")?) {
        (Some(days), _) if days > 0 => start + Duration::days(days),
        (Some(days), _) => {
            return Err(RavenError::validation(
                "duration",
                format!("{} is not a positive number of days", days),
            ))
        }
        (None, Some(end)) => end,
        (None, None) => return Err(RavenError::Missing("end_date".into())),
    };
    if end <= start {
        return Err(RavenError::validation(
            "end_date",
            format!("{} is not after {}", end, start),
        ));
    }
    Ok((start, end))
}

/// run names prefix every output file and name the run directory
fn run_name(text: &str) -> Result<String> {
    let name = text.trim().replace(char::is_whitespace, "_");
    if name.is_empty() {
        return Err(RavenError::validation("run_name", "empty run name"));
    }
    match name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        Some(c) => Err(RavenError::validation(
            "run_name",
            format!("{:?} may not hold {:?}", text, c),
        )),
        None => Ok(name),
    }
}

/// everything needed to render the engine configuration
#[derive(Clone, Debug)]
struct Setup {
    run_name: String,
    name: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    hrus: Vec<Hru>,
    forcings: Vec<Forcing>,
    nc_index: i64,
    evaporation: String,
    rain_snow_fraction: String,
    rvc: Option<PathBuf>,
}

impl Setup {
    fn new(inputs: &Inputs) -> Result<Self> {
        let (start, end) = period(inputs)?;
        let literal = |id: &str| {
            inputs
                .literal(id)
                .map(str::to_string)
                .ok_or_else(|| RavenError::Missing(id.to_string()))
        };
        Ok(Self {
            run_name: run_name(&literal("run_name")?)?,
            // raven names may not hold whitespace
            name: literal("name")?.replace(char::is_whitespace, "_"),
            start,
            end,
            hrus: hrus(inputs)?,
            forcings: forcings(inputs, &inputs.files("ts"))?,
            nc_index: inputs.integer("nc_index")?.unwrap_or(1),
            evaporation: literal("evaporation")?,
            rain_snow_fraction: literal("rain_snow_fraction")?,
            rvc: inputs.file("rvc").map(Path::to_path_buf),
        })
    }

    fn values(&self) -> BTreeMap<String, String> {
        let total = self.hrus.iter().map(|hru| hru.area).sum::<f64>();
        let weighted =
            |f: fn(&Hru) -> f64| self.hrus.iter().map(|hru| f(hru) * hru.area).sum::<f64>() / total;
        BTreeMap::from([
            ("run_name".to_string(), self.run_name.clone()),
            ("name".to_string(), self.name.clone()),
            ("start_date".to_string(), self.start.format(DATE_FORMAT).to_string()),
            ("end_date".to_string(), self.end.format(DATE_FORMAT).to_string()),
            ("evaporation".to_string(), self.evaporation.clone()),
            ("rain_snow_fraction".to_string(), self.rain_snow_fraction.clone()),
            ("nc_index".to_string(), self.nc_index.to_string()),
            ("area".to_string(), total.to_string()),
            ("latitude".to_string(), weighted(|h| h.latitude).to_string()),
            ("longitude".to_string(), weighted(|h| h.longitude).to_string()),
            ("elevation".to_string(), weighted(|h| h.elevation).to_string()),
        ])
    }
}

fn with(base: &BTreeMap<String, String>, pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    let mut values = base.clone();
    for (key, value) in pairs {
        values.insert(key.to_string(), value.clone());
    }
    values
}

fn header(extension: &str) -> Result<String> {
    fill(
        templates::HEADER,
        &BTreeMap::from([
            ("extension".to_string(), extension.to_string()),
            (
                "creation_date".to_string(),
                Utc::now().format("%Y-%m-%d").to_string(),
            ),
        ]),
    )
}

/// the `.rv*` files of a model, keyed by extension
fn render(
    model: Model,
    setup: &Setup,
    params: &BTreeMap<String, String>,
) -> Result<Vec<(&'static str, String)>> {
    let t = templates(model);
    let base = setup.values();
    let all = base
        .iter()
        .chain(params.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<BTreeMap<String, String>>();

    let processes = fill(t.processes, &all)?;
    let rvi = fill(templates::RVI, &with(&all, &[("processes", processes)]))?;

    let rows = setup
        .hrus
        .iter()
        .enumerate()
        .map(|(index, hru)| {
            fill(
                templates::HRU_ROW,
                &BTreeMap::from([
                    (
                        "hru_id".to_string(),
                        hru.hru_id.unwrap_or(index as u64 + 1).to_string(),
                    ),
                    ("area".to_string(), hru.area.to_string()),
                    ("elevation".to_string(), hru.elevation.to_string()),
                    ("latitude".to_string(), hru.latitude.to_string()),
                    ("longitude".to_string(), hru.longitude.to_string()),
                ]),
            )
        })
        .collect::<Result<Vec<String>>>()?;
    let rvh = fill(
        templates::RVH,
        &with(
            &all,
            &[
                ("hru_rows", rows.join("\n")),
                ("subbasin_properties", fill(t.subbasin_properties, &all)?),
            ],
        ),
    )?;

    let mut forcing_blocks = String::new();
    let mut observations = String::new();
    for forcing in &setup.forcings {
        let values = with(
            &all,
            &[
                ("forcing", forcing.forcing.clone()),
                ("units", forcing.units.clone()),
                ("file", forcing.file.display().to_string()),
                ("var", forcing.var.clone()),
                ("scale", forcing.scale.to_string()),
                ("offset", forcing.offset.to_string()),
            ],
        );
        if forcing.forcing == "HYDROGRAPH" {
            observations.push_str(&fill(templates::RVT_OBSERVATION, &values)?);
        } else {
            forcing_blocks.push_str(&fill(templates::RVT_DATA, &values)?);
        }
    }
    let rvt = fill(
        templates::RVT,
        &with(
            &all,
            &[("forcings", forcing_blocks), ("observations", observations)],
        ),
    )?;

    let state = fill(t.state_values, &all)?;
    let state_rows = setup
        .hrus
        .iter()
        .enumerate()
        .map(|(index, hru)| {
            format!(
                "  {}, {}",
                hru.hru_id.unwrap_or(index as u64 + 1),
                state
            )
        })
        .collect::<Vec<String>>()
        .join("\n");
    let rvc = fill(
        templates::RVC,
        &with(
            &all,
            &[
                ("state_names", t.state_names.to_string()),
                ("state_units", t.state_units.to_string()),
                ("state_rows", state_rows),
            ],
        ),
    )?;

    let rvp = fill(t.rvp, &all)?;
    Ok(vec![
        ("rvi", rvi),
        ("rvp", rvp),
        ("rvh", rvh),
        ("rvt", rvt),
        ("rvc", rvc),
    ])
}

/// write the rendered files as `<dir>/<stem>.<extension>`, a given initial state replaces the rendered one
fn write_config(
    dir: &Path,
    stem: &str,
    files: &[(&'static str, String)],
    rvc: Option<&Path>,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (extension, text) in files {
        let path = dir.join(format!("{}.{}", stem, extension));
        match (*extension, rvc) {
            ("rvc", Some(given)) => {
                fs::copy(given, &path)?;
            }
            _ => fs::write(&path, format!("{}{}", header(extension)?, text))?,
        }
        trace!("wrote {}", path.display());
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// first free `<root>/<name>`, `<root>/<name>-1`, ...
fn run_dir(root: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    for n in 0.. {
        let dir = match n {
            0 => root.join(name),
            n => root.join(format!("{}-{}", name, n)),
        };
        // creation is the claim, concurrent requests never share a directory
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(RavenError::Config(format!(
        "no free run directory in {}",
        root.display()
    )))
}

/// `par_NAME : value` lines following Ostrich's optimal parameter set banner
pub fn read_calibrated(text: &str, model: Model) -> Result<ParamSet> {
    let found = text
        .lines()
        .skip_while(|line| !line.contains("Optimal Parameter Set"))
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim().strip_prefix("par_")?;
            Some((name.to_string(), value.trim().parse::<f64>().ok()?))
        })
        .collect::<BTreeMap<String, f64>>();
    let values = model
        .names()
        .iter()
        .map(|name| {
            found.get(*name).copied().ok_or_else(|| {
                RavenError::Engine(format!("calibration report lacks {}", name))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    ParamSet::new(model, values)
}

/* # processes */

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Process {
    pub identifier: &'static str,
    pub title: &'static str,
    pub abstract_: &'static str,
    pub model: Model,
    /// calibrate with Ostrich instead of simulating given parameters
    pub calibration: bool,
}

impl Process {
    /// declared inputs, parameter sets per request as configured
    pub fn inputs(&self, config: &Config) -> Vec<InputSpec> {
        let sets = if self.calibration {
            1
        } else {
            config.max_parallel_processes
        };
        let mut inputs = SIMULATION
            .iter()
            .map(|spec| match spec.identifier {
                "params" => InputSpec {
                    max_occurs: sets,
                    ..*spec
                },
                _ => *spec,
            })
            .collect::<Vec<InputSpec>>();
        if self.calibration {
            inputs.extend(CALIBRATION);
        }
        inputs
    }

    pub fn outputs(&self) -> Vec<OutputSpec> {
        let mut outputs = vec![HYDROGRAPH, STORAGE, SOLUTION, DIAGNOSTICS];
        if self.calibration {
            outputs.extend([CALIBPARAMS, CALIBRATION_RESULTS]);
        }
        outputs
    }

    pub fn execute(
        &self,
        given: Vec<(String, Value)>,
        config: &Config,
        engine: &dyn Engine,
    ) -> Result<Outputs> {
        info!("executing {}", self.identifier);
        let inputs = Inputs::validate(&self.inputs(config), given)?;
        let setup = Setup::new(&inputs)?;
        let root = config.workdir.join(self.identifier);
        let dir = run_dir(&root, &setup.run_name)?;
        info!("running {} in {}", self.identifier, dir.display());

        let runs = if self.calibration {
            vec![self.calibrate(&inputs, &setup, &dir, config, engine)?]
        } else {
            self.simulate(&inputs, &setup, &dir, config, engine)?
        };
        info!("{} finished with {} run(s)", self.identifier, runs.len());
        Ok(Outputs {
            identifier: self.identifier,
            runs,
        })
    }

    fn simulate(
        &self,
        inputs: &Inputs,
        setup: &Setup,
        dir: &Path,
        config: &Config,
        engine: &dyn Engine,
    ) -> Result<Vec<Run>> {
        let mut sets = inputs
            .literals("params")
            .into_iter()
            .map(|text| ParamSet::parse(self.model, text))
            .collect::<Result<Vec<ParamSet>>>()?;
        if sets.is_empty() {
            sets.push(ParamSet::defaults(self.model));
        }
        if sets.len() > config.max_parallel_processes {
            return Err(RavenError::validation(
                "params",
                format!(
                    "{} parameter sets, at most {} are run per request",
                    sets.len(),
                    config.max_parallel_processes
                ),
            ));
        }

        let several = sets.len() > 1;
        sets.into_iter()
            .enumerate()
            .map(|(index, params)| {
                let dir = if several {
                    dir.join(format!("p{:02}", index))
                } else {
                    dir.to_path_buf()
                };
                let files = render(self.model, setup, &param_values(&params)?)?;
                write_config(&dir, self.identifier, &files, setup.rvc.as_deref())?;

                let job = Job {
                    program: Program::Raven,
                    dir: dir.clone(),
                    model: self.identifier.to_string(),
                    run_name: setup.run_name.clone(),
                };
                engine.run(&job)?;
                collect(&job, params, BTreeMap::new())
            })
            .collect()
    }

    fn calibrate(
        &self,
        inputs: &Inputs,
        setup: &Setup,
        dir: &Path,
        config: &Config,
        engine: &dyn Engine,
    ) -> Result<Run> {
        let initial = match inputs.literals("params").as_slice() {
            [] => ParamSet::defaults(self.model),
            [text] => ParamSet::parse(self.model, text)?,
            _ => {
                return Err(RavenError::validation(
                    "params",
                    "calibration starts from a single parameter set",
                ))
            }
        };
        let bound = |id: &str, default: ParamSet| {
            inputs
                .literal(id)
                .map(|text| {
                    ParamSet::parse(self.model, text).map_err(|e| match e {
                        RavenError::Validation { reason, .. } => RavenError::validation(id, reason),
                        other => other,
                    })
                })
                .unwrap_or(Ok(default))
        };
        let lower = bound("lowerBounds", ParamSet::lower(self.model))?;
        let upper = bound("upperBounds", ParamSet::upper(self.model))?;
        initial.check_bounds(&lower, &upper)?;

        // model files go to model/, ostrich writes the parameter file from its template
        let files = render(self.model, setup, &param_values(&initial)?)?;
        let model_files = files
            .iter()
            .filter(|(extension, _)| *extension != "rvp")
            .cloned()
            .collect::<Vec<(&'static str, String)>>();
        write_config(
            &dir.join("model"),
            self.identifier,
            &model_files,
            setup.rvc.as_deref(),
        )?;
        let template = render(self.model, setup, &param_names(self.model))?
            .into_iter()
            .find(|(extension, _)| *extension == "rvp")
            .map(|(_, text)| text)
            .ok_or_else(|| RavenError::Config("no parameter template".into()))?;
        fs::write(
            dir.join(format!("{}.rvp.tpl", self.identifier)),
            format!("{}{}", header("rvp")?, template),
        )?;

        let params = initial
            .iter()
            .zip(lower.values().iter().zip(upper.values()))
            .map(|((name, init), (low, high))| {
                fill(
                    templates::OST_PARAM,
                    &BTreeMap::from([
                        ("name".to_string(), name.to_string()),
                        ("init".to_string(), init.to_string()),
                        ("low".to_string(), low.to_string()),
                        ("high".to_string(), high.to_string()),
                    ]),
                )
            })
            .collect::<Result<Vec<String>>>()?;
        let random_seed = match inputs.integer("random_seed")? {
            Some(seed) => format!("RandomSeed {}\n", seed),
            None => String::new(),
        };
        let ost_in = fill(
            templates::OST_IN,
            &BTreeMap::from([
                (
                    "algorithm".to_string(),
                    inputs.literal("algorithm").unwrap_or("DDS").to_string(),
                ),
                ("model".to_string(), self.identifier.to_string()),
                ("params".to_string(), params.join("\n")),
                (
                    "tied".to_string(),
                    templates::derived(self.model)
                        .iter()
                        .map(tied)
                        .collect::<Vec<String>>()
                        .join("\n"),
                ),
                ("run_name".to_string(), setup.run_name.clone()),
                ("random_seed".to_string(), random_seed),
                (
                    "max_iterations".to_string(),
                    inputs.integer("max_iterations")?.unwrap_or(50).to_string(),
                ),
            ]),
        )?;
        fs::write(dir.join("ostIn.txt"), ost_in)?;

        let scripts = BTreeMap::from([
            ("model".to_string(), self.identifier.to_string()),
            (
                "raven".to_string(),
                fs::canonicalize(&config.raven_binary)
                    .unwrap_or_else(|_| config.raven_binary.clone())
                    .display()
                    .to_string(),
            ),
        ]);
        for (name, template) in [
            ("ostrich-runs-raven.sh", templates::OST_RUNS_RAVEN),
            ("save_best.sh", templates::OST_SAVE_BEST),
        ] {
            let path = dir.join(name);
            fs::write(&path, fill(template, &scripts)?)?;
            make_executable(&path)?;
        }
        if let Some(numbers) = inputs.file("random_numbers") {
            fs::copy(numbers, dir.join("OstRandomNumbers.txt"))?;
        }

        let job = Job {
            program: Program::Ostrich,
            dir: dir.to_path_buf(),
            model: self.identifier.to_string(),
            run_name: setup.run_name.clone(),
        };
        engine.run(&job)?;

        let report = expect_artifact(&dir.join("OstOutput0.txt"))?;
        let calibrated = read_calibrated(&fs::read_to_string(&report)?, self.model)?;
        let mut run = collect(
            &job,
            calibrated.clone(),
            BTreeMap::from([(CALIBPARAMS.identifier, calibrated.to_string())]),
        )?;
        run.files.insert(CALIBRATION_RESULTS.identifier, report);
        Ok(run)
    }
}

/// gather what the engine wrote, diagnostics and hydrograph are mandatory
fn collect(
    job: &Job,
    params: ParamSet,
    literals: BTreeMap<&'static str, String>,
) -> Result<Run> {
    let diagnostics_path = expect_artifact(&job.output("Diagnostics.csv"))?;
    let diagnostics = Diagnostics::load(&diagnostics_path)?;
    let mut files = BTreeMap::from([
        (DIAGNOSTICS.identifier, diagnostics_path),
        (
            HYDROGRAPH.identifier,
            expect_artifact(&job.output("Hydrographs.csv"))?,
        ),
    ]);
    for (identifier, suffix) in [
        (STORAGE.identifier, "WatershedStorage.csv"),
        (SOLUTION.identifier, "solution.rvc"),
    ] {
        let path = job.output(suffix);
        if path.is_file() {
            files.insert(identifier, path);
        } else {
            warn!("engine did not write {}", path.display());
        }
    }
    if let Some(nse) = diagnostics.metric("DIAG_NASH_SUTCLIFFE") {
        info!("run in {} reached NSE {}", job.dir.display(), nse);
    }
    Ok(Run {
        dir: job.dir.clone(),
        params,
        files,
        literals,
        diagnostics,
    })
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        stats::{diagnostics::test::DIAGNOSTICS as DIAGNOSTICS_CSV, timeseries::test::HYDROGRAPHS},
        wps::request::parse_datainputs,
    };
    use float_eq::assert_float_eq;
    use std::cell::RefCell;

    pub const OST_OUTPUT: &str = "\
Ostrich Run Record
Optimal Parameter Set
Objective Function : -0.6178
par_GR4J_X1        : 0.4815
par_GR4J_X2        : -2.9000
par_GR4J_X3        : 380.1
par_GR4J_X4        : 1.35
par_CEMANEIGE_X1   : 15.2
par_CEMANEIGE_X2   : 0.81
par_GR4J_X1_hlf    : 240.75

Summary of Constraints
";

    /// writes canned artifacts where the real engine would, or nothing at all
    #[derive(Default)]
    pub struct FakeEngine {
        pub silent: bool,
        pub jobs: RefCell<Vec<Job>>,
    }

    impl Engine for FakeEngine {
        fn run(&self, job: &Job) -> Result<()> {
            self.jobs.borrow_mut().push(job.clone());
            if self.silent {
                return Ok(());
            }
            fs::create_dir_all(job.output_dir())?;
            fs::write(job.output("Hydrographs.csv"), HYDROGRAPHS)?;
            fs::write(job.output("Diagnostics.csv"), DIAGNOSTICS_CSV)?;
            if job.program == Program::Ostrich {
                fs::write(job.dir.join("OstOutput0.txt"), OST_OUTPUT)?;
            }
            Ok(())
        }
    }

    pub const GR4J: Process = Process {
        identifier: "raven-gr4j-cemaneige",
        title: "",
        abstract_: "",
        model: Model::Gr4jCn,
        calibration: false,
    };

    const OSTRICH_GR4J: Process = Process {
        identifier: "ostrich-gr4j-cemaneige",
        calibration: true,
        ..GR4J
    };

    fn config(dir: &Path) -> Config {
        Config {
            workdir: dir.join("runs"),
            ..Config::default()
        }
    }

    fn salmon(dir: &Path, extra: &str) -> Vec<(String, Value)> {
        let forcing = dir.join("salmon.nc");
        fs::write(&forcing, "").unwrap();
        parse_datainputs(&format!(
            "ts=files@xlink:href=file://{};start_date=1954-01-01 00:00:00;duration=208;\
             name=Salmon River;run_name=test;area=4250.6;elevation=843.0;latitude=54.4848;\
             longitude=-123.3659;{}",
            forcing.display(),
            extra
        ))
        .unwrap()
    }

    #[test]
    fn simulation() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        let outputs = GR4J
            .execute(
                salmon(dir.path(), "params=0.529, -3.396, 407.29, 1.072, 16.9, 0.947"),
                &config(dir.path()),
                &engine,
            )
            .unwrap();
        assert_eq!(outputs.runs.len(), 1);
        let run = &outputs.runs[0];
        assert_float_eq!(
            run.diagnostics.metric("DIAG_NASH_SUTCLIFFE").unwrap(),
            -1.43474,
            abs <= 1e-4
        );
        assert!(run.files[HYDROGRAPH.identifier].is_file());
        assert!(!run.files.contains_key(STORAGE.identifier));

        let rvi = fs::read_to_string(run.dir.join("raven-gr4j-cemaneige.rvi")).unwrap();
        assert!(rvi.contains(":StartDate             1954-01-01 00:00:00"));
        assert!(rvi.contains(":EndDate               1954-07-28 00:00:00"));
        assert!(rvi.contains(":Evaporation           PET_OUDIN"));
        let rvt = fs::read_to_string(run.dir.join("raven-gr4j-cemaneige.rvt")).unwrap();
        assert!(rvt.contains(":Gauge Salmon_River"));
        assert!(rvt.contains(":VarNameNC       tasmax"));
        assert!(rvt.contains(":ObservationData HYDROGRAPH 1 m3/s"));
        let rvc = fs::read_to_string(run.dir.join("raven-gr4j-cemaneige.rvc")).unwrap();
        assert!(rvc.contains(":HRUStateVariableTable"));
        assert!(rvc.contains(", 15.0"));

        let jobs = engine.jobs.borrow();
        assert_eq!(jobs[0].program, Program::Raven);
        assert_eq!(jobs[0].run_name, "test");
    }

    #[test]
    fn run_directories_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        let config = config(dir.path());
        let first = GR4J.execute(salmon(dir.path(), ""), &config, &engine).unwrap();
        let second = GR4J.execute(salmon(dir.path(), ""), &config, &engine).unwrap();
        assert_ne!(first.runs[0].dir, second.runs[0].dir);
        assert_eq!(first.runs[0].params, ParamSet::defaults(Model::Gr4jCn));
    }

    #[test]
    fn parameter_sets_run_separately() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        let outputs = GR4J
            .execute(
                salmon(
                    dir.path(),
                    "params=0.529, -3.396, 407.29, 1.072, 16.9, 0.947;\
                     params=0.6, -3.0, 400.0, 1.1, 15.0, 0.9",
                ),
                &config(dir.path()),
                &engine,
            )
            .unwrap();
        assert_eq!(outputs.runs.len(), 2);
        assert_ne!(outputs.runs[0].dir, outputs.runs[1].dir);
        assert_eq!(outputs.runs[1].params.values()[0], 0.6);
    }

    #[test]
    fn parameter_sets_follow_configured_limit() {
        let dir = tempfile::tempdir().unwrap();
        let three = "params=0.529, -3.396, 407.29, 1.072, 16.9, 0.947;\
                     params=0.6, -3.0, 400.0, 1.1, 15.0, 0.9;\
                     params=0.7, -2.0, 390.0, 1.2, 14.0, 0.85";
        let mut config = config(dir.path());
        assert!(matches!(
            GR4J.execute(salmon(dir.path(), three), &config, &FakeEngine::default()),
            Err(RavenError::Validation { name, .. }) if name == "params"
        ));
        config.max_parallel_processes = 3;
        let outputs = GR4J
            .execute(salmon(dir.path(), three), &config, &FakeEngine::default())
            .unwrap();
        assert_eq!(outputs.runs.len(), 3);
        assert_eq!(outputs.runs[2].params.values()[0], 0.7);
    }

    #[test]
    fn run_names_stay_inside_workdir() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../../escaped", "a/b", "a\\b", ".."] {
            let mut given = salmon(dir.path(), "");
            given.retain(|(key, _)| key != "run_name");
            given.push(("run_name".into(), Value::Literal(bad.into())));
            assert!(matches!(
                GR4J.execute(given, &config(dir.path()), &FakeEngine::default()),
                Err(RavenError::Validation { name, .. }) if name == "run_name"
            ));
        }
        assert!(!dir.path().join("escaped").exists());
        assert_eq!(run_name(" Salmon River ").unwrap(), "Salmon_River");
    }

    #[test]
    fn existing_run_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("runs");
        fs::create_dir_all(root.join("test")).unwrap();
        fs::create_dir_all(root.join("test-1")).unwrap();
        assert_eq!(run_dir(&root, "test").unwrap(), root.join("test-2"));
        assert_eq!(run_dir(&root, "test").unwrap(), root.join("test-3"));
    }

    #[test]
    fn netcdf_variable_names() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = GR4J
            .execute(
                salmon(
                    dir.path(),
                    "nc_spec={\"TEMP_MAX\": {\"name\": \"tmax\", \"scale\": 0.1}, \"HYDROGRAPH\": null}",
                ),
                &config(dir.path()),
                &FakeEngine::default(),
            )
            .unwrap();
        let rvt =
            fs::read_to_string(outputs.runs[0].dir.join("raven-gr4j-cemaneige.rvt")).unwrap();
        assert!(rvt.contains(":VarNameNC       tmax"));
        assert!(rvt.contains(":LinearTransform 0.1 0"));
        assert!(!rvt.contains(":ObservationData"));
    }

    #[test]
    fn netcdf_file_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let result = GR4J.execute(
            salmon(dir.path(), "nc_spec={\"PRECIP\": {\"file\": 3}}"),
            &config(dir.path()),
            &FakeEngine::default(),
        );
        assert!(matches!(
            result,
            Err(RavenError::Validation { name, .. }) if name == "nc_spec"
        ));
    }

    #[test]
    fn missing_watershed() {
        let dir = tempfile::tempdir().unwrap();
        let mut given = salmon(dir.path(), "");
        given.retain(|(key, _)| key != "area");
        assert!(matches!(
            GR4J.execute(given, &config(dir.path()), &FakeEngine::default()),
            Err(RavenError::Missing(name)) if name == "area"
        ));
    }

    #[test]
    fn response_units_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let hrus = dir.path().join("hrus.json");
        fs::write(
            &hrus,
            r#"[{"area": 100.0, "elevation": 500.0, "latitude": 50.0, "longitude": -70.0},
                {"hru_id": 7, "area": 300.0, "elevation": 900.0, "latitude": 52.0, "longitude": -72.0}]"#,
        )
        .unwrap();
        let forcing = dir.path().join("salmon.nc");
        fs::write(&forcing, "").unwrap();
        let given = parse_datainputs(&format!(
            "ts=files@xlink:href=file://{};hrus=files@xlink:href=file://{};\
             start_date=1954-01-01;end_date=1954-12-31",
            forcing.display(),
            hrus.display()
        ))
        .unwrap();
        let outputs = GR4J
            .execute(given, &config(dir.path()), &FakeEngine::default())
            .unwrap();
        let run = &outputs.runs[0];
        let rvh = fs::read_to_string(run.dir.join("raven-gr4j-cemaneige.rvh")).unwrap();
        assert!(rvh.contains("  1, 100, 500, 50, -70,"));
        assert!(rvh.contains("  7, 300, 900, 52, -72,"));
        let rvt = fs::read_to_string(run.dir.join("raven-gr4j-cemaneige.rvt")).unwrap();
        assert!(rvt.contains(":Latitude  51.5"));
        assert!(rvt.contains(":Elevation 800"));
    }

    #[test]
    fn period_must_be_positive() {
        let dir = tempfile::tempdir().unwrap();
        let mut given = salmon(dir.path(), "");
        given.retain(|(key, _)| key != "duration");
        given.push(("end_date".into(), Value::Literal("1953-01-01".into())));
        assert!(matches!(
            GR4J.execute(given, &config(dir.path()), &FakeEngine::default()),
            Err(RavenError::Validation { name, .. }) if name == "end_date"
        ));
    }

    #[test]
    fn engine_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            silent: true,
            ..FakeEngine::default()
        };
        assert!(matches!(
            GR4J.execute(salmon(dir.path(), ""), &config(dir.path()), &engine),
            Err(RavenError::Engine(_))
        ));
    }

    #[test]
    fn given_initial_conditions_are_copied() {
        let dir = tempfile::tempdir().unwrap();
        let rvc = dir.path().join("previous_solution.rvc");
        fs::write(&rvc, ":HRUStateVariableTable\n:EndHRUStateVariableTable\n").unwrap();
        let outputs = GR4J
            .execute(
                salmon(dir.path(), &format!("rvc=files@xlink:href=file://{}", rvc.display())),
                &config(dir.path()),
                &FakeEngine::default(),
            )
            .unwrap();
        assert_eq!(
            fs::read_to_string(outputs.runs[0].dir.join("raven-gr4j-cemaneige.rvc")).unwrap(),
            fs::read_to_string(&rvc).unwrap()
        );
    }

    #[test]
    fn calibration() {
        let dir = tempfile::tempdir().unwrap();
        let numbers = dir.path().join("random.txt");
        fs::write(&numbers, "0.1\n0.7\n").unwrap();
        let engine = FakeEngine::default();
        let outputs = OSTRICH_GR4J
            .execute(
                salmon(
                    dir.path(),
                    &format!(
                        "lowerBounds=0.01, -15.0, 10.0, 0.0, 1.0, 0.0;\
                         upperBounds=2.5, 10.0, 700.0, 7.0, 30.0, 1.0;\
                         max_iterations=10;random_seed=0;\
                         random_numbers=files@xlink:href=file://{}",
                        numbers.display()
                    ),
                ),
                &config(dir.path()),
                &engine,
            )
            .unwrap();
        let run = &outputs.runs[0];
        assert_eq!(
            run.literals[CALIBPARAMS.identifier],
            "0.4815, -2.9, 380.1, 1.35, 15.2, 0.81"
        );
        assert_eq!(run.params.get("GR4J_X3"), Some(380.1));
        assert!(run.files[CALIBRATION_RESULTS.identifier].is_file());
        assert!(run.files[DIAGNOSTICS.identifier].starts_with(run.dir.join("best")));

        let ost_in = fs::read_to_string(run.dir.join("ostIn.txt")).unwrap();
        assert!(ost_in.contains("ProgramType         DDS"));
        assert!(ost_in.contains("MaxIterations 10"));
        assert!(ost_in.contains("RandomSeed 0"));
        assert!(ost_in.contains("  par_GR4J_X3  407.29  10  700  none  none  none"));
        assert!(ost_in.contains("par_one_minus_CEMANEIGE_X2 1 par_CEMANEIGE_X2"));
        let template =
            fs::read_to_string(run.dir.join("raven-gr4j-cemaneige.rvp.tpl")).unwrap();
        assert!(template.contains(":GlobalParameter GR4J_X4 par_GR4J_X4"));
        assert!(run.dir.join("model/raven-gr4j-cemaneige.rvi").is_file());
        assert!(!run.dir.join("model/raven-gr4j-cemaneige.rvp").exists());
        assert!(run.dir.join("save_best.sh").is_file());
        assert!(run.dir.join("OstRandomNumbers.txt").is_file());
        assert_eq!(engine.jobs.borrow()[0].program, Program::Ostrich);
    }

    #[test]
    fn calibration_outside_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let result = OSTRICH_GR4J.execute(
            salmon(dir.path(), "lowerBounds=1.0, -15.0, 10.0, 0.0, 1.0, 0.0"),
            &config(dir.path()),
            &FakeEngine::default(),
        );
        assert!(matches!(result, Err(RavenError::Validation { .. })));
    }

    #[test]
    fn calibration_report() {
        assert!(matches!(
            read_calibrated("Optimal Parameter Set\npar_GR4J_X1 : 0.5\n", Model::Gr4jCn),
            Err(RavenError::Engine(_))
        ));
        let calibrated = read_calibrated(OST_OUTPUT, Model::Gr4jCn).unwrap();
        assert_eq!(calibrated.values()[0], 0.4815);
    }
}
