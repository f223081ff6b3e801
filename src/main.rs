use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use raven::{
    carto::{
        basin::{feature_contains, get_bbox, load_basins},
        coords::{param, read_realization},
        datum::LonLat,
        drainage::{hydrobasins_aggregate, hydrobasins_upstream_ids},
        gridweights::{calc_gridweights, Grid},
    },
    config::Config,
    imaging::graphs,
    regionalization::{read_gauged_params, read_gauged_properties, regionalize, Method, Ungauged},
    services::{
        client::Ows,
        wcs::{get_dem_wcs, raster_nodata, raster_stats},
        wfs::{
            get_hydrobasins_attributes_wfs, get_hydrobasins_location_wfs, select_hybas_domain,
            Region,
        },
    },
    stats::{
        diagnostics::{nse, rmse},
        mann_kendall::mk_test_calc,
        timeseries::{load_hydrograph, load_series},
    },
    units::{Area, Discharge, Elevation, Unit},
    vars::{HYBAS_LEVEL, MK_ALPHA, REG_MIN_NSE, REG_SIZE},
    wps::{
        engine::CommandEngine,
        params::Model,
        registry::{find, processes},
        request::parse_datainputs,
        response::{describe_process, exception_report, execute_response},
    },
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "raven", author, version, about = "Hydrological model emulator processes")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the processes, or describe them as WPS XML
    Processes {
        #[arg(short, long)]
        describe: bool,
        /// only this process
        identifier: Option<String>,
    },
    /// Execute a process with KVP encoded inputs
    Execute {
        #[arg(short, long)]
        identifier: String,
        /// e.g. `ts=files@xlink:href=file:///data/salmon.nc;area=4250.6`
        #[arg(short, long)]
        datainputs: String,
    },
    /// Draw the graphs of a Raven hydrograph file
    Graphs {
        hydrographs: PathBuf,
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// watershed area in km², reports the mean runoff depth
        #[arg(long)]
        area: Option<f64>,
    },
    /// Mann-Kendall trend test of `date,value` tables
    Trend {
        #[arg(required = true)]
        series: Vec<PathBuf>,
        #[arg(short, long, default_value_t = MK_ALPHA)]
        alpha: f64,
        /// directory receiving one graph per series
        #[arg(long)]
        graphs: Option<PathBuf>,
        /// distribution fitted to the values: norm, lognorm or gumbel_r
        #[arg(long, requires = "graphs")]
        fit: Option<String>,
    },
    /// Raven grid weights of GeoJSON basins over a rectilinear grid
    Gridweights {
        geojson: PathBuf,
        /// cell centre longitudes, comma separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        lon: Vec<f64>,
        /// cell centre latitudes, comma separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        lat: Vec<f64>,
    },
    /// Transfer calibrated parameters from gauged basins
    Regionalize {
        #[arg(short, long, default_value = "SP_IDW")]
        method: String,
        #[arg(long, default_value = "GR4JCN")]
        model: String,
        /// gauged basin properties table
        #[arg(long)]
        properties: PathBuf,
        /// gauged basin calibration table
        #[arg(long)]
        params: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// property columns compared between basins, comma separated
        #[arg(long, value_delimiter = ',')]
        names: Vec<String>,
        /// the ungauged basin's values of those properties
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        values: Vec<f64>,
        #[arg(long, default_value_t = REG_SIZE)]
        size: usize,
        #[arg(long, default_value_t = REG_MIN_NSE)]
        min_nse: f64,
    },
    /// Hydrobasins upstream of a feature of a GeoJSON file
    Upstream {
        geojson: PathBuf,
        id: u64,
        /// dissolve the upstream basins into their river system
        #[arg(long)]
        aggregate: bool,
    },
    /// Delineate the watershed draining to a point with the geoserver
    Watershed {
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = HYBAS_LEVEL)]
        level: u8,
    },
}

fn execute(config: &Config, identifier: &str, datainputs: &str) -> Result<()> {
    let outcome = find(identifier).and_then(|process| {
        let given = parse_datainputs(datainputs)?;
        let outputs = process.execute(given, config, &CommandEngine::new(config))?;
        Ok((process, outputs))
    });
    match outcome {
        Ok((process, outputs)) => {
            println!("{}", execute_response(&process, &outputs));
            Ok(())
        }
        Err(error) => {
            println!("{}", exception_report(&error));
            Err(error).with_context(|| format!("executing {}", identifier))
        }
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init_timed();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => Config::default(),
    };
    info!("initialising raven");

    match cli.command {
        Commands::Processes {
            describe,
            identifier,
        } => {
            let selected = match identifier {
                Some(identifier) => vec![find(&identifier)?],
                None => processes().to_vec(),
            };
            if describe {
                println!("{}", describe_process(&selected, &config));
            } else {
                for process in selected {
                    println!("{:<24} {}", process.identifier, process.title);
                }
            }
        }
        Commands::Execute {
            identifier,
            datainputs,
        } => execute(&config, &identifier, &datainputs)?,
        Commands::Graphs {
            hydrographs,
            dir,
            area,
        } => {
            let hydrograph = load_hydrograph(&hydrographs)?;
            std::fs::create_dir_all(&dir)?;
            for path in [
                graphs::hydrograph(&hydrograph, &dir)?,
                graphs::mean_annual_hydrograph(&hydrograph, &dir)?,
                graphs::spaghetti_annual_hydrograph(&hydrograph, &dir)?,
            ] {
                println!("{}", path.display());
            }
            if let Some(obs) = &hydrograph.obs {
                let (obs, sim) = (obs.values(), hydrograph.sim.values());
                println!("NSE {:.4}, RMSE {:.3} m³/s", nse(obs, sim), rmse(obs, sim));
            }
            if let Some(area) = area {
                let flows = hydrograph.sim.finite();
                let mean = flows.iter().sum::<f64>() / flows.len().max(1) as f64;
                println!(
                    "mean runoff depth {:.3} mm/d",
                    Discharge::confine(mean).depth(Area::confine(area))
                );
            }
        }
        Commands::Trend {
            series,
            alpha,
            graphs: dir,
            fit,
        } => {
            let mut loaded = Vec::with_capacity(series.len());
            for path in &series {
                let mut ts = load_series(path)?;
                match read_realization(path) {
                    Ok(r) => ts.name = format!("r{}", r),
                    Err(_) if series.len() > 1 => {
                        warn!("{} carries no realization tag", path.display())
                    }
                    Err(_) => {}
                }
                let result = mk_test_calc(&ts.finite(), alpha)?;
                println!(
                    "{}: {} (significant: {}, p = {:.4}, z = {:.3})",
                    ts.name,
                    result.trend.label(),
                    result.h,
                    result.p,
                    result.z
                );
                loaded.push(ts);
            }
            if let Some(dir) = dir {
                std::fs::create_dir_all(&dir)?;
                for path in graphs::ts_graphs(&loaded, true, alpha, &dir)? {
                    println!("{}", path.display());
                }
                if let Some(distribution) = fit {
                    for ts in &loaded {
                        let path = graphs::ts_fit_graph(&ts.finite(), &distribution, &dir)?;
                        println!("{}", path.display());
                    }
                }
            }
        }
        Commands::Gridweights { geojson, lon, lat } => {
            let basins = load_basins(&geojson)?;
            let weights = calc_gridweights(&basins, &Grid::new(&lon, &lat)?)?;
            print!("{}", weights.to_rvt());
        }
        Commands::Regionalize {
            method,
            model,
            properties,
            params,
            lon,
            lat,
            names,
            values,
            size,
            min_nse,
        } => {
            let method = method.parse::<Method>()?;
            let model = model.parse::<Model>()?;
            let names = names.iter().map(String::as_str).collect::<Vec<&str>>();
            let gauged = read_gauged_properties(&properties, &names)?;
            let calibrated = read_gauged_params(&params, model)?;
            let target = Ungauged {
                location: LonLat::new(lon, lat),
                properties: values,
            };
            let result = regionalize(
                method,
                model,
                &target,
                &gauged,
                &calibrated,
                size,
                min_nse,
            )?;
            let axis = param(model);
            for (name, value) in axis.values.iter().zip(result.params.values()) {
                println!("{:<20} {}", name, value);
            }
            println!(
                "donors: {}",
                result
                    .donors
                    .iter()
                    .map(|d| d.id.as_str())
                    .collect::<Vec<&str>>()
                    .join(", ")
            );
        }
        Commands::Upstream {
            geojson,
            id,
            aggregate,
        } => {
            let basins = load_basins(&geojson)?;
            let upstream = hydrobasins_upstream_ids(id, &basins)?;
            if aggregate {
                for basin in hydrobasins_aggregate(&upstream)? {
                    let area = Area::confine(basin.attribute("SUB_AREA").unwrap_or(0.));
                    println!("{} {} km²", basin.id, area.release());
                }
            } else {
                for basin in upstream {
                    println!("{}", basin.id);
                }
            }
        }
        Commands::Watershed { lon, lat, level } => {
            let ows = Ows::new(&config)?;
            let point = LonLat::new(lon, lat);
            let domain = select_hybas_domain(Region::Point(point))?;
            let located = get_hydrobasins_location_wfs(&ows, &point, domain, level)?;
            let outlet = feature_contains(&point, &located)?;
            let main_bas = outlet.main_bas.unwrap_or(outlet.id).to_string();
            let system =
                get_hydrobasins_attributes_wfs(&ows, "MAIN_BAS", &main_bas, domain, level)?;
            let upstream = hydrobasins_upstream_ids(outlet.id, &system)?;
            let watershed = hydrobasins_aggregate(&upstream)?;
            let bounds = get_bbox(&watershed, true)?;
            let raster = get_dem_wcs(&ows, &bounds)?;
            let dem = raster_stats(&raster, raster_nodata(&raster)?)?;

            let area = Area::confine(
                upstream
                    .iter()
                    .filter_map(|basin| basin.attribute("SUB_AREA"))
                    .sum(),
            );
            let elevation = Elevation::confine(dem.mean);
            println!("outlet {} in {} at level {}", outlet.id, domain, level);
            println!("{} upstream basins, {} km²", upstream.len(), area.release());
            println!("bounds {:?}", bounds.tuple());
            println!("mean elevation {:.1} m", elevation.release());
        }
    }
    info!("done");
    Ok(())
}
