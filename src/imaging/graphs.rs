use crate::{
    error::{RavenError, Result},
    imaging::{
        colour::{Ink, WheelInk, BAND, OBSERVED, SIMULATED, TREND},
        plot::Figure,
    },
    stats::{
        distributions::Distribution,
        mann_kendall::{mk_test_calc, sens_slope},
        timeseries::{Hydrograph, TimeSeries},
    },
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use log::info;
use std::path::{Path, PathBuf};

const DISCHARGE: &str = "Discharge [m³/s]";
const DAY_OF_YEAR: &str = "Day of year";
// first day of each month in a non leap year
const MONTH_STARTS: [(u32, &str); 12] = [
    (1, "Jan"),
    (32, "Feb"),
    (60, "Mar"),
    (91, "Apr"),
    (121, "May"),
    (152, "Jun"),
    (182, "Jul"),
    (213, "Aug"),
    (244, "Sep"),
    (274, "Oct"),
    (305, "Nov"),
    (335, "Dec"),
];

fn decimal_year(time: &NaiveDateTime) -> f64 {
    let year = time.year();
    let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
    let days = if leap { 366. } else { 365. };
    year as f64 + (time.ordinal0() as f64 + time.hour() as f64 / 24.) / days
}

fn year_ticks(series: &TimeSeries) -> Vec<(f64, String)> {
    let (first, last) = match (series.times().first(), series.times().last()) {
        (Some(first), Some(last)) => (first.year(), last.year()),
        _ => return Vec::new(),
    };
    let step = ((last - first) / 8).max(1);
    (first..=last + 1)
        .step_by(step as usize)
        .map(|year| (year as f64, year.to_string()))
        .collect()
}

fn month_ticks() -> Vec<(f64, String)> {
    MONTH_STARTS
        .iter()
        .map(|(day, name)| (*day as f64, name.to_string()))
        .collect()
}

fn points(series: &TimeSeries) -> Vec<(f64, f64)> {
    series
        .iter()
        .map(|(time, value)| (decimal_year(&time), value))
        .collect()
}

fn file_name(series: &TimeSeries, suffix: &str) -> String {
    let stem = series
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    format!("{}_{}.svg", stem, suffix)
}

/* # hydrographs */

/// simulated and observed discharge over the whole simulation
pub fn hydrograph(hydrograph: &Hydrograph, dir: &Path) -> Result<PathBuf> {
    let sim = &hydrograph.sim;
    let mut figure = Figure::new(format!("{} hydrograph", sim.name), "Year", DISCHARGE)
        .line(points(sim), SIMULATED.paint(), Some("simulated"))
        .x_ticks(year_ticks(sim));
    if let Some(obs) = &hydrograph.obs {
        figure = figure.line(points(obs), OBSERVED.paint(), Some("observed"));
    }
    info!("drawing hydrograph of {}", sim.name);
    figure.save(&dir.join(file_name(sim, "hydrograph")))
}

/// day of year mean discharge, with the simulated extremes as a band
pub fn mean_annual_hydrograph(hydrograph: &Hydrograph, dir: &Path) -> Result<PathBuf> {
    let sim = &hydrograph.sim;
    let stats = sim.day_of_year_stats();
    let (lower, upper) = stats
        .iter()
        .map(|(day, _, min, max)| ((*day as f64, *min), (*day as f64, *max)))
        .unzip::<_, _, Vec<(f64, f64)>, Vec<(f64, f64)>>();

    let mut figure = Figure::new(
        format!("{} mean annual hydrograph", sim.name),
        DAY_OF_YEAR,
        DISCHARGE,
    )
    .band(lower, upper, BAND.paint(), "simulated range")
    .line(
        stats
            .iter()
            .map(|(day, mean, _, _)| (*day as f64, *mean))
            .collect(),
        SIMULATED.paint(),
        Some("simulated mean"),
    )
    .x_ticks(month_ticks());
    if let Some(obs) = &hydrograph.obs {
        figure = figure.line(
            obs.day_of_year_stats()
                .iter()
                .map(|(day, mean, _, _)| (*day as f64, *mean))
                .collect(),
            OBSERVED.paint(),
            Some("observed mean"),
        );
    }
    figure.save(&dir.join(file_name(sim, "mean_annual_hydrograph")))
}

/// one simulated line per year over the day of year mean
pub fn spaghetti_annual_hydrograph(hydrograph: &Hydrograph, dir: &Path) -> Result<PathBuf> {
    let sim = &hydrograph.sim;
    let years = sim.by_year();
    let ink = WheelInk::new(years.len());

    let mut figure = Figure::new(
        format!("{} annual hydrographs", sim.name),
        DAY_OF_YEAR,
        DISCHARGE,
    );
    for (index, days) in years.values().enumerate() {
        figure = figure.trace(
            days.iter().map(|(day, q)| (*day as f64, *q)).collect(),
            ink.paint(index),
        );
    }
    figure
        .line(
            sim.day_of_year_stats()
                .iter()
                .map(|(day, mean, _, _)| (*day as f64, *mean))
                .collect(),
            OBSERVED.paint(),
            Some("mean"),
        )
        .x_ticks(month_ticks())
        .save(&dir.join(file_name(sim, "spaghetti_annual_hydrograph")))
}

/* # statistics */

/// one graph per statistic series, optionally annotated with its Mann-Kendall verdict
pub fn ts_graphs(
    series: &[TimeSeries],
    trend: bool,
    alpha: f64,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    series
        .iter()
        .map(|ts| {
            let mut title = ts.name.clone();
            let mut figure_points = points(ts);
            let mut slope_line = None;
            if trend {
                let values = ts.finite();
                let test = mk_test_calc(&values, alpha)?;
                title = format!(
                    "{}: {} (p = {:.3}, α = {})",
                    ts.name,
                    test.trend.label(),
                    test.p,
                    alpha
                );
                if let Some(slope) = sens_slope(&values) {
                    slope_line = Some(trend_line(ts, slope));
                }
            }
            figure_points.retain(|(_, v)| v.is_finite());
            let mut graph =
                Figure::new(title, "Year", &ts.name).line(figure_points, SIMULATED.paint(), None);
            if let Some(line) = slope_line {
                graph = graph.line(line, TREND.paint(), Some("Sen slope"));
            }
            graph.save(&dir.join(file_name(ts, "trend")))
        })
        .collect()
}

/// line of the given slope per step through the median intercept
fn trend_line(ts: &TimeSeries, slope: f64) -> Vec<(f64, f64)> {
    let finite = ts
        .iter()
        .filter(|(_, v)| v.is_finite())
        .collect::<Vec<(NaiveDateTime, f64)>>();
    let mut intercepts = finite
        .iter()
        .enumerate()
        .map(|(step, (_, value))| value - slope * step as f64)
        .collect::<Vec<f64>>();
    intercepts.sort_by(|a, b| a.total_cmp(b));
    let intercept = match intercepts.len() {
        0 => return Vec::new(),
        n if n % 2 == 0 => (intercepts[n / 2 - 1] + intercepts[n / 2]) / 2.,
        n => intercepts[n / 2],
    };
    finite
        .iter()
        .enumerate()
        .map(|(step, (time, _))| (decimal_year(time), intercept + slope * step as f64))
        .collect()
}

/// density histogram of `values` with the pdf of the named distribution fitted to them
pub fn ts_fit_graph(values: &[f64], distribution: &str, dir: &Path) -> Result<PathBuf> {
    let values = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<f64>>();
    let fit = Distribution::fit(distribution, &values)?;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max - min <= f64::EPSILON {
        return Err(RavenError::validation(
            "values",
            "all values are equal, nothing to fit",
        ));
    }

    let bins = ((values.len() as f64).sqrt().ceil() as usize).max(1);
    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in &values {
        let bin = (((value - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let bars = counts
        .iter()
        .enumerate()
        .map(|(bin, count)| {
            let left = min + bin as f64 * width;
            (
                left,
                left + width,
                *count as f64 / (values.len() as f64 * width),
            )
        })
        .collect();
    let curve = (0..=100)
        .map(|step| {
            let x = min + (max - min) * step as f64 / 100.;
            (x, fit.pdf(x))
        })
        .collect();

    Figure::new(
        format!("{} fit", fit.name()),
        "Value",
        "Probability density",
    )
    .bars(bars, BAND.paint(), "observed")
    .line(curve, TREND.paint(), Some(fit.name()))
    .save(&dir.join(format!("{}_fit.svg", fit.name())))
}
