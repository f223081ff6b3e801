use crate::error::{RavenError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use log::trace;
use std::{collections::BTreeMap, fs, path::Path};

/// values ordered by strictly increasing time
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    pub name: String,
    times: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, times: Vec<NaiveDateTime>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if times.len() != values.len() {
            return Err(RavenError::validation(
                name,
                format!("{} timestamps for {} values", times.len(), values.len()),
            ));
        }
        if let Some(pair) = times.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(RavenError::validation(
                name,
                format!("timestamps not increasing at {}", pair[1]),
            ));
        }
        Ok(Self {
            name,
            times,
            values,
        })
    }

    /// daily series starting at midnight of `start`
    pub fn daily(name: impl Into<String>, start: NaiveDate, values: Vec<f64>) -> Result<Self> {
        let origin = start.and_hms_opt(0, 0, 0).ok_or_else(|| {
            RavenError::validation("start_date", format!("{} has no midnight", start))
        })?;
        let times = (0..values.len())
            .map(|day| origin + chrono::Duration::days(day as i64))
            .collect();
        Self::new(name, times, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// values with missing entries dropped
    pub fn finite(&self) -> Vec<f64> {
        self.values.iter().copied().filter(|v| v.is_finite()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// (day of year, value) pairs for every year in the series
    pub fn by_year(&self) -> BTreeMap<i32, Vec<(u32, f64)>> {
        let mut years = BTreeMap::<i32, Vec<(u32, f64)>>::new();
        for (time, value) in self.iter().filter(|(_, v)| v.is_finite()) {
            years
                .entry(time.year())
                .or_default()
                .push((time.ordinal(), value));
        }
        years
    }

    /// (day of year, mean, min, max) over all years
    pub fn day_of_year_stats(&self) -> Vec<(u32, f64, f64, f64)> {
        let mut days = BTreeMap::<u32, Vec<f64>>::new();
        for (time, value) in self.iter().filter(|(_, v)| v.is_finite()) {
            days.entry(time.ordinal()).or_default().push(value);
        }
        days.into_iter()
            .map(|(day, values)| {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (day, mean, min, max)
            })
            .collect()
    }
}

/* # readers */

fn parse_value(field: &str) -> f64 {
    field.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_time(date: &str, hour: Option<&str>) -> Result<NaiveDateTime> {
    let date = date.trim();
    if let Ok(time) = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S") {
        return Ok(time);
    }
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| RavenError::validation("date", format!("{}: {}", date, e)))?;
    let hour = hour.map(str::trim).unwrap_or("00:00:00");
    NaiveDateTime::parse_from_str(&format!("{} {}", day, hour), "%Y-%m-%d %H:%M:%S")
        .map_err(|e| RavenError::validation("hour", format!("{}: {}", hour, e)))
}

/// simulated and, when present, observed discharge of one basin
#[derive(Clone, Debug)]
pub struct Hydrograph {
    pub sim: TimeSeries,
    pub obs: Option<TimeSeries>,
}

/// read the `Hydrographs.csv` written by Raven
pub fn read_hydrograph(text: &str) -> Result<Hydrograph> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |wanted: &dyn Fn(&str) -> bool| headers.iter().position(|h| wanted(h.trim()));

    let date = column(&|h| h == "date")
        .ok_or_else(|| RavenError::validation("hydrograph", "no date column"))?;
    let hour = column(&|h| h == "hour");
    let sim = column(&|h| h.ends_with("[m3/s]") && !h.contains("observed"))
        .ok_or_else(|| RavenError::validation("hydrograph", "no simulated discharge column"))?;
    let obs = column(&|h| h.ends_with("[m3/s]") && h.contains("observed"));

    let mut times = Vec::new();
    let (mut qsim, mut qobs) = (Vec::new(), Vec::new());
    for record in reader.records() {
        let record = record?;
        let field = |index: usize| record.get(index).unwrap_or("");
        times.push(parse_time(field(date), hour.map(field))?);
        qsim.push(parse_value(field(sim)));
        if let Some(obs) = obs {
            qobs.push(parse_value(field(obs)));
        }
    }
    trace!("read hydrograph with {} steps", times.len());

    let name = headers
        .get(sim)
        .map(|h| h.trim_end_matches("[m3/s]").trim().to_string())
        .unwrap_or_default();
    Ok(Hydrograph {
        obs: match obs {
            Some(_) => Some(TimeSeries::new(
                format!("{} (observed)", name),
                times.clone(),
                qobs,
            )?),
            None => None,
        },
        sim: TimeSeries::new(name, times, qsim)?,
    })
}

pub fn load_hydrograph(path: &Path) -> Result<Hydrograph> {
    read_hydrograph(&fs::read_to_string(path)?)
}

/// read a two column `date,value` table
pub fn read_series(text: &str, name: &str) -> Result<TimeSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let mut times = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        times.push(parse_time(record.get(0).unwrap_or(""), None)?);
        values.push(parse_value(record.get(1).unwrap_or("")));
    }
    TimeSeries::new(name, times, values)
}

pub fn load_series(path: &Path) -> Result<TimeSeries> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("series")
        .to_string();
    read_series(&fs::read_to_string(path)?, &name)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub const HYDROGRAPHS: &str = "\
time,date,hour,precip [mm/day],Salmon [m3/s],Salmon (observed) [m3/s]
0,1954-01-01,00:00:00,---,0,
1,1954-01-02,00:00:00,1.2,139.6,144
2,1954-01-03,00:00:00,0.0,137.1,140
3,1955-01-01,00:00:00,3.1,120.0,118
";

    #[test]
    fn rejects_unordered_times() {
        let day = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(TimeSeries::new("x", vec![day, day], vec![1., 2.]).is_err());
        assert!(TimeSeries::new("x", vec![day], vec![1., 2.]).is_err());
    }

    #[test]
    fn daily_series() {
        let series =
            TimeSeries::daily("q", NaiveDate::from_ymd_opt(2000, 12, 31).unwrap(), vec![1., 2.])
                .unwrap();
        assert_eq!(series.times()[1].year(), 2001);
    }

    #[test]
    fn raven_hydrograph() {
        let hydrograph = read_hydrograph(HYDROGRAPHS).unwrap();
        assert_eq!(hydrograph.sim.name, "Salmon");
        assert_eq!(hydrograph.sim.len(), 4);
        assert_eq!(hydrograph.sim.values()[1], 139.6);
        let obs = hydrograph.obs.unwrap();
        assert!(obs.values()[0].is_nan());
        assert_eq!(obs.finite(), vec![144., 140., 118.]);
    }

    #[test]
    fn hydrograph_without_discharge() {
        assert!(read_hydrograph("time,date,hour\n0,1954-01-01,00:00:00\n").is_err());
    }

    #[test]
    fn grouped_by_year() {
        let hydrograph = read_hydrograph(HYDROGRAPHS).unwrap();
        let years = hydrograph.sim.by_year();
        assert_eq!(years.len(), 2);
        assert_eq!(years[&1954].len(), 3);
        assert_eq!(years[&1955], vec![(1, 120.0)]);

        let days = hydrograph.sim.day_of_year_stats();
        assert_eq!(days[0], (1, 60.0, 0.0, 120.0));
    }

    #[test]
    fn two_column_series() {
        let series = read_series("date,flow\n2000-01-01,1.5\n2000-01-02,2.5\n", "flow").unwrap();
        assert_eq!(series.values(), &[1.5, 2.5]);
    }
}
