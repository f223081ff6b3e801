use crate::error::{RavenError, Result};
use csv::ReaderBuilder;
use std::{collections::BTreeMap, fs, path::Path};

/// one row of the engine's diagnostics file
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticRow {
    pub series: String,
    pub filename: String,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub rows: Vec<DiagnosticRow>,
}

impl Diagnostics {
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<String>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = DiagnosticRow {
                series: record.get(0).unwrap_or("").trim().to_string(),
                filename: record.get(1).unwrap_or("").trim().to_string(),
                metrics: BTreeMap::new(),
            };
            for (name, field) in headers.iter().zip(record.iter()).skip(2) {
                if name.is_empty() {
                    continue;
                }
                if let Ok(value) = field.trim().parse::<f64>() {
                    row.metrics.insert(name.clone(), value);
                }
            }
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(RavenError::Engine("diagnostics file has no rows".into()));
        }
        Ok(Self { rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// metric of the first observation series
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.rows.first().and_then(|row| row.metrics.get(name).copied())
    }
}

fn paired(observed: &[f64], simulated: &[f64]) -> Vec<(f64, f64)> {
    observed
        .iter()
        .zip(simulated)
        .filter(|(o, s)| o.is_finite() && s.is_finite())
        .map(|(o, s)| (*o, *s))
        .collect()
}

/// Nash-Sutcliffe efficiency over steps where both series have data
pub fn nse(observed: &[f64], simulated: &[f64]) -> f64 {
    let pairs = paired(observed, simulated);
    if pairs.is_empty() {
        return f64::NAN;
    }
    let mean = pairs.iter().map(|(o, _)| o).sum::<f64>() / pairs.len() as f64;
    let numerator = pairs.iter().map(|(o, s)| (o - s).powi(2)).sum::<f64>();
    let denominator = pairs.iter().map(|(o, _)| (o - mean).powi(2)).sum::<f64>();
    if denominator == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - numerator / denominator
}

/// root mean square error over steps where both series have data
pub fn rmse(observed: &[f64], simulated: &[f64]) -> f64 {
    let pairs = paired(observed, simulated);
    if pairs.is_empty() {
        return f64::NAN;
    }
    (pairs.iter().map(|(o, s)| (o - s).powi(2)).sum::<f64>() / pairs.len() as f64).sqrt()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use float_eq::assert_float_eq;

    pub const DIAGNOSTICS: &str = "\
observed data series,filename,DIAG_NASH_SUTCLIFFE,DIAG_RMSE,
HYDROGRAPH,Salmon-River-Near-Prince-George_meteo_daily.nc,-1.43474,80.8459,
";

    #[test]
    fn parse_engine_file() {
        let diagnostics = Diagnostics::parse(DIAGNOSTICS).unwrap();
        assert_eq!(diagnostics.rows.len(), 1);
        assert_eq!(diagnostics.rows[0].series, "HYDROGRAPH");
        assert_float_eq!(
            diagnostics.metric("DIAG_NASH_SUTCLIFFE").unwrap(),
            -1.43474,
            abs <= 1e-4
        );
        assert_float_eq!(diagnostics.metric("DIAG_RMSE").unwrap(), 80.8459, abs <= 1e-4);
        assert_eq!(diagnostics.metric("DIAG_KLING_GUPTA"), None);
    }

    #[test]
    fn empty_file() {
        assert!(matches!(
            Diagnostics::parse("observed data series,filename,DIAG_RMSE\n"),
            Err(RavenError::Engine(_))
        ));
    }

    #[test]
    fn perfect_fit() {
        let q = [1., 2., 3., 4.];
        assert_float_eq!(nse(&q, &q), 1., abs <= 1e-12);
        assert_float_eq!(rmse(&q, &q), 0., abs <= 1e-12);
    }

    #[test]
    fn gaps_are_skipped() {
        let obs = [1., f64::NAN, 3.];
        let sim = [2., 100., 2.];
        assert_float_eq!(rmse(&obs, &sim), 1., abs <= 1e-12);
        // mean of observed is 2, each error equals the deviation
        assert_float_eq!(nse(&obs, &sim), 0., abs <= 1e-12);
    }
}
