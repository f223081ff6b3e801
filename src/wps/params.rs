use crate::error::{RavenError, Result};
use std::{fmt, str::FromStr};

/* # models */

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Model {
    /// GR4J with the Cemaneige snow module
    Gr4jCn,
    Hmets,
}

const GR4JCN_NAMES: [&str; 6] = [
    "GR4J_X1",
    "GR4J_X2",
    "GR4J_X3",
    "GR4J_X4",
    "CEMANEIGE_X1",
    "CEMANEIGE_X2",
];
const GR4JCN_DEFAULTS: [f64; 6] = [0.529, -3.396, 407.29, 1.072, 16.9, 0.947];
const GR4JCN_LOWER: [f64; 6] = [0.01, -15.0, 10.0, 0.0, 1.0, 0.0];
const GR4JCN_UPPER: [f64; 6] = [2.5, 10.0, 700.0, 7.0, 30.0, 1.0];

const HMETS_NAMES: [&str; 21] = [
    "GAMMA_SHAPE",
    "GAMMA_SCALE",
    "GAMMA_SHAPE2",
    "GAMMA_SCALE2",
    "MIN_MELT_FACTOR",
    "MAX_MELT_FACTOR",
    "DD_MELT_TEMP",
    "DD_AGGRADATION",
    "SNOW_SWI_MIN",
    "SNOW_SWI_MAX",
    "SWI_REDUCT_COEFF",
    "DD_REFREEZE_TEMP",
    "REFREEZE_FACTOR",
    "REFREEZE_EXP",
    "PET_CORRECTION",
    "HMETS_RUNOFF_COEFF",
    "PERC_COEFF",
    "BASEFLOW_COEFF_1",
    "BASEFLOW_COEFF_2",
    "TOPSOIL",
    "PHREATIC",
];
const HMETS_DEFAULTS: [f64; 21] = [
    9.5019, 0.2774, 6.3942, 0.6884, 1.2875, 5.4134, 2.3641, 0.0973, 0.0464, 0.1998, 0.0222,
    -1.0919, 2.6851, 0.3740, 1.0000, 0.4739, 0.0114, 0.0243, 0.0069, 0.3107211, 0.9161947,
];
const HMETS_LOWER: [f64; 21] = [
    0.3, 0.01, 0.5, 0.15, 0.0, 0.0, -2.0, 0.01, 0.0, 0.01, 0.005, -5.0, 0.0, 0.0, 0.0, 0.0,
    0.00001, 0.0, 0.00001, 0.0, 0.0,
];
const HMETS_UPPER: [f64; 21] = [
    20.0, 5.0, 13.0, 1.5, 20.0, 20.0, 3.0, 0.2, 0.1, 0.3, 0.1, 2.0, 5.0, 1.0, 3.0, 1.0, 0.02,
    0.1, 0.01, 0.5, 2.0,
];

impl Model {
    pub fn name(&self) -> &'static str {
        match self {
            Model::Gr4jCn => "GR4JCN",
            Model::Hmets => "HMETS",
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Model::Gr4jCn => &GR4JCN_NAMES,
            Model::Hmets => &HMETS_NAMES,
        }
    }

    pub fn count(&self) -> usize {
        self.names().len()
    }

    pub fn defaults(&self) -> &'static [f64] {
        match self {
            Model::Gr4jCn => &GR4JCN_DEFAULTS,
            Model::Hmets => &HMETS_DEFAULTS,
        }
    }

    /// calibration search space used when no bounds are given
    pub fn bounds(&self) -> (&'static [f64], &'static [f64]) {
        match self {
            Model::Gr4jCn => (&GR4JCN_LOWER, &GR4JCN_UPPER),
            Model::Hmets => (&HMETS_LOWER, &HMETS_UPPER),
        }
    }
}

impl FromStr for Model {
    type Err = RavenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GR4JCN" | "GR4J-CEMANEIGE" | "GR4J_CEMANEIGE" => Ok(Model::Gr4jCn),
            "HMETS" => Ok(Model::Hmets),
            other => Err(RavenError::validation(
                "model",
                format!("unknown model {}", other),
            )),
        }
    }
}

/* # parameter sets */

/// ordered parameter values of one model, always of the model's length
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSet {
    model: Model,
    values: Vec<f64>,
}

impl ParamSet {
    pub fn new(model: Model, values: Vec<f64>) -> Result<Self> {
        if values.len() != model.count() {
            return Err(RavenError::validation(
                "params",
                format!(
                    "{} expects {} parameters, got {}",
                    model.name(),
                    model.count(),
                    values.len()
                ),
            ));
        }
        if let Some((name, value)) = model
            .names()
            .iter()
            .zip(&values)
            .find(|(_, value)| !value.is_finite())
        {
            return Err(RavenError::validation(
                "params",
                format!("{} is {}", name, value),
            ));
        }
        Ok(Self { model, values })
    }

    pub fn defaults(model: Model) -> Self {
        Self {
            model,
            values: model.defaults().to_vec(),
        }
    }

    pub fn lower(model: Model) -> Self {
        Self {
            model,
            values: model.bounds().0.to_vec(),
        }
    }

    pub fn upper(model: Model) -> Self {
        Self {
            model,
            values: model.bounds().1.to_vec(),
        }
    }

    /// parse a comma separated literal such as `0.529, -3.396, ...`
    pub fn parse(model: Model, text: &str) -> Result<Self> {
        let values = text
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    RavenError::validation("params", format!("{} is not a number", token))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::new(model, values)
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.model
            .names()
            .iter()
            .position(|n| *n == name)
            .map(|index| self.values[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.model
            .names()
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// every value within `[lower, upper]`, with `lower <= upper`
    pub fn check_bounds(&self, lower: &ParamSet, upper: &ParamSet) -> Result<()> {
        if lower.model != self.model || upper.model != self.model {
            return Err(RavenError::validation(
                "params",
                "bounds belong to another model",
            ));
        }
        for (((name, value), lo), hi) in self.iter().zip(&lower.values).zip(&upper.values) {
            if lo > hi {
                return Err(RavenError::validation(
                    "lowerBounds",
                    format!("{}: lower bound {} above upper bound {}", name, lo, hi),
                ));
            }
            if value < *lo || value > *hi {
                return Err(RavenError::validation(
                    "params",
                    format!("{} = {} outside [{}, {}]", name, value, lo, hi),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "{}", text)
    }
}
