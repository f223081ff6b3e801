use crate::{
    error::{RavenError, Result},
    wps::params::Model,
};
use std::{collections::BTreeMap, path::Path};

/// a labelled coordinate axis attached to model outputs
#[derive(Clone, Debug, PartialEq)]
pub struct Coord<T> {
    pub name: &'static str,
    pub values: Vec<T>,
    pub attrs: BTreeMap<&'static str, String>,
}

/// ensemble member axis for `n` realizations
pub fn realization(n: usize) -> Coord<usize> {
    Coord {
        name: "realization",
        values: (0..n).collect(),
        attrs: BTreeMap::from([
            ("long_name", "Ensemble member".to_string()),
            ("standard_name", "realization".to_string()),
            ("axis", "E".to_string()),
            ("units", "1".to_string()),
        ]),
    }
}

/// parameter name axis of a model
pub fn param(model: Model) -> Coord<&'static str> {
    Coord {
        name: "param",
        values: model.names().to_vec(),
        attrs: BTreeMap::from([
            ("standard_name", "parameter".to_string()),
            ("long_name", format!("{} model parameter name", model.name())),
        ]),
    }
}

/// realization index encoded in a file name like `..._r3.nc` or `...r003i1p1...`
pub fn read_realization(path: &Path) -> Result<usize> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| RavenError::validation("realization", "file has no name"))?;
    stem.split(|c: char| c == '_' || c == '-' || c == '.')
        .rev()
        .find_map(|token| {
            let digits = token.strip_prefix('r')?;
            let digits = digits
                .split(|c: char| !c.is_ascii_digit())
                .next()
                .filter(|d| !d.is_empty())?;
            digits.parse::<usize>().ok()
        })
        .ok_or_else(|| {
            RavenError::validation("realization", format!("no realization tag in {}", stem))
        })
}
