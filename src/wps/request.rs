use crate::{
    error::{RavenError, Result},
    wps::io::{InputSpec, Kind},
};
use chrono::{NaiveDate, NaiveDateTime};
use log::trace;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

const HREF: &str = "@xlink:href=";

/// one value given for an input
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Literal(String),
    File(PathBuf),
}

fn parse_value(text: &str) -> Value {
    match text.find(HREF) {
        Some(at) => {
            let href = text[at + HREF.len()..].trim();
            Value::File(PathBuf::from(href.strip_prefix("file://").unwrap_or(href)))
        }
        None => Value::Literal(text.trim().to_string()),
    }
}

/// split KVP `datainputs` such as `ts=files@xlink:href=file:///a.nc;area=4250.6`
pub fn parse_datainputs(text: &str) -> Result<Vec<(String, Value)>> {
    text.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                RavenError::validation("datainputs", format!("{} is not key=value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(RavenError::validation(
                    "datainputs",
                    format!("{} has no identifier", pair),
                ));
            }
            Ok((key.to_string(), parse_value(value)))
        })
        .collect()
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
        })
}

fn check_value(spec: &InputSpec, value: &Value) -> Result<()> {
    let invalid = |reason: String| Err(RavenError::validation(spec.identifier, reason));
    let literal = match (spec.kind, value) {
        (Kind::File, Value::File(_)) => return Ok(()),
        (Kind::File, Value::Literal(text)) => {
            return invalid(format!("{} is not a file reference", text))
        }
        (_, Value::File(path)) => {
            return invalid(format!("expected a literal, got file {}", path.display()))
        }
        (_, Value::Literal(text)) => text,
    };
    let ok = match spec.kind {
        Kind::Float => literal.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false),
        Kind::Integer => literal.parse::<i64>().is_ok(),
        Kind::DateTime => parse_datetime(literal).is_some(),
        Kind::String | Kind::File => true,
    };
    if !ok {
        return invalid(format!("{} is not a valid {}", literal, spec.kind.name()));
    }
    if !spec.allowed.is_empty() && !spec.allowed.contains(&literal.as_str()) {
        return invalid(format!(
            "{} is not one of {}",
            literal,
            spec.allowed.join(", ")
        ));
    }
    Ok(())
}

/// inputs checked against a process's declarations, defaults filled in
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inputs {
    values: BTreeMap<&'static str, Vec<Value>>,
}

impl Inputs {
    pub fn validate(specs: &[InputSpec], given: Vec<(String, Value)>) -> Result<Self> {
        let mut values = BTreeMap::<&'static str, Vec<Value>>::new();
        for (key, value) in given {
            let spec = specs
                .iter()
                .find(|spec| spec.identifier == key)
                .ok_or_else(|| RavenError::validation(key.as_str(), "unknown input"))?;
            check_value(spec, &value)?;
            values.entry(spec.identifier).or_default().push(value);
        }

        for spec in specs {
            let count = values.get(spec.identifier).map(Vec::len).unwrap_or(0);
            if count == 0 {
                if let Some(default) = spec.default {
                    values.insert(spec.identifier, vec![Value::Literal(default.to_string())]);
                    continue;
                }
            }
            if count < spec.min_occurs {
                return Err(if count == 0 {
                    RavenError::Missing(spec.identifier.to_string())
                } else {
                    RavenError::validation(
                        spec.identifier,
                        format!("needs at least {} values, got {}", spec.min_occurs, count),
                    )
                });
            }
            if count > spec.max_occurs {
                return Err(RavenError::validation(
                    spec.identifier,
                    format!("accepts at most {} values, got {}", spec.max_occurs, count),
                ));
            }
        }
        trace!("validated inputs {:?}", values.keys().collect::<Vec<_>>());
        Ok(Self { values })
    }

    pub fn all(&self, identifier: &str) -> &[Value] {
        self.values
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn literal(&self, identifier: &str) -> Option<&str> {
        self.all(identifier).iter().find_map(|value| match value {
            Value::Literal(text) => Some(text.as_str()),
            Value::File(_) => None,
        })
    }

    pub fn literals(&self, identifier: &str) -> Vec<&str> {
        self.all(identifier)
            .iter()
            .filter_map(|value| match value {
                Value::Literal(text) => Some(text.as_str()),
                Value::File(_) => None,
            })
            .collect()
    }

    pub fn files(&self, identifier: &str) -> Vec<&Path> {
        self.all(identifier)
            .iter()
            .filter_map(|value| match value {
                Value::File(path) => Some(path.as_path()),
                Value::Literal(_) => None,
            })
            .collect()
    }

    pub fn file(&self, identifier: &str) -> Option<&Path> {
        self.files(identifier).into_iter().next()
    }

    pub fn float(&self, identifier: &str) -> Result<Option<f64>> {
        self.literal(identifier)
            .map(|text| {
                text.parse::<f64>().map_err(|_| {
                    RavenError::validation(identifier, format!("{} is not a float", text))
                })
            })
            .transpose()
    }

    pub fn integer(&self, identifier: &str) -> Result<Option<i64>> {
        self.literal(identifier)
            .map(|text| {
                text.parse::<i64>().map_err(|_| {
                    RavenError::validation(identifier, format!("{} is not an integer", text))
                })
            })
            .transpose()
    }

    pub fn datetime(&self, identifier: &str) -> Result<Option<NaiveDateTime>> {
        self.literal(identifier)
            .map(|text| {
                parse_datetime(text).ok_or_else(|| {
                    RavenError::validation(identifier, format!("{} is not a date", text))
                })
            })
            .transpose()
    }
}
