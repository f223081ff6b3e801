use crate::{
    carto::datum::LonLat,
    error::{RavenError, Result},
    wps::params::{Model, ParamSet},
};
use csv::ReaderBuilder;
use log::{info, trace, warn};
use nalgebra::{DMatrix, DVector};
use ord_subset::OrdSubsetIterExt;
use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

/* # methods */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// closest donor in space
    Sp,
    /// closest donor in property space
    Ps,
    SpIdw,
    PsIdw,
    /// multiple linear regression on the properties
    Mlr,
    /// regression plus inverse distance weighted residuals of spatial neighbours
    SpIdwRa,
    /// regression plus inverse distance weighted residuals of similar neighbours
    PsIdwRa,
}

impl Method {
    fn spatial(&self) -> bool {
        matches!(self, Method::Sp | Method::SpIdw | Method::SpIdwRa)
    }

    fn regression(&self) -> bool {
        matches!(self, Method::Mlr | Method::SpIdwRa | Method::PsIdwRa)
    }
}

impl FromStr for Method {
    type Err = RavenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SP" => Ok(Method::Sp),
            "PS" => Ok(Method::Ps),
            "SP_IDW" => Ok(Method::SpIdw),
            "PS_IDW" => Ok(Method::PsIdw),
            "MLR" => Ok(Method::Mlr),
            "SP_IDW_RA" => Ok(Method::SpIdwRa),
            "PS_IDW_RA" => Ok(Method::PsIdwRa),
            other => Err(RavenError::validation(
                "method",
                format!("unknown regionalization method {}", other),
            )),
        }
    }
}

/* # tables */

/// physiographic properties of a gauged basin
#[derive(Clone, Debug, PartialEq)]
pub struct Gauged {
    pub id: String,
    pub location: LonLat,
    pub properties: Vec<f64>,
}

/// calibrated parameters of a gauged basin
#[derive(Clone, Debug, PartialEq)]
pub struct Calibrated {
    pub id: String,
    pub nse: f64,
    pub params: ParamSet,
}

/// the basin receiving parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Ungauged {
    pub location: LonLat,
    pub properties: Vec<f64>,
}

type Row = BTreeMap<String, String>;

fn read_rows(path: &Path) -> Result<Vec<Row>> {
    read_rows_from(&fs::read_to_string(path)?)
}

fn read_rows_from(text: &str) -> Result<Vec<Row>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let rows = reader
        .deserialize::<Row>()
        .collect::<std::result::Result<Vec<Row>, csv::Error>>()?;
    Ok(rows)
}

fn number(row: &Row, column: &str) -> Result<f64> {
    let field = row
        .get(column)
        .ok_or_else(|| RavenError::validation(column, "column missing from table"))?;
    field
        .parse::<f64>()
        .map_err(|_| RavenError::validation(column, format!("{} is not a number", field)))
}

fn identifier(row: &Row) -> Result<String> {
    row.get("ID")
        .cloned()
        .ok_or_else(|| RavenError::validation("ID", "column missing from table"))
}

fn gauged_properties(rows: &[Row], properties: &[&str]) -> Result<Vec<Gauged>> {
    rows.iter()
        .map(|row| {
            Ok(Gauged {
                id: identifier(row)?,
                location: LonLat::new(number(row, "longitude")?, number(row, "latitude")?),
                properties: properties
                    .iter()
                    .map(|name| number(row, name))
                    .collect::<Result<Vec<f64>>>()?,
            })
        })
        .collect()
}

fn gauged_params(rows: &[Row], model: Model) -> Result<Vec<Calibrated>> {
    rows.iter()
        .map(|row| {
            let values = model
                .names()
                .iter()
                .map(|name| number(row, name))
                .collect::<Result<Vec<f64>>>()?;
            Ok(Calibrated {
                id: identifier(row)?,
                nse: number(row, "NASH")?,
                params: ParamSet::new(model, values)?,
            })
        })
        .collect()
}

/// gauged basin table with `ID`, `latitude`, `longitude` and the requested property columns
pub fn read_gauged_properties(path: &Path, properties: &[&str]) -> Result<Vec<Gauged>> {
    gauged_properties(&read_rows(path)?, properties)
}

/// calibration table with `ID`, `NASH` and one column per model parameter
pub fn read_gauged_params(path: &Path, model: Model) -> Result<Vec<Calibrated>> {
    gauged_params(&read_rows(path)?, model)
}

/* # transfer */

/// a gauged basin eligible to give its parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Donor {
    pub id: String,
    pub location: LonLat,
    pub properties: Vec<f64>,
    pub params: ParamSet,
    pub nse: f64,
    /// distance to the ungauged basin, in kilometers or in property space
    pub distance: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Regionalized {
    pub params: ParamSet,
    /// donors that contributed, closest first
    pub donors: Vec<Donor>,
}

fn donors(gauged: &[Gauged], calibrated: &[Calibrated], min_nse: f64) -> Vec<Donor> {
    let by_id = calibrated
        .iter()
        .map(|c| (c.id.as_str(), c))
        .collect::<BTreeMap<&str, &Calibrated>>();
    let joined = gauged
        .iter()
        .filter_map(|g| by_id.get(g.id.as_str()).map(|c| (g, *c)))
        .collect::<Vec<(&Gauged, &Calibrated)>>();
    let donors = joined
        .iter()
        .filter(|(_, c)| c.nse >= min_nse)
        .map(|(g, c)| Donor {
            id: g.id.clone(),
            location: g.location,
            properties: g.properties.clone(),
            params: c.params.clone(),
            nse: c.nse,
            distance: f64::NAN,
        })
        .collect::<Vec<Donor>>();
    if donors.len() < joined.len() {
        warn!(
            "dropped {} of {} donors calibrated below NSE {}",
            joined.len() - donors.len(),
            joined.len(),
            min_nse
        );
    }
    donors
}

/// sum of absolute property differences scaled by each property's spread among donors
fn similarity(target: &[f64], donors: &mut [Donor]) {
    let spreads = (0..target.len())
        .map(|index| {
            let column = donors.iter().map(|d| d.properties[index]);
            let min = column.clone().ord_subset_min().unwrap_or(0.);
            let max = column.ord_subset_max().unwrap_or(0.);
            max - min
        })
        .collect::<Vec<f64>>();
    for donor in donors.iter_mut() {
        donor.distance = target
            .iter()
            .zip(&donor.properties)
            .zip(&spreads)
            .filter(|(_, spread)| **spread > 0.)
            .map(|((t, p), spread)| (t - p).abs() / spread)
            .sum();
    }
}

fn rank(target: &Ungauged, donors: &mut [Donor], spatial: bool) {
    if spatial {
        for donor in donors.iter_mut() {
            donor.distance = donor.location.haversine(&target.location);
        }
    } else {
        similarity(&target.properties, donors);
    }
    donors.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// inverse distance weighted mean of rows, an exact match takes all the weight
fn idw(rows: &[(f64, Vec<f64>)]) -> Vec<f64> {
    let width = rows.first().map(|(_, row)| row.len()).unwrap_or(0);
    if let Some((_, exact)) = rows.iter().find(|(distance, _)| *distance == 0.) {
        return exact.clone();
    }
    let total = rows.iter().map(|(distance, _)| distance.recip()).sum::<f64>();
    (0..width)
        .map(|column| {
            rows.iter()
                .map(|(distance, row)| row[column] * distance.recip())
                .sum::<f64>()
                / total
        })
        .collect()
}

/// least squares fit with intercept by QR decomposition, evaluated at `x_test`
fn lin_reg(
    x_train: &DMatrix<f64>,
    y_train: &DVector<f64>,
    x_test: &DMatrix<f64>,
) -> Result<DVector<f64>> {
    let columns = x_train.shape().1;
    let qr = x_train
        .clone()
        .insert_column(columns, 1.0)
        .into_owned()
        .qr();
    let (q, r) = (qr.q().transpose(), qr.r());

    // rank deficient designs leave a vanishing pivot on the diagonal of r
    let diagonal = r.diagonal().map(f64::abs);
    if diagonal.min() <= 1e-10 * diagonal.max() {
        return Err(RavenError::Numerical(
            "regression design matrix is singular".into(),
        ));
    }
    let inverse = r
        .try_inverse()
        .ok_or_else(|| RavenError::Numerical("regression design matrix is singular".into()))?;
    let coeff = inverse * &q * y_train;
    let mul = coeff.rows(0, columns);
    let intercept = coeff[(columns, 0)];

    Ok((x_test * mul).add_scalar(intercept))
}

/// per parameter regression on donor properties, predicted at the target and at every donor
fn regression(target: &Ungauged, donors: &[Donor]) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let width = target.properties.len();
    let x_train = DMatrix::<f64>::from_fn(donors.len(), width, |row, column| {
        donors[row].properties[column]
    });
    let x_test = DMatrix::<f64>::from_row_slice(1, width, &target.properties);
    let count = donors
        .first()
        .map(|d| d.params.values().len())
        .unwrap_or(0);

    let mut at_target = Vec::with_capacity(count);
    let mut at_donors = vec![Vec::with_capacity(count); donors.len()];
    for param in 0..count {
        let y_train = DVector::<f64>::from_iterator(
            donors.len(),
            donors.iter().map(|d| d.params.values()[param]),
        );
        at_target.push(lin_reg(&x_train, &y_train, &x_test)?[0]);
        let fitted = lin_reg(&x_train, &y_train, &x_train)?;
        for (row, value) in at_donors.iter_mut().zip(fitted.iter()) {
            row.push(*value);
        }
    }
    trace!("regression prediction {:?}", at_target);
    Ok((at_target, at_donors))
}

/// transfer calibrated parameters from gauged donors to an ungauged basin
pub fn regionalize(
    method: Method,
    model: Model,
    target: &Ungauged,
    gauged: &[Gauged],
    calibrated: &[Calibrated],
    size: usize,
    min_nse: f64,
) -> Result<Regionalized> {
    if size == 0 {
        return Err(RavenError::validation("size", "at least one donor is needed"));
    }
    if let Some(donor) = gauged
        .iter()
        .find(|g| g.properties.len() != target.properties.len())
    {
        return Err(RavenError::validation(
            "properties",
            format!(
                "donor {} has {} properties, target has {}",
                donor.id,
                donor.properties.len(),
                target.properties.len()
            ),
        ));
    }
    if let Some(c) = calibrated.iter().find(|c| c.params.model() != model) {
        return Err(RavenError::validation(
            "params",
            format!("donor {} was calibrated with {}", c.id, c.params.model().name()),
        ));
    }

    let mut pool = donors(gauged, calibrated, min_nse);
    let needed = if method.regression() {
        let needed = target.properties.len() + 2;
        if method == Method::Mlr {
            needed
        } else {
            needed.max(size)
        }
    } else {
        size
    };
    if pool.len() < needed {
        return Err(RavenError::InsufficientData {
            needed,
            found: pool.len(),
        });
    }
    info!(
        "regionalizing {} with {:?} over {} donors",
        model.name(),
        method,
        pool.len()
    );

    rank(target, &mut pool, method.spatial() || method == Method::Mlr);

    let values = match method {
        Method::Sp | Method::Ps => {
            pool.truncate(size);
            pool[0].params.values().to_vec()
        }
        Method::SpIdw | Method::PsIdw => {
            pool.truncate(size);
            idw(&pool
                .iter()
                .map(|d| (d.distance, d.params.values().to_vec()))
                .collect::<Vec<(f64, Vec<f64>)>>())
        }
        Method::Mlr => regression(target, &pool)?.0,
        Method::SpIdwRa | Method::PsIdwRa => {
            let (prediction, fitted) = regression(target, &pool)?;
            let residuals = pool
                .iter()
                .zip(&fitted)
                .take(size)
                .map(|(donor, fit)| {
                    (
                        donor.distance,
                        donor
                            .params
                            .values()
                            .iter()
                            .zip(fit)
                            .map(|(p, f)| p - f)
                            .collect::<Vec<f64>>(),
                    )
                })
                .collect::<Vec<(f64, Vec<f64>)>>();
            pool.truncate(size);
            prediction
                .iter()
                .zip(idw(&residuals))
                .map(|(p, r)| p + r)
                .collect()
        }
    };
    Ok(Regionalized {
        params: ParamSet::new(model, values)?,
        donors: pool,
    })
}
