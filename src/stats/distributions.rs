use crate::error::{RavenError, Result};
use std::f64::consts::{PI, SQRT_2};

const EULER_GAMMA: f64 = 0.5772156649015329;

/// error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7)
pub fn erf(x: f64) -> f64 {
    let t = (1. + 0.3275911 * x.abs()).recip();
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let y = 1. - poly * (-x * x).exp();
    y.copysign(x)
}

/// standard normal cumulative distribution
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1. + erf(x / SQRT_2))
}

/// standard normal quantile, Acklam's rational approximation
pub fn norm_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.)
    };

    if p <= 0. {
        f64::NEG_INFINITY
    } else if p >= 1. {
        f64::INFINITY
    } else if p < P_LOW {
        tail((-2. * p.ln()).sqrt())
    } else if p > 1. - P_LOW {
        -tail((-2. * (1. - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.)
    }
}

fn moments(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.);
    (mean, var.sqrt())
}

/// distributions fitted to annual statistics
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Distribution {
    Normal { loc: f64, scale: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Gumbel { loc: f64, scale: f64 },
}

impl Distribution {
    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Normal { .. } => "norm",
            Distribution::LogNormal { .. } => "lognorm",
            Distribution::Gumbel { .. } => "gumbel_r",
        }
    }

    pub fn pdf(&self, x: f64) -> f64 {
        match *self {
            Distribution::Normal { loc, scale } => {
                let z = (x - loc) / scale;
                (-0.5 * z * z).exp() / (scale * (2. * PI).sqrt())
            }
            Distribution::LogNormal { mu, sigma } => {
                if x <= 0. {
                    0.
                } else {
                    let z = (x.ln() - mu) / sigma;
                    (-0.5 * z * z).exp() / (x * sigma * (2. * PI).sqrt())
                }
            }
            Distribution::Gumbel { loc, scale } => {
                let z = (x - loc) / scale;
                (-(z + (-z).exp())).exp() / scale
            }
        }
    }

    /// method of moments fit of the named distribution
    pub fn fit(name: &str, values: &[f64]) -> Result<Self> {
        if values.len() < 2 {
            return Err(RavenError::InsufficientData {
                needed: 2,
                found: values.len(),
            });
        }
        match name {
            "norm" => {
                let (loc, scale) = moments(values);
                Ok(Distribution::Normal { loc, scale })
            }
            "lognorm" => {
                if values.iter().any(|v| *v <= 0.) {
                    return Err(RavenError::validation(
                        "dist",
                        "lognormal fit needs strictly positive values",
                    ));
                }
                let (mu, sigma) = moments(&values.iter().map(|v| v.ln()).collect::<Vec<f64>>());
                Ok(Distribution::LogNormal { mu, sigma })
            }
            "gumbel_r" => {
                let (mean, std) = moments(values);
                let scale = std * 6f64.sqrt() / PI;
                Ok(Distribution::Gumbel {
                    loc: mean - EULER_GAMMA * scale,
                    scale,
                })
            }
            other => Err(RavenError::validation(
                "dist",
                format!("unknown distribution {}", other),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn cdf_values() {
        assert_float_eq!(norm_cdf(0.), 0.5, abs <= 1e-7);
        assert_float_eq!(norm_cdf(1.959964), 0.975, abs <= 1e-6);
        assert_float_eq!(norm_cdf(-1.), 0.158655, abs <= 1e-6);
    }

    #[test]
    fn ppf_values() {
        assert_float_eq!(norm_ppf(0.975), 1.959964, abs <= 1e-6);
        assert_float_eq!(norm_ppf(0.5), 0., abs <= 1e-9);
        assert_float_eq!(norm_ppf(0.01), -2.326348, abs <= 1e-6);
        assert_eq!(norm_ppf(1.), f64::INFINITY);
    }

    #[test]
    fn pdf_peaks() {
        let normal = Distribution::Normal { loc: 0., scale: 1. };
        assert_float_eq!(normal.pdf(0.), 0.398942, abs <= 1e-6);
        let gumbel = Distribution::Gumbel { loc: 0., scale: 1. };
        assert_float_eq!(gumbel.pdf(0.), (-1f64).exp(), abs <= 1e-12);
        let lognormal = Distribution::LogNormal { mu: 0., sigma: 1. };
        assert_eq!(lognormal.pdf(-1.), 0.);
        assert_float_eq!(lognormal.pdf(1.), 0.398942, abs <= 1e-6);
    }

    #[test]
    fn moment_fits() {
        let values = [1., 2., 3., 4., 5.];
        match Distribution::fit("norm", &values).unwrap() {
            Distribution::Normal { loc, scale } => {
                assert_float_eq!(loc, 3., abs <= 1e-12);
                assert_float_eq!(scale, 2.5f64.sqrt(), abs <= 1e-12);
            }
            other => panic!("unexpected fit {:?}", other),
        }
        assert!(Distribution::fit("lognorm", &[0., 1.]).is_err());
        assert!(Distribution::fit("weibull", &values).is_err());
        assert!(Distribution::fit("norm", &[1.]).is_err());
    }
}
