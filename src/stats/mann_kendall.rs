use crate::{
    error::{RavenError, Result},
    stats::distributions::{norm_cdf, norm_ppf},
    vars::{MK_MIN_SAMPLES, MK_WARN_SAMPLES},
};
use itertools::Itertools;
use log::{trace, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Trend {
    Increasing,
    Decreasing,
    NoTrend,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::NoTrend => "no trend",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MannKendall {
    pub trend: Trend,
    /// whether the trend is significant at the requested level
    pub h: bool,
    /// two sided p-value
    pub p: f64,
    pub z: f64,
    pub s: f64,
    pub var_s: f64,
}

/// reject series too short for the test, warn on series too short to trust
pub fn check_num_samples(x: &[f64]) -> Result<()> {
    let n = x.len();
    if n < MK_MIN_SAMPLES {
        return Err(RavenError::validation(
            "series",
            format!(
                "Mann-Kendall needs at least {} values, got {}",
                MK_MIN_SAMPLES, n
            ),
        ));
    }
    if n < MK_WARN_SAMPLES {
        warn!(
            "Mann-Kendall test on {} values, the normal approximation is unreliable below {}",
            n, MK_WARN_SAMPLES
        );
    }
    Ok(())
}

fn sign(value: f64) -> f64 {
    if value > 0. {
        1.
    } else if value < 0. {
        -1.
    } else {
        0.
    }
}

/// sizes of groups of equal values
fn ties(x: &[f64]) -> Vec<usize> {
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let groups = sorted.iter().group_by(|value| **value);
    let sizes = groups.into_iter().map(|(_, group)| group.count()).collect();
    sizes
}

/// Mann-Kendall test for a monotonic trend at significance level `alpha`
pub fn mk_test_calc(x: &[f64], alpha: f64) -> Result<MannKendall> {
    check_num_samples(x)?;
    if !(0. < alpha && alpha < 1.) {
        return Err(RavenError::validation(
            "alpha",
            format!("{} is not in (0, 1)", alpha),
        ));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(RavenError::validation("series", "contains missing values"));
    }

    let n = x.len() as f64;
    let s = x
        .iter()
        .tuple_combinations()
        .map(|(earlier, later)| sign(later - earlier))
        .sum::<f64>();

    let correction = ties(x)
        .into_iter()
        .filter(|&t| t > 1)
        .map(|t| {
            let t = t as f64;
            t * (t - 1.) * (2. * t + 5.)
        })
        .sum::<f64>();
    let var_s = (n * (n - 1.) * (2. * n + 5.) - correction) / 18.;

    let z = if s > 0. && var_s > 0. {
        (s - 1.) / var_s.sqrt()
    } else if s < 0. && var_s > 0. {
        (s + 1.) / var_s.sqrt()
    } else {
        0.
    };

    let p = 2. * (1. - norm_cdf(z.abs()));
    let h = z.abs() > norm_ppf(1. - alpha / 2.);
    let trend = match (h, z) {
        (true, z) if z > 0. => Trend::Increasing,
        (true, z) if z < 0. => Trend::Decreasing,
        _ => Trend::NoTrend,
    };
    trace!("mann-kendall s={} var={} z={} p={}", s, var_s, z, p);

    Ok(MannKendall {
        trend,
        h,
        p,
        z,
        s,
        var_s,
    })
}

/// Theil-Sen slope per time step
pub fn sens_slope(x: &[f64]) -> Option<f64> {
    let mut slopes = x
        .iter()
        .enumerate()
        .tuple_combinations()
        .map(|((i, a), (j, b))| (b - a) / (j - i) as f64)
        .collect::<Vec<f64>>();
    if slopes.is_empty() {
        return None;
    }
    slopes.sort_by(|a, b| a.total_cmp(b));
    let mid = slopes.len() / 2;
    Some(if slopes.len() % 2 == 0 {
        (slopes[mid - 1] + slopes[mid]) / 2.
    } else {
        slopes[mid]
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vars::MK_ALPHA;
    use float_eq::assert_float_eq;

    #[test]
    fn increasing_series() {
        let x = (0..20).map(f64::from).collect::<Vec<f64>>();
        let result = mk_test_calc(&x, MK_ALPHA).unwrap();
        assert_eq!(result.trend, Trend::Increasing);
        assert!(result.h);
        assert_float_eq!(result.s, 190., abs <= 1e-12);
        assert_float_eq!(result.var_s, 20. * 19. * 45. / 18., abs <= 1e-9);
        assert!(result.p < 1e-6);
    }

    #[test]
    fn decreasing_series() {
        let x = (0..12).map(|v| -f64::from(v).powi(2)).collect::<Vec<f64>>();
        assert_eq!(mk_test_calc(&x, MK_ALPHA).unwrap().trend, Trend::Decreasing);
    }

    #[test]
    fn constant_series() {
        let result = mk_test_calc(&[4.; 15], MK_ALPHA).unwrap();
        assert_eq!(result.trend, Trend::NoTrend);
        assert!(!result.h);
        assert_eq!(result.z, 0.);
        assert_float_eq!(result.p, 1., abs <= 1e-6);
    }

    #[test]
    fn tie_correction() {
        // one pair of ties: n=5 gives 5*4*15 = 300, minus 2*1*9 = 18
        let result = mk_test_calc(&[1., 2., 2., 3., 4.], MK_ALPHA).unwrap();
        assert_float_eq!(result.var_s, (300. - 18.) / 18., abs <= 1e-12);
        assert_float_eq!(result.s, 9., abs <= 1e-12);
        assert_float_eq!(result.z, 8. / result.var_s.sqrt(), abs <= 1e-12);
    }

    #[test]
    fn alternating_series_has_no_trend() {
        let x = [1., 3., 1., 3., 1., 3., 1., 3., 1., 3.];
        assert_eq!(mk_test_calc(&x, MK_ALPHA).unwrap().trend, Trend::NoTrend);
    }

    #[test]
    fn too_short() {
        assert!(matches!(
            mk_test_calc(&[1., 2.], MK_ALPHA),
            Err(RavenError::Validation { .. })
        ));
        assert!(check_num_samples(&[1., 2., 3.]).is_ok());
    }

    #[test]
    fn bad_alpha_and_gaps() {
        assert!(mk_test_calc(&[1., 2., 3.], 1.5).is_err());
        assert!(mk_test_calc(&[1., f64::NAN, 3.], MK_ALPHA).is_err());
    }

    #[test]
    fn sen_slope() {
        assert_float_eq!(sens_slope(&[1., 3., 5., 7.]).unwrap(), 2., abs <= 1e-12);
        assert_float_eq!(
            sens_slope(&[0., 10., 1., 2.]).unwrap(),
            // slopes sorted: -9, -4, 0.5, 0.667, 1, 10
            (0.5 + 2. / 3.) / 2.,
            abs <= 1e-12
        );
        assert_eq!(sens_slope(&[1.]), None);
    }
}
