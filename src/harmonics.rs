//! Back-azimuth harmonic decomposition.
//!
//! At every time sample independently, the radial and transverse amplitudes
//! of all accepted receiver functions are regressed jointly onto a truncated
//! Fourier basis in back-azimuth (constant, first and second order). The
//! transverse rows use the radial basis phase-advanced by 90 degrees in the
//! harmonic argument, which couples the two components and makes the
//! transverse vanish for azimuth-independent structure.
//!
//! The design matrix is shared by all time samples, so it is factorized once
//! and its conditioning checked once. A rank-deficient design (sparse or
//! clustered back-azimuth coverage) produces a ridge-regularized solution
//! flagged `degraded`, never a silently arbitrary least-norm answer.

use crate::data_container::{HarmonicModel, RfCatalog, RfPair};
use crate::errors::{RfError, RfResult};
use log::{info, warn};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of basis functions: constant, cos, sin, cos2, sin2.
const N_TERMS: usize = 5;

/// Parameters of the harmonic fit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HarmonicConfig {
    /// Azimuth the decomposition is referenced to, degrees.
    pub azimuth_deg: f64,
    /// When set, search for the azimuth that minimizes first-order sine
    /// energy inside `search_range` instead of using `azimuth_deg`.
    pub find_azimuth: bool,
    /// Time range (seconds after onset) scored by the azimuth search.
    pub search_range: (f64, f64),
    /// Condition-number limit of the normal matrix beyond which the fit is
    /// flagged degraded.
    pub condition_limit: f64,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        HarmonicConfig {
            azimuth_deg: 0.0,
            find_azimuth: false,
            search_range: (0.0, 10.0),
            condition_limit: 1e5,
        }
    }
}

impl HarmonicConfig {
    pub fn validate(&self) -> RfResult<()> {
        if !self.azimuth_deg.is_finite() {
            return Err(RfError::configuration("harmonic azimuth must be finite"));
        }
        if self.search_range.1 <= self.search_range.0 {
            return Err(RfError::configuration(
                "azimuth search range must be ascending",
            ));
        }
        if !(self.condition_limit > 1.0) {
            return Err(RfError::configuration(
                "condition limit must exceed one",
            ));
        }
        Ok(())
    }
}

/// Radial basis functions at harmonic argument `phi` (radians).
pub fn basis_radial(phi: f64) -> [f64; N_TERMS] {
    [
        1.0,
        phi.cos(),
        phi.sin(),
        (2.0 * phi).cos(),
        (2.0 * phi).sin(),
    ]
}

/// Transverse basis functions: the radial basis with each harmonic advanced
/// by 90 degrees in its argument, and no constant term.
pub fn basis_transverse(phi: f64) -> [f64; N_TERMS] {
    [
        0.0,
        -phi.sin(),
        phi.cos(),
        -(2.0 * phi).sin(),
        (2.0 * phi).cos(),
    ]
}

/// LU factorization with partial pivoting of the 5x5 normal matrix.
/// Returns `None` on an exactly singular matrix.
fn lu_factor(mut a: [[f64; N_TERMS]; N_TERMS]) -> Option<([[f64; N_TERMS]; N_TERMS], [usize; N_TERMS])> {
    let mut perm = [0usize; N_TERMS];
    for (i, p) in perm.iter_mut().enumerate() {
        *p = i;
    }
    for col in 0..N_TERMS {
        let mut pivot_row = col;
        let mut pivot_val = a[col][col].abs();
        for row in col + 1..N_TERMS {
            if a[row][col].abs() > pivot_val {
                pivot_val = a[row][col].abs();
                pivot_row = row;
            }
        }
        if pivot_val == 0.0 {
            return None;
        }
        if pivot_row != col {
            a.swap(col, pivot_row);
            perm.swap(col, pivot_row);
        }
        for row in col + 1..N_TERMS {
            let factor = a[row][col] / a[col][col];
            a[row][col] = factor;
            for k in col + 1..N_TERMS {
                a[row][k] -= factor * a[col][k];
            }
        }
    }
    Some((a, perm))
}

fn lu_solve(
    lu: &[[f64; N_TERMS]; N_TERMS],
    perm: &[usize; N_TERMS],
    b: &[f64; N_TERMS],
) -> [f64; N_TERMS] {
    let mut y = [0.0; N_TERMS];
    for i in 0..N_TERMS {
        let mut v = b[perm[i]];
        for (j, yj) in y.iter().enumerate().take(i) {
            v -= lu[i][j] * yj;
        }
        y[i] = v;
    }
    let mut x = [0.0; N_TERMS];
    for i in (0..N_TERMS).rev() {
        let mut v = y[i];
        for j in i + 1..N_TERMS {
            v -= lu[i][j] * x[j];
        }
        x[i] = v / lu[i][i];
    }
    x
}

fn mat_vec(a: &[[f64; N_TERMS]; N_TERMS], v: &[f64; N_TERMS]) -> [f64; N_TERMS] {
    let mut out = [0.0; N_TERMS];
    for i in 0..N_TERMS {
        for j in 0..N_TERMS {
            out[i] += a[i][j] * v[j];
        }
    }
    out
}

fn norm(v: &[f64; N_TERMS]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Condition number estimate of the symmetric normal matrix via power
/// iteration for the largest eigenvalue and inverse iteration for the
/// smallest. Deterministic start vectors keep the estimate reproducible.
fn condition_estimate(a: &[[f64; N_TERMS]; N_TERMS]) -> f64 {
    let mut v = [1.0, 1.0, 1.0, 1.0, 1.0];
    let mut lambda_max = 0.0;
    for _ in 0..100 {
        let av = mat_vec(a, &v);
        let n = norm(&av);
        if n == 0.0 {
            return f64::INFINITY;
        }
        lambda_max = n;
        for (vi, avi) in v.iter_mut().zip(av.iter()) {
            *vi = avi / n;
        }
    }

    let Some((lu, perm)) = lu_factor(*a) else {
        return f64::INFINITY;
    };
    let mut w = [1.0, 0.9, 0.8, 0.7, 0.6];
    let mut inv_lambda = 0.0;
    for _ in 0..100 {
        let x = lu_solve(&lu, &perm, &w);
        let n = norm(&x);
        if !n.is_finite() || n == 0.0 {
            return f64::INFINITY;
        }
        inv_lambda = n;
        for (wi, xi) in w.iter_mut().zip(x.iter()) {
            *wi = xi / n;
        }
    }
    lambda_max * inv_lambda
}

/// One design row: basis coefficients plus where the data value comes from.
struct DesignRow {
    basis: [f64; N_TERMS],
    rf_index: usize,
    transverse: bool,
}

struct Fit {
    coefficients: Array2<f64>,
    condition: f64,
    degraded: bool,
}

fn fit_samples(
    rfs: &[&RfPair],
    azimuth_deg: f64,
    sample_range: std::ops::Range<usize>,
    condition_limit: f64,
) -> Fit {
    let rows: Vec<DesignRow> = rfs
        .iter()
        .enumerate()
        .flat_map(|(i, rf)| {
            let phi = (rf.back_azimuth_deg - azimuth_deg).to_radians();
            [
                DesignRow {
                    basis: basis_radial(phi),
                    rf_index: i,
                    transverse: false,
                },
                DesignRow {
                    basis: basis_transverse(phi),
                    rf_index: i,
                    transverse: true,
                },
            ]
        })
        .collect();

    let mut a = [[0.0; N_TERMS]; N_TERMS];
    for row in &rows {
        for i in 0..N_TERMS {
            for j in 0..N_TERMS {
                a[i][j] += row.basis[i] * row.basis[j];
            }
        }
    }

    let condition = condition_estimate(&a);
    let mut degraded = !condition.is_finite() || condition > condition_limit;
    let factorization = if degraded {
        // ridge regularization keeps the solve defined; the flag tells the
        // caller the coefficients are not independently constrained
        let ridge = 1e-8 * (0..N_TERMS).map(|i| a[i][i]).sum::<f64>() / N_TERMS as f64;
        let mut damped = a;
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] += ridge.max(f64::MIN_POSITIVE);
        }
        lu_factor(damped)
    } else {
        lu_factor(a)
    };
    let Some((lu, perm)) = factorization else {
        // a fully zero design; solve degenerates to zero coefficients
        let n = sample_range.len();
        return Fit {
            coefficients: Array2::zeros((N_TERMS, n)),
            condition: f64::INFINITY,
            degraded: true,
        };
    };
    if degraded {
        warn!(
            "harmonic regression is rank-deficient (condition {condition:.3e}); \
             returning ridge-regularized coefficients"
        );
    }
    degraded = degraded || !condition.is_finite();

    let columns: Vec<[f64; N_TERMS]> = sample_range
        .clone()
        .into_par_iter()
        .map(|t| {
            let mut b = [0.0; N_TERMS];
            for row in &rows {
                let value = if row.transverse {
                    rfs[row.rf_index].transverse[t]
                } else {
                    rfs[row.rf_index].radial[t]
                };
                for (bi, basis) in b.iter_mut().zip(row.basis.iter()) {
                    *bi += basis * value;
                }
            }
            lu_solve(&lu, &perm, &b)
        })
        .collect();

    let mut coefficients = Array2::zeros((N_TERMS, columns.len()));
    for (t, column) in columns.iter().enumerate() {
        for term in 0..N_TERMS {
            coefficients[(term, t)] = column[term];
        }
    }
    Fit {
        coefficients,
        condition,
        degraded,
    }
}

/// Fits the harmonic expansion across the accepted entries of the catalog.
///
/// All accepted receiver functions must share sample rate, length and onset
/// index (they do when produced by one batch run); mixed axes are a skip.
pub fn decompose(catalog: &RfCatalog, config: &HarmonicConfig) -> RfResult<HarmonicModel> {
    config.validate()?;
    let rfs: Vec<&RfPair> = catalog.accepted().collect();
    if rfs.is_empty() {
        return Err(RfError::data_unavailable(
            "no accepted receiver functions to decompose",
        ));
    }
    let first = rfs[0];
    for rf in &rfs {
        if rf.len() != first.len()
            || rf.onset_index != first.onset_index
            || (rf.sample_rate - first.sample_rate).abs() > 1e-9
        {
            return Err(RfError::data_unavailable(
                "catalog mixes receiver functions with different time axes",
            ));
        }
    }
    let n = first.len();
    let time = first.times();

    let azimuth_deg = if config.find_azimuth {
        let az = search_azimuth(&rfs, &time, config);
        info!("harmonic decomposition azimuth search selected {az:.1} deg");
        az
    } else {
        config.azimuth_deg
    };

    let fit = fit_samples(&rfs, azimuth_deg, 0..n, config.condition_limit);
    Ok(HarmonicModel {
        time,
        coefficients: fit.coefficients,
        azimuth_deg,
        condition: fit.condition,
        degraded: fit.degraded,
    })
}

/// Grid search over 0..180 degrees for the reference azimuth minimizing the
/// first-order sine-term energy inside the configured time range.
fn search_azimuth(rfs: &[&RfPair], time: &Array1<f64>, config: &HarmonicConfig) -> f64 {
    let sample_range = {
        let start = time
            .iter()
            .position(|t| *t >= config.search_range.0)
            .unwrap_or(0);
        let end = time
            .iter()
            .rposition(|t| *t <= config.search_range.1)
            .map(|i| i + 1)
            .unwrap_or(time.len());
        start..end.max(start + 1)
    };

    let mut best_az = 0.0;
    let mut best_energy = f64::INFINITY;
    for az_step in 0..180 {
        let az = az_step as f64;
        let fit = fit_samples(rfs, az, sample_range.clone(), config.condition_limit);
        let energy: f64 = fit.coefficients.row(2).iter().map(|c| c * c).sum();
        if energy < best_energy {
            best_energy = energy;
            best_az = az;
        }
    }
    best_az
}
