//! H-k stacking: a grid search over layer thickness H and Vp/Vs ratio k that
//! stacks each accepted receiver function's amplitude at the predicted
//! arrival times of the primary conversion (Ps) and its first two surface
//! multiples (PpPs, PpSs+PsPs).
//!
//! For a fixed catalog and grid the result is exactly reproducible: the
//! per-RF partial stacks are computed in catalog order and merged
//! sequentially, and ties at the maximum resolve to the lexicographically
//! smallest (H, k) cell.

use crate::data_container::{HkGrid, RfCatalog, RfPair};
use crate::errors::{RfError, RfResult};
use crate::traveltime::{pps_delay, ps_delay, pss_delay};
use interp1d::Interp1d;
use log::{info, warn};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How the three per-phase stacks merge into one stack value per cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HkCombination {
    /// Weighted average using the configured phase weights.
    WeightedSum,
    /// Product of the positive parts of the weighted per-phase stacks,
    /// which rewards cells where all three phases stack constructively.
    Product,
}

/// Grid definition and stacking parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HkConfig {
    /// Layer thickness search range, km.
    pub h_range: (f64, f64),
    pub h_step: f64,
    /// Vp/Vs search range.
    pub k_range: (f64, f64),
    pub k_step: f64,
    /// Assumed average crustal P velocity, km/s.
    pub vp: f64,
    /// Phase weights for (Ps, PpPs, PpSs+PsPs). The third weight is
    /// conventionally negative because the second multiple arrives with
    /// reversed polarity.
    pub weights: [f64; 3],
    pub combination: HkCombination,
}

impl Default for HkConfig {
    fn default() -> Self {
        HkConfig {
            h_range: (20.0, 50.0),
            h_step: 0.5,
            k_range: (1.56, 2.1),
            k_step: 0.02,
            vp: 6.0,
            weights: [0.5, 2.0, -1.0],
            combination: HkCombination::WeightedSum,
        }
    }
}

impl HkConfig {
    pub fn validate(&self) -> RfResult<()> {
        if !(self.h_range.0 > 0.0 && self.h_range.1 > self.h_range.0) {
            return Err(RfError::configuration(
                "H range must be positive and ascending",
            ));
        }
        if !(self.k_range.0 > 1.0 && self.k_range.1 > self.k_range.0) {
            return Err(RfError::configuration(
                "k range must be ascending with k_min > 1",
            ));
        }
        if !(self.h_step > 0.0) || !(self.k_step > 0.0) {
            return Err(RfError::configuration("grid steps must be positive"));
        }
        if !(self.vp > 0.0) {
            return Err(RfError::configuration("crustal Vp must be positive"));
        }
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(RfError::configuration("phase weights must be finite"));
        }
        Ok(())
    }

    fn h_values(&self) -> Array1<f64> {
        let n = ((self.h_range.1 - self.h_range.0) / self.h_step).floor() as usize + 1;
        Array1::from_iter((0..n).map(|i| self.h_range.0 + i as f64 * self.h_step))
    }

    fn k_values(&self) -> Array1<f64> {
        let n = ((self.k_range.1 - self.k_range.0) / self.k_step).floor() as usize + 1;
        Array1::from_iter((0..n).map(|i| self.k_range.0 + i as f64 * self.k_step))
    }
}

/// Amplitudes of one receiver function sampled at the three predicted phase
/// times on every grid cell.
struct PhaseSamples {
    ps: Array2<f64>,
    pps: Array2<f64>,
    pss: Array2<f64>,
}

fn sample_rf(
    rf: &RfPair,
    h_values: &Array1<f64>,
    k_values: &Array1<f64>,
    vp: f64,
) -> PhaseSamples {
    let times = rf.times();
    let t0 = times[0];
    let t1 = times[times.len() - 1];
    let interp = Interp1d::new_unsorted(times.to_vec(), rf.radial.to_vec())
        .expect("receiver function time axis is monotonic");
    let sample = |t: f64| -> f64 {
        if t < t0 || t > t1 {
            // predicted arrival outside the window contributes nothing
            0.0
        } else {
            interp.interpolate(t)
        }
    };

    let p = rf.ray_parameter;
    let shape = (h_values.len(), k_values.len());
    let mut ps = Array2::zeros(shape);
    let mut pps = Array2::zeros(shape);
    let mut pss = Array2::zeros(shape);
    for (i, &h) in h_values.iter().enumerate() {
        for (j, &k) in k_values.iter().enumerate() {
            ps[(i, j)] = sample(ps_delay(h, k, vp, p));
            pps[(i, j)] = sample(pps_delay(h, k, vp, p));
            pss[(i, j)] = sample(pss_delay(h, k, vp, p));
        }
    }
    PhaseSamples { ps, pps, pss }
}

/// Runs the grid search over all accepted entries of the catalog.
///
/// Receiver functions whose ray parameter is incompatible with the assumed
/// Vp (the ray would turn inside the layer) are skipped with a warning.
pub fn hk_stack(catalog: &RfCatalog, config: &HkConfig) -> RfResult<HkGrid> {
    config.validate()?;
    let h_values = config.h_values();
    let k_values = config.k_values();
    let vp = config.vp;

    let usable: Vec<&RfPair> = catalog
        .accepted()
        .filter(|rf| {
            let ok = rf.ray_parameter * vp < 1.0;
            if !ok {
                warn!(
                    "skipping receiver function with ray parameter {:.4} s/km: incompatible with Vp {:.2} km/s",
                    rf.ray_parameter, vp
                );
            }
            ok
        })
        .collect();
    if usable.is_empty() {
        return Err(RfError::data_unavailable(
            "no accepted receiver functions to stack",
        ));
    }
    let n_rf = usable.len();
    info!(
        "H-k stacking {} receiver functions on a {}x{} grid",
        n_rf,
        h_values.len(),
        k_values.len()
    );

    // parallel sampling, sequential in-order merge: the reduction order is
    // fixed, so the stack is reproducible bit for bit
    let sampled: Vec<PhaseSamples> = usable
        .par_iter()
        .map(|rf| sample_rf(rf, &h_values, &k_values, vp))
        .collect();

    let shape = (h_values.len(), k_values.len());
    let mut ps = Array2::<f64>::zeros(shape);
    let mut pps = Array2::<f64>::zeros(shape);
    let mut pss = Array2::<f64>::zeros(shape);
    for s in &sampled {
        ps += &s.ps;
        pps += &s.pps;
        pss += &s.pss;
    }
    let scale = 1.0 / n_rf as f64;
    ps *= scale;
    pps *= scale;
    pss *= scale;

    let [w1, w2, w3] = config.weights;
    let combined = match config.combination {
        HkCombination::WeightedSum => &ps * w1 + &pps * w2 + &pss * w3,
        HkCombination::Product => {
            let mut grid = Array2::zeros(shape);
            for i in 0..shape.0 {
                for j in 0..shape.1 {
                    grid[(i, j)] = (w1 * ps[(i, j)]).max(0.0)
                        * (w2 * pps[(i, j)]).max(0.0)
                        * (w3 * pss[(i, j)]).max(0.0);
                }
            }
            grid
        }
    };

    // maximum with lexicographic tie-break: first strictly-greater wins
    let mut best_index = (0usize, 0usize);
    let mut best_value = combined[(0, 0)];
    for i in 0..shape.0 {
        for j in 0..shape.1 {
            if combined[(i, j)] > best_value {
                best_value = combined[(i, j)];
                best_index = (i, j);
            }
        }
    }

    // spread of the per-RF contributions at the best cell gives the contour
    // level for the uncertainty region
    let contributions: Vec<f64> = sampled
        .iter()
        .map(|s| {
            w1 * s.ps[best_index] + w2 * s.pps[best_index] + w3 * s.pss[best_index]
        })
        .collect();
    let mean = contributions.iter().sum::<f64>() / n_rf as f64;
    let variance = contributions
        .iter()
        .map(|c| (c - mean) * (c - mean))
        .sum::<f64>()
        / n_rf as f64;
    let standard_error = (variance / n_rf as f64).sqrt();
    let drop = match config.combination {
        HkCombination::WeightedSum => standard_error,
        // transfer the spread onto the product scale
        HkCombination::Product => {
            if mean.abs() > 0.0 {
                best_value.abs() * standard_error / mean.abs()
            } else {
                0.0
            }
        }
    };
    let threshold = best_value - drop;
    let mut h_unc = (h_values[best_index.0], h_values[best_index.0]);
    let mut k_unc = (k_values[best_index.1], k_values[best_index.1]);
    for i in 0..shape.0 {
        for j in 0..shape.1 {
            if combined[(i, j)] >= threshold {
                h_unc.0 = h_unc.0.min(h_values[i]);
                h_unc.1 = h_unc.1.max(h_values[i]);
                k_unc.0 = k_unc.0.min(k_values[j]);
                k_unc.1 = k_unc.1.max(k_values[j]);
            }
        }
    }

    Ok(HkGrid {
        best_h: h_values[best_index.0],
        best_k: k_values[best_index.1],
        h_values,
        k_values,
        ps,
        pps,
        pss,
        combined,
        n_rf,
        best_index,
        h_uncertainty: h_unc,
        k_uncertainty: k_unc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::{EventMetadata, QcStatus, RfPair, StationMetadata};
    use crate::deconvolution::DeconvolutionMethod;
    use crate::math_tools::gaussian_pulse;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array1;

    fn station() -> StationMetadata {
        StationMetadata {
            code: "HKTEST".into(),
            latitude: 46.0,
            longitude: 8.0,
            elevation_m: 1200.0,
            sensor_azimuth_deg: 0.0,
        }
    }

    fn event(back_azimuth_deg: f64) -> EventMetadata {
        EventMetadata {
            origin_time: Utc.with_ymd_and_hms(2020, 6, 23, 4, 12, 0).unwrap(),
            distance_deg: 60.0,
            back_azimuth_deg,
            depth_km: 25.0,
            magnitude: 6.5,
        }
    }

    /// Noise-free receiver function for a single layer over a half space:
    /// Gaussian bumps at the Ps, PpPs and PpSs+PsPs delays, the last with
    /// reversed polarity.
    fn synthetic_rf(h: f64, k: f64, vp: f64, p: f64, baz: f64) -> RfPair {
        let fs = 20.0;
        let n = 1200;
        let onset = 100;
        let pulse_half_width = 0.6;
        let mut radial = Array1::zeros(n);
        let phases = [
            (ps_delay(h, k, vp, p), 0.4),
            (pps_delay(h, k, vp, p), 0.2),
            (pss_delay(h, k, vp, p), -0.15),
        ];
        // direct arrival
        radial[onset] = 1.0;
        for (delay, amp) in phases {
            for i in 0..n {
                let t = (i as f64 - onset as f64) / fs;
                radial[i] += amp * (-((t - delay) / pulse_half_width).powi(2)).exp();
            }
        }
        RfPair {
            event: event(baz),
            radial,
            transverse: Array1::zeros(n),
            sample_rate: fs,
            onset_index: onset,
            ray_parameter: p,
            back_azimuth_deg: baz,
            method: DeconvolutionMethod::default(),
            converged: true,
            metrics: None,
            status: QcStatus::Accepted,
        }
    }

    fn synthetic_catalog(h: f64, k: f64, vp: f64) -> RfCatalog {
        let mut catalog = RfCatalog::new(station());
        for (i, p) in [0.042, 0.048, 0.055, 0.061, 0.068, 0.074]
            .iter()
            .enumerate()
        {
            catalog.push(synthetic_rf(h, k, vp, *p, 30.0 * i as f64));
        }
        catalog
    }

    fn tight_config(vp: f64) -> HkConfig {
        HkConfig {
            h_range: (30.0, 40.0),
            h_step: 0.5,
            k_range: (1.6, 2.0),
            k_step: 0.02,
            vp,
            ..HkConfig::default()
        }
    }

    #[test]
    fn test_recovers_known_layer_within_one_grid_step() {
        let (h, k, vp) = (35.0, 1.8, 6.5);
        let catalog = synthetic_catalog(h, k, vp);
        let grid = hk_stack(&catalog, &tight_config(vp)).unwrap();
        assert!(
            (grid.best_h - h).abs() <= 0.5 + 1e-9,
            "best H {} vs true {}",
            grid.best_h,
            h
        );
        assert!(
            (grid.best_k - k).abs() <= 0.02 + 1e-9,
            "best k {} vs true {}",
            grid.best_k,
            k
        );
        // uncertainty region encloses the best cell
        assert!(grid.h_uncertainty.0 <= grid.best_h && grid.best_h <= grid.h_uncertainty.1);
        assert!(grid.k_uncertainty.0 <= grid.best_k && grid.best_k <= grid.k_uncertainty.1);
    }

    #[test]
    fn test_product_combination_also_recovers_layer() {
        let (h, k, vp) = (35.0, 1.8, 6.5);
        let catalog = synthetic_catalog(h, k, vp);
        let config = HkConfig {
            combination: HkCombination::Product,
            ..tight_config(vp)
        };
        let grid = hk_stack(&catalog, &config).unwrap();
        assert!((grid.best_h - h).abs() <= 0.5 + 1e-9);
        assert!((grid.best_k - k).abs() <= 0.02 + 1e-9);
    }

    #[test]
    fn test_two_runs_are_bit_identical() {
        let catalog = synthetic_catalog(32.0, 1.75, 6.2);
        let config = tight_config(6.2);
        let a = hk_stack(&catalog, &config).unwrap();
        let b = hk_stack(&catalog, &config).unwrap();
        assert_eq!(a.combined, b.combined);
        assert_eq!(a.ps, b.ps);
        assert_eq!(a.best_index, b.best_index);
        assert_eq!(a.best_h, b.best_h);
        assert_eq!(a.best_k, b.best_k);
    }

    #[test]
    fn test_flat_stack_ties_break_to_smallest_cell() {
        let mut catalog = RfCatalog::new(station());
        let mut rf = synthetic_rf(35.0, 1.8, 6.5, 0.05, 0.0);
        rf.radial.fill(0.0);
        catalog.push(rf);
        let grid = hk_stack(&catalog, &tight_config(6.5)).unwrap();
        assert_eq!(grid.best_index, (0, 0));
        assert_relative_eq!(grid.best_h, 30.0);
        assert_relative_eq!(grid.best_k, 1.6);
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let catalog = RfCatalog::new(station());
        assert!(hk_stack(&catalog, &HkConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_grid_rejected_before_work() {
        let catalog = synthetic_catalog(35.0, 1.8, 6.5);
        let config = HkConfig {
            h_step: -0.5,
            ..HkConfig::default()
        };
        let err = hk_stack(&catalog, &config).unwrap_err();
        assert!(!err.is_skip());
    }

    #[test]
    fn test_gridded_axes_are_inclusive() {
        let config = tight_config(6.5);
        let h = config.h_values();
        let k = config.k_values();
        assert_relative_eq!(h[0], 30.0);
        assert_relative_eq!(h[h.len() - 1], 40.0, epsilon = 1e-9);
        assert_relative_eq!(k[0], 1.6);
        assert!(k[k.len() - 1] <= 2.0 + 1e-9);
    }
}
