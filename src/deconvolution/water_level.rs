//! Frequency-domain water-level deconvolution.
//!
//! The denominator power spectrum is floored at a fraction of its peak so
//! that spectral nulls cannot blow up the division; a Gaussian low-pass then
//! suppresses the high-frequency noise the division amplifies.

use super::{deconvolve_with_power, SpectralContext};
use crate::errors::{RfError, RfResult};
use ndarray::Array1;

/// Deconvolves each numerator by `denominator` with the water-level floor.
///
/// Returns one receiver function per numerator, each of the numerator's
/// length with zero lag at `onset_index`.
pub fn water_level_deconvolve(
    numerators: &[&Array1<f64>],
    denominator: &Array1<f64>,
    sample_rate: f64,
    water_level: f64,
    gauss_width: Option<f64>,
    onset_index: usize,
) -> RfResult<Vec<Array1<f64>>> {
    let n = denominator.len();
    let ctx = SpectralContext::new(n, sample_rate);
    let den_spec = ctx.forward(denominator)?;

    let psd: Vec<f64> = den_spec.iter().map(|d| d.norm_sqr()).collect();
    let max_power = psd.iter().cloned().fold(0.0, f64::max);
    if max_power <= 0.0 {
        return Err(RfError::deconvolution("source component is silent"));
    }
    let floor = water_level * max_power;
    let denom_power: Vec<f64> = psd.iter().map(|p| p.max(floor)).collect();

    deconvolve_with_power(
        &ctx,
        numerators,
        &den_spec,
        &denom_power,
        gauss_width,
        onset_index,
        n,
    )
}
