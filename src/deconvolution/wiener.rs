//! Wiener deconvolution: the frequency-domain division is regularized by the
//! power spectrum of the pre-onset noise instead of a scalar floor, so the
//! damping adapts to where the noise actually sits in frequency.

use super::{deconvolve_with_power, SpectralContext};
use crate::errors::{RfError, RfResult};
use crate::math_tools::apply_cosine_taper;
use ndarray::{s, Array1};

/// Deconvolves each numerator by `denominator`, regularized by the noise
/// power estimated from the denominator's pre-onset segment
/// (`[0, onset_index)`).
pub fn wiener_deconvolve(
    numerators: &[&Array1<f64>],
    denominator: &Array1<f64>,
    sample_rate: f64,
    gauss_width: Option<f64>,
    onset_index: usize,
) -> RfResult<Vec<Array1<f64>>> {
    let n = denominator.len();
    if onset_index < 2 {
        return Err(RfError::data_unavailable(
            "no pre-onset segment available for the noise spectrum",
        ));
    }
    let ctx = SpectralContext::new(n, sample_rate);
    let den_spec = ctx.forward(denominator)?;

    let psd: Vec<f64> = den_spec.iter().map(|d| d.norm_sqr()).collect();
    let max_power = psd.iter().cloned().fold(0.0, f64::max);
    if max_power <= 0.0 {
        return Err(RfError::deconvolution("source component is silent"));
    }

    let mut noise = denominator.slice(s![..onset_index]).to_owned();
    apply_cosine_taper(&mut noise.view_mut(), 0.1);
    let noise_spec = ctx.forward(&noise)?;

    // tiny absolute floor so bins where both signal and noise vanish stay
    // finite
    let eps = 1e-12 * max_power;
    let denom_power: Vec<f64> = psd
        .iter()
        .zip(noise_spec.iter())
        .map(|(p, ns)| p + ns.norm_sqr() + eps)
        .collect();

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
