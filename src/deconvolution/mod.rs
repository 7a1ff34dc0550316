//! Spectral deconvolution engine: isolates the receiver-side structural
//! response by deconvolving the source component from the radial and
//! transverse components of one rotated event window.
//!
//! Three methods are available, selected through [`DeconvolutionMethod`]:
//! a frequency-domain water-level division, a Wiener division regularized by
//! the pre-onset noise spectrum, and an iterative time-domain spike
//! deconvolution. All of them normalize amplitudes so that deconvolving the
//! source component with itself yields a unit peak at zero lag, which keeps
//! receiver functions comparable across events and stations.

pub mod iterative;
pub mod water_level;
pub mod wiener;

use crate::data_container::{EventMetadata, QcStatus, RfPair};
use crate::errors::{RfError, RfResult};
use crate::math_tools::{gaussian_spectrum, next_pow2};
use crate::preprocess::RotatedTriplet;
use ndarray::Array1;
use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Deconvolution method selector with the parameter record of each variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeconvolutionMethod {
    /// Frequency-domain division with the denominator power floored at
    /// `water_level` times its peak.
    WaterLevel {
        /// Fraction of the peak source power used as the spectral floor.
        water_level: f64,
        /// Gaussian low-pass width parameter in Hz; `None` leaves the full
        /// band.
        gauss_width: Option<f64>,
    },
    /// Frequency-domain division regularized by the power spectrum of the
    /// pre-onset noise on the source component.
    Wiener {
        gauss_width: Option<f64>,
    },
    /// Iterative time-domain spike deconvolution. A budget overrun is not an
    /// error: the partial estimate is returned with `converged = false` on
    /// the resulting [`RfPair`].
    Iterative {
        gauss_width: Option<f64>,
        max_iterations: usize,
        /// Minimum relative residual-power improvement per iteration.
        tolerance: f64,
    },
}

impl Default for DeconvolutionMethod {
    fn default() -> Self {
        DeconvolutionMethod::Wiener { gauss_width: None }
    }
}

impl DeconvolutionMethod {
    pub fn validate(&self) -> RfResult<()> {
        let gauss = match self {
            DeconvolutionMethod::WaterLevel {
                water_level,
                gauss_width,
            } => {
                if !(*water_level > 0.0 && *water_level <= 1.0) {
                    return Err(RfError::configuration(
                        "water level must lie in (0, 1]",
                    ));
                }
                gauss_width
            }
            DeconvolutionMethod::Wiener { gauss_width } => gauss_width,
            DeconvolutionMethod::Iterative {
                gauss_width,
                max_iterations,
                tolerance,
            } => {
                if *max_iterations == 0 {
                    return Err(RfError::configuration(
                        "iterative deconvolution needs at least one iteration",
                    ));
                }
                if !(*tolerance > 0.0) {
                    return Err(RfError::configuration(
                        "iterative tolerance must be positive",
                    ));
                }
                gauss_width
            }
        };
        if let Some(a) = gauss {
            if !(*a > 0.0) {
                return Err(RfError::configuration(
                    "Gaussian filter width must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// FFT plans and padding shared by the spectral stages. The transforms are
/// padded to at least twice the window length so that circular wrap-around
/// cannot alias acausal energy into the causal part.
pub(crate) struct SpectralContext {
    pub nfft: usize,
    pub sample_rate: f64,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
}

impl SpectralContext {
    pub fn new(n: usize, sample_rate: f64) -> Self {
        let nfft = next_pow2(2 * n.max(1));
        let mut planner = RealFftPlanner::<f64>::new();
        SpectralContext {
            nfft,
            sample_rate,
            r2c: planner.plan_fft_forward(nfft),
            c2r: planner.plan_fft_inverse(nfft),
        }
    }

    /// Frequency axis of the one-sided spectrum, Hz.
    pub fn frequencies(&self) -> Array1<f64> {
        let df = self.sample_rate / self.nfft as f64;
        Array1::from_iter((0..self.nfft / 2 + 1).map(|i| i as f64 * df))
    }

    /// Forward transform of a zero-padded copy of `x`.
    pub fn forward(&self, x: &Array1<f64>) -> RfResult<Vec<Complex<f64>>> {
        let mut input = vec![0.0; self.nfft];
        input[..x.len()].copy_from_slice(x.as_slice().expect("contiguous trace"));
        let mut spectrum = self.r2c.make_output_vec();
        self.r2c
            .process(&mut input, &mut spectrum)
            .map_err(|err| RfError::deconvolution(format!("forward FFT failed: {err:?}")))?;
        Ok(spectrum)
    }

    /// Inverse transform, normalized by `1 / nfft`.
    pub fn inverse(&self, spectrum: &mut [Complex<f64>]) -> RfResult<Vec<f64>> {
        let mut output = self.c2r.make_output_vec();
        self.c2r
            .process(spectrum, &mut output)
            .map_err(|err| RfError::deconvolution(format!("inverse FFT failed: {err:?}")))?;
        let scale = 1.0 / self.nfft as f64;
        for v in output.iter_mut() {
            *v *= scale;
        }
        Ok(output)
    }

    /// Gaussian low-pass taper on this context's frequency axis, or all-ones
    /// when no width is configured.
    pub fn gauss_taper(&self, gauss_width: Option<f64>) -> Array1<f64> {
        match gauss_width {
            Some(a) => gaussian_spectrum(&self.frequencies(), a),
            None => Array1::ones(self.nfft / 2 + 1),
        }
    }
}

/// Spectral division of each numerator by the denominator using an already
/// regularized denominator power, with optional Gaussian low-pass and the
/// self-deconvolution amplitude normalization.
///
/// Output traces have length `out_len` with zero lag moved to `onset_index`;
/// acausal lags wrap in ahead of the onset.
pub(crate) fn deconvolve_with_power(
    ctx: &SpectralContext,
    numerators: &[&Array1<f64>],
    den_spec: &[Complex<f64>],
    denom_power: &[f64],
    gauss_width: Option<f64>,
    onset_index: usize,
    out_len: usize,
) -> RfResult<Vec<Array1<f64>>> {
    let gauss = ctx.gauss_taper(gauss_width);

    // amplitude normalization: the source deconvolved by itself must come
    // out with a unit peak at zero lag
    let mut self_spec: Vec<Complex<f64>> = den_spec
        .iter()
        .zip(denom_power.iter())
        .zip(gauss.iter())
        .map(|((d, p), g)| Complex::new(d.norm_sqr() / p * g, 0.0))
        .collect();
    let self_td = ctx.inverse(&mut self_spec)?;
    let norm = self_td[0];
    if !norm.is_finite() || norm.abs() < f64::EPSILON {
        return Err(RfError::deconvolution(
            "source component has no usable spectral power",
        ));
    }

    let mut outputs = Vec::with_capacity(numerators.len());
    for numerator in numerators {
        let num_spec = ctx.forward(numerator)?;
        let mut rf_spec: Vec<Complex<f64>> = num_spec
            .iter()
            .zip(den_spec.iter())
            .zip(denom_power.iter().zip(gauss.iter()))
            .map(|((n, d), (p, g))| n * d.conj() / *p * *g)
            .collect();
        let rf_td = ctx.inverse(&mut rf_spec)?;
        let mut out = Array1::zeros(out_len);
        for j in 0..out_len {
            out[j] = rf_td[(ctx.nfft + j - onset_index) % ctx.nfft] / norm;
        }
        outputs.push(out);
    }
    Ok(outputs)
}

/// Convolves a receiver function (onset at `onset_index`) with the source
/// window, reproducing the numerator trace the deconvolution explained. Used
/// by quality control to score waveform fit.
pub(crate) fn reconvolve(
    rf: &Array1<f64>,
    onset_index: usize,
    source: &Array1<f64>,
    sample_rate: f64,
) -> RfResult<Array1<f64>> {
    let n = source.len();
    let ctx = SpectralContext::new(n, sample_rate);
    // rotate zero lag back to index 0; acausal lags wrap to the tail
    let mut aligned = Array1::zeros(ctx.nfft);
    for (j, v) in rf.iter().enumerate() {
        aligned[(ctx.nfft + j - onset_index) % ctx.nfft] = *v;
    }
    let rf_spec = ctx.forward(&aligned)?;
    let src_spec = ctx.forward(source)?;
    let mut product: Vec<Complex<f64>> = rf_spec
        .iter()
        .zip(src_spec.iter())
        .map(|(a, b)| a * b)
        .collect();
    let full = ctx.inverse(&mut product)?;
    Ok(Array1::from_iter(full[..n].iter().cloned()))
}

/// Runs the configured deconvolution on a rotated event window and assembles
/// the resulting [`RfPair`] with `Pending` QC status.
pub fn deconvolve(
    triplet: &RotatedTriplet,
    event: &EventMetadata,
    ray_parameter: f64,
    onset_index: usize,
    method: &DeconvolutionMethod,
) -> RfResult<RfPair> {
    let n = triplet.source.len();
    if n == 0 || triplet.radial.len() != n || triplet.transverse.len() != n {
        return Err(RfError::data_unavailable(
            "rotated components are empty or differ in length",
        ));
    }
    if onset_index >= n {
        return Err(RfError::data_unavailable(
            "onset lies outside the analysis window",
        ));
    }
    let sample_rate = triplet.source.sample_rate;

    let (radial, transverse, converged) = match method {
        DeconvolutionMethod::WaterLevel {
            water_level,
            gauss_width,
        } => {
            let mut rfs = water_level::water_level_deconvolve(
                &[&triplet.radial.samples, &triplet.transverse.samples],
                &triplet.source.samples,
                sample_rate,
                *water_level,
                *gauss_width,
                onset_index,
            )?;
            let t = rfs.pop().expect("two outputs");
            let r = rfs.pop().expect("two outputs");
            (r, t, true)
        }
        DeconvolutionMethod::Wiener { gauss_width } => {
            let mut rfs = wiener::wiener_deconvolve(
                &[&triplet.radial.samples, &triplet.transverse.samples],
                &triplet.source.samples,
                sample_rate,
                *gauss_width,
                onset_index,
            )?;
            let t = rfs.pop().expect("two outputs");
            let r = rfs.pop().expect("two outputs");
            (r, t, true)
        }
        DeconvolutionMethod::Iterative {
            gauss_width,
            max_iterations,
            tolerance,
        } => {
            let (r, converged_r) = iterative::iterative_deconvolve(
                &triplet.radial.samples,
                &triplet.source.samples,
                sample_rate,
                *gauss_width,
                *max_iterations,
                *tolerance,
                onset_index,
            )?;
            let (t, converged_t) = iterative::iterative_deconvolve(
                &triplet.transverse.samples,
                &triplet.source.samples,
                sample_rate,
                *gauss_width,
                *max_iterations,
                *tolerance,
                onset_index,
            )?;
            (r, t, converged_r && converged_t)
        }
    };

    Ok(RfPair {
        event: event.clone(),
        radial,
        transverse,
        sample_rate,
        onset_index,
        ray_parameter,
        back_azimuth_deg: event.back_azimuth_deg,
        method: method.clone(),
        converged,
        metrics: None,
        status: QcStatus::Pending,
    })
}
