//! Decimation onto the target output sample rate.
//!
//! Performed in the frequency domain: the spectrum is truncated at the new
//! Nyquist frequency and inverse-transformed at the shorter length, which
//! low-passes and resamples in one step. Only integer rate ratios are
//! supported; the caller skips events whose native rate does not divide
//! down to the target.

use crate::data_container::Waveform;
use crate::errors::{RfError, RfResult};
use ndarray::Array1;
use realfft::RealFftPlanner;

/// Integer decimation factor between a native and a target rate, or `None`
/// when the ratio is not an integer.
pub fn decimation_factor(sample_rate: f64, target_rate: f64) -> Option<usize> {
    if target_rate <= 0.0 || sample_rate < target_rate {
        return None;
    }
    let ratio = sample_rate / target_rate;
    let factor = ratio.round();
    ((ratio - factor).abs() < 1e-6).then_some(factor as usize)
}

/// Returns the waveform decimated by `factor`.
pub fn decimate(waveform: &Waveform, factor: usize) -> RfResult<Waveform> {
    if factor == 0 {
        return Err(RfError::configuration("decimation factor must be positive"));
    }
    if factor == 1 {
        return Ok(waveform.clone());
    }
    // trim so both lengths are even and the ratio exact
    let mut m = waveform.len() / factor;
    if m % 2 == 1 {
        m -= 1;
    }
    let n = m * factor;
    if m < 2 {
        return Err(RfError::data_unavailable(
            "trace too short for the requested decimation",
        ));
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(m);

    let mut input = waveform.samples.iter().take(n).cloned().collect::<Vec<f64>>();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)
        .map_err(|err| RfError::data_unavailable(format!("forward FFT failed: {err:?}")))?;

    let mut truncated = spectrum[..m / 2 + 1].to_vec();
    // the new Nyquist bin must be real
    let last = truncated.len() - 1;
    truncated[last].im = 0.0;

    let mut output = c2r.make_output_vec();
    c2r.process(&mut truncated, &mut output)
        .map_err(|err| RfError::data_unavailable(format!("inverse FFT failed: {err:?}")))?;
    let scale = 1.0 / n as f64;
    let samples = Array1::from_iter(output.into_iter().map(|v| v * scale));

    Ok(Waveform::new(
        waveform.component,
        waveform.sample_rate / factor as f64,
        waveform.start,
        samples,
    ))
}
