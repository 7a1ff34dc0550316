//! Optional band-pass pre-filter applied ahead of deconvolution.
//!
//! Works in the frequency domain: forward real FFT, Blackman-tapered corner
//! edges on the pass band, inverse transform. Teleseismic receiver-function
//! work typically restricts the band to a fraction of a Hz up to ~1 Hz
//! before deconvolving.

use crate::data_container::Waveform;
use crate::errors::{RfError, RfResult};
use crate::math_tools::apply_band_edge_taper;
use ndarray::Array1;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Corner frequencies of the pre-deconvolution band-pass.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PreFilter {
    /// Low corner, Hz.
    pub low: f64,
    /// High corner, Hz.
    pub high: f64,
    /// Width of the tapered roll-off inside each corner, Hz.
    pub edge_width: f64,
}

impl PreFilter {
    pub fn new(low: f64, high: f64) -> Self {
        PreFilter {
            low,
            high,
            edge_width: 0.1 * (high - low),
        }
    }

    pub fn validate(&self) -> RfResult<()> {
        if self.low < 0.0 || self.high <= self.low {
            return Err(RfError::configuration(
                "pre-filter corners must satisfy 0 <= low < high",
            ));
        }
        if self.edge_width <= 0.0 || self.edge_width > (self.high - self.low) / 2.0 {
            return Err(RfError::configuration(
                "pre-filter edge width must be positive and at most half the band",
            ));
        }
        Ok(())
    }
}

/// Band-pass filters the waveform in place.
pub fn band_pass(waveform: &mut Waveform, filter: &PreFilter) -> RfResult<()> {
    let n = waveform.len();
    if n < 2 {
        return Err(RfError::data_unavailable(
            "trace too short for band-pass filtering",
        ));
    }
    let fs = waveform.sample_rate;
    let nyquist = fs / 2.0;
    let high = filter.high.min(nyquist);

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(n);

    let mut input = waveform.samples.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)
        .map_err(|err| RfError::data_unavailable(format!("forward FFT failed: {err:?}")))?;

    let frequencies = Array1::from_iter((0..spectrum.len()).map(|i| i as f64 * fs / n as f64));
    let mut window = Array1::<f64>::ones(spectrum.len());
    apply_band_edge_taper(
        &mut window.view_mut(),
        &frequencies,
        filter.low,
        high,
        filter.edge_width,
    );
    for (s, w) in spectrum.iter_mut().zip(window.iter()) {
        *s *= *w;
    }

    let mut output = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut output)
        .map_err(|err| RfError::data_unavailable(format!("inverse FFT failed: {err:?}")))?;
    let scale = 1.0 / n as f64;
    waveform.samples = Array1::from_iter(output.into_iter().map(|v| v * scale));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::Component;
    use crate::math_tools::rms;
    use chrono::{TimeZone, Utc};
    use std::f64::consts::PI;

    fn tone_mix(fs: f64, n: usize, f_in: f64, f_out: f64) -> Waveform {
        let start = Utc.with_ymd_and_hms(2020, 1, 2, 3, 0, 0).unwrap();
        let samples = Array1::from_iter((0..n).map(|i| {
            let t = i as f64 / fs;
            (2.0 * PI * f_in * t).sin() + (2.0 * PI * f_out * t).sin()
        }));
        Waveform::new(Component::Radial, fs, start, samples)
    }

    #[test]
    fn test_band_pass_keeps_in_band_tone_and_kills_out_of_band() {
        let fs = 20.0;
        let n = 2048;
        let mut w = tone_mix(fs, n, 0.5, 5.0);
        let filter = PreFilter::new(0.1, 1.0);
        band_pass(&mut w, &filter).unwrap();

        // correlate against the two tones to measure what survived
        let in_band: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 0.5 * i as f64 / fs).sin())
            .collect();
        let out_band: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 5.0 * i as f64 / fs).sin())
            .collect();
        let dot = |a: &[f64]| {
            w.samples
                .iter()
                .zip(a.iter())
                .map(|(x, y)| x * y)
                .sum::<f64>()
                .abs()
        };
        assert!(dot(&in_band) > 100.0 * dot(&out_band));
        assert!(rms(w.samples.as_slice().unwrap()) > 0.1);
    }

    #[test]
    fn test_validation_rejects_inverted_corners() {
        assert!(PreFilter::new(1.0, 0.1).validate().is_err());
        assert!(PreFilter::new(0.05, 1.0).validate().is_ok());
    }
}
