//! Extraction of the fixed analysis window around the predicted phase onset.
//!
//! The extracted segment is detrended and cosine-tapered so that the
//! frequency-domain stages see a zero-mean signal without edge
//! discontinuities. A window that is not fully covered by the available data
//! is a skip, never a fatal error.

use crate::data_container::Waveform;
use crate::errors::{RfError, RfResult};
use crate::math_tools::{apply_cosine_taper, detrend_linear};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Geometry of the analysis window around the predicted onset.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Seconds of signal retained before the onset.
    pub pre: f64,
    /// Seconds retained after the onset.
    pub post: f64,
    /// Cosine-taper fraction applied at each window edge.
    pub taper_fraction: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            pre: 30.0,
            post: 120.0,
            taper_fraction: 0.05,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> RfResult<()> {
        if self.pre <= 0.0 || self.post <= 0.0 {
            return Err(RfError::configuration(
                "window pre and post lengths must be positive",
            ));
        }
        if !(0.0..=0.5).contains(&self.taper_fraction) {
            return Err(RfError::configuration(
                "taper fraction must lie in [0, 0.5]",
            ));
        }
        Ok(())
    }

    /// Number of samples in the window at the given rate, onset sample
    /// included.
    pub fn n_samples(&self, sample_rate: f64) -> usize {
        ((self.pre + self.post) * sample_rate).round() as usize
    }

    /// Index of the onset within the window at the given rate.
    pub fn onset_index(&self, sample_rate: f64) -> usize {
        (self.pre * sample_rate).round() as usize
    }
}

/// Cuts the analysis window around `onset` out of `waveform`, detrends it and
/// tapers the edges.
///
/// Fails with [`RfError::DataUnavailable`] when the requested span is not
/// fully contained in the trace, which the batch driver treats as an event
/// skip.
pub fn extract_window(
    waveform: &Waveform,
    onset: DateTime<Utc>,
    config: &WindowConfig,
) -> RfResult<Waveform> {
    let fs = waveform.sample_rate;
    if fs <= 0.0 {
        return Err(RfError::data_unavailable(format!(
            "component {} carries a non-positive sample rate",
            waveform.component
        )));
    }
    let n = config.n_samples(fs);
    let offset = waveform.seconds_from_start(onset) - config.pre;
    let start_idx = (offset * fs).round();
    if start_idx < 0.0 {
        return Err(RfError::data_unavailable(format!(
            "window starts {:.1} s before the {} trace begins",
            -offset, waveform.component
        )));
    }
    let start_idx = start_idx as usize;
    if start_idx + n > waveform.len() {
        return Err(RfError::data_unavailable(format!(
            "window extends past the end of the {} trace",
            waveform.component
        )));
    }

    let mut samples = waveform
        .samples
        .slice(ndarray::s![start_idx..start_idx + n])
        .to_owned();
    detrend_linear(&mut samples.view_mut());
    apply_cosine_taper(&mut samples.view_mut(), config.taper_fraction);

    let start = waveform.start + Duration::microseconds((start_idx as f64 / fs * 1e6) as i64);
    Ok(Waveform::new(waveform.component, fs, start, samples))
}
