//! Quality control of computed receiver functions.
//!
//! Pure classification: each pair is scored for signal-to-noise on the
//! source and radial windows and for how well the receiver function,
//! reconvolved with the source, reproduces the observed radial trace. Both
//! thresholds are inclusive — a value exactly at the limit passes. A second,
//! catalog-level pass tags variance outliers with the median absolute
//! deviation rule.

use crate::data_container::{QcMetrics, QcStatus, RfPair, Waveform};
use crate::deconvolution::reconvolve;
use crate::errors::{RfError, RfResult};
use crate::math_tools::{pearson_correlation, rms};
use log::debug;
use serde::{Deserialize, Serialize};

/// Acceptance thresholds and scoring windows.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QcConfig {
    /// Minimum signal-to-noise ratio, dB, required on both the source and
    /// radial components.
    pub snr_min_db: f64,
    /// Minimum correlation between the observed radial trace and the
    /// reconvolved receiver function.
    pub fit_min: f64,
    /// Length of the pre-onset noise window, seconds.
    pub noise_window: f64,
    /// Length of the post-onset signal window, seconds.
    pub signal_window: f64,
}

impl Default for QcConfig {
    fn default() -> Self {
        QcConfig {
            snr_min_db: 5.0,
            fit_min: 0.5,
            noise_window: 30.0,
            signal_window: 30.0,
        }
    }
}

impl QcConfig {
    pub fn validate(&self) -> RfResult<()> {
        if self.noise_window <= 0.0 || self.signal_window <= 0.0 {
            return Err(RfError::configuration(
                "QC noise and signal windows must be positive",
            ));
        }
        if !(-1.0..=1.0).contains(&self.fit_min) {
            return Err(RfError::configuration(
                "QC fit threshold must lie in [-1, 1]",
            ));
        }
        Ok(())
    }
}

/// Signal-to-noise ratio in dB around the onset sample of a windowed trace.
///
/// Signal is the RMS amplitude over `signal_window` seconds after the onset,
/// noise the RMS over `noise_window` seconds before it (clipped to the
/// available samples).
pub fn snr_db(trace: &Waveform, onset_index: usize, config: &QcConfig) -> f64 {
    let fs = trace.sample_rate;
    let n = trace.len();
    let n_noise = ((config.noise_window * fs) as usize).min(onset_index);
    let n_signal = ((config.signal_window * fs) as usize).min(n - onset_index);
    let samples = trace.samples.as_slice().expect("contiguous trace");
    let noise = rms(&samples[onset_index - n_noise..onset_index]);
    let signal = rms(&samples[onset_index..onset_index + n_signal]);
    if noise <= 0.0 {
        return f64::INFINITY;
    }
    20.0 * (signal / noise).log10()
}

/// Scores one receiver function against the windows it was computed from and
/// tags it `Accepted` or `Rejected`.
///
/// Both thresholds are inclusive; the first failing metric is recorded on
/// the rejection for diagnostics. Returns the metrics for the caller's
/// bookkeeping.
pub fn evaluate(
    rf: &mut RfPair,
    source: &Waveform,
    radial_observed: &Waveform,
    config: &QcConfig,
) -> RfResult<QcMetrics> {
    let snr_source = snr_db(source, rf.onset_index, config);
    let snr_radial = snr_db(radial_observed, rf.onset_index, config);
    let predicted = reconvolve(&rf.radial, rf.onset_index, &source.samples, rf.sample_rate)?;
    let fit = pearson_correlation(
        predicted.as_slice().expect("contiguous trace"),
        radial_observed.samples.as_slice().expect("contiguous trace"),
    );

    let metrics = QcMetrics {
        snr_source_db: snr_source,
        snr_radial_db: snr_radial,
        fit_correlation: fit,
    };
    rf.metrics = Some(metrics.clone());

    rf.status = if snr_source < config.snr_min_db {
        QcStatus::Rejected {
            metric: format!("source SNR {snr_source:.2} dB"),
        }
    } else if snr_radial < config.snr_min_db {
        QcStatus::Rejected {
            metric: format!("radial SNR {snr_radial:.2} dB"),
        }
    } else if fit < config.fit_min {
        QcStatus::Rejected {
            metric: format!("reconvolution fit {fit:.3}"),
        }
    } else {
        QcStatus::Accepted
    };
    if let QcStatus::Rejected { metric } = &rf.status {
        debug!("receiver function rejected: {metric}");
    }
    Ok(metrics)
}

/// Catalog-level outlier pass: rejects accepted entries whose radial
/// variance deviates from the ensemble median by more than
/// `threshold` scaled median absolute deviations.
///
/// Returns the number of entries newly rejected.
pub fn mad_outlier_pass(rfs: &mut [RfPair], threshold: f64) -> usize {
    let mut variances: Vec<(usize, f64)> = rfs
        .iter()
        .enumerate()
        .filter(|(_, rf)| rf.status.is_accepted())
        .map(|(i, rf)| {
            let v = rf.radial.iter().map(|x| x * x).sum::<f64>() / rf.len() as f64;
            (i, v)
        })
        .collect();
    if variances.len() < 3 {
        return 0;
    }
    let mut sorted: Vec<f64> = variances.iter().map(|(_, v)| *v).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = sorted[sorted.len() / 2];
    let mut deviations: Vec<f64> = sorted.iter().map(|v| (v - median).abs()).collect();
    deviations.sort_by(|a, b| a.partial_cmp(b).unwrap());
    // 1.4826 rescales the MAD to a Gaussian standard deviation
    let mad = 1.4826 * deviations[deviations.len() / 2];
    if mad <= 0.0 {
        return 0;
    }

    let mut rejected = 0;
    for (i, v) in variances.drain(..) {
        if (v - median).abs() > threshold * mad {
            rfs[i].status = QcStatus::Rejected {
                metric: format!("variance outlier ({v:.3e})"),
            };
            rejected += 1;
        }
    }
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::{Component, EventMetadata};
    use crate::deconvolution::DeconvolutionMethod;
    use chrono::{TimeZone, Utc};
    use ndarray::Array1;

    fn waveform(samples: Array1<f64>) -> Waveform {
        let start = Utc.with_ymd_and_hms(2018, 11, 30, 17, 0, 0).unwrap();
        Waveform::new(Component::Vertical, 10.0, start, samples)
    }

    fn event() -> EventMetadata {
        EventMetadata {
            origin_time: Utc.with_ymd_and_hms(2018, 11, 30, 16, 45, 0).unwrap(),
            distance_deg: 55.0,
            back_azimuth_deg: 80.0,
            depth_km: 15.0,
            magnitude: 6.1,
        }
    }

    fn rf_with_unit_spike(n: usize, onset: usize) -> RfPair {
        let mut radial = Array1::zeros(n);
        radial[onset] = 1.0;
        RfPair {
            event: event(),
            radial,
            transverse: Array1::zeros(n),
            sample_rate: 10.0,
            onset_index: onset,
            ray_parameter: 0.06,
            back_azimuth_deg: 80.0,
            method: DeconvolutionMethod::default(),
            converged: true,
            metrics: None,
            status: QcStatus::Pending,
        }
    }

    /// Square-wave trace whose post-onset RMS is exactly `ratio` times the
    /// pre-onset RMS, so the SNR in dB is exact.
    fn two_level_trace(n: usize, onset: usize, ratio: f64) -> Waveform {
        let samples = Array1::from_iter((0..n).map(|i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            if i < onset {
                sign
            } else {
                ratio * sign
            }
        }));
        waveform(samples)
    }

    #[test]
    fn test_snr_at_threshold_is_accepted_just_below_is_rejected() {
        // an amplitude ratio of exactly 2 gives 20 log10(2) dB
        let threshold_db = 20.0 * 2.0f64.log10();
        let config = QcConfig {
            snr_min_db: threshold_db,
            fit_min: -1.0,
            noise_window: 10.0,
            signal_window: 10.0,
        };
        let onset = 200;
        let n = 600;

        let mut rf = rf_with_unit_spike(n, onset);
        let source = two_level_trace(n, onset, 2.0);
        let radial = two_level_trace(n, onset, 2.0);
        evaluate(&mut rf, &source, &radial, &config).unwrap();
        assert!(rf.status.is_accepted(), "exactly at threshold must pass");

        let mut rf = rf_with_unit_spike(n, onset);
        let source = two_level_trace(n, onset, 1.9);
        let radial = two_level_trace(n, onset, 1.9);
        evaluate(&mut rf, &source, &radial, &config).unwrap();
        assert!(
            matches!(rf.status, QcStatus::Rejected { .. }),
            "just below threshold must fail"
        );
    }

    #[test]
    fn test_good_fit_accepted_and_poor_fit_rejected_with_metric() {
        let config = QcConfig {
            snr_min_db: -100.0,
            fit_min: 0.8,
            noise_window: 10.0,
            signal_window: 10.0,
        };
        let n = 512;
        let onset = 100;
        let source = waveform(Array1::from_iter(
            (0..n).map(|i| (-((i as f64 - 150.0) / 5.0).powi(2)).exp()),
        ));

        // a unit spike at zero lag reconvolves into the source itself
        let mut rf = rf_with_unit_spike(n, onset);
        let radial = source.clone();
        evaluate(&mut rf, &source, &radial, &config).unwrap();
        assert!(rf.status.is_accepted());
        assert!(rf.metrics.as_ref().unwrap().fit_correlation > 0.99);

        // radial unrelated to the source: fit collapses
        let mut rf = rf_with_unit_spike(n, onset);
        let radial = waveform(Array1::from_iter((0..n).map(|i| (i as f64 * 1.7).sin())));
        evaluate(&mut rf, &source, &radial, &config).unwrap();
        match &rf.status {
            QcStatus::Rejected { metric } => assert!(metric.contains("fit")),
            other => panic!("expected fit rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_mad_outlier_pass_flags_the_wild_trace() {
        let n = 256;
        let mut rfs: Vec<RfPair> = (0..9)
            .map(|i| {
                let mut rf = rf_with_unit_spike(n, 50);
                rf.radial *= 1.0 + 0.01 * i as f64;
                rf.status = QcStatus::Accepted;
                rf
            })
            .collect();
        let mut wild = rf_with_unit_spike(n, 50);
        wild.radial *= 50.0;
        wild.status = QcStatus::Accepted;
        rfs.push(wild);

        let rejected = mad_outlier_pass(&mut rfs, 3.0);
        assert_eq!(rejected, 1);
        assert!(matches!(rfs[9].status, QcStatus::Rejected { .. }));
        assert!(rfs[0].status.is_accepted());
    }
}
