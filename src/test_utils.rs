//! Shared synthetic fixtures for the test suite: a deterministic waveform
//! source generating single-layer responses with analytically known phase
//! delays, and a matching linear onset model.

use crate::batch::WaveformSource;
use crate::data_container::{Component, EventMetadata, StationMetadata, Waveform};
use crate::errors::{RfError, RfResult};
use crate::traveltime::{pps_delay, ps_delay, pss_delay, OnsetModel, OnsetPrediction};
use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array1;

/// Straight-line stand-in for a travel-time model: 6 s per degree, slowness
/// decreasing linearly with distance. Rejects distances beyond 95 degrees so
/// batch tests can exercise the skip path.
pub struct LinearOnsetModel;

impl OnsetModel for LinearOnsetModel {
    fn predict(&self, distance_deg: f64, _depth_km: f64) -> RfResult<OnsetPrediction> {
        if distance_deg > 95.0 {
            return Err(RfError::missing_metadata(format!(
                "distance {distance_deg:.1} deg outside the synthetic model"
            )));
        }
        Ok(OnsetPrediction {
            travel_time: 6.0 * distance_deg,
            ray_parameter: 0.1 - 6e-4 * distance_deg,
        })
    }
}

/// Deterministic waveform source for a single layer over a half space: the
/// vertical carries the source wavelet, the radial carries scaled copies at
/// the Ps/PpPs/PpSs delays (the last with reversed polarity), and the
/// transverse is zero. Horizontals are rotated back into N/E so the full
/// pipeline, rotation included, is exercised.
pub struct LayeredSyntheticSource {
    pub h: f64,
    pub k: f64,
    pub vp: f64,
    pub sample_rate: f64,
}

impl LayeredSyntheticSource {
    pub fn new(h: f64, k: f64, vp: f64, sample_rate: f64) -> Self {
        LayeredSyntheticSource {
            h,
            k,
            vp,
            sample_rate,
        }
    }
}

impl WaveformSource for LayeredSyntheticSource {
    fn fetch(
        &self,
        _station: &StationMetadata,
        event: &EventMetadata,
        start: DateTime<Utc>,
        duration: f64,
    ) -> RfResult<Vec<Waveform>> {
        let fs = self.sample_rate;
        let n = (duration * fs).round() as usize + 1;
        let prediction = LinearOnsetModel.predict(event.distance_deg, event.depth_km)?;
        let onset = event.origin_time
            + chrono::Duration::microseconds((prediction.travel_time * 1e6) as i64);
        let onset_rel = (onset - start).num_milliseconds() as f64 / 1e3;
        let p = prediction.ray_parameter;

        let wavelet = |t: f64| (-(1.5 * t).powi(2)).exp();
        let phases = [
            (0.0, 0.5),
            (ps_delay(self.h, self.k, self.vp, p), 0.3),
            (pps_delay(self.h, self.k, self.vp, p), 0.15),
            (pss_delay(self.h, self.k, self.vp, p), -0.1),
        ];

        let mut vertical = Array1::zeros(n);
        let mut radial = Array1::zeros(n);
        for i in 0..n {
            let t = i as f64 / fs - onset_rel;
            vertical[i] = wavelet(t);
            for (delay, amp) in phases {
                radial[i] += amp * wavelet(t - delay);
            }
        }
        // rotate radial (transverse is zero) back into the recording frame
        let baz = event.back_azimuth_deg.to_radians();
        let north = radial.mapv(|r: f64| -r * baz.cos());
        let east = radial.mapv(|r: f64| -r * baz.sin());

        Ok(vec![
            Waveform::new(Component::Vertical, fs, start, vertical),
            Waveform::new(Component::North, fs, start, north),
            Waveform::new(Component::East, fs, start, east),
        ])
    }
}

/// Test station with a correctly oriented sensor.
pub fn station() -> StationMetadata {
    StationMetadata {
        code: "SYN".into(),
        latitude: 46.95,
        longitude: 7.45,
        elevation_m: 540.0,
        sensor_azimuth_deg: 0.0,
    }
}

/// Events spread in distance and back-azimuth for catalog-level tests.
pub fn layered_catalog_events(count: usize) -> Vec<EventMetadata> {
    (0..count)
        .map(|i| EventMetadata {
            origin_time: Utc.with_ymd_and_hms(2015, 9, 16, 22, 54, 32).unwrap(),
            distance_deg: 40.0 + 9.0 * i as f64,
            back_azimuth_deg: (55.0 * i as f64) % 360.0,
            depth_km: 15.0,
            magnitude: 6.3,
        })
        .collect()
}
