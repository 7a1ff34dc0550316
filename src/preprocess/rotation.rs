//! Rotation of the three recorded components into the wave-propagation
//! frame.
//!
//! Two alignments are supported: ZRT (vertical kept as the source component)
//! and LQT (the vertical/radial pair rotated by the P incidence angle so the
//! source component points along the incident ray). The sensor misorientation
//! recorded in the station metadata is removed before the geographic
//! rotation.

use crate::data_container::{Component, EventMetadata, StationMetadata, Waveform};
use crate::errors::{RfError, RfResult};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Target frame of the component rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    /// Vertical / radial / transverse.
    Zrt,
    /// Longitudinal / Q (SV) / transverse.
    Lqt,
}

impl Display for Alignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Alignment::Zrt => write!(f, "ZRT"),
            Alignment::Lqt => write!(f, "LQT"),
        }
    }
}

/// The rotated component set handed to the deconvolution engine: the source
/// component (Z or L) and the two numerator components.
#[derive(Clone, Debug)]
pub struct RotatedTriplet {
    pub source: Waveform,
    pub radial: Waveform,
    pub transverse: Waveform,
}

/// Rotates Z/N/E windows into the requested alignment.
///
/// `incidence_deg` is only consulted for [`Alignment::Lqt`]. All three input
/// windows must share length and sample rate; a mismatch means the upstream
/// windowing produced inconsistent cuts and the event is skipped.
pub fn rotate_to_alignment(
    z: &Waveform,
    n: &Waveform,
    e: &Waveform,
    station: &StationMetadata,
    event: &EventMetadata,
    alignment: Alignment,
    incidence_deg: f64,
) -> RfResult<RotatedTriplet> {
    if z.len() != n.len() || z.len() != e.len() {
        return Err(RfError::data_unavailable(
            "component windows differ in length",
        ));
    }
    if (z.sample_rate - n.sample_rate).abs() > 1e-9 || (z.sample_rate - e.sample_rate).abs() > 1e-9
    {
        return Err(RfError::data_unavailable(
            "component windows differ in sample rate",
        ));
    }
    if !event.back_azimuth_deg.is_finite() {
        return Err(RfError::missing_metadata("event back-azimuth"));
    }

    // undo sensor misorientation, then rotate to the great-circle frame
    let theta = station.sensor_azimuth_deg.to_radians();
    let baz = event.back_azimuth_deg.to_radians();

    let mut radial = z.samples.clone();
    let mut transverse = z.samples.clone();
    Zip::from(&mut radial)
        .and(&mut transverse)
        .and(&n.samples)
        .and(&e.samples)
        .for_each(|r, t, &ns, &es| {
            let true_n = ns * theta.cos() - es * theta.sin();
            let true_e = ns * theta.sin() + es * theta.cos();
            *r = -true_e * baz.sin() - true_n * baz.cos();
            *t = -true_e * baz.cos() + true_n * baz.sin();
        });

    let (source, radial, source_label, radial_label) = match alignment {
        Alignment::Zrt => (z.samples.clone(), radial, Component::Vertical, Component::Radial),
        Alignment::Lqt => {
            let inc = incidence_deg.to_radians();
            let mut l = z.samples.clone();
            let mut q = z.samples.clone();
            Zip::from(&mut l)
                .and(&mut q)
                .and(&z.samples)
                .and(&radial)
                .for_each(|lv, qv, &zv, &rv| {
                    *lv = zv * inc.cos() + rv * inc.sin();
                    *qv = -zv * inc.sin() + rv * inc.cos();
                });
            (l, q, Component::Longitudinal, Component::Sv)
        }
    };

    Ok(RotatedTriplet {
        source: Waveform::new(source_label, z.sample_rate, z.start, source),
        radial: Waveform::new(radial_label, z.sample_rate, z.start, radial),
        transverse: Waveform::new(Component::Transverse, z.sample_rate, z.start, transverse),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array1;

    fn station(sensor_azimuth_deg: f64) -> StationMetadata {
        StationMetadata {
            code: "TEST".into(),
            latitude: 47.0,
            longitude: 7.4,
            elevation_m: 550.0,
            sensor_azimuth_deg,
        }
    }

    fn event(back_azimuth_deg: f64) -> EventMetadata {
        EventMetadata {
            origin_time: Utc.with_ymd_and_hms(2021, 8, 14, 12, 29, 8).unwrap(),
            distance_deg: 70.0,
            back_azimuth_deg,
            depth_km: 10.0,
            magnitude: 7.2,
        }
    }

    fn triplet(zv: f64, nv: f64, ev: f64) -> (Waveform, Waveform, Waveform) {
        let start = Utc.with_ymd_and_hms(2021, 8, 14, 12, 40, 0).unwrap();
        let make = |c, v: f64| Waveform::new(c, 10.0, start, Array1::from_elem(8, v));
        (
            make(Component::Vertical, zv),
            make(Component::North, nv),
            make(Component::East, ev),
        )
    }

    #[test]
    fn test_zrt_rotation_from_due_north() {
        // event due north: radial = -N, transverse = -E
        let (z, n, e) = triplet(0.3, 1.0, 0.5);
        let rot =
            rotate_to_alignment(&z, &n, &e, &station(0.0), &event(0.0), Alignment::Zrt, 0.0)
                .unwrap();
        assert_relative_eq!(rot.radial.samples[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(rot.transverse.samples[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(rot.source.samples[0], 0.3, epsilon = 1e-12);
        assert_eq!(rot.source.component, Component::Vertical);
    }

    #[test]
    fn test_zrt_rotation_from_due_east() {
        // event due east: radial = -E, transverse = +N
        let (z, n, e) = triplet(0.0, 0.25, 1.0);
        let rot =
            rotate_to_alignment(&z, &n, &e, &station(0.0), &event(90.0), Alignment::Zrt, 0.0)
                .unwrap();
        assert_relative_eq!(rot.radial.samples[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(rot.transverse.samples[0], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_misorientation_is_compensated() {
        // a sensor rotated 30 deg clockwise records the same ground motion on
        // rotated axes; after correction the output must match the aligned
        // sensor.
        let baz = 135.0_f64;
        let (z, n, e) = triplet(0.1, 0.7, -0.4);
        let reference =
            rotate_to_alignment(&z, &n, &e, &station(0.0), &event(baz), Alignment::Zrt, 0.0)
                .unwrap();

        let theta = 30.0_f64.to_radians();
        // project true N/E ground motion onto the misoriented axes
        let n_mis = 0.7 * theta.cos() + (-0.4) * theta.sin();
        let e_mis = -0.7 * theta.sin() + (-0.4) * theta.cos();
        let (z2, n2, e2) = triplet(0.1, n_mis, e_mis);
        let corrected =
            rotate_to_alignment(&z2, &n2, &e2, &station(30.0), &event(baz), Alignment::Zrt, 0.0)
                .unwrap();

        assert_relative_eq!(
            reference.radial.samples[0],
            corrected.radial.samples[0],
            epsilon = 1e-12
        );
        assert_relative_eq!(
            reference.transverse.samples[0],
            corrected.transverse.samples[0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_lqt_at_vertical_incidence_equals_zrt() {
        let (z, n, e) = triplet(0.8, 0.3, -0.6);
        let zrt =
            rotate_to_alignment(&z, &n, &e, &station(0.0), &event(210.0), Alignment::Zrt, 0.0)
                .unwrap();
        let lqt =
            rotate_to_alignment(&z, &n, &e, &station(0.0), &event(210.0), Alignment::Lqt, 0.0)
                .unwrap();
        assert_relative_eq!(lqt.source.samples[0], zrt.source.samples[0], epsilon = 1e-12);
        assert_relative_eq!(lqt.radial.samples[0], zrt.radial.samples[0], epsilon = 1e-12);
        assert_eq!(lqt.source.component, Component::Longitudinal);
    }

    #[test]
    fn test_missing_back_azimuth_is_a_skip() {
        let (z, n, e) = triplet(0.0, 1.0, 1.0);
        let err = rotate_to_alignment(
            &z,
            &n,
            &e,
            &station(0.0),
            &event(f64::NAN),
            Alignment::Zrt,
            0.0,
        )
        .unwrap_err();
        assert!(err.is_skip());
    }
}
