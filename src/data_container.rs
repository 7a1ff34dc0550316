//! Core data records of the pipeline: waveforms, event/station metadata,
//! receiver-function pairs and the station-level aggregates (catalog, H-k
//! grid, harmonic model). Everything outward-facing derives `Serialize` so
//! results can be archived without the core imposing a file format.

use crate::deconvolution::DeconvolutionMethod;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Orthogonal component labels, covering the recording frame (Z/N/E) and the
/// two wave-propagation frames this crate rotates into (R/T and L/Q).
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Component {
    /// Vertical, positive up.
    Vertical,
    /// Horizontal, positive geographic north.
    North,
    /// Horizontal, positive geographic east.
    East,
    /// Radial, positive away from the source along the great circle.
    Radial,
    /// Transverse, 90 degrees clockwise from radial.
    Transverse,
    /// Longitudinal, along the incident P ray.
    Longitudinal,
    /// SV direction, perpendicular to the ray in the vertical plane.
    Sv,
}

impl Display for Component {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Component::Vertical => "Z",
            Component::North => "N",
            Component::East => "E",
            Component::Radial => "R",
            Component::Transverse => "T",
            Component::Longitudinal => "L",
            Component::Sv => "Q",
        };
        write!(f, "{}", label)
    }
}

/// A uniformly-sampled single-component time series. Immutable once built;
/// the processing stages produce new `Waveform`s rather than editing input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Waveform {
    pub component: Component,
    /// Samples per second.
    pub sample_rate: f64,
    /// Time of the first sample.
    pub start: DateTime<Utc>,
    pub samples: Array1<f64>,
}

impl Waveform {
    pub fn new(
        component: Component,
        sample_rate: f64,
        start: DateTime<Utc>,
        samples: Array1<f64>,
    ) -> Self {
        Waveform {
            component,
            sample_rate,
            start,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds between `start` and `t` (negative if `t` precedes the trace).
    pub fn seconds_from_start(&self, t: DateTime<Utc>) -> f64 {
        (t - self.start).num_milliseconds() as f64 / 1e3
    }

    /// Nearest sample index for time `t`, or `None` outside the trace.
    pub fn index_at(&self, t: DateTime<Utc>) -> Option<usize> {
        let offset = self.seconds_from_start(t) * self.sample_rate;
        if offset < -0.5 {
            return None;
        }
        let idx = offset.round() as usize;
        (idx < self.samples.len()).then_some(idx)
    }
}

/// Source parameters of one teleseismic event. Supplied externally and never
/// modified by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMetadata {
    pub origin_time: DateTime<Utc>,
    /// Great-circle distance station-event, degrees.
    pub distance_deg: f64,
    /// Direction from the station toward the event, degrees clockwise from
    /// north.
    pub back_azimuth_deg: f64,
    pub depth_km: f64,
    pub magnitude: f64,
}

/// Station coordinates and sensor orientation. Supplied externally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StationMetadata {
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    /// Azimuth of the nominal north component, degrees clockwise from true
    /// north. Zero for a correctly oriented sensor.
    pub sensor_azimuth_deg: f64,
}

/// Quality metrics attached to an [`RfPair`] by the QC stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QcMetrics {
    /// Signal-to-noise ratio on the source component, dB.
    pub snr_source_db: f64,
    /// Signal-to-noise ratio on the radial component, dB.
    pub snr_radial_db: f64,
    /// Correlation between the observed radial trace and the receiver
    /// function reconvolved with the source.
    pub fit_correlation: f64,
}

/// Accept/reject state of an [`RfPair`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QcStatus {
    /// Not yet evaluated.
    Pending,
    Accepted,
    /// Rejected; `metric` names the first threshold that failed.
    Rejected { metric: String },
}

impl QcStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, QcStatus::Accepted)
    }
}

/// The deconvolution result for one event-station pair: radial and
/// transverse receiver functions on a shared time axis referenced to the
/// predicted phase onset.
///
/// After QC tagging the record is read-only; the stacking and harmonic
/// engines consume it without mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RfPair {
    pub event: EventMetadata,
    pub radial: Array1<f64>,
    pub transverse: Array1<f64>,
    pub sample_rate: f64,
    /// Index of t = 0, the predicted phase onset. Samples before it are
    /// acausal lags.
    pub onset_index: usize,
    /// Horizontal slowness of the incident wave, s/km.
    pub ray_parameter: f64,
    pub back_azimuth_deg: f64,
    pub method: DeconvolutionMethod,
    /// False when the iterative deconvolution exhausted its iteration budget
    /// without meeting the residual threshold; the traces then hold the best
    /// partial estimate.
    pub converged: bool,
    pub metrics: Option<QcMetrics>,
    pub status: QcStatus,
}

impl RfPair {
    pub fn len(&self) -> usize {
        self.radial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radial.is_empty()
    }

    /// Time axis in seconds relative to the predicted onset.
    pub fn times(&self) -> Array1<f64> {
        let onset = self.onset_index as f64;
        let dt = 1.0 / self.sample_rate;
        Array1::from_iter((0..self.len()).map(|i| (i as f64 - onset) * dt))
    }
}

/// Ordered collection of receiver functions for one station. Append-only
/// during batch assembly; read-only for the stacking and harmonic stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RfCatalog {
    pub station: StationMetadata,
    pub rfs: Vec<RfPair>,
}

impl RfCatalog {
    pub fn new(station: StationMetadata) -> Self {
        RfCatalog {
            station,
            rfs: Vec::new(),
        }
    }

    pub fn push(&mut self, rf: RfPair) {
        self.rfs.push(rf);
    }

    pub fn len(&self) -> usize {
        self.rfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rfs.is_empty()
    }

    /// Entries that passed quality control, in insertion order.
    pub fn accepted(&self) -> impl Iterator<Item = &RfPair> {
        self.rfs.iter().filter(|rf| rf.status.is_accepted())
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted().count()
    }

    pub fn rejected_count(&self) -> usize {
        self.rfs
            .iter()
            .filter(|rf| matches!(rf.status, QcStatus::Rejected { .. }))
            .count()
    }
}

/// Result of an H-k grid search: per-phase stacks, the combined stack, the
/// best-fit cell and a spread-based uncertainty region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HkGrid {
    /// Hypothesis layer thicknesses, km.
    pub h_values: Array1<f64>,
    /// Hypothesis Vp/Vs ratios.
    pub k_values: Array1<f64>,
    /// Stacked amplitude of the primary conversion per (H, k) cell.
    pub ps: Array2<f64>,
    /// Stacked amplitude of the first multiple per cell.
    pub pps: Array2<f64>,
    /// Stacked amplitude of the second multiple per cell.
    pub pss: Array2<f64>,
    /// Weighted combination of the three per-phase stacks.
    pub combined: Array2<f64>,
    /// Number of receiver functions that contributed.
    pub n_rf: usize,
    /// Grid indices (h, k) of the maximum of `combined`.
    pub best_index: (usize, usize),
    pub best_h: f64,
    pub best_k: f64,
    /// H interval enclosed by the uncertainty contour, km.
    pub h_uncertainty: (f64, f64),
    /// k interval enclosed by the uncertainty contour.
    pub k_uncertainty: (f64, f64),
}

/// Back-azimuth harmonic expansion fit across a catalog: one coefficient per
/// basis function per time sample, plus conditioning diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarmonicModel {
    /// Time axis shared with the catalog, seconds relative to onset.
    pub time: Array1<f64>,
    /// Coefficients, shape (5, n_samples): constant, cos, sin, cos2, sin2.
    pub coefficients: Array2<f64>,
    /// Azimuth the decomposition is referenced to, degrees.
    pub azimuth_deg: f64,
    /// Condition number estimate of the normal matrix.
    pub condition: f64,
    /// True when the regression was rank-deficient (sparse or clustered
    /// back-azimuth coverage); coefficients are then a regularized estimate
    /// and must not be treated as a well-constrained fit.
    pub degraded: bool,
}

impl HarmonicModel {
    /// The azimuth-invariant (order zero) radial receiver function.
    pub fn constant_radial(&self) -> Array1<f64> {
        self.coefficients.row(0).to_owned()
    }

    /// Modeled radial and transverse traces for one back-azimuth, degrees.
    pub fn reconstruct(&self, back_azimuth_deg: f64) -> (Array1<f64>, Array1<f64>) {
        let phi = (back_azimuth_deg - self.azimuth_deg).to_radians();
        let br = crate::harmonics::basis_radial(phi);
        let bt = crate::harmonics::basis_transverse(phi);
        let n = self.coefficients.ncols();
        let mut radial = Array1::zeros(n);
        let mut transverse = Array1::zeros(n);
        for j in 0..n {
            let mut r = 0.0;
            let mut t = 0.0;
            for term in 0..5 {
                r += br[term] * self.coefficients[(term, j)];
                t += bt[term] * self.coefficients[(term, j)];
            }
            radial[j] = r;
            transverse[j] = t;
        }
        (radial, transverse)
    }
}
