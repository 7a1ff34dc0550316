//! Travel-time collaborators: the external onset/ray-parameter model consumed
//! by the windowing stage, and the closed-form crustal phase moveouts the H-k
//! stacking engine evaluates on every grid cell.

use crate::errors::{RfError, RfResult};
use interp1d::Interp1d;

/// Predicted first arrival for a given source-receiver geometry.
#[derive(Clone, Copy, Debug)]
pub struct OnsetPrediction {
    /// Travel time from origin to predicted onset, seconds.
    pub travel_time: f64,
    /// Horizontal slowness of the incident wave, s/km.
    pub ray_parameter: f64,
}

/// External travel-time model supplying the predicted phase onset and ray
/// parameter for an event-station geometry.
pub trait OnsetModel: Send + Sync {
    fn predict(&self, distance_deg: f64, depth_km: f64) -> RfResult<OnsetPrediction>;
}

/// Coarse teleseismic P travel-time table (30-100 degrees), linearly
/// interpolated. Good to a few seconds, which is ample for positioning the
/// analysis window; production runs substitute a proper 1-D model through
/// [`OnsetModel`].
pub struct CoarsePModel {
    distance: Vec<f64>,
    times: Vec<f64>,
    p_s_per_deg: Vec<f64>,
}

/// Kilometers per degree of great-circle arc.
pub const KM_PER_DEG: f64 = 111.19;

impl CoarsePModel {
    pub fn new() -> Self {
        CoarsePModel {
            distance: vec![30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0],
            // surface-focus P times (s) and slownesses (s/deg)
            times: vec![372.5, 451.5, 524.5, 592.0, 654.0, 710.5, 761.5, 806.5],
            p_s_per_deg: vec![8.85, 8.30, 7.76, 7.07, 6.36, 5.61, 4.98, 4.58],
        }
    }
}

impl Default for CoarsePModel {
    fn default() -> Self {
        Self::new()
    }
}

impl OnsetModel for CoarsePModel {
    fn predict(&self, distance_deg: f64, depth_km: f64) -> RfResult<OnsetPrediction> {
        if !(30.0..=100.0).contains(&distance_deg) {
            return Err(RfError::missing_metadata(format!(
                "distance {distance_deg:.1} deg outside the 30-100 deg teleseismic P range"
            )));
        }
        let time_curve = Interp1d::new_unsorted(self.distance.clone(), self.times.clone())
            .expect("travel-time table is well-formed");
        let slowness_curve = Interp1d::new_unsorted(self.distance.clone(), self.p_s_per_deg.clone())
            .expect("slowness table is well-formed");
        let surface_time = time_curve.interpolate(distance_deg);
        // crude source-depth correction at a mean lower-mantle speed
        let travel_time = surface_time - depth_km / 8.8;
        let ray_parameter = slowness_curve.interpolate(distance_deg) / KM_PER_DEG;
        Ok(OnsetPrediction {
            travel_time,
            ray_parameter,
        })
    }
}

/// P incidence angle at the surface, degrees, from ray parameter (s/km) and
/// near-surface P velocity (km/s).
pub fn incidence_angle_deg(ray_parameter: f64, vp: f64) -> f64 {
    (ray_parameter * vp).clamp(-1.0, 1.0).asin().to_degrees()
}

/// Vertical slownesses (s/km) of P and S legs in a layer of P velocity `vp`
/// and Vp/Vs ratio `k`, for horizontal slowness `p`.
///
/// Requires `p < 1/vp` (and hence `p < k/vp`); the stacking engine filters
/// out rays that turn within the layer before calling this.
pub(crate) fn vertical_slownesses(k: f64, vp: f64, p: f64) -> (f64, f64) {
    let eta_p = (1.0 / (vp * vp) - p * p).sqrt();
    let eta_s = ((k * k) / (vp * vp) - p * p).sqrt();
    (eta_p, eta_s)
}

/// Delay of the direct conversion (Ps) behind the direct arrival for a layer
/// of thickness `h` km.
pub fn ps_delay(h: f64, k: f64, vp: f64, p: f64) -> f64 {
    let (eta_p, eta_s) = vertical_slownesses(k, vp, p);
    h * (eta_s - eta_p)
}

/// Delay of the first surface multiple (PpPs).
pub fn pps_delay(h: f64, k: f64, vp: f64, p: f64) -> f64 {
    let (eta_p, eta_s) = vertical_slownesses(k, vp, p);
    h * (eta_s + eta_p)
}

/// Delay of the second surface multiple (PpSs + PsPs).
pub fn pss_delay(h: f64, k: f64, vp: f64, p: f64) -> f64 {
    let (_, eta_s) = vertical_slownesses(k, vp, p);
    2.0 * h * eta_s
}
