//! Pipeline configuration: everything the per-event chain (windowing,
//! rotation, filtering, deconvolution, quality control) needs, validated in
//! one place before any computation starts.

use crate::deconvolution::DeconvolutionMethod;
use crate::errors::{RfError, RfResult};
use crate::preprocess::{Alignment, PreFilter, WindowConfig};
use crate::qc::QcConfig;
use serde::{Deserialize, Serialize};

/// Parameters of the per-event receiver-function chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RfConfig {
    /// Target frame for the component rotation.
    pub alignment: Alignment,
    pub window: WindowConfig,
    /// Optional band-pass applied to all components before deconvolution.
    pub pre_filter: Option<PreFilter>,
    /// Output sample rate of the receiver functions; `None` keeps the
    /// native rate. Only integer decimations of the native rate are
    /// accepted.
    pub target_sample_rate: Option<f64>,
    /// Near-surface P velocity used for the LQT incidence angle, km/s.
    pub near_surface_vp: f64,
    pub method: DeconvolutionMethod,
    pub qc: QcConfig,
}

impl Default for RfConfig {
    fn default() -> Self {
        RfConfig {
            alignment: Alignment::Zrt,
            window: WindowConfig::default(),
            pre_filter: Some(PreFilter::new(0.05, 1.0)),
            target_sample_rate: Some(10.0),
            near_surface_vp: 6.0,
            method: DeconvolutionMethod::default(),
            qc: QcConfig::default(),
        }
    }
}

impl RfConfig {
    /// Checks every parameter, rejecting the configuration before any event
    /// is touched.
    pub fn validate(&self) -> RfResult<()> {
        self.window.validate()?;
        if let Some(filter) = &self.pre_filter {
            filter.validate()?;
        }
        if let Some(rate) = self.target_sample_rate {
            if !(rate > 0.0) {
                return Err(RfError::configuration(
                    "target sample rate must be positive",
                ));
            }
        }
        if !(self.near_surface_vp > 0.0) {
            return Err(RfError::configuration(
                "near-surface Vp must be positive",
            ));
        }
        self.method.validate()?;
        self.qc.validate()?;
        if self.qc.noise_window > self.window.pre {
            return Err(RfError::configuration(
                "QC noise window is longer than the pre-onset window",
            ));
        }
        if self.qc.signal_window > self.window.post {
            return Err(RfError::configuration(
                "QC signal window is longer than the post-onset window",
            ));
        }
        Ok(())
    }
}
