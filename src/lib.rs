//! # RF Explorer
//!
//! Teleseismic receiver-function computation and post-processing for
//! single-station crustal structure work.
//!
//! The per-event pipeline windows three-component seismograms around the
//! predicted P onset, rotates them into the propagation frame, deconvolves
//! the source component from the horizontals and scores the result:
//!
//! ```text
//! raw Z/N/E  ->  window + rotate  ->  deconvolve  ->  QC  ->  RfCatalog
//!                                                                │
//!                                      ┌─────────────────────────┤
//!                                      ▼                         ▼
//!                                H-k stacking        harmonic decomposition
//! ```
//!
//! Events are independent and processed in parallel by [`RfProcessor`];
//! the two catalog-level engines, [`hk::hk_stack`] and
//! [`harmonics::decompose`], read the assembled catalog without mutating it.
//!
//! External concerns stay external: waveforms and travel times enter through
//! the [`batch::WaveformSource`] and [`traveltime::OnsetModel`] traits, and
//! results leave as serializable records (with optional NPZ archival in
//! [`io`]).

pub mod batch;
pub mod config;
pub mod data_container;
pub mod deconvolution;
pub mod errors;
pub mod harmonics;
pub mod hk;
pub mod io;
pub mod math_tools;
pub mod preprocess;
pub mod qc;
pub mod traveltime;

#[cfg(test)]
pub(crate) mod test_utils;

pub use batch::{BatchSummary, RfProcessor, WaveformSource};
pub use config::RfConfig;
pub use data_container::{
    Component, EventMetadata, HarmonicModel, HkGrid, QcMetrics, QcStatus, RfCatalog, RfPair,
    StationMetadata, Waveform,
};
pub use deconvolution::DeconvolutionMethod;
pub use errors::{RfError, RfResult};
pub use harmonics::HarmonicConfig;
pub use hk::{HkCombination, HkConfig};
pub use preprocess::{Alignment, PreFilter, WindowConfig};
pub use qc::QcConfig;
pub use traveltime::{CoarsePModel, OnsetModel, OnsetPrediction};
