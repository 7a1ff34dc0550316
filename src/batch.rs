//! Batch driver: runs the per-event chain (window, rotate, filter,
//! deconvolve, score) over an event list and assembles the station catalog.
//!
//! Events are independent and run on the rayon pool; results stream through
//! a channel into a single-writer merge that restores catalog order, so the
//! assembled catalog does not depend on scheduling. Per-event failures are
//! skips counted in the summary; only an invalid configuration aborts, and
//! it does so before any event is processed.

use crate::config::RfConfig;
use crate::data_container::{
    Component, EventMetadata, QcStatus, RfCatalog, RfPair, StationMetadata, Waveform,
};
use crate::deconvolution::deconvolve;
use crate::errors::{RfError, RfResult};
use crate::preprocess::{
    band_pass, decimate, decimation_factor, extract_window, rotate_to_alignment,
};
use crate::qc;
use crate::traveltime::{incidence_angle_deg, OnsetModel};
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::unbounded;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};

/// External supplier of raw three-component waveforms.
///
/// Implementations return the Z/N/E traces covering at least
/// `[start, start + duration]`, or [`RfError::DataUnavailable`] for gaps.
pub trait WaveformSource: Sync {
    fn fetch(
        &self,
        station: &StationMetadata,
        event: &EventMetadata,
        start: DateTime<Utc>,
        duration: f64,
    ) -> RfResult<Vec<Waveform>>;
}

/// Outcome counters of one batch run.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Events for which a receiver function was computed.
    pub processed: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Events skipped for missing data or metadata.
    pub skipped: usize,
    /// Receiver functions kept with a non-converged deconvolution.
    pub flagged: usize,
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed ({} accepted, {} rejected, {} flagged), {} skipped",
            self.processed, self.accepted, self.rejected, self.flagged, self.skipped
        )
    }
}

/// Runs the validated per-event chain and assembles catalogs.
#[derive(Debug)]
pub struct RfProcessor {
    config: RfConfig,
}

impl RfProcessor {
    /// Validates the configuration up front; an invalid configuration never
    /// reaches the data.
    pub fn new(config: RfConfig) -> RfResult<Self> {
        config.validate()?;
        Ok(RfProcessor { config })
    }

    pub fn config(&self) -> &RfConfig {
        &self.config
    }

    /// Full chain for a single event. Errors are per-event skips.
    pub fn process_event(
        &self,
        station: &StationMetadata,
        event: &EventMetadata,
        waveforms: &dyn WaveformSource,
        onset_model: &dyn OnsetModel,
    ) -> RfResult<RfPair> {
        let config = &self.config;
        let prediction = onset_model.predict(event.distance_deg, event.depth_km)?;
        let onset = event.origin_time
            + Duration::microseconds((prediction.travel_time * 1e6) as i64);

        let fetch_start = onset - Duration::microseconds((config.window.pre * 1e6) as i64);
        let traces = waveforms.fetch(
            station,
            event,
            fetch_start,
            config.window.pre + config.window.post,
        )?;
        let pick = |component: Component| -> RfResult<&Waveform> {
            traces
                .iter()
                .find(|w| w.component == component)
                .ok_or_else(|| {
                    RfError::missing_metadata(format!("{component} component waveform"))
                })
        };
        let z = pick(Component::Vertical)?;
        let n = pick(Component::North)?;
        let e = pick(Component::East)?;

        let mut windows = [
            extract_window(z, onset, &config.window)?,
            extract_window(n, onset, &config.window)?,
            extract_window(e, onset, &config.window)?,
        ];

        if let Some(target) = config.target_sample_rate {
            let native = windows[0].sample_rate;
            let factor = decimation_factor(native, target).ok_or_else(|| {
                RfError::data_unavailable(format!(
                    "native rate {native} Hz is not an integer multiple of {target} Hz"
                ))
            })?;
            if factor > 1 {
                for w in windows.iter_mut() {
                    *w = decimate(w, factor)?;
                }
            }
        }

        if let Some(filter) = &config.pre_filter {
            for w in windows.iter_mut() {
                band_pass(w, filter)?;
            }
        }

        let incidence = incidence_angle_deg(prediction.ray_parameter, config.near_surface_vp);
        let [z, n, e] = &windows;
        let triplet =
            rotate_to_alignment(z, n, e, station, event, config.alignment, incidence)?;

        let onset_index = config.window.onset_index(triplet.source.sample_rate);
        let mut rf = deconvolve(
            &triplet,
            event,
            prediction.ray_parameter,
            onset_index,
            &config.method,
        )?;
        qc::evaluate(&mut rf, &triplet.source, &triplet.radial, &config.qc)?;
        Ok(rf)
    }

    /// Processes every event in parallel and assembles the station catalog.
    ///
    /// Per-event failures are logged and counted as skips; raising `abort`
    /// drops the remaining events and returns the partial catalog.
    pub fn process_events(
        &self,
        station: &StationMetadata,
        events: &[EventMetadata],
        waveforms: &dyn WaveformSource,
        onset_model: &dyn OnsetModel,
        abort: &AtomicBool,
    ) -> (RfCatalog, BatchSummary) {
        let (sender, receiver) = unbounded();
        events
            .par_iter()
            .enumerate()
            .for_each_with(sender, |s, (index, event)| {
                if abort.load(Relaxed) {
                    return;
                }
                let result = self.process_event(station, event, waveforms, onset_model);
                s.send((index, result)).ok();
            });

        // single-writer merge in event order
        let mut results: Vec<(usize, RfResult<RfPair>)> = receiver.try_iter().collect();
        results.sort_by_key(|(index, _)| *index);

        let mut catalog = RfCatalog::new(station.clone());
        let mut summary = BatchSummary {
            skipped: events.len() - results.len(),
            ..BatchSummary::default()
        };
        for (index, result) in results {
            match result {
                Ok(rf) => {
                    summary.processed += 1;
                    if !rf.converged {
                        summary.flagged += 1;
                    }
                    match rf.status {
                        QcStatus::Accepted => summary.accepted += 1,
                        QcStatus::Rejected { .. } => summary.rejected += 1,
                        QcStatus::Pending => {}
                    }
                    catalog.push(rf);
                }
                Err(err) => {
                    warn!("skipping event {index}: {err}");
                    summary.skipped += 1;
                }
            }
        }
        info!("batch for {}: {}", station.code, summary);
        (catalog, summary)
    }
}
