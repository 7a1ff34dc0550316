//! NPZ archival of pipeline results.
//!
//! The core exposes receiver functions, H-k grids and harmonic models as
//! plain serializable records; these writers store the numeric payloads as
//! NumPy archives for downstream plotting and exchange. Nothing here is
//! consumed by the numerical pipeline itself.

use crate::data_container::{HarmonicModel, HkGrid, RfPair};
use ndarray::arr0;
use ndarray_npy::NpzWriter;
use std::error::Error;
use std::fs::File;
use std::path::Path;

/// Writes one receiver function pair (traces, time axis and scalar
/// parameters) to an `.npz` archive.
pub fn save_rf_pair(rf: &RfPair, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("time", &rf.times())?;
    npz.add_array("radial", &rf.radial)?;
    npz.add_array("transverse", &rf.transverse)?;
    npz.add_array("sample_rate", &arr0(rf.sample_rate))?;
    npz.add_array("ray_parameter", &arr0(rf.ray_parameter))?;
    npz.add_array("back_azimuth", &arr0(rf.back_azimuth_deg))?;
    npz.add_array("converged", &arr0(if rf.converged { 1.0 } else { 0.0 }))?;
    npz.finish()?;
    Ok(())
}

/// Writes the per-phase and combined H-k stacks with their axes and the
/// best-fit estimate.
pub fn save_hk_grid(grid: &HkGrid, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("h", &grid.h_values)?;
    npz.add_array("k", &grid.k_values)?;
    npz.add_array("ps", &grid.ps)?;
    npz.add_array("pps", &grid.pps)?;
    npz.add_array("pss", &grid.pss)?;
    npz.add_array("combined", &grid.combined)?;
    npz.add_array("best_h", &arr0(grid.best_h))?;
    npz.add_array("best_k", &arr0(grid.best_k))?;
    npz.add_array(
        "h_uncertainty",
        &ndarray::arr1(&[grid.h_uncertainty.0, grid.h_uncertainty.1]),
    )?;
    npz.add_array(
        "k_uncertainty",
        &ndarray::arr1(&[grid.k_uncertainty.0, grid.k_uncertainty.1]),
    )?;
    npz.finish()?;
    Ok(())
}

/// Writes the harmonic coefficient block and its diagnostics.
pub fn save_harmonic_model(model: &HarmonicModel, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("time", &model.time)?;
    npz.add_array("coefficients", &model.coefficients)?;
    npz.add_array("azimuth", &arr0(model.azimuth_deg))?;
    npz.add_array("condition", &arr0(model.condition))?;
    npz.add_array("degraded", &arr0(if model.degraded { 1.0 } else { 0.0 }))?;
    npz.finish()?;
    Ok(())
}
