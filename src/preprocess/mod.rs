//! Per-event signal conditioning ahead of deconvolution: onset-window
//! extraction, component rotation into the propagation frame, and the
//! optional band-pass pre-filter.

pub mod band_pass;
pub mod resample;
pub mod rotation;
pub mod window;

pub use band_pass::{band_pass, PreFilter};
pub use resample::{decimate, decimation_factor};
pub use rotation::{rotate_to_alignment, Alignment, RotatedTriplet};
pub use window::{extract_window, WindowConfig};
