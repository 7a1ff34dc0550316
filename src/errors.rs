//! Error taxonomy for the receiver-function pipeline.
//!
//! Per-event problems (missing data, unusable metadata) are recoverable: the
//! batch driver logs them and skips the event. Configuration problems are
//! fatal and are rejected before any computation starts.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type RfResult<T> = Result<T, RfError>;

/// Errors raised by the receiver-function pipeline.
#[derive(Error, Debug)]
pub enum RfError {
    /// Waveform data is missing or does not cover the requested window.
    /// Recoverable: the batch driver skips the event.
    #[error("waveform data unavailable: {reason}")]
    DataUnavailable { reason: String },

    /// Event or station metadata required for processing is absent.
    /// Recoverable: the batch driver skips the event.
    #[error("missing metadata: {what}")]
    MissingMetadata { what: String },

    /// The deconvolution could not produce a usable estimate at all
    /// (e.g. a silent source trace). A merely non-converged iterative
    /// deconvolution is NOT an error; it returns a flagged result.
    #[error("deconvolution failed: {reason}")]
    Deconvolution { reason: String },

    /// Invalid parameters. Fatal: rejected before any work begins.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl RfError {
    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            reason: reason.into(),
        }
    }

    pub fn missing_metadata(what: impl Into<String>) -> Self {
        Self::MissingMetadata { what: what.into() }
    }

    pub fn deconvolution(reason: impl Into<String>) -> Self {
        Self::Deconvolution {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the batch driver may recover from this error by skipping
    /// the offending event.
    pub fn is_skip(&self) -> bool {
        !matches!(self, RfError::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_semantics() {
        assert!(RfError::data_unavailable("gap").is_skip());
        assert!(RfError::missing_metadata("back-azimuth").is_skip());
        assert!(RfError::deconvolution("silent source").is_skip());
        assert!(!RfError::configuration("h_step <= 0").is_skip());
    }
}
