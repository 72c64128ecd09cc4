//! # Error Module
//!
//! The failure taxonomy shared by every analyzer. Analyzers never panic or
//! raise to the caller: each public operation returns
//! `Result<_, AnalysisError>` and the error carries a human-readable message
//! plus whatever diagnostic data was measured before the failure.

use serde::Serialize;
use thiserror::Error;

/// Why an analysis could not produce metrics.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    /// Silence, or no active phonation above the adaptive threshold.
    #[error("no signal detected: {reason}")]
    NoSignalDetected {
        reason: String,
        /// The measured noise floor, when the envelope got that far.
        noise_floor_db: Option<f32>,
    },
    /// Too few reliable pitch frames for the requested measurement.
    #[error("insufficient voiced audio: {reason} ({voiced_frames} voiced frames)")]
    InsufficientVoicedAudio { reason: String, voiced_frames: usize },
    /// Any lower-level numeric fault.
    #[error("analysis failed: {message}")]
    DecodeOrComputeFailure { message: String },
    /// The caller handed over a malformed signal, pattern or configuration.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl AnalysisError {
    pub(crate) fn no_signal(reason: impl Into<String>, noise_floor_db: Option<f32>) -> Self {
        Self::NoSignalDetected {
            reason: reason.into(),
            noise_floor_db,
        }
    }

    pub(crate) fn insufficient_voiced(reason: impl Into<String>, voiced_frames: usize) -> Self {
        Self::InsufficientVoicedAudio {
            reason: reason.into(),
            voiced_frames,
        }
    }

    pub(crate) fn compute(message: impl std::fmt::Display) -> Self {
        Self::DecodeOrComputeFailure {
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// The noise floor measured before the failure, if any.
    pub fn noise_floor_db(&self) -> Option<f32> {
        match self {
            Self::NoSignalDetected { noise_floor_db, .. } => *noise_floor_db,
            _ => None,
        }
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        // Alternate formatting keeps the whole context chain in one line.
        Self::compute(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn anyhow_chain_becomes_compute_failure() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("zero periods"))
            .context("measuring jitter");
        let converted = AnalysisError::from(err.unwrap_err());
        assert_eq!(
            converted,
            AnalysisError::DecodeOrComputeFailure {
                message: "measuring jitter: zero periods".to_string()
            }
        );
    }

    #[test]
    fn noise_floor_only_on_no_signal() {
        let err = AnalysisError::no_signal("silence", Some(-80.0));
        assert_eq!(err.noise_floor_db(), Some(-80.0));
        assert!(err.to_string().contains("silence"));

        let err = AnalysisError::insufficient_voiced("too short", 3);
        assert_eq!(err.noise_floor_db(), None);
        assert!(err.to_string().contains("3 voiced frames"));
    }
}
