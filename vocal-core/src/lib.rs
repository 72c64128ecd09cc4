// vocal-core/src/lib.rs

//! The analysis engine behind vocal exercise feedback.
//! This crate turns a recorded clip into objective measurements: breath
//! stability of a sustained tone, pitch and rhythm accuracy against an
//! exercise pattern, and vocal health (jitter, shimmer, HNR) on a
//! traffic-light scale. It is headless and performs no I/O; decoding audio
//! and rendering feedback belong to the host.
//!
//! Every analyzer is a pure function of a mono [`AudioSignal`] and an
//! [`EngineConfig`], returning `Result<_, AnalysisError>`.

pub mod accuracy;
pub mod alignment;
pub mod audio;
pub mod breath;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fft;
pub mod harmonicity;
pub mod health;
pub mod pattern;
pub mod pitch;
pub mod point_process;
pub mod report;
pub mod stats;
pub mod tuning;

pub use accuracy::{
    NoteSequenceAccuracy, PitchAccuracy, PitchStatistics, ScoreBand, TempoQualifier, analyze_note_sequence,
    analyze_pitch, analyze_pitch_accuracy, score_against_target,
};
pub use alignment::{Alignment, BandedDtw, Dtw, FullDtw, SequenceAligner};
pub use audio::AudioSignal;
pub use breath::{BreathMetrics, analyze_breath};
pub use config::{AlignmentConfig, EngineConfig, Locale};
pub use error::AnalysisError;
pub use health::{HealthMetrics, HealthStatus, MetricAssessment, analyze_health};
pub use pattern::{TargetCurve, TargetPattern};
pub use pitch::{PitchContour, track_pitch};
pub use report::{AnalysisResult, PerformanceReport, analyze_performance};
