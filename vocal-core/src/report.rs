//! # Report Module
//!
//! Uniform result envelope over every analyzer, plus the flat metrics
//! dictionary handed to feedback generation and scoring.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::accuracy::{self, NoteSequenceAccuracy, PitchAccuracy, PitchStatistics};
use crate::audio::AudioSignal;
use crate::breath::{BreathMetrics, SILENT_MEAN_DB};
use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::health::{self, HealthMetrics};

/// Outcome of one analysis, tagged by analyzer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Breath(Result<BreathMetrics, AnalysisError>),
    PitchStatistics(Result<PitchStatistics, AnalysisError>),
    PitchAccuracy(Result<PitchAccuracy, AnalysisError>),
    NoteSequence(Result<NoteSequenceAccuracy, AnalysisError>),
    Health(Result<HealthMetrics, AnalysisError>),
}

impl AnalysisResult {
    /// Snake-case analyzer name, used as the `analysis` tag when serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Breath(_) => "breath",
            Self::PitchStatistics(_) => "pitch_statistics",
            Self::PitchAccuracy(_) => "pitch_accuracy",
            Self::NoteSequence(_) => "note_sequence",
            Self::Health(_) => "health",
        }
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        match self {
            Self::Breath(r) => r.as_ref().err(),
            Self::PitchStatistics(r) => r.as_ref().err(),
            Self::PitchAccuracy(r) => r.as_ref().err(),
            Self::NoteSequence(r) => r.as_ref().err(),
            Self::Health(r) => r.as_ref().err(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    /// Flat metrics dictionary keyed by metric name.
    ///
    /// A failed breath analysis keeps the success keys: duration, spread
    /// and stability at 0.0, the silent mean level, and the measured noise
    /// floor when there is one. Other failures yield an empty dictionary.
    pub fn metrics(&self) -> Map<String, Value> {
        match self {
            Self::Breath(Ok(m)) => object(m),
            Self::Breath(Err(err)) => {
                let mut map = Map::new();
                map.insert("duration_seconds".into(), json!(0.0));
                map.insert("mean_amplitude_db".into(), json!(SILENT_MEAN_DB));
                map.insert("std_amplitude_db".into(), json!(0.0));
                map.insert("stability_score".into(), json!(0.0));
                if let Some(floor) = err.noise_floor_db() {
                    map.insert("noise_floor_db".into(), json!(floor));
                }
                map
            }
            Self::PitchStatistics(Ok(m)) => object(m),
            Self::PitchAccuracy(Ok(m)) => object(m),
            Self::NoteSequence(Ok(m)) => object(m),
            Self::Health(Ok(m)) => {
                let mut map = object(m);
                map.insert("health_status".into(), json!(m.overall));
                map
            }
            _ => Map::new(),
        }
    }
}

fn object<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[derive(Serialize)]
struct ResultView<'a> {
    analysis: &'static str,
    success: bool,
    metrics: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a AnalysisError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultView {
            analysis: self.kind(),
            success: self.is_success(),
            metrics: self.metrics(),
            error: self.error(),
            message: self.error_message(),
        }
        .serialize(serializer)
    }
}

/// Freeform pitch statistics and vocal health of one clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub pitch: AnalysisResult,
    pub health: AnalysisResult,
}

impl PerformanceReport {
    pub fn is_success(&self) -> bool {
        self.pitch.is_success() || self.health.is_success()
    }

    /// Metrics of every successful part merged into one dictionary.
    pub fn metrics(&self) -> Map<String, Value> {
        let mut merged = self.pitch.metrics();
        merged.extend(self.health.metrics());
        merged
    }

    pub fn errors(&self) -> Vec<&AnalysisError> {
        [self.pitch.error(), self.health.error()].into_iter().flatten().collect()
    }
}

/// Runs pitch statistics and health analysis on the same clip.
pub fn analyze_performance(signal: &AudioSignal, config: &EngineConfig) -> PerformanceReport {
    let report = PerformanceReport {
        pitch: AnalysisResult::PitchStatistics(accuracy::analyze_pitch(signal, config)),
        health: AnalysisResult::Health(health::analyze_health(signal, config)),
    };
    debug!(
        pitch_ok = report.pitch.is_success(),
        health_ok = report.health.is_success(),
        "performance analysis finished"
    );
    report
}
