//! # Vocal Health Module
//!
//! Jitter, shimmer and harmonics-to-noise ratio of a sustained phonation,
//! each classified on a green / yellow / red scale with a short explanation
//! for the singer. The overall status is the worst of the three.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::AudioSignal;
use crate::config::{EngineConfig, HealthConfig, Locale, LowerBounds, PitchConfig, UpperBounds};
use crate::error::AnalysisError;
use crate::harmonicity::harmonicity;
use crate::pitch::track_pitch;
use crate::point_process::{measure_perturbation, periodic_pulses};
use crate::stats::round_to;

/// Traffic-light status, ordered from healthiest to least healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

/// The three classified measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMetric {
    Jitter,
    Shimmer,
    Hnr,
}

/// Status of one metric plus the sentence shown to the singer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAssessment {
    pub status: HealthStatus,
    pub explanation: String,
}

impl MetricAssessment {
    fn new(metric: HealthMetric, status: HealthStatus, locale: Locale) -> Self {
        Self {
            status,
            explanation: explanation(metric, status, locale).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub jitter_percent: f32,
    pub shimmer_percent: f32,
    pub hnr_db: f32,
    pub jitter: MetricAssessment,
    pub shimmer: MetricAssessment,
    pub hnr: MetricAssessment,
    pub overall: HealthStatus,
    pub voiced_frames: usize,
    pub pulse_count: usize,
}

/// Lower is healthier: `≤ green_max` green, `≤ yellow_max` yellow.
pub fn classify_upper(value: f32, bounds: &UpperBounds) -> HealthStatus {
    if value <= bounds.green_max {
        HealthStatus::Green
    } else if value <= bounds.yellow_max {
        HealthStatus::Yellow
    } else {
        HealthStatus::Red
    }
}

/// Higher is healthier: `≥ green_min` green, `≥ yellow_min` yellow.
pub fn classify_lower(value: f32, bounds: &LowerBounds) -> HealthStatus {
    if value >= bounds.green_min {
        HealthStatus::Green
    } else if value >= bounds.yellow_min {
        HealthStatus::Yellow
    } else {
        HealthStatus::Red
    }
}

pub fn classify_jitter(percent: f32, config: &HealthConfig) -> HealthStatus {
    classify_upper(percent, &config.jitter_percent)
}

pub fn classify_shimmer(percent: f32, config: &HealthConfig) -> HealthStatus {
    classify_upper(percent, &config.shimmer_percent)
}

pub fn classify_hnr(db: f32, config: &HealthConfig) -> HealthStatus {
    classify_lower(db, &config.hnr_db)
}

/// Worst status of the given ones; green for none.
pub fn overall_status(statuses: &[HealthStatus]) -> HealthStatus {
    statuses.iter().copied().max().unwrap_or(HealthStatus::Green)
}

/// Short feedback sentence for a metric in a given state.
pub fn explanation(metric: HealthMetric, status: HealthStatus, locale: Locale) -> &'static str {
    use HealthMetric::*;
    use HealthStatus::*;

    match locale {
        Locale::English => match (metric, status) {
            (Jitter, Green) => "Excellent! Very clear phonation.",
            (Jitter, Yellow) => "Slight roughness. Keep the vocal folds closing gently.",
            (Jitter, Red) => "Roughness detected. Use less pressure or drink some water.",
            (Shimmer, Green) => "Very stable loudness.",
            (Shimmer, Yellow) => "Slight breathiness or wobble in loudness.",
            (Shimmer, Red) => "Breathiness detected. Try to meter your air more evenly.",
            (Hnr, Green) => "Crystal clear tone with little noise.",
            (Hnr, Yellow) => "Somewhat airy tone.",
            (Hnr, Red) => "Very airy, noisy tone. Check your vocal placement.",
        },
        Locale::German => match (metric, status) {
            (Jitter, Green) => "Exzellent! Sehr klare Stimmgebung.",
            (Jitter, Yellow) => "Leichte Rauigkeit. Achte auf entspannten Stimmlippenschluss.",
            (Jitter, Red) => "Rauigkeit erkannt. Bitte weniger Druck oder mehr Wasser trinken.",
            (Shimmer, Green) => "Super stabile Lautstärke.",
            (Shimmer, Yellow) => "Leichtes Hauchen oder Wackeln in der Lautstärke.",
            (Shimmer, Red) => "Hauchigkeit erkannt. Versuche, die Luft besser zu dosieren.",
            (Hnr, Green) => "Glasklarer Klang, wenig Rauschen.",
            (Hnr, Yellow) => "Etwas luftiger Klang.",
            (Hnr, Red) => "Sehr luftiger, rauschiger Klang. Prüfe deinen Stimmsitz.",
        },
    }
}

/// Pitch settings for the perturbation pass: the health pitch range at the
/// health time step, with a frame holding two periods of the lowest pitch.
fn perturbation_pitch_config(config: &EngineConfig, sample_rate: u32) -> PitchConfig {
    let health = &config.health;
    let longest_lag = (sample_rate as f32 / health.pitch_floor).ceil() as usize;
    PitchConfig {
        fmin: health.pitch_floor,
        fmax: health.pitch_ceiling,
        frame_length: (2 * (longest_lag + 2)).next_power_of_two(),
        hop_length: ((health.time_step * sample_rate as f32).round() as usize).max(1),
        ..config.pitch.clone()
    }
}

/// Measures jitter, shimmer and HNR of a clip and classifies them.
///
/// # Errors
/// * `InvalidInput` when the configuration fails validation.
/// * `InsufficientVoicedAudio` when fewer than `min_voiced_frames` frames
///   carry a pitch.
/// * `DecodeOrComputeFailure` when no consecutive glottal periods pass the
///   plausibility bounds.
pub fn analyze_health(signal: &AudioSignal, config: &EngineConfig) -> Result<HealthMetrics, AnalysisError> {
    config.check()?;
    let health = &config.health;
    let pitch_config = perturbation_pitch_config(config, signal.sample_rate());
    let contour = track_pitch(signal, &pitch_config);
    let voiced_frames = contour.voiced_count();

    if voiced_frames < health.min_voiced_frames {
        warn!(
            voiced_frames,
            required = health.min_voiced_frames,
            "too little voiced audio for health analysis"
        );
        return Err(AnalysisError::insufficient_voiced(
            "not enough voiced audio, sing a sustained tone",
            voiced_frames,
        ));
    }

    let pulses = periodic_pulses(signal, &contour, pitch_config.frame_length);
    let perturbation = measure_perturbation(&pulses, health).inspect_err(|err| {
        warn!(error = %err, pulses = pulses.pulse_count(), "perturbation measurement failed");
    })?;
    let hnr_db = harmonicity(signal, health).mean_db();

    let metrics = assess(
        (perturbation.jitter_local * 100.0) as f32,
        (perturbation.shimmer_local * 100.0) as f32,
        hnr_db,
        health,
    );
    debug!(
        jitter_percent = metrics.jitter_percent,
        shimmer_percent = metrics.shimmer_percent,
        hnr_db = metrics.hnr_db,
        voiced_frames,
        overall = metrics.overall.as_str(),
        "health analysis finished"
    );

    Ok(HealthMetrics {
        voiced_frames,
        pulse_count: pulses.pulse_count(),
        ..metrics
    })
}

/// Classifies measured values, then rounds them for display.
fn assess(jitter_percent: f32, shimmer_percent: f32, hnr_db: f32, health: &HealthConfig) -> HealthMetrics {
    let jitter_status = classify_jitter(jitter_percent, health);
    let shimmer_status = classify_shimmer(shimmer_percent, health);
    let hnr_status = classify_hnr(hnr_db, health);

    HealthMetrics {
        jitter_percent: round_to(jitter_percent, 3),
        shimmer_percent: round_to(shimmer_percent, 3),
        hnr_db: round_to(hnr_db, 2),
        jitter: MetricAssessment::new(HealthMetric::Jitter, jitter_status, health.locale),
        shimmer: MetricAssessment::new(HealthMetric::Shimmer, shimmer_status, health.locale),
        hnr: MetricAssessment::new(HealthMetric::Hnr, hnr_status, health.locale),
        overall: overall_status(&[jitter_status, shimmer_status, hnr_status]),
        voiced_frames: 0,
        pulse_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn jitter_boundaries_are_inclusive() {
        let config = HealthConfig::default();
        assert_eq!(classify_jitter(0.9, &config), HealthStatus::Green);
        assert_eq!(classify_jitter(1.04, &config), HealthStatus::Green);
        assert_eq!(classify_jitter(1.2, &config), HealthStatus::Yellow);
        assert_eq!(classify_jitter(1.50, &config), HealthStatus::Yellow);
        assert_eq!(classify_jitter(2.0, &config), HealthStatus::Red);
    }

    #[test]
    fn shimmer_and_hnr_classification() {
        let config = HealthConfig::default();
        assert_eq!(classify_shimmer(2.0, &config), HealthStatus::Green);
        assert_eq!(classify_shimmer(4.5, &config), HealthStatus::Yellow);
        assert_eq!(classify_shimmer(5.01, &config), HealthStatus::Red);

        assert_eq!(classify_hnr(25.0, &config), HealthStatus::Green);
        assert_eq!(classify_hnr(20.0, &config), HealthStatus::Green);
        assert_eq!(classify_hnr(12.0, &config), HealthStatus::Yellow);
        assert_eq!(classify_hnr(11.99, &config), HealthStatus::Red);
    }

    #[test]
    fn overall_is_the_worst_status() {
        use HealthStatus::*;
        assert_eq!(overall_status(&[Green, Green, Green]), Green);
        assert_eq!(overall_status(&[Green, Yellow, Green]), Yellow);
        assert_eq!(overall_status(&[Yellow, Green, Red]), Red);
        assert_eq!(overall_status(&[]), Green);
    }

    #[test]
    fn explanations_follow_the_locale() {
        assert_eq!(
            explanation(HealthMetric::Jitter, HealthStatus::Green, Locale::German),
            "Exzellent! Sehr klare Stimmgebung."
        );
        assert_eq!(
            explanation(HealthMetric::Hnr, HealthStatus::Yellow, Locale::English),
            "Somewhat airy tone."
        );
    }

    #[test]
    fn lights_follow_unrounded_measurements() {
        let config = HealthConfig::default();
        let metrics = assess(1.0404, 3.8104, 19.996, &config);

        assert_eq!(metrics.jitter_percent, 1.04);
        assert_eq!(metrics.jitter.status, HealthStatus::Yellow);
        assert_eq!(metrics.shimmer_percent, 3.81);
        assert_eq!(metrics.shimmer.status, HealthStatus::Yellow);
        assert_eq!(metrics.hnr_db, 20.0);
        assert_eq!(metrics.hnr.status, HealthStatus::Yellow);
        assert_eq!(metrics.overall, HealthStatus::Yellow);
    }

    #[test]
    fn invalid_pitch_floor_is_rejected() {
        let samples: Vec<f32> = (0..16000)
            .map(|i| 0.5 * (2.0 * PI * 220.0 * i as f32 / 16000.0).sin())
            .collect();
        let signal = AudioSignal::new(samples, 16000).unwrap();
        let mut config = EngineConfig::default();
        config.health.pitch_floor = 0.0;

        let err = analyze_health(&signal, &config).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput { .. }));
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let samples: Vec<f32> = (0..16000)
            .map(|i| 0.5 * (2.0 * PI * 180.0 * i as f32 / 16000.0).sin())
            .collect();
        let signal = AudioSignal::new(samples, 16000).unwrap();
        let config = EngineConfig::default();
        assert_eq!(analyze_health(&signal, &config), analyze_health(&signal, &config));
    }

    #[test]
    fn perturbation_pass_frames_hold_two_low_periods() {
        let pitch = perturbation_pitch_config(&EngineConfig::default(), 16000);
        assert_eq!(pitch.frame_length, 512);
        assert_eq!(pitch.hop_length, 160);
        assert_eq!(pitch.fmin, 75.0);
        assert_eq!(pitch.fmax, 600.0);
    }

    #[test]
    fn steady_sine_is_healthy() {
        let sample_rate = 16000;
        let samples: Vec<f32> = (0..sample_rate)
            .map(|i| 0.5 * (2.0 * PI * 220.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        let signal = AudioSignal::new(samples, sample_rate as u32).unwrap();
        let metrics = analyze_health(&signal, &EngineConfig::default()).unwrap();

        assert!(metrics.jitter_percent < 0.5, "jitter {}", metrics.jitter_percent);
        assert!(metrics.shimmer_percent < 1.0, "shimmer {}", metrics.shimmer_percent);
        assert!(metrics.hnr_db > 20.0, "hnr {}", metrics.hnr_db);
        assert_eq!(metrics.overall, HealthStatus::Green);
        assert_eq!(metrics.jitter.explanation, "Excellent! Very clear phonation.");
    }

    #[test]
    fn silence_is_insufficient() {
        let signal = AudioSignal::new(vec![0.0; 16000], 16000).unwrap();
        let err = analyze_health(&signal, &EngineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InsufficientVoicedAudio { voiced_frames: 0, .. }
        ));
    }
}
