//! # Breath Stability Module
//!
//! Scores how steadily a sustained sound (a held "s", a vowel) is kept up.
//!
//! ## Algorithm
//! 1. Peak-referenced dB envelope of the clip
//! 2. Noise floor = low percentile of the envelope
//! 3. Activity threshold = floor + a share of the dynamic range, clamped
//! 4. Mean and standard deviation of the frames above the threshold
//! 5. Standard deviation mapped to 0..1 against difficulty-dependent tolerances

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::AudioSignal;
use crate::config::{BreathConfig, EngineConfig};
use crate::envelope::amplitude_envelope;
use crate::error::AnalysisError;
use crate::stats;

/// Mean loudness reported for a clip without any active phonation.
pub const SILENT_MEAN_DB: f32 = -80.0;

/// Standard deviations (dB) that score 1.0 and 0.0 for a difficulty level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityTolerance {
    pub target_std: f32,
    pub max_std: f32,
}

const TOLERANCES: [StabilityTolerance; 5] = [
    StabilityTolerance { target_std: 2.5, max_std: 6.0 },
    StabilityTolerance { target_std: 2.0, max_std: 5.5 },
    StabilityTolerance { target_std: 1.5, max_std: 5.0 },
    StabilityTolerance { target_std: 1.0, max_std: 4.5 },
    StabilityTolerance { target_std: 0.7, max_std: 4.0 },
];

/// Result of a successful breath stability analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathMetrics {
    pub duration_seconds: f32,
    pub mean_amplitude_db: f32,
    /// Lower is steadier.
    pub std_amplitude_db: f32,
    /// 0.0 (unsteady) to 1.0 (steady).
    pub stability_score: f32,
    pub noise_floor_db: f32,
    pub activity_threshold_db: f32,
    pub active_frames: usize,
    /// Difficulty level actually applied, after clamping.
    pub difficulty: u8,
}

/// Clamps a requested difficulty into 1..=5, truncating fractions.
pub fn difficulty_level(difficulty: f32) -> u8 {
    // NaN casts to 0 and lands on level 1.
    (difficulty.trunc() as i32).clamp(1, 5) as u8
}

/// Tolerances for a difficulty level (clamped into 1..=5).
pub fn stability_tolerance(difficulty: f32) -> StabilityTolerance {
    TOLERANCES[usize::from(difficulty_level(difficulty)) - 1]
}

/// The adaptive activity threshold policy.
///
/// `noise_floor + ratio × (0 − noise_floor)`, clamped to
/// `[threshold_floor_db, threshold_ceiling_db]`. The ceiling keeps loud,
/// clean recordings from cutting off real signal; the floor keeps deep
/// silence from triggering.
pub fn activity_threshold(noise_floor_db: f32, config: &BreathConfig) -> f32 {
    let dynamic_range = 0.0 - noise_floor_db;
    let raw = noise_floor_db + dynamic_range * config.dynamic_range_ratio;
    raw.min(config.threshold_ceiling_db)
        .max(config.threshold_floor_db)
}

/// Maps a loudness standard deviation to a 0..1 stability score.
pub fn stability_score(std_db: f32, difficulty: f32) -> f32 {
    let StabilityTolerance {
        target_std,
        max_std,
    } = stability_tolerance(difficulty);

    if std_db <= target_std {
        1.0
    } else if std_db >= max_std {
        0.0
    } else {
        (1.0 - (std_db - target_std) / (max_std - target_std)).clamp(0.0, 1.0)
    }
}

/// Analyzes a sustained-phonation clip.
///
/// # Errors
/// * `InvalidInput` when the configuration fails validation.
/// * `NoSignalDetected` (with the measured noise floor) when no frame rises
///   above the activity threshold.
pub fn analyze_breath(
    signal: &AudioSignal,
    difficulty: f32,
    config: &EngineConfig,
) -> Result<BreathMetrics, AnalysisError> {
    config.check()?;
    let envelope = amplitude_envelope(signal, &config.envelope);

    let noise_floor_db = stats::percentile(&envelope.db, config.breath.noise_floor_percentile)
        .ok_or_else(|| AnalysisError::compute("amplitude envelope has no frames"))?;
    let threshold_db = activity_threshold(noise_floor_db, &config.breath);

    let active: Vec<f32> = envelope
        .db
        .iter()
        .copied()
        .filter(|&db| db > threshold_db)
        .collect();

    debug!(
        frames = envelope.len(),
        active = active.len(),
        noise_floor_db,
        threshold_db,
        "breath envelope thresholded"
    );

    let (Some(mean_db), Some(std_db)) = (stats::mean(&active), stats::std_dev(&active)) else {
        warn!(noise_floor_db, threshold_db, "no sustained phonation detected");
        return Err(AnalysisError::no_signal(
            "no sustained phonation above the activity threshold",
            Some(noise_floor_db),
        ));
    };

    Ok(BreathMetrics {
        duration_seconds: signal.duration_seconds(),
        mean_amplitude_db: mean_db,
        std_amplitude_db: std_db,
        stability_score: stability_score(std_db, difficulty),
        noise_floor_db,
        activity_threshold_db: threshold_db,
        active_frames: active.len(),
        difficulty: difficulty_level(difficulty),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 22050;

    fn tone(freq: f32, amplitude: f32, seconds: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * seconds) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    /// Deterministic uniform noise in [-amplitude, amplitude].
    fn noise(amplitude: f32, seconds: f32, seed: u32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * seconds) as usize;
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as f32 / 32768.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn analyze(samples: Vec<f32>, difficulty: f32) -> Result<BreathMetrics, AnalysisError> {
        let signal = AudioSignal::new(samples, SAMPLE_RATE).unwrap();
        analyze_breath(&signal, difficulty, &EngineConfig::default())
    }

    #[test]
    fn threshold_policy_adds_a_quarter_of_the_range() {
        let config = BreathConfig::default();
        assert!((activity_threshold(-40.0, &config) + 30.0).abs() < 1e-6);
        assert!((activity_threshold(-60.0, &config) + 45.0).abs() < 1e-6);
    }

    #[test]
    fn threshold_policy_clamps_both_ends() {
        let config = BreathConfig::default();
        // raw -7.5 dB would cut off loud signal
        assert_eq!(activity_threshold(-10.0, &config), -15.0);
        // raw -75 dB would trigger on deep silence
        assert_eq!(activity_threshold(-100.0, &config), -70.0);
        assert_eq!(activity_threshold(-93.4, &config), -70.0);
    }

    #[test]
    fn difficulty_is_clamped_and_truncated() {
        assert_eq!(difficulty_level(0.0), 1);
        assert_eq!(difficulty_level(-3.0), 1);
        assert_eq!(difficulty_level(3.9), 3);
        assert_eq!(difficulty_level(12.0), 5);
        assert_eq!(difficulty_level(f32::NAN), 1);
        assert_eq!(stability_tolerance(5.0).target_std, 0.7);
    }

    #[test]
    fn score_interpolates_between_tolerances() {
        assert_eq!(stability_score(2.5, 1.0), 1.0);
        assert_eq!(stability_score(6.0, 1.0), 0.0);
        assert!((stability_score(4.25, 1.0) - 0.5).abs() < 1e-6);
        assert_eq!(stability_score(4.0, 5.0), 0.0);
        assert!((stability_score(1.0, 4.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn steady_tone_over_noise_floor_is_fully_stable() {
        // -40 dB noise, a steady -10 dB tone, -40 dB noise
        let mut samples = noise(0.01 * 3f32.sqrt(), 1.0, 7);
        samples.extend(tone(220.0, 0.316 * 2f32.sqrt(), 10.0));
        samples.extend(noise(0.01 * 3f32.sqrt(), 1.0, 11));

        for difficulty in 1..=5 {
            let metrics = analyze(samples.clone(), difficulty as f32).unwrap();
            assert!(
                metrics.std_amplitude_db < 0.7,
                "std {} too high",
                metrics.std_amplitude_db
            );
            assert_eq!(metrics.stability_score, 1.0);
            assert!(metrics.noise_floor_db < -25.0 && metrics.noise_floor_db > -35.0);
            assert!(metrics.mean_amplitude_db > -1.0);
        }
    }

    #[test]
    fn silence_is_a_failure() {
        let err = analyze(vec![0.0; SAMPLE_RATE as usize * 2], 1.0).unwrap_err();
        assert!(matches!(err, AnalysisError::NoSignalDetected { .. }));
        assert_eq!(err.noise_floor_db(), Some(-80.0));
    }

    #[test]
    fn upper_clamp_keeps_quieter_phonation_active() {
        // 80% at full level, 20% 12 dB lower: raw threshold -9 dB, clamped to -15 dB.
        let mut samples = tone(220.0, 1.0, 8.0);
        samples.extend(tone(220.0, 0.251, 2.0));
        let metrics = analyze(samples, 1.0).unwrap();

        assert_eq!(metrics.activity_threshold_db, -15.0);
        let total_frames = (SAMPLE_RATE as usize * 10 - 2048) / 512 + 1;
        assert_eq!(metrics.active_frames, total_frames);
        assert!(metrics.mean_amplitude_db < -1.0);
    }

    #[test]
    fn wobbling_tone_scores_lower_than_steady_tone() {
        let steady = analyze(tone(220.0, 0.5, 4.0), 3.0).unwrap();
        let wobbling: Vec<f32> = tone(220.0, 0.5, 4.0)
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let t = i as f32 / SAMPLE_RATE as f32;
                s * (0.55 + 0.45 * (2.0 * PI * 1.5 * t).sin())
            })
            .collect();
        let wobbling = analyze(wobbling, 3.0).unwrap();

        assert_eq!(steady.stability_score, 1.0);
        assert!(wobbling.std_amplitude_db > steady.std_amplitude_db);
        assert!(wobbling.stability_score < 1.0);
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let samples = tone(330.0, 0.4, 2.0);
        assert_eq!(analyze(samples.clone(), 2.0), analyze(samples, 2.0));
    }
}
