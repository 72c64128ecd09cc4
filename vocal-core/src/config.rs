//! # Engine Configuration
//!
//! Every tunable constant of the analyzers, grouped per analyzer. The
//! defaults are the calibrated values the scores were tuned against;
//! overriding them is meant for experiments and tests.
//!
//! Configuration is plain data: it can be saved to and loaded from JSON so
//! the surrounding application can keep it next to its exercise catalog.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::audio::{FRAME_LENGTH, HOP_LENGTH};
use crate::error::AnalysisError;

/// Widest accepted DTW band radius, in frames.
pub const MAX_BAND_RADIUS: usize = 1 << 20;
/// Lowest accepted health pitch floor.
pub const MIN_PITCH_FLOOR_HZ: f32 = 20.0;

/// Top-level configuration handed to the analyzers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub envelope: EnvelopeConfig,
    pub breath: BreathConfig,
    pub pitch: PitchConfig,
    pub alignment: AlignmentConfig,
    pub health: HealthConfig,
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize engine configuration")
    }

    /// Checks the invariants the analyzers rely on.
    pub fn validate(&self) -> Result<()> {
        self.envelope.validate().context("invalid envelope configuration")?;
        self.breath.validate().context("invalid breath configuration")?;
        self.pitch.validate().context("invalid pitch configuration")?;
        self.alignment.validate().context("invalid alignment configuration")?;
        self.health.validate().context("invalid health configuration")?;
        Ok(())
    }

    /// [`validate`](Self::validate) as run at every analyzer entry, so
    /// hand-built configurations fail with `InvalidInput` instead of panicking.
    pub fn check(&self) -> std::result::Result<(), AnalysisError> {
        self.validate()
            .map_err(|err| AnalysisError::invalid_input(format!("{err:#}")))
    }
}

/// Amplitude envelope framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub frame_length: usize,
    pub hop_length: usize,
    /// Floor of the envelope below the loudest frame, in dB.
    pub top_db: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            frame_length: FRAME_LENGTH,
            hop_length: HOP_LENGTH,
            top_db: 80.0,
        }
    }
}

impl EnvelopeConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.frame_length > 0, "frame_length must be positive");
        ensure!(self.hop_length > 0, "hop_length must be positive");
        ensure!(self.top_db > 0.0, "top_db must be positive");
        Ok(())
    }
}

/// Adaptive activity threshold of the breath analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathConfig {
    /// Percentile of the envelope taken as the noise floor.
    pub noise_floor_percentile: f32,
    /// Share of the dynamic range added on top of the noise floor.
    pub dynamic_range_ratio: f32,
    /// Lowest allowed activity threshold, in dB.
    pub threshold_floor_db: f32,
    /// Highest allowed activity threshold, in dB.
    pub threshold_ceiling_db: f32,
}

impl Default for BreathConfig {
    fn default() -> Self {
        Self {
            noise_floor_percentile: 10.0,
            dynamic_range_ratio: 0.25,
            threshold_floor_db: -70.0,
            threshold_ceiling_db: -15.0,
        }
    }
}

impl BreathConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=100.0).contains(&self.noise_floor_percentile),
            "noise_floor_percentile must be within 0..=100"
        );
        ensure!(
            self.threshold_floor_db <= self.threshold_ceiling_db,
            "threshold_floor_db ({}) must not exceed threshold_ceiling_db ({})",
            self.threshold_floor_db,
            self.threshold_ceiling_db
        );
        Ok(())
    }
}

/// Fundamental-frequency tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub fmin: f32,
    pub fmax: f32,
    pub frame_length: usize,
    pub hop_length: usize,
    /// Voiced probability at or above which a frame counts as voiced.
    pub voicing_threshold: f32,
    /// Frames with an RMS below this are unvoiced without further analysis.
    pub rms_gate: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            fmin: 50.0,
            fmax: 2000.0,
            frame_length: FRAME_LENGTH,
            hop_length: HOP_LENGTH,
            voicing_threshold: 0.1,
            rms_gate: 1e-4,
        }
    }
}

impl PitchConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.fmin > 0.0, "fmin must be positive");
        ensure!(self.fmin < self.fmax, "fmin ({}) must be below fmax ({})", self.fmin, self.fmax);
        ensure!(self.frame_length >= 4, "frame_length must be at least 4");
        ensure!(self.hop_length > 0, "hop_length must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.voicing_threshold),
            "voicing_threshold must be within 0..=1"
        );
        Ok(())
    }
}

/// Which dynamic time warping variant aligns user and target curves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentConfig {
    /// Classic O(n·m) DTW over the full cost matrix.
    #[default]
    Full,
    /// Sakoe-Chiba band of the given radius around the diagonal.
    Banded { radius: usize },
}

impl AlignmentConfig {
    fn validate(&self) -> Result<()> {
        if let Self::Banded { radius } = *self {
            ensure!(
                radius <= MAX_BAND_RADIUS,
                "band radius {radius} exceeds {MAX_BAND_RADIUS} frames"
            );
        }
        Ok(())
    }
}

/// Green/yellow upper bounds for a metric where lower is healthier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpperBounds {
    pub green_max: f32,
    pub yellow_max: f32,
}

/// Green/yellow lower bounds for a metric where higher is healthier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowerBounds {
    pub green_min: f32,
    pub yellow_min: f32,
}

/// Language of the per-metric status explanations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    English,
    German,
}

/// Vocal health measurement and traffic-light thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub pitch_floor: f32,
    pub pitch_ceiling: f32,
    /// Analysis step of the pitch and harmonicity passes, in seconds.
    pub time_step: f32,
    pub min_voiced_frames: usize,
    pub shortest_period: f32,
    pub longest_period: f32,
    pub max_period_factor: f32,
    pub max_amplitude_factor: f32,
    /// Harmonicity frames quieter than this share of the clip peak are silent.
    pub silence_threshold: f32,
    pub periods_per_window: f32,
    pub jitter_percent: UpperBounds,
    pub shimmer_percent: UpperBounds,
    pub hnr_db: LowerBounds,
    pub locale: Locale,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            pitch_floor: 75.0,
            pitch_ceiling: 600.0,
            time_step: 0.01,
            min_voiced_frames: 10,
            shortest_period: 0.0001,
            longest_period: 0.02,
            max_period_factor: 1.3,
            max_amplitude_factor: 1.6,
            silence_threshold: 0.1,
            periods_per_window: 1.0,
            jitter_percent: UpperBounds {
                green_max: 1.04,
                yellow_max: 1.50,
            },
            shimmer_percent: UpperBounds {
                green_max: 3.81,
                yellow_max: 5.00,
            },
            hnr_db: LowerBounds {
                green_min: 20.0,
                yellow_min: 12.0,
            },
            locale: Locale::default(),
        }
    }
}

impl HealthConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.pitch_floor >= MIN_PITCH_FLOOR_HZ,
            "pitch_floor must be at least {MIN_PITCH_FLOOR_HZ} Hz, got {}",
            self.pitch_floor
        );
        ensure!(
            self.pitch_floor < self.pitch_ceiling,
            "pitch_floor ({}) must be below pitch_ceiling ({})",
            self.pitch_floor,
            self.pitch_ceiling
        );
        ensure!(
            self.time_step > 0.0 && self.time_step.is_finite(),
            "time_step must be a positive number"
        );
        ensure!(
            self.shortest_period < self.longest_period,
            "shortest_period must be below longest_period"
        );
        ensure!(self.max_period_factor >= 1.0, "max_period_factor must be at least 1");
        ensure!(self.max_amplitude_factor >= 1.0, "max_amplitude_factor must be at least 1");
        ensure!(
            self.periods_per_window > 0.0 && self.periods_per_window <= 10.0,
            "periods_per_window must be within (0, 10]"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.envelope.frame_length, 2048);
        assert_eq!(config.pitch.hop_length, 512);
        assert_eq!(config.alignment, AlignmentConfig::Full);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "pitch": { "fmax": 1000.0 }, "alignment": { "kind": "banded", "radius": 40 } }"#,
        )
        .unwrap();
        assert_eq!(config.pitch.fmax, 1000.0);
        assert_eq!(config.pitch.fmin, 50.0);
        assert_eq!(config.alignment, AlignmentConfig::Banded { radius: 40 });
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let mut config = EngineConfig::default();
        config.health.locale = Locale::German;
        let json = config.to_json_string().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = EngineConfig::from_json_str(r#"{ "pitch": { "fmin": 900.0, "fmax": 100.0 } }"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid pitch configuration"));

        let err = EngineConfig::from_json_str(
            r#"{ "breath": { "threshold_floor_db": -10.0, "threshold_ceiling_db": -20.0 } }"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("threshold_floor_db"));
    }

    #[test]
    fn rejects_unbounded_band_radius() {
        let err = EngineConfig::from_json_str(
            r#"{ "alignment": { "kind": "banded", "radius": 18446744073709551615 } }"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("invalid alignment configuration"));
    }

    #[test]
    fn check_reports_invalid_input() {
        let mut config = EngineConfig::default();
        assert_eq!(config.check(), Ok(()));

        config.health.pitch_floor = 0.0;
        let err = config.check().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput { .. }));
        assert!(err.to_string().contains("pitch_floor"));

        let mut config = EngineConfig::default();
        config.health.time_step = f32::INFINITY;
        assert!(config.check().is_err());
    }
}
