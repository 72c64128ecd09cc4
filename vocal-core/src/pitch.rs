//! # Pitch Tracking Module
//!
//! Frame-wise fundamental-frequency estimation for a single voice, with an
//! explicit voiced probability per frame.
//!
//! The estimator is a probabilistic variant of YIN:
//! - the YIN difference function is computed per frame from an FFT
//!   cross-correlation and prefix-sum energies
//! - the cumulative mean normalized difference (CMND) is searched for troughs
//! - instead of one fixed absolute threshold, a Beta(2, 18) prior over 100
//!   thresholds is used; every threshold hands its weight to the first trough
//!   below it, and the total weight handed out is the voiced probability
//! - the trough collecting the most weight is the period, refined by
//!   parabolic interpolation for sub-sample accuracy

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{self, AudioSignal};
use crate::config::PitchConfig;
use crate::envelope::frame_rms;
use crate::fft::WindowCorrelator;
use crate::tuning;

/// Number of absolute thresholds in the voicing prior.
const THRESHOLD_COUNT: usize = 100;

/// Beta prior parameters over the absolute threshold.
const PRIOR_ALPHA: i32 = 2;
const PRIOR_BETA: i32 = 18;

/// Per-frame pitch of a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchContour {
    /// Fundamental frequency per frame in Hz, `None` where unvoiced.
    pub frequencies: Vec<Option<f32>>,
    /// Probability that each frame is voiced (0.0 to 1.0).
    pub voiced_probabilities: Vec<f32>,
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl PitchContour {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Voiced/unvoiced flag per frame.
    pub fn voiced_flags(&self) -> Vec<bool> {
        self.frequencies.iter().map(Option::is_some).collect()
    }

    pub fn voiced_count(&self) -> usize {
        self.frequencies.iter().flatten().count()
    }

    /// Frequencies of voiced frames only, in frame order.
    pub fn voiced_frequencies(&self) -> Vec<f32> {
        self.frequencies.iter().flatten().copied().collect()
    }

    /// The contour as MIDI numbers with unvoiced frames set to 0.
    ///
    /// Every tracked frequency lies above 8.2 Hz and so maps to a positive
    /// MIDI number; 0 is free to mark silence.
    pub fn to_midi_with_silence(&self) -> Vec<f32> {
        self.frequencies
            .iter()
            .map(|f| f.map_or(0.0, tuning::hz_to_midi))
            .collect()
    }

    /// Start time of a frame in seconds.
    pub fn frame_time(&self, index: usize) -> f32 {
        (index * self.hop_length) as f32 / self.sample_rate as f32
    }
}

/// Outcome of analyzing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameEstimate {
    frequency: Option<f32>,
    voiced_probability: f32,
}

impl FrameEstimate {
    const UNVOICED: Self = Self {
        frequency: None,
        voiced_probability: 0.0,
    };
}

/// Working buffers reused across frames of one analysis call.
#[derive(Default)]
struct Scratch {
    correlation: Vec<f32>,
    energy_prefix: Vec<f64>,
    cmnd: Vec<f32>,
    troughs: Vec<usize>,
    mass: Vec<f32>,
}

/// A configured pitch tracker for one sample rate.
#[derive(Debug, Clone)]
pub struct PitchTracker {
    sample_rate: u32,
    fmin: f32,
    fmax: f32,
    frame_length: usize,
    hop_length: usize,
    window: usize,
    tau_min: usize,
    tau_max: usize,
    voicing_threshold: f32,
    rms_gate: f32,
    /// (threshold, prior weight), ascending thresholds.
    prior: Vec<(f32, f32)>,
}

impl PitchTracker {
    pub fn new(config: &PitchConfig, sample_rate: u32) -> Self {
        let window = config.frame_length / 2;
        let tau_min = ((sample_rate as f32 / config.fmax).floor() as usize).max(2);
        // The refinement step reads one lag past the period.
        let tau_max = ((sample_rate as f32 / config.fmin).ceil() as usize).min(window.saturating_sub(1));

        Self {
            sample_rate,
            fmin: config.fmin,
            fmax: config.fmax,
            frame_length: config.frame_length,
            hop_length: config.hop_length,
            window,
            tau_min,
            tau_max,
            voicing_threshold: config.voicing_threshold,
            rms_gate: config.rms_gate,
            prior: threshold_prior(),
        }
    }

    /// Tracks the pitch of a whole clip.
    pub fn track(&self, signal: &AudioSignal) -> PitchContour {
        let frame_count = audio::frame_count(signal.len(), self.frame_length, self.hop_length);
        let mut frequencies = Vec::with_capacity(frame_count);
        let mut voiced_probabilities = Vec::with_capacity(frame_count);

        if self.tau_min >= self.tau_max {
            debug!(
                tau_min = self.tau_min,
                tau_max = self.tau_max,
                "pitch search range is empty for this frame length, every frame unvoiced"
            );
            frequencies.resize(frame_count, None);
            voiced_probabilities.resize(frame_count, 0.0);
        } else {
            let mut correlator = WindowCorrelator::new(self.frame_length, self.window);
            let mut scratch = Scratch::default();
            for frame in audio::frames(signal.samples(), self.frame_length, self.hop_length) {
                let estimate = self.analyze_frame(&frame, &mut correlator, &mut scratch);
                frequencies.push(estimate.frequency);
                voiced_probabilities.push(estimate.voiced_probability);
            }
        }

        let contour = PitchContour {
            frequencies,
            voiced_probabilities,
            hop_length: self.hop_length,
            sample_rate: self.sample_rate,
        };
        debug!(
            frames = contour.len(),
            voiced = contour.voiced_count(),
            fmin = self.fmin,
            fmax = self.fmax,
            "pitch contour tracked"
        );
        contour
    }

    fn analyze_frame(
        &self,
        frame: &[f32],
        correlator: &mut WindowCorrelator,
        scratch: &mut Scratch,
    ) -> FrameEstimate {
        // --- Noise Gate: skip silence before doing any transforms ---
        if frame_rms(frame) < self.rms_gate {
            return FrameEstimate::UNVOICED;
        }

        // --- Difference function from correlation and energies ---
        correlator.correlate(frame, &mut scratch.correlation);

        scratch.energy_prefix.clear();
        scratch.energy_prefix.push(0.0);
        let mut acc = 0.0_f64;
        for &s in frame {
            acc += f64::from(s) * f64::from(s);
            scratch.energy_prefix.push(acc);
        }
        let w = self.window;
        let prefix = &scratch.energy_prefix;
        let leading_energy = prefix[w];

        // --- Cumulative mean normalized difference ---
        scratch.cmnd.clear();
        scratch.cmnd.push(1.0);
        let mut running_sum = 0.0_f64;
        for tau in 1..=self.tau_max + 1 {
            let lagged_energy = prefix[tau + w] - prefix[tau];
            let difference = (leading_energy + lagged_energy
                - 2.0 * f64::from(scratch.correlation[tau]))
            .max(0.0);
            running_sum += difference;
            let normalized = if running_sum > 0.0 {
                (difference * tau as f64 / running_sum) as f32
            } else {
                1.0
            };
            scratch.cmnd.push(normalized);
        }
        let cmnd = &scratch.cmnd;

        // --- Troughs inside the allowed period range ---
        scratch.troughs.clear();
        scratch.troughs.extend(
            (self.tau_min..=self.tau_max)
                .filter(|&tau| cmnd[tau] < cmnd[tau - 1] && cmnd[tau] <= cmnd[tau + 1]),
        );
        if scratch.troughs.is_empty() {
            return FrameEstimate::UNVOICED;
        }

        // --- Threshold prior: each threshold votes for its first trough below it ---
        scratch.mass.clear();
        scratch.mass.resize(scratch.troughs.len(), 0.0);
        for &(threshold, weight) in &self.prior {
            if let Some(k) = scratch.troughs.iter().position(|&tau| cmnd[tau] < threshold) {
                scratch.mass[k] += weight;
            }
        }
        let voiced_probability = scratch.mass.iter().sum::<f32>().min(1.0);

        let best = scratch
            .mass
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (k, &m)| if m > best.1 { (k, m) } else { best })
            .0;

        if voiced_probability < self.voicing_threshold {
            return FrameEstimate {
                frequency: None,
                voiced_probability,
            };
        }

        // --- Parabolic interpolation for better precision ---
        let period = scratch.troughs[best];
        let y1 = cmnd[period - 1];
        let y2 = cmnd[period];
        let y3 = cmnd[period + 1];
        let curvature = y1 - 2.0 * y2 + y3;
        let period_float = if curvature != 0.0 {
            let peak_shift = ((y1 - y3) / (2.0 * curvature)).clamp(-1.0, 1.0);
            period as f32 + peak_shift
        } else {
            period as f32
        };

        let frequency = self.sample_rate as f32 / period_float;
        let frequency = (frequency.is_finite() && frequency >= self.fmin && frequency <= self.fmax)
            .then_some(frequency);

        FrameEstimate {
            frequency,
            voiced_probability,
        }
    }
}

/// Tracks the pitch of a clip with the given configuration.
pub fn track_pitch(signal: &AudioSignal, config: &PitchConfig) -> PitchContour {
    PitchTracker::new(config, signal.sample_rate()).track(signal)
}

/// Thresholds 0.01..=1.00 weighted by a normalized Beta(2, 18) density.
fn threshold_prior() -> Vec<(f32, f32)> {
    let thresholds: Vec<f32> = (1..=THRESHOLD_COUNT)
        .map(|i| i as f32 / THRESHOLD_COUNT as f32)
        .collect();
    let densities: Vec<f32> = thresholds
        .iter()
        .map(|&t| t.powi(PRIOR_ALPHA - 1) * (1.0 - t).powi(PRIOR_BETA - 1))
        .collect();
    let total: f32 = densities.iter().sum();
    thresholds
        .into_iter()
        .zip(densities.into_iter().map(|d| d / total))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 22050;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * seconds) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn track(samples: Vec<f32>) -> PitchContour {
        let signal = AudioSignal::new(samples, SAMPLE_RATE).unwrap();
        track_pitch(&signal, &PitchConfig::default())
    }

    fn median(mut values: Vec<f32>) -> f32 {
        values.sort_by(|a, b| a.total_cmp(b));
        values[values.len() / 2]
    }

    #[test]
    fn prior_is_normalized() {
        let prior = threshold_prior();
        assert_eq!(prior.len(), THRESHOLD_COUNT);
        let total: f32 = prior.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert_eq!(prior.last().map(|p| p.1), Some(0.0));
    }

    #[test]
    fn tracks_a_pure_tone() {
        let contour = track(sine(220.0, 1.0));
        assert_eq!(contour.len(), (22050 - 2048) / 512 + 1);
        assert_eq!(contour.voiced_count(), contour.len());

        let f0 = median(contour.voiced_frequencies());
        assert!((f0 - 220.0).abs() < 1.0, "expected ~220 Hz, got {f0}");
        assert!(contour.voiced_probabilities.iter().all(|&p| p > 0.9));
    }

    #[test]
    fn finds_the_fundamental_under_harmonics() {
        let samples: Vec<f32> = (0..SAMPLE_RATE as usize)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                0.5 * (2.0 * PI * 150.0 * t).sin()
                    + 0.3 * (2.0 * PI * 300.0 * t).sin()
                    + 0.2 * (2.0 * PI * 450.0 * t).sin()
            })
            .collect();
        let f0 = median(track(samples).voiced_frequencies());
        assert!((f0 - 150.0).abs() < 2.0, "expected ~150 Hz, got {f0}");
    }

    #[test]
    fn silence_is_unvoiced() {
        let contour = track(vec![0.0; SAMPLE_RATE as usize]);
        assert_eq!(contour.voiced_count(), 0);
        assert!(contour.to_midi_with_silence().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn noise_is_mostly_unvoiced() {
        let mut state = 99u32;
        let samples: Vec<f32> = (0..SAMPLE_RATE as usize)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as f32 / 32768.0 - 1.0) * 0.3
            })
            .collect();
        let contour = track(samples);
        assert!(
            contour.voiced_count() * 5 < contour.len(),
            "{} of {} noise frames voiced",
            contour.voiced_count(),
            contour.len()
        );
    }

    #[test]
    fn midi_conversion_marks_silence_with_zero() {
        let mut samples = vec![0.0; SAMPLE_RATE as usize / 2];
        samples.extend(sine(440.0, 1.0));
        let midi = track(samples).to_midi_with_silence();

        assert_eq!(midi[0], 0.0);
        let last = *midi.last().unwrap();
        assert!((last - 69.0).abs() < 0.1, "expected A4, got {last}");
    }

    #[test]
    fn repeated_tracking_is_identical() {
        let samples = sine(330.0, 0.5);
        assert_eq!(track(samples.clone()), track(samples));
    }
}
