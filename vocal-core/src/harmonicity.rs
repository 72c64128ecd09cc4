//! # Harmonicity Module
//!
//! Harmonics-to-noise ratio from short-time normalized autocorrelation.
//!
//! Each 10 ms frame is correlated against itself over the lags of the
//! allowed pitch range. A perfectly periodic frame reaches a normalized
//! correlation of 1; additive noise lowers the peak to roughly
//! `harmonic / (harmonic + noise)` power, which maps to decibels as
//! `10·log10(r / (1 − r))`.

use tracing::debug;

use crate::audio::{self, AudioSignal};
use crate::config::HealthConfig;
use crate::fft::{WindowCorrelator, remove_dc_offset};

/// Value given to frames without measurable periodicity.
pub const UNVOICED_HARMONICITY_DB: f32 = -200.0;

/// Highest correlation fed into the dB conversion (about 60 dB).
const MAX_CORRELATION: f64 = 0.999_999;

/// Per-frame harmonicity in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Harmonicity {
    pub values: Vec<f32>,
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl Harmonicity {
    /// Frames that carried periodicity.
    pub fn voiced_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied().filter(|&v| v > UNVOICED_HARMONICITY_DB)
    }

    /// Mean over frames with periodicity, 0.0 when there are none.
    pub fn mean_db(&self) -> f32 {
        let (sum, count) = self
            .voiced_values()
            .fold((0.0_f64, 0usize), |(sum, count), v| (sum + f64::from(v), count + 1));
        if count == 0 { 0.0 } else { (sum / count as f64) as f32 }
    }
}

/// Converts a normalized autocorrelation peak to dB.
pub fn correlation_to_db(r: f64) -> f32 {
    if r <= 0.0 {
        return UNVOICED_HARMONICITY_DB;
    }
    let r = r.min(MAX_CORRELATION);
    (10.0 * (r / (1.0 - r)).log10()) as f32
}

/// Computes the harmonicity contour of a clip.
pub fn harmonicity(signal: &AudioSignal, config: &HealthConfig) -> Harmonicity {
    let sample_rate = f64::from(signal.sample_rate());
    let hop_length = ((f64::from(config.time_step) * sample_rate).round() as usize).max(1);
    let window = ((sample_rate / f64::from(config.pitch_floor)).ceil() * f64::from(config.periods_per_window))
        .ceil()
        .max(2.0) as usize;
    let tau_min = ((sample_rate / f64::from(config.pitch_ceiling)).floor() as usize).max(1);
    let tau_max = ((sample_rate / f64::from(config.pitch_floor)).ceil() as usize).max(tau_min + 1);
    // One lag beyond tau_max for the parabolic neighbour.
    let frame_length = window + tau_max + 1;

    let global_peak = signal.peak_amplitude();
    let silence_level = config.silence_threshold * global_peak;

    let mut correlator = WindowCorrelator::new(frame_length, window);
    let mut correlation = Vec::with_capacity(tau_max + 2);
    let mut buffer = Vec::with_capacity(frame_length);
    let mut energy = Vec::with_capacity(frame_length + 1);

    let values = audio::frames(signal.samples(), frame_length, hop_length)
        .map(|frame| {
            buffer.clear();
            buffer.extend_from_slice(&frame);
            let local_peak = buffer.iter().fold(0.0_f32, |p, s| p.max(s.abs()));
            if global_peak <= 0.0 || local_peak < silence_level {
                return UNVOICED_HARMONICITY_DB;
            }
            remove_dc_offset(&mut buffer);

            energy.clear();
            energy.push(0.0_f64);
            for &s in &buffer {
                let last = energy[energy.len() - 1];
                energy.push(last + f64::from(s) * f64::from(s));
            }
            let window_energy = |tau: usize| energy[tau + window] - energy[tau];
            let reference = window_energy(0);
            if reference <= 0.0 {
                return UNVOICED_HARMONICITY_DB;
            }

            correlator.correlate(&buffer, &mut correlation);
            let normalized = |tau: usize| {
                let denominator = (reference * window_energy(tau)).sqrt();
                if denominator > 0.0 {
                    f64::from(correlation[tau]) / denominator
                } else {
                    0.0
                }
            };

            let (best_tau, best) = (tau_min..=tau_max)
                .map(|tau| (tau, normalized(tau)))
                .fold((tau_min, f64::NEG_INFINITY), |best, candidate| {
                    if candidate.1 > best.1 { candidate } else { best }
                });

            let y1 = normalized(best_tau - 1);
            let y3 = normalized(best_tau + 1);
            let curvature = y1 - 2.0 * best + y3;
            let peak = if curvature < 0.0 {
                let shift = ((y1 - y3) / (2.0 * curvature)).clamp(-0.5, 0.5);
                best - 0.25 * (y1 - y3) * shift
            } else {
                best
            };
            correlation_to_db(peak)
        })
        .collect::<Vec<_>>();

    debug!(
        frames = values.len(),
        window,
        tau_min,
        tau_max,
        "harmonicity contour computed"
    );

    Harmonicity {
        values,
        hop_length,
        sample_rate: signal.sample_rate(),
    }
}
