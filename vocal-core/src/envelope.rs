//! # Amplitude Envelope Module
//!
//! Per-frame loudness of a clip: RMS energy per frame, in dB relative to the
//! clip's own loudest frame. The loudest frame is therefore always 0 dB and
//! everything else is negative, floored at `-top_db`.

use crate::audio::{self, AudioSignal};
use crate::config::EnvelopeConfig;

/// Smallest amplitude distinguished from silence.
pub const AMPLITUDE_FLOOR: f32 = 1e-5;

/// Per-frame loudness contour in dB (peak-referenced).
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeEnvelope {
    pub db: Vec<f32>,
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl AmplitudeEnvelope {
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Time in seconds between consecutive frames.
    pub fn frame_duration(&self) -> f32 {
        self.hop_length as f32 / self.sample_rate as f32
    }
}

/// Root-mean-square of a frame.
pub fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let energy = frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
    (energy / frame.len() as f64).sqrt() as f32
}

/// Extracts the dB envelope of a signal.
///
/// A clip with no frame above [`AMPLITUDE_FLOOR`] (digital silence) comes
/// back as a flat `-top_db` envelope rather than a flat 0 dB one.
pub fn amplitude_envelope(signal: &AudioSignal, config: &EnvelopeConfig) -> AmplitudeEnvelope {
    let rms: Vec<f32> = audio::frames(signal.samples(), config.frame_length, config.hop_length)
        .map(|frame| frame_rms(&frame))
        .collect();

    let peak = rms.iter().copied().fold(0.0_f32, f32::max);
    let db = if peak <= AMPLITUDE_FLOOR {
        vec![-config.top_db; rms.len()]
    } else {
        let reference_db = 20.0 * peak.log10();
        rms.iter()
            .map(|&r| {
                let level = 20.0 * r.max(AMPLITUDE_FLOOR).log10() - reference_db;
                level.max(-config.top_db)
            })
            .collect()
    };

    AmplitudeEnvelope {
        db,
        hop_length: config.hop_length,
        sample_rate: signal.sample_rate(),
    }
}
