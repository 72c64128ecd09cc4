//! # Audio Signal Module
//!
//! The decoded clip handed to the engine and the frame geometry every
//! frame-based extractor shares. Decoding and file handling happen outside
//! the engine; this module only validates what it is given.
//!
//! ## Features
//! - Validated, immutable `AudioSignal` (positive sample rate, non-empty, finite)
//! - Deterministic frame counting from (length, frame length, hop)
//! - Zero-copy frame iteration with zero-padding for clips shorter than a frame

use std::borrow::Cow;

use crate::error::AnalysisError;

/// Analysis frame length in samples.
///
/// Both the amplitude envelope and the pitch tracker use this window so
/// their frame indices line up.
pub const FRAME_LENGTH: usize = 2048;

/// Hop between consecutive frames in samples (one frame every ~11.6 ms at 44.1 kHz).
pub const HOP_LENGTH: usize = 512;

/// A decoded mono clip: samples plus sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Wraps decoded samples, rejecting signals the analyzers cannot use.
    ///
    /// # Errors
    /// * `InvalidInput` if the sample rate is zero, there are no samples,
    ///   or any sample is NaN or infinite.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AnalysisError> {
        if sample_rate == 0 {
            return Err(AnalysisError::invalid_input("sample rate must be positive"));
        }
        if samples.is_empty() {
            return Err(AnalysisError::invalid_input("audio signal has no samples"));
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(AnalysisError::invalid_input(format!(
                "sample {index} is not a finite number"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed signal; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Clip duration in seconds.
    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Largest absolute sample value.
    pub fn peak_amplitude(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}

/// Number of frames for a signal of `len` samples.
///
/// `floor((len - frame_length) / hop) + 1`, and a single zero-padded frame
/// when the signal is shorter than one frame.
pub fn frame_count(len: usize, frame_length: usize, hop_length: usize) -> usize {
    if len == 0 || frame_length == 0 || hop_length == 0 {
        return 0;
    }
    if len < frame_length {
        return 1;
    }
    (len - frame_length) / hop_length + 1
}

/// Iterates over analysis frames of a sample buffer.
///
/// Full frames are borrowed; a frame running past the end of the buffer is
/// copied and zero-padded.
pub fn frames(samples: &[f32], frame_length: usize, hop_length: usize) -> Frames<'_> {
    Frames {
        samples,
        frame_length,
        hop_length,
        index: 0,
        count: frame_count(samples.len(), frame_length, hop_length),
    }
}

/// Iterator returned by [`frames`].
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    samples: &'a [f32],
    frame_length: usize,
    hop_length: usize,
    index: usize,
    count: usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Cow<'a, [f32]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let start = self.index * self.hop_length;
        let end = start + self.frame_length;
        self.index += 1;

        if end <= self.samples.len() {
            return Some(Cow::Borrowed(&self.samples[start..end]));
        }
        let mut padded = vec![0.0; self.frame_length];
        let available = &self.samples[start.min(self.samples.len())..];
        padded[..available.len()].copy_from_slice(available);
        Some(Cow::Owned(padded))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}
