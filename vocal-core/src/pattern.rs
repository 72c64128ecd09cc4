//! # Target Pattern Module
//!
//! Expands an exercise's declarative note pattern (root note, semitone
//! intervals, note length, gap length) into the pitch curve a singer is
//! expected to produce, frame by frame, at the pitch tracker's frame rate.
//!
//! Pitches are MIDI numbers; silence between notes is 0.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::tuning;

/// An exercise pattern as supplied by the exercise catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPattern {
    /// Root note name, e.g. "C4" or "Bb3".
    pub root: String,
    /// Signed semitone offsets from the root, one per note.
    pub intervals: Vec<i32>,
    pub note_duration_seconds: f32,
    #[serde(default)]
    pub silence_gap_seconds: f32,
}

/// One note of a synthesized target curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetNote {
    pub name: String,
    pub midi: i32,
    pub start_frame: usize,
    pub frames: usize,
}

/// Expected pitch per frame in MIDI numbers, 0 for silence.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetCurve {
    pub values: Vec<f32>,
    pub notes: Vec<TargetNote>,
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl TargetCurve {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of the pattern's notes in order.
    pub fn note_names(&self) -> Vec<String> {
        self.notes.iter().map(|n| n.name.clone()).collect()
    }
}

/// Frames covering `seconds` at the given frame rate, rounded to nearest.
pub fn frames_for_duration(seconds: f32, sample_rate: u32, hop_length: usize) -> usize {
    (f64::from(seconds) * f64::from(sample_rate) / hop_length as f64).round() as usize
}

impl TargetPattern {
    /// MIDI number of the root note.
    pub fn root_midi(&self) -> Result<i32, AnalysisError> {
        tuning::note_name_to_midi(&self.root)
            .ok_or_else(|| AnalysisError::invalid_input(format!("unknown root note '{}'", self.root)))
    }

    /// Absolute MIDI number of every note of the pattern.
    pub fn note_midis(&self) -> Result<Vec<i32>, AnalysisError> {
        let root = self.root_midi()?;
        self.intervals
            .iter()
            .map(|&interval| {
                let midi = root + interval;
                if midi < 1 {
                    Err(AnalysisError::invalid_input(format!(
                        "interval {interval} from {} falls below the lowest representable note",
                        self.root
                    )))
                } else {
                    Ok(midi)
                }
            })
            .collect()
    }

    /// Note names of the pattern, e.g. `["C4", "E4", "G4"]`.
    pub fn note_names(&self) -> Result<Vec<String>, AnalysisError> {
        Ok(self
            .note_midis()?
            .into_iter()
            .map(tuning::midi_to_note_name)
            .collect())
    }

    /// Synthesizes the frame-level target curve.
    ///
    /// For every interval: `round(note_duration × sr / hop)` frames at the
    /// note's pitch, then `round(silence_gap × sr / hop)` frames of 0.
    ///
    /// # Errors
    /// * `InvalidInput` for an unknown root, negative or non-finite
    ///   durations, or a pattern spanning zero frames.
    pub fn synthesize(&self, sample_rate: u32, hop_length: usize) -> Result<TargetCurve, AnalysisError> {
        for (label, seconds) in [
            ("note_duration_seconds", self.note_duration_seconds),
            ("silence_gap_seconds", self.silence_gap_seconds),
        ] {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(AnalysisError::invalid_input(format!(
                    "{label} must be a non-negative number, got {seconds}"
                )));
            }
        }
        if sample_rate == 0 || hop_length == 0 {
            return Err(AnalysisError::invalid_input(
                "sample rate and hop length must be positive",
            ));
        }

        let note_frames = frames_for_duration(self.note_duration_seconds, sample_rate, hop_length);
        let gap_frames = frames_for_duration(self.silence_gap_seconds, sample_rate, hop_length);

        let midis = self.note_midis()?;
        let mut values = Vec::with_capacity(midis.len() * (note_frames + gap_frames));
        let mut notes = Vec::with_capacity(midis.len());
        for midi in midis {
            notes.push(TargetNote {
                name: tuning::midi_to_note_name(midi),
                midi,
                start_frame: values.len(),
                frames: note_frames,
            });
            values.extend(std::iter::repeat_n(midi as f32, note_frames));
            values.extend(std::iter::repeat_n(0.0, gap_frames));
        }

        if values.iter().all(|&v| v <= 0.0) {
            return Err(AnalysisError::invalid_input("target pattern spans no sung frames"));
        }

        Ok(TargetCurve {
            values,
            notes,
            hop_length,
            sample_rate,
        })
    }
}
