//! # Pitch and Rhythm Accuracy Module
//!
//! Three ways of judging what was sung:
//! - **freeform statistics**: the range and steadiness of whatever was sung
//! - **target matching**: alignment of the sung contour against an exercise
//!   pattern with dynamic time warping, scored for intonation and tempo
//! - **note sequence**: the legacy hit-rate over quantized, de-duplicated notes
//!
//! All values are rounded only when they leave this module.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alignment::{Dtw, SequenceAligner, absolute_difference};
use crate::audio::AudioSignal;
use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::pattern::{TargetCurve, TargetPattern};
use crate::pitch::{PitchContour, track_pitch};
use crate::stats::{self, round_to};
use crate::tuning;

/// Average error assumed when no sung frame lines up with a target note.
pub const NO_MATCH_PENALTY_SEMITONES: f32 = 10.0;
/// Intonation points lost per semitone of average error.
const POINTS_PER_SEMITONE: f32 = 10.0;
/// Rhythm points lost per unit of relative duration deviation.
const POINTS_PER_DEVIATION: f32 = 200.0;
const INTONATION_WEIGHT: f32 = 0.7;
const RHYTHM_WEIGHT: f32 = 0.3;
/// A quantized note must last longer than this many frames to count.
const MIN_NOTE_RUN_FRAMES: usize = 10;

/// Range and steadiness of a freely sung clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchStatistics {
    /// 10th percentile of the voiced pitch.
    pub min_pitch_hz: f32,
    /// 90th percentile of the voiced pitch.
    pub max_pitch_hz: f32,
    pub avg_pitch_hz: f32,
    /// Lower is steadier when a single note is held.
    pub pitch_stability_std: f32,
    pub range_semitones: f32,
    pub min_note: String,
    pub max_note: String,
    /// e.g. "A3 - E5"
    pub vocal_range: String,
    pub voiced_frames: usize,
}

/// Coarse verbal band of a 0..100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Strong,
    Moderate,
    Weak,
}

impl ScoreBand {
    pub fn from_score(score: f32) -> Self {
        if score > 80.0 {
            Self::Strong
        } else if score > 50.0 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }
}

/// Direction of the overall tempo deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoQualifier {
    /// The sung phrase is shorter than the target.
    TooFast,
    OnTempo,
    /// The sung phrase is longer than the target.
    TooSlow,
}

impl TempoQualifier {
    pub fn from_ratio(duration_ratio: f32) -> Self {
        if duration_ratio < 1.0 {
            Self::TooFast
        } else if duration_ratio > 1.0 {
            Self::TooSlow
        } else {
            Self::OnTempo
        }
    }
}

/// Scores of a clip matched against an exercise pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchAccuracy {
    /// Intonation, 0..100.
    pub pitch_score: f32,
    /// Overall tempo match, 0..100.
    pub rhythm_score: f32,
    /// `0.7 × pitch + 0.3 × rhythm`.
    pub combined_score: f32,
    pub average_error_semitones: f32,
    /// Sung span over target span; above 1 means slower than the target.
    pub duration_ratio: f32,
    pub dtw_distance: f32,
    /// Aligned pairs where both user and target are sounding.
    pub voiced_pairs: usize,
    pub intonation: ScoreBand,
    pub rhythm: ScoreBand,
    pub tempo: TempoQualifier,
    pub target_notes: Vec<String>,
}

/// Legacy hit-rate of distinct sung notes against the pattern's notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSequenceAccuracy {
    pub accuracy_score: f32,
    pub hits: usize,
    pub target_notes: Vec<String>,
    pub detected_sequence: Vec<String>,
    pub matched_notes: Vec<String>,
    pub feedback: String,
}

/// Freeform statistics of a tracked contour.
///
/// Percentiles instead of the absolute extremes keep coughs and squeaks
/// from widening the measured range.
///
/// # Errors
/// * `NoSignalDetected` when no frame is voiced.
pub fn pitch_statistics(contour: &PitchContour) -> Result<PitchStatistics, AnalysisError> {
    let voiced = contour.voiced_frequencies();
    let (Some(min_pitch), Some(max_pitch), Some(avg_pitch), Some(std_pitch)) = (
        stats::percentile(&voiced, 10.0),
        stats::percentile(&voiced, 90.0),
        stats::mean(&voiced),
        stats::std_dev(&voiced),
    ) else {
        warn!(frames = contour.len(), "no pitch detected");
        return Err(AnalysisError::no_signal(
            "no pitch detected, try recording closer to the microphone or singing louder",
            None,
        ));
    };

    let min_note = tuning::hz_to_note_name(min_pitch);
    let max_note = tuning::hz_to_note_name(max_pitch);
    Ok(PitchStatistics {
        min_pitch_hz: round_to(min_pitch, 2),
        max_pitch_hz: round_to(max_pitch, 2),
        avg_pitch_hz: round_to(avg_pitch, 2),
        pitch_stability_std: round_to(std_pitch, 2),
        range_semitones: round_to(tuning::semitones_between(min_pitch, max_pitch), 1),
        vocal_range: format!("{min_note} - {max_note}"),
        min_note,
        max_note,
        voiced_frames: voiced.len(),
    })
}

/// Tracks a clip and computes its freeform pitch statistics.
pub fn analyze_pitch(
    signal: &AudioSignal,
    config: &EngineConfig,
) -> Result<PitchStatistics, AnalysisError> {
    config.check()?;
    pitch_statistics(&track_pitch(signal, &config.pitch))
}

/// Number of frames from the first to the last non-silent value.
fn sounding_span(values: &[f32]) -> Option<usize> {
    let first = values.iter().position(|&v| v > 0.0)?;
    let last = values.iter().rposition(|&v| v > 0.0)?;
    Some(last - first + 1)
}

/// Scores a user pitch curve (MIDI numbers, 0 = silence) against a target curve.
///
/// Intonation averages the absolute error over aligned pairs where both
/// sides sound; silence-to-silence and note-to-silence pairs are ignored.
/// Rhythm compares only the overall sung span with the target's span, so
/// tempo wobbles inside a phrase go unpenalized.
///
/// # Errors
/// * `InvalidInput` when the target curve is empty.
/// * `NoSignalDetected` when the user curve has no sounding frame.
pub fn score_against_target<A: SequenceAligner>(
    user: &[f32],
    target: &TargetCurve,
    aligner: &A,
) -> Result<PitchAccuracy, AnalysisError> {
    let target_span = sounding_span(&target.values)
        .ok_or_else(|| AnalysisError::invalid_input("target curve has no sung frames"))?;
    let user_span = sounding_span(user)
        .ok_or_else(|| AnalysisError::no_signal("no voice detected", None))?;

    let alignment = aligner
        .align(user, &target.values, absolute_difference)
        .ok_or_else(|| AnalysisError::compute("no alignment path between user and target curves"))?;

    let errors: Vec<f32> = alignment
        .path
        .iter()
        .map(|&(u, t)| (user[u], target.values[t]))
        .filter(|&(u, t)| u > 0.0 && t > 0.0)
        .map(|(u, t)| (u - t).abs())
        .collect();
    let average_error = stats::mean(&errors).unwrap_or(NO_MATCH_PENALTY_SEMITONES);
    let pitch_score = (100.0 - average_error * POINTS_PER_SEMITONE).max(0.0);

    let duration_ratio = user_span as f32 / target_span as f32;
    let deviation = (1.0 - duration_ratio).abs();
    let rhythm_score = (100.0 - deviation * POINTS_PER_DEVIATION).max(0.0);

    let combined_score = INTONATION_WEIGHT * pitch_score + RHYTHM_WEIGHT * rhythm_score;

    debug!(
        user_frames = user.len(),
        target_frames = target.len(),
        distance = alignment.distance,
        voiced_pairs = errors.len(),
        average_error,
        duration_ratio,
        "target curve aligned"
    );

    // Bands follow the scores as reported, so a shown 80.0 is never "strong".
    let pitch_score = round_to(pitch_score, 1);
    let rhythm_score = round_to(rhythm_score, 1);
    Ok(PitchAccuracy {
        pitch_score,
        rhythm_score,
        combined_score: round_to(combined_score, 1),
        average_error_semitones: round_to(average_error, 2),
        duration_ratio: round_to(duration_ratio, 3),
        dtw_distance: round_to(alignment.distance, 2),
        voiced_pairs: errors.len(),
        intonation: ScoreBand::from_score(pitch_score),
        rhythm: ScoreBand::from_score(rhythm_score),
        tempo: TempoQualifier::from_ratio(duration_ratio),
        target_notes: target.note_names(),
    })
}

/// Tracks a clip and scores it against an exercise pattern.
pub fn analyze_pitch_accuracy(
    signal: &AudioSignal,
    pattern: &TargetPattern,
    config: &EngineConfig,
) -> Result<PitchAccuracy, AnalysisError> {
    config.check()?;
    let target = pattern.synthesize(signal.sample_rate(), config.pitch.hop_length)?;
    let contour = track_pitch(signal, &config.pitch);
    if contour.voiced_count() == 0 {
        warn!(frames = contour.len(), "no voice detected for target matching");
        return Err(AnalysisError::no_signal("no voice detected", None));
    }

    let aligner = Dtw::from_config(&config.alignment);
    score_against_target(&contour.to_midi_with_silence(), &target, &aligner)
}

/// Collapses voiced frames into the sequence of notes held long enough.
fn quantize_notes(contour: &PitchContour) -> Vec<i32> {
    let mut sequence = Vec::new();
    let mut previous: Option<i32> = None;
    let mut run = 0;

    for frequency in contour.voiced_frequencies() {
        let note = tuning::hz_to_midi(frequency).round() as i32;
        if previous == Some(note) {
            run += 1;
            continue;
        }
        if let Some(held) = previous.filter(|_| run > MIN_NOTE_RUN_FRAMES) {
            sequence.push(held);
        }
        previous = Some(note);
        run = 1;
    }
    if let Some(held) = previous.filter(|_| run > MIN_NOTE_RUN_FRAMES) {
        sequence.push(held);
    }
    sequence
}

/// Legacy note-sequence scoring of a tracked contour.
///
/// Each target note is searched for strictly forward in the detected
/// sequence; skipped notes cost a hit but do not stop the search.
///
/// # Errors
/// * `NoSignalDetected` when no frame is voiced.
/// * `InsufficientVoicedAudio` when no note is held long enough to count.
pub fn note_sequence_accuracy(
    contour: &PitchContour,
    pattern: &TargetPattern,
) -> Result<NoteSequenceAccuracy, AnalysisError> {
    let target_midis = pattern.note_midis()?;
    if target_midis.is_empty() {
        return Err(AnalysisError::invalid_input("target pattern has no notes"));
    }
    let voiced_frames = contour.voiced_count();
    if voiced_frames == 0 {
        return Err(AnalysisError::no_signal("no voice detected", None));
    }

    let detected = quantize_notes(contour);
    if detected.is_empty() {
        return Err(AnalysisError::insufficient_voiced(
            "no note was held long enough to count",
            voiced_frames,
        ));
    }

    let mut matched = Vec::new();
    let mut cursor = detected.iter();
    for &target in &target_midis {
        if cursor.any(|&sung| sung == target) {
            matched.push(target);
        }
    }

    let hits = matched.len();
    let total = target_midis.len();
    let names = |notes: &[i32]| -> Vec<String> {
        notes.iter().copied().map(tuning::midi_to_note_name).collect()
    };

    Ok(NoteSequenceAccuracy {
        accuracy_score: round_to(hits as f32 / total as f32 * 100.0, 1),
        hits,
        target_notes: names(&target_midis),
        detected_sequence: names(&detected),
        matched_notes: names(&matched),
        feedback: format!("You hit {hits} out of {total} notes."),
    })
}

/// Tracks a clip and runs the legacy note-sequence scoring.
pub fn analyze_note_sequence(
    signal: &AudioSignal,
    pattern: &TargetPattern,
    config: &EngineConfig,
) -> Result<NoteSequenceAccuracy, AnalysisError> {
    config.check()?;
    note_sequence_accuracy(&track_pitch(signal, &config.pitch), pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::FullDtw;

    fn pattern(gap: f32) -> TargetPattern {
        TargetPattern {
            root: "C4".to_string(),
            intervals: vec![0, 2, 4, 5, 7],
            note_duration_seconds: 0.4,
            silence_gap_seconds: gap,
        }
    }

    fn curve(gap: f32) -> TargetCurve {
        pattern(gap).synthesize(22050, 512).unwrap()
    }

    fn contour(frequencies: Vec<Option<f32>>) -> PitchContour {
        let n = frequencies.len();
        PitchContour {
            frequencies,
            voiced_probabilities: vec![1.0; n],
            hop_length: 512,
            sample_rate: 22050,
        }
    }

    #[test]
    fn self_match_scores_full_marks() {
        let target = curve(0.1);
        let result = score_against_target(&target.values, &target, &FullDtw).unwrap();

        assert_eq!(result.pitch_score, 100.0);
        assert_eq!(result.rhythm_score, 100.0);
        assert_eq!(result.combined_score, 100.0);
        assert_eq!(result.average_error_semitones, 0.0);
        assert_eq!(result.tempo, TempoQualifier::OnTempo);
        assert_eq!(result.intonation, ScoreBand::Strong);
        assert_eq!(result.target_notes, vec!["C4", "D4", "E4", "F4", "G4"]);
    }

    #[test]
    fn double_length_loses_rhythm_but_keeps_intonation() {
        let target = curve(0.1);
        let stretched: Vec<f32> = target.values.iter().flat_map(|&v| [v, v]).collect();
        let result = score_against_target(&stretched, &target, &FullDtw).unwrap();

        assert_eq!(result.duration_ratio, 2.0);
        assert_eq!(result.rhythm_score, 0.0);
        assert_eq!(result.pitch_score, 100.0);
        assert_eq!(result.tempo, TempoQualifier::TooSlow);
        assert_eq!(result.rhythm, ScoreBand::Weak);
        assert!((result.combined_score - 70.0).abs() < 1e-4);
    }

    #[test]
    fn ten_percent_faster_costs_twenty_points() {
        let target = TargetCurve {
            values: vec![60.0; 100],
            notes: Vec::new(),
            hop_length: 512,
            sample_rate: 22050,
        };
        let user = vec![60.0; 90];
        let result = score_against_target(&user, &target, &FullDtw).unwrap();
        assert_eq!(result.rhythm_score, 80.0);
        assert_eq!(result.tempo, TempoQualifier::TooFast);
        assert_eq!(result.rhythm, ScoreBand::Moderate);
    }

    #[test]
    fn semitone_sharp_costs_ten_points() {
        let fifth = TargetPattern {
            intervals: vec![0, 7],
            ..pattern(0.0)
        };
        let target = fifth.synthesize(22050, 512).unwrap();
        let sharp: Vec<f32> = target.values.iter().map(|&v| v + 1.0).collect();
        let result = score_against_target(&sharp, &target, &FullDtw).unwrap();
        assert_eq!(result.average_error_semitones, 1.0);
        assert_eq!(result.pitch_score, 90.0);
    }

    #[test]
    fn silence_is_ignored_in_intonation() {
        let target = curve(0.2);
        let mut user = vec![0.0; 15];
        user.extend(target.values.iter().copied());
        user.extend([0.0; 15]);
        let result = score_against_target(&user, &target, &FullDtw).unwrap();
        assert_eq!(result.pitch_score, 100.0);
        assert_eq!(result.rhythm_score, 100.0);
    }

    #[test]
    fn no_overlapping_notes_uses_the_penalty() {
        let target = TargetCurve {
            values: vec![60.0, 0.0],
            notes: Vec::new(),
            hop_length: 512,
            sample_rate: 22050,
        };
        let result = score_against_target(&[0.0, 70.0], &target, &FullDtw).unwrap();
        assert_eq!(result.voiced_pairs, 0);
        assert_eq!(result.average_error_semitones, NO_MATCH_PENALTY_SEMITONES);
        assert_eq!(result.pitch_score, 0.0);
        assert_eq!(result.rhythm_score, 100.0);
        assert_eq!(result.combined_score, 30.0);
    }

    #[test]
    fn silent_user_or_empty_target_fail() {
        let target = curve(0.0);
        assert!(matches!(
            score_against_target(&[0.0; 40], &target, &FullDtw),
            Err(AnalysisError::NoSignalDetected { .. })
        ));

        let empty = TargetCurve {
            values: Vec::new(),
            notes: Vec::new(),
            hop_length: 512,
            sample_rate: 22050,
        };
        assert!(matches!(
            score_against_target(&[60.0], &empty, &FullDtw),
            Err(AnalysisError::InvalidInput { .. })
        ));
    }

    #[test]
    fn score_bands() {
        assert_eq!(ScoreBand::from_score(80.1), ScoreBand::Strong);
        assert_eq!(ScoreBand::from_score(80.0), ScoreBand::Moderate);
        assert_eq!(ScoreBand::from_score(50.0), ScoreBand::Weak);
    }

    #[test]
    fn statistics_use_percentiles() {
        // 100 frames at A3, a one-frame squeak, some unvoiced frames
        let mut frequencies = vec![Some(220.0); 50];
        frequencies.extend(vec![Some(440.0); 50]);
        frequencies.push(Some(1900.0));
        frequencies.extend(vec![None; 20]);
        let stats = pitch_statistics(&contour(frequencies)).unwrap();

        assert_eq!(stats.voiced_frames, 101);
        assert_eq!(stats.min_pitch_hz, 220.0);
        assert_eq!(stats.max_pitch_hz, 440.0);
        assert_eq!(stats.range_semitones, 12.0);
        assert_eq!(stats.vocal_range, "A3 - A4");
    }

    #[test]
    fn statistics_need_voiced_frames() {
        let err = pitch_statistics(&contour(vec![None; 30])).unwrap_err();
        assert!(matches!(err, AnalysisError::NoSignalDetected { .. }));
    }

    #[test]
    fn note_sequence_counts_held_notes_in_order() {
        let c4 = Some(261.63);
        let e4 = Some(329.63);
        let g4 = Some(392.0);
        let mut frequencies = vec![c4; 20];
        frequencies.extend(vec![Some(300.0); 3]); // blip
        frequencies.extend(vec![e4; 20]);
        frequencies.extend(vec![None; 5]);
        frequencies.extend(vec![g4; 20]);

        let triad = TargetPattern {
            root: "C4".to_string(),
            intervals: vec![0, 4, 7, 12],
            note_duration_seconds: 0.5,
            silence_gap_seconds: 0.0,
        };
        let result = note_sequence_accuracy(&contour(frequencies), &triad).unwrap();

        assert_eq!(result.detected_sequence, vec!["C4", "E4", "G4"]);
        assert_eq!(result.matched_notes, vec!["C4", "E4", "G4"]);
        assert_eq!(result.hits, 3);
        assert_eq!(result.accuracy_score, 75.0);
        assert_eq!(result.feedback, "You hit 3 out of 4 notes.");
    }

    #[test]
    fn note_sequence_failures() {
        let triad = pattern(0.0);
        assert!(matches!(
            note_sequence_accuracy(&contour(vec![None; 30]), &triad),
            Err(AnalysisError::NoSignalDetected { .. })
        ));
        // voiced, but every run is too short
        let flicker: Vec<Option<f32>> = (0..40)
            .map(|i| Some(if i % 2 == 0 { 261.63 } else { 392.0 }))
            .collect();
        assert!(matches!(
            note_sequence_accuracy(&contour(flicker), &triad),
            Err(AnalysisError::InsufficientVoicedAudio { voiced_frames: 40, .. })
        ));
    }
}
