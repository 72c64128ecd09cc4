//! # Musical Tuning Module
//!
//! Conversions between frequency, MIDI number and note name in twelve-tone
//! equal temperament with A4 = 440 Hz.
//!
//! The MIDI number is the engine's linear pitch unit: one unit per semitone,
//! so pitch errors measured on it are directly in semitones. Every audible
//! frequency maps to a positive MIDI number, which leaves 0 free as the
//! silence marker used during alignment.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Reference pitch for equal temperament.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI number of A4.
pub const A4_MIDI: f32 = 69.0;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Represents a single MIDI note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f32,
}

/// Statically computed notes for the full MIDI range (C-1 to G9).
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    (0..128)
        .map(|midi: i32| Note {
            name: format_note_name(midi, &SHARP_NAMES),
            frequency: midi_to_hz(midi as f32),
        })
        .collect()
});

/// Note name to MIDI number, accepting both sharp and flat spellings.
static NOTE_MAP: Lazy<BTreeMap<String, i32>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for midi in 0..128 {
        map.insert(format_note_name(midi, &SHARP_NAMES), midi);
        map.insert(format_note_name(midi, &FLAT_NAMES), midi);
    }
    map
});

fn format_note_name(midi: i32, names: &[&str; 12]) -> String {
    let pitch_class = midi.rem_euclid(12) as usize;
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", names[pitch_class], octave)
}

/// Converts a frequency in Hz to a (fractional) MIDI number.
pub fn hz_to_midi(frequency: f32) -> f32 {
    A4_MIDI + 12.0 * (frequency / A4_FREQUENCY).log2()
}

/// Converts a (fractional) MIDI number to a frequency in Hz.
pub fn midi_to_hz(midi: f32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) / 12.0)
}

/// Name of an integer MIDI note, using sharps ("C#4").
pub fn midi_to_note_name(midi: i32) -> String {
    match usize::try_from(midi).ok().and_then(|i| NOTES.get(i)) {
        Some(note) => note.name.clone(),
        None => format_note_name(midi, &SHARP_NAMES),
    }
}

/// Name of the note nearest to a frequency.
pub fn hz_to_note_name(frequency: f32) -> String {
    midi_to_note_name(hz_to_midi(frequency).round() as i32)
}

/// Parses a note name such as "C4", "F#3" or "Bb2" into a MIDI number.
///
/// Unicode accidentals are accepted too. Returns `None` for unknown names.
pub fn note_name_to_midi(name: &str) -> Option<i32> {
    let normalized = name.trim().replace('♯', "#").replace('♭', "b");
    NOTE_MAP.get(normalized.as_str()).copied()
}

/// Distance between two frequencies in semitones.
pub fn semitones_between(low_hz: f32, high_hz: f32) -> f32 {
    12.0 * (high_hz / low_hz).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_midi_69() {
        assert!((hz_to_midi(440.0) - 69.0).abs() < 1e-5);
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-3);
        assert_eq!(hz_to_note_name(440.0), "A4");
    }

    #[test]
    fn parses_sharps_and_flats() {
        assert_eq!(note_name_to_midi("C4"), Some(60));
        assert_eq!(note_name_to_midi("C#4"), Some(61));
        assert_eq!(note_name_to_midi("Db4"), Some(61));
        assert_eq!(note_name_to_midi("B♭3"), Some(58));
        assert_eq!(note_name_to_midi("H4"), None);
    }

    #[test]
    fn names_round_to_nearest_note() {
        assert_eq!(hz_to_note_name(261.63), "C4");
        assert_eq!(hz_to_note_name(270.0), "C#4");
        assert_eq!(midi_to_note_name(0), "C-1");
    }

    #[test]
    fn octave_is_twelve_semitones() {
        assert!((semitones_between(110.0, 220.0) - 12.0).abs() < 1e-5);
    }
}
