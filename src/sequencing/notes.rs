use crate::graph::settings::Value;

/*
Note Names
==========

Notes can be given by name or by MIDI note number. Names are a pitch class
plus a single octave digit:

    C  C#/Db  D  D#/Eb  E  F  F#/Gb  G  G#/Ab  A  A#/Bb  B      octave 0-8

The formula: note_number = 12 * (octave + 1) + semitone
Where semitone: C=0, C#=1, D=2, D#=3, E=4, F=5, F#=6, G=7, G#=8, A=9, A#=10, B=11

So C4 (middle C) is 60 and A4 is 69. Frequencies follow equal temperament
around A4 = 440 Hz:

    frequency = 440 * 2^((note_number - 69) / 12)

Only the spellings above are known. `E#4`, `Cb4` or `C-1` are not in the
table; text that is not a known name is read as a note number if it parses
as one.
*/

/// Middle C.
pub const MIDDLE_C: u8 = 60;
/// Concert A, 440 Hz.
pub const A4: u8 = 69;

const PITCH_CLASSES: [(&str, u8); 17] = [
    ("C", 0),
    ("C#", 1),
    ("Db", 1),
    ("D", 2),
    ("D#", 3),
    ("Eb", 3),
    ("E", 4),
    ("F", 5),
    ("F#", 6),
    ("Gb", 6),
    ("G", 7),
    ("G#", 8),
    ("Ab", 8),
    ("A", 9),
    ("A#", 10),
    ("Bb", 10),
    ("B", 11),
];

/// Look up a note name such as `"A4"` or `"Eb2"`.
pub fn note_number(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let octave = chars.next_back()?.to_digit(10)?;
    if octave > 8 {
        return None;
    }
    let pitch = chars.as_str();
    PITCH_CLASSES
        .iter()
        .find(|(class, _)| *class == pitch)
        .map(|(_, semitone)| (octave as u8 + 1) * 12 + semitone)
}

/// Equal-tempered frequency of a (possibly fractional) note number.
#[inline]
pub fn midi_to_frequency(note: f64) -> f64 {
    440.0 * 2.0_f64.powf((note - 69.0) / 12.0)
}

/// Frequency of a note given as a name, numeric text or a number.
///
/// Returns `None` for anything that is none of those. The result is not
/// range-checked; callers decide what to do with odd values.
pub fn note_to_frequency(note: &Value) -> Option<f64> {
    match note {
        Value::Number(number) => Some(midi_to_frequency(*number)),
        Value::Text(text) => note_number(text)
            .map(f64::from)
            .or_else(|| text.trim().parse::<f64>().ok())
            .map(midi_to_frequency),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn reference_notes() {
        assert_eq!(note_number("A4"), Some(A4));
        assert_eq!(note_number("C4"), Some(MIDDLE_C));
        assert_eq!(note_number("C0"), Some(12));
        assert_eq!(note_number("B8"), Some(119));
    }

    #[test]
    fn enharmonic_spellings_agree() {
        for (sharp, flat) in [("C#3", "Db3"), ("D#5", "Eb5"), ("F#1", "Gb1"), ("G#7", "Ab7"), ("A#0", "Bb0")] {
            assert_eq!(note_number(sharp), note_number(flat));
        }
    }

    #[test]
    fn unknown_spellings_are_rejected() {
        for name in ["E#4", "Cb4", "H4", "A9", "A", "", "A-1", "é4"] {
            assert_eq!(note_number(name), None, "{name}");
        }
    }

    #[test]
    fn a4_is_concert_pitch() {
        assert_eq!(note_to_frequency(&Value::from("A4")), Some(440.0));
        assert_eq!(note_to_frequency(&Value::from(69.0)), Some(440.0));
        assert!(approx_eq!(
            f64,
            note_to_frequency(&Value::from("C4")).unwrap_or_default(),
            261.625_565_300_598_6,
            epsilon = 1e-9
        ));
    }

    #[test]
    fn octaves_double() {
        let a3 = note_to_frequency(&Value::from("A3")).unwrap_or_default();
        let a5 = note_to_frequency(&Value::from("A5")).unwrap_or_default();
        assert!(approx_eq!(f64, a3, 220.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, a5, 880.0, epsilon = 1e-9));
    }

    #[test]
    fn numeric_text_is_a_note_number() {
        assert_eq!(note_to_frequency(&Value::from("81")), Some(880.0));
        assert_eq!(note_to_frequency(&Value::from("loud")), None);
        assert_eq!(note_to_frequency(&Value::Bool(true)), None);
    }
}
