// Purpose: Musical pitch helpers
// Note names and numbers to frequencies, used by instruments

pub mod notes;

pub use notes::{midi_to_frequency, note_number, note_to_frequency};
