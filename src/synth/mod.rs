// Purpose: Instruments
// This layer sits above composites and turns notes into scheduled sounds

pub mod instrument;

pub use instrument::{Init, Instrument, Performance};
