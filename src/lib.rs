//! Fluent, declarative node graphs on top of a host audio graph.
//!
//! The crate does no signal processing. It drives an [`AudioHost`] (a
//! Web-Audio-shaped runtime) and adds what that API lacks: settings applied
//! at creation, envelopes written as step lists, and composite nodes that
//! start, stop and tear down as one.
//!
//! ```
//! use tony_graph::{envelope, host::offline::OfflineHost, settings, GraphContext};
//!
//! fn main() -> tony_graph::Result<()> {
//!     let mut ctx = GraphContext::new(OfflineHost::default());
//!     let dest = ctx.destination();
//!     let osc = ctx.create_oscillator(settings! { "type" => "square", "frequency" => 220.0 })?;
//!     ctx.node(osc)
//!         .with_gain(envelope![0.0, (0.5, 0.01), (0.0, 0.3)])?
//!         .connect(dest)?
//!         .play(Some(0.3), None)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod graph; // Node arena, setter, composites
pub mod host; // AudioHost boundary and the offline host
pub mod sequencing; // Note names and frequencies
pub mod synth; // Instruments
pub mod voices; // Ready-made composite recipes

pub use error::{Error, Result};
pub use graph::{
    composite::{CompositeState, Scope},
    context::GraphContext,
    envelope::{Envelope, EnvelopeStep},
    node::{Capabilities, Hooks, Node, Param, Target},
    settings::{Settings, Value},
};
pub use host::{AudioHost, Seconds};
pub use synth::instrument::{Instrument, Performance};

/// Duration of `play` when none is given.
pub const DEFAULT_PLAY_DURATION: Seconds = 0.25;
/// Duration of an envelope ramp when none is given.
pub const DEFAULT_STEP_DURATION: Seconds = 0.1;
/// Where an exponential ramp "to zero" actually ends.
pub const SILENCE_FLOOR: f64 = 0.0001;
/// Length of the final linear ramp from the floor to zero.
pub const SILENCE_TAIL: Seconds = 0.0001;
/// Frequency used when a note cannot be converted.
pub const FALLBACK_FREQUENCY: f64 = 440.0;
/// Capacity of the host → context event ring buffer.
pub const EVENT_QUEUE_SIZE: usize = 1024;

/// Build a context over `host`, or over a default-constructed host.
pub fn init<H: AudioHost + Default>(host: Option<H>) -> GraphContext<H> {
    GraphContext::new(host.unwrap_or_default())
}
