//! Pre-built composite recipes.
//!
//! Each voice is a composite initializer plus a `create_*` method on the
//! context. Use the initializer directly with an instrument, or call the
//! method for a one-off node.
//!
//! # Example
//!
//! ```
//! use tony_graph::{host::offline::OfflineHost, settings, voices, GraphContext};
//!
//! # fn main() -> tony_graph::Result<()> {
//! let mut ctx = GraphContext::new(OfflineHost::default());
//! let pwm = ctx.create_pwm_oscillator(settings! { "width" => 0.3 })?;
//! let lead = ctx.create_instrument(voices::supersaw, settings! { "mix" => 0.8 }, None);
//! lead.play(&mut ctx, "C3", None)?;
//! # let _ = pwm;
//! # Ok(())
//! # }
//! ```

mod pwm;
mod supersaw;

pub use pwm::{pulse_curve, pwm_oscillator};
pub use supersaw::supersaw;
