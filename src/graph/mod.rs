//! Node graphs built on a host, with settings, envelopes and composites.
//!
//! [`context::GraphContext`] owns the host and a node arena. Every node is
//! created through the capability table, configured by the setter from a
//! [`settings::Settings`] map and then enhanced: hooks attached and, when a
//! composite initializer is running, registered with that composite. The
//! `extensions` module adds fluent handles so wiring reads as a chain.

/// Composite nodes: many children started, stopped and torn down as one.
pub mod composite;
/// The node arena, creation path and scheduling entry points.
pub mod context;
/// Step-list envelopes and their scheduling on host parameters.
pub mod envelope;
/// Fluent handles (`ctx.node(n).connect(..)?.play(..)`).
pub mod extensions;
/// Node handles, capabilities, hooks and parameter handles.
pub mod node;
/// Applying one settings member: assign, schedule or weld.
pub mod setter;
/// Declarative values and insertion-ordered settings maps.
pub mod settings;

pub use context::GraphContext;
pub use node::{Capabilities, Node, Param, Target};
