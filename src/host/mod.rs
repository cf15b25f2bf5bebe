//! The boundary between the engine and the audio runtime that does the work.
//!
//! The engine never renders audio. Everything it does ends up as a call on an
//! [`AudioHost`]: create a node, connect two nodes, schedule a ramp on a
//! parameter, start a source at a time. A host adapter translates those calls
//! for a concrete runtime; [`offline::OfflineHost`] records them instead and
//! models the automation timeline, which is what the tests run against.
//!
//! Hosts talk back through a single-producer ring buffer of [`HostEvent`]s so
//! that "this source has ended" can be reported from whichever thread notices
//! it, and consumed by the context on its own thread.

/// Statically declared node factories and their wrapping rules.
pub mod factory;
/// Recording host used for tests, benches and demos.
pub mod offline;
/// Automation timeline model (set/linear/exponential/cancel).
pub mod timeline;

use rtrb::{Consumer, Producer, RingBuffer};
use thiserror::Error;

use crate::graph::settings::Value;

pub use factory::{Factory, NodeKind, WrapRule, DEFAULT_FACTORIES};

/// Time on the host clock, in seconds.
pub type Seconds = f64;

/// Opaque handle to a node owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNodeId(pub u32);

/// Opaque handle to a sample buffer owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferId(pub u32);

/// Address of one automation parameter on one host node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamKey {
    pub node: HostNodeId,
    pub name: String,
}

impl ParamKey {
    pub fn new(node: HostNodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

/// Where a connection lands: a node input or a parameter (modulation).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostTarget {
    Input { node: HostNodeId, input: usize },
    Param(ParamKey),
}

impl HostTarget {
    pub fn node(node: HostNodeId) -> Self {
        HostTarget::Input { node, input: 0 }
    }

    /// The host node the connection lands on.
    pub fn host_node(&self) -> HostNodeId {
        match self {
            HostTarget::Input { node, .. } => *node,
            HostTarget::Param(key) => key.node,
        }
    }
}

/// Notifications the host sends back to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A scheduled source has played to its stop time.
    Ended(HostNodeId),
}

/// Host-side end of the event channel.
pub struct EventSink {
    tx: Producer<HostEvent>,
}

impl EventSink {
    /// Queue `event` for the engine. A full queue hands the event back; the
    /// host keeps it and tries again later, or completion tracking stalls.
    pub fn notify(&mut self, event: HostEvent) -> Result<(), HostEvent> {
        if self.tx.is_full() {
            log::warn!("host event queue is full, holding back {event:?}");
            return Err(event);
        }
        self.tx.push(event).map_err(|_| event)
    }
}

/// Engine-side end of the event channel.
pub struct EventQueue {
    rx: Consumer<HostEvent>,
}

impl EventQueue {
    pub fn pop(&mut self) -> Option<HostEvent> {
        self.rx.pop().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a connected sink/queue pair holding up to `capacity` events.
pub fn event_channel(capacity: usize) -> (EventSink, EventQueue) {
    let (tx, rx) = RingBuffer::<HostEvent>::new(capacity);
    (EventSink { tx }, EventQueue { rx })
}

/// Failures reported by the audio runtime.
///
/// The engine does not validate what it hands to the host; these are the
/// host's own rejections, propagated unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("host node {0:?} does not exist")]
    UnknownNode(HostNodeId),
    #[error("buffer {0:?} does not exist")]
    UnknownBuffer(BufferId),
    #[error("host node {node:?} has no parameter `{name}`")]
    UnknownParam { node: HostNodeId, name: String },
    #[error("{kind} nodes do not support `{operation}`")]
    Unsupported {
        kind: String,
        operation: &'static str,
    },
    #[error("invalid state for {node:?}: {reason}")]
    InvalidState {
        node: HostNodeId,
        reason: &'static str,
    },
    #[error("{from:?} is not connected to {to:?}")]
    NotConnected { from: HostNodeId, to: HostTarget },
    #[error("{what} cannot be {value}")]
    InvalidValue { what: &'static str, value: f64 },
    #[error("channel {channel} is out of range for buffer {buffer:?}")]
    ChannelOutOfRange { buffer: BufferId, channel: usize },
}

/// Operations the engine needs from an audio runtime.
///
/// Everything is immediate-return: scheduling methods record future work on
/// the host clock and never wait for it.
pub trait AudioHost {
    fn sample_rate(&self) -> f32;

    fn current_time(&self) -> Seconds;

    /// The node that represents the speakers.
    fn destination(&self) -> HostNodeId;

    /// The node factories this host provides. Hosts with extra node types
    /// append `NodeKind::Other` entries and the context picks them up.
    fn factories(&self) -> Vec<Factory> {
        DEFAULT_FACTORIES.to_vec()
    }

    /// Hand the host the producer side of the event channel.
    fn subscribe(&mut self, sink: EventSink);

    fn create_node(&mut self, kind: &NodeKind, args: &[f64]) -> Result<HostNodeId, HostError>;

    fn create_buffer(
        &mut self,
        channels: usize,
        length: usize,
        sample_rate: f32,
    ) -> Result<BufferId, HostError>;

    fn write_channel(
        &mut self,
        buffer: BufferId,
        channel: usize,
        data: &[f32],
    ) -> Result<(), HostError>;

    fn connect(
        &mut self,
        from: HostNodeId,
        output: usize,
        to: &HostTarget,
    ) -> Result<(), HostError>;

    /// Remove one connection, or every outgoing connection when `to` is `None`.
    fn disconnect(&mut self, from: HostNodeId, to: Option<&HostTarget>) -> Result<(), HostError>;

    fn start(&mut self, node: HostNodeId, when: Seconds) -> Result<(), HostError>;

    fn stop(&mut self, node: HostNodeId, when: Seconds) -> Result<(), HostError>;

    /// Assign a plain (non-automation) member such as `type`, `loop` or `curve`.
    fn set_property(
        &mut self,
        node: HostNodeId,
        name: &str,
        value: &Value,
    ) -> Result<(), HostError>;

    fn has_param(&self, node: HostNodeId, name: &str) -> bool;

    fn param_value(&self, param: &ParamKey) -> Result<f64, HostError>;

    fn set_param_value(&mut self, param: &ParamKey, value: f64) -> Result<(), HostError>;

    fn set_value_at_time(
        &mut self,
        param: &ParamKey,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError>;

    fn linear_ramp_to_value_at_time(
        &mut self,
        param: &ParamKey,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError>;

    fn exponential_ramp_to_value_at_time(
        &mut self,
        param: &ParamKey,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError>;

    /// Drop every scheduled event at or after `time`.
    fn cancel_scheduled_values(&mut self, param: &ParamKey, time: Seconds)
        -> Result<(), HostError>;

    /// The engine no longer references `node`; the host may free it.
    fn release(&mut self, _node: HostNodeId) -> Result<(), HostError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_flow_from_sink_to_queue_in_order() {
        let (mut sink, mut queue) = event_channel(4);
        sink.notify(HostEvent::Ended(HostNodeId(1))).unwrap();
        sink.notify(HostEvent::Ended(HostNodeId(2))).unwrap();

        assert_eq!(queue.pop(), Some(HostEvent::Ended(HostNodeId(1))));
        assert_eq!(queue.pop(), Some(HostEvent::Ended(HostNodeId(2))));
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_hands_the_event_back() {
        let (mut sink, mut queue) = event_channel(1);
        assert_eq!(sink.notify(HostEvent::Ended(HostNodeId(1))), Ok(()));
        assert_eq!(
            sink.notify(HostEvent::Ended(HostNodeId(2))),
            Err(HostEvent::Ended(HostNodeId(2)))
        );

        assert_eq!(queue.pop(), Some(HostEvent::Ended(HostNodeId(1))));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn target_reports_landing_node() {
        let param = HostTarget::Param(ParamKey::new(HostNodeId(7), "gain"));
        assert_eq!(param.host_node(), HostNodeId(7));
        assert_eq!(HostTarget::node(HostNodeId(3)).host_node(), HostNodeId(3));
    }
}
