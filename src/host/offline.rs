//! A host that records instead of rendering.
//!
//! [`OfflineHost`] keeps just enough state to answer the questions a test (or a
//! host-adapter author) asks: which nodes exist, how they are wired, when they
//! start and stop, and what every automation parameter reads at a given time.
//! It enforces the rules browser hosts enforce (no double start, no
//! exponential ramp to zero, no disconnecting what is not connected), so
//! engine code that passes here is engine code a real host accepts.
//!
//! Time only moves when the owner calls [`OfflineHost::advance_to`]. Sources
//! whose stop time has been reached are then reported as ended through the
//! subscribed [`EventSink`].

use indexmap::IndexMap;
use std::collections::VecDeque;

use super::{
    timeline::{AutomationKind, ParamTimeline},
    AudioHost, BufferId, EventSink, Factory, HostError, HostEvent, HostNodeId, HostTarget,
    NodeKind, ParamKey, Seconds, DEFAULT_FACTORIES,
};
use crate::graph::settings::Value;

/// One call the engine made, in the order it made them.
#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    Create {
        node: HostNodeId,
        kind: NodeKind,
        args: Vec<f64>,
    },
    CreateBuffer {
        buffer: BufferId,
        channels: usize,
        length: usize,
    },
    WriteChannel {
        buffer: BufferId,
        channel: usize,
    },
    Connect {
        from: HostNodeId,
        output: usize,
        to: HostTarget,
    },
    Disconnect {
        from: HostNodeId,
        to: Option<HostTarget>,
    },
    Start {
        node: HostNodeId,
        when: Seconds,
    },
    Stop {
        node: HostNodeId,
        when: Seconds,
    },
    SetProperty {
        node: HostNodeId,
        name: String,
        value: Value,
    },
    SetParam {
        param: ParamKey,
        value: f64,
    },
    Schedule {
        param: ParamKey,
        kind: AutomationKind,
        value: f64,
        time: Seconds,
    },
    Cancel {
        param: ParamKey,
        time: Seconds,
    },
    Release {
        node: HostNodeId,
    },
}

#[derive(Debug)]
struct HostNode {
    kind: NodeKind,
    args: Vec<f64>,
    params: IndexMap<String, ParamTimeline>,
    properties: IndexMap<String, Value>,
    started: Option<Seconds>,
    stopped: Option<Seconds>,
    ended: bool,
    released: bool,
}

impl HostNode {
    fn new(kind: NodeKind, args: &[f64]) -> Self {
        let params = default_params(&kind)
            .iter()
            .map(|(name, value)| (name.to_string(), ParamTimeline::new(*value)))
            .collect();
        Self {
            kind,
            args: args.to_vec(),
            params,
            properties: IndexMap::new(),
            started: None,
            stopped: None,
            ended: false,
            released: false,
        }
    }

    fn is_source(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Oscillator | NodeKind::BufferSource | NodeKind::ConstantSource | NodeKind::Other(_)
        )
    }
}

/// Automation parameters and their defaults, as browser hosts declare them.
fn default_params(kind: &NodeKind) -> &'static [(&'static str, f64)] {
    match kind {
        NodeKind::Oscillator => &[("frequency", 440.0), ("detune", 0.0)],
        NodeKind::Gain => &[("gain", 1.0)],
        NodeKind::BiquadFilter => &[("frequency", 350.0), ("detune", 0.0), ("Q", 1.0), ("gain", 0.0)],
        NodeKind::BufferSource => &[("playbackRate", 1.0), ("detune", 0.0)],
        NodeKind::ConstantSource => &[("offset", 1.0)],
        NodeKind::Delay => &[("delayTime", 0.0)],
        NodeKind::StereoPanner => &[("pan", 0.0)],
        NodeKind::DynamicsCompressor => &[
            ("threshold", -24.0),
            ("knee", 30.0),
            ("ratio", 12.0),
            ("attack", 0.003),
            ("release", 0.25),
        ],
        _ => &[],
    }
}

#[derive(Debug)]
struct Buffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f32,
}

/// Recording [`AudioHost`] with a manually advanced clock.
pub struct OfflineHost {
    sample_rate: f32,
    time: Seconds,
    nodes: Vec<HostNode>,
    buffers: Vec<Buffer>,
    connections: Vec<(HostNodeId, usize, HostTarget)>,
    extra_factories: Vec<Factory>,
    sink: Option<EventSink>,
    /// Events the sink had no room for, oldest first.
    backlog: VecDeque<HostEvent>,
    calls: Vec<HostCall>,
}

impl Default for OfflineHost {
    fn default() -> Self {
        Self::new(48_000.0)
    }
}

impl OfflineHost {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            time: 0.0,
            nodes: vec![HostNode::new(NodeKind::Destination, &[])],
            buffers: Vec::new(),
            connections: Vec::new(),
            extra_factories: Vec::new(),
            sink: None,
            backlog: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    /// Advertise an extra factory on top of the defaults.
    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.extra_factories.push(factory);
        self
    }

    /// Move the clock forward and report every source that has reached its
    /// stop time. Events that did not fit in the queue last time go first.
    pub fn advance_to(&mut self, time: Seconds) {
        if time > self.time {
            self.time = time;
        }
        let now = self.time;
        let mut ended = Vec::new();
        for (index, node) in self.nodes.iter_mut().enumerate() {
            let finished = match (node.started, node.stopped) {
                (Some(start), Some(stop)) => start.max(stop) <= now,
                _ => false,
            };
            if finished && !node.ended && !node.released {
                node.ended = true;
                let id = HostNodeId(index as u32);
                log::trace!("{id:?} ended at {now}");
                ended.push(HostEvent::Ended(id));
            }
        }
        if self.sink.is_some() {
            self.backlog.extend(ended);
        }
        self.deliver();
    }

    fn deliver(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        while let Some(event) = self.backlog.pop_front() {
            if let Err(event) = sink.notify(event) {
                self.backlog.push_front(event);
                break;
            }
        }
    }

    /// Events still waiting for room in the queue.
    pub fn undelivered(&self) -> usize {
        self.backlog.len()
    }

    pub fn advance_by(&mut self, delta: Seconds) {
        self.advance_to(self.time + delta);
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn timeline(&self, param: &ParamKey) -> Option<&ParamTimeline> {
        self.nodes
            .get(param.node.0 as usize)
            .and_then(|node| node.params.get(&param.name))
    }

    pub fn kind(&self, node: HostNodeId) -> Option<&NodeKind> {
        self.nodes.get(node.0 as usize).map(|n| &n.kind)
    }

    pub fn args(&self, node: HostNodeId) -> Option<&[f64]> {
        self.nodes.get(node.0 as usize).map(|n| n.args.as_slice())
    }

    pub fn property(&self, node: HostNodeId, name: &str) -> Option<&Value> {
        self.nodes
            .get(node.0 as usize)
            .and_then(|n| n.properties.get(name))
    }

    pub fn start_time(&self, node: HostNodeId) -> Option<Seconds> {
        self.nodes.get(node.0 as usize).and_then(|n| n.started)
    }

    pub fn stop_time(&self, node: HostNodeId) -> Option<Seconds> {
        self.nodes.get(node.0 as usize).and_then(|n| n.stopped)
    }

    pub fn is_released(&self, node: HostNodeId) -> bool {
        self.nodes
            .get(node.0 as usize)
            .is_some_and(|n| n.released)
    }

    pub fn is_connected(&self, from: HostNodeId, to: &HostTarget) -> bool {
        self.connections
            .iter()
            .any(|(source, _, target)| *source == from && target == to)
    }

    /// Everything `from` currently feeds, in connection order.
    pub fn outputs(&self, from: HostNodeId) -> Vec<&HostTarget> {
        self.connections
            .iter()
            .filter(|(source, ..)| *source == from)
            .map(|(_, _, target)| target)
            .collect()
    }

    /// Nodes feeding `to`'s inputs or parameters.
    pub fn inputs(&self, to: HostNodeId) -> Vec<HostNodeId> {
        self.connections
            .iter()
            .filter(|(_, _, target)| target.host_node() == to)
            .map(|(source, ..)| *source)
            .collect()
    }

    /// Live (unreleased) nodes of `kind`.
    pub fn count(&self, kind: &NodeKind) -> usize {
        self.nodes
            .iter()
            .filter(|n| !n.released && &n.kind == kind)
            .count()
    }

    /// Live nodes, not counting the destination.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().skip(1).filter(|n| !n.released).count()
    }

    pub fn channel_data(&self, buffer: BufferId, channel: usize) -> Option<&[f32]> {
        self.buffers
            .get(buffer.0 as usize)
            .and_then(|b| b.channels.get(channel))
            .map(Vec::as_slice)
    }

    pub fn buffer_sample_rate(&self, buffer: BufferId) -> Option<f32> {
        self.buffers.get(buffer.0 as usize).map(|b| b.sample_rate)
    }

    fn node(&self, id: HostNodeId) -> Result<&HostNode, HostError> {
        self.nodes
            .get(id.0 as usize)
            .filter(|n| !n.released)
            .ok_or(HostError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: HostNodeId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id.0 as usize)
            .filter(|n| !n.released)
            .ok_or(HostError::UnknownNode(id))
    }

    fn timeline_mut(&mut self, param: &ParamKey) -> Result<&mut ParamTimeline, HostError> {
        self.node_mut(param.node)?
            .params
            .get_mut(&param.name)
            .ok_or_else(|| HostError::UnknownParam {
                node: param.node,
                name: param.name.clone(),
            })
    }

    fn schedule(
        &mut self,
        param: &ParamKey,
        kind: AutomationKind,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError> {
        if time < 0.0 || time.is_nan() {
            return Err(HostError::InvalidValue {
                what: "event time",
                value: time,
            });
        }
        self.timeline_mut(param)?.schedule(kind, value, time);
        self.calls.push(HostCall::Schedule {
            param: param.clone(),
            kind,
            value,
            time,
        });
        Ok(())
    }
}

impl AudioHost for OfflineHost {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn current_time(&self) -> Seconds {
        self.time
    }

    fn destination(&self) -> HostNodeId {
        HostNodeId(0)
    }

    fn factories(&self) -> Vec<Factory> {
        DEFAULT_FACTORIES
            .iter()
            .chain(&self.extra_factories)
            .cloned()
            .collect()
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    fn create_node(&mut self, kind: &NodeKind, args: &[f64]) -> Result<HostNodeId, HostError> {
        if *kind == NodeKind::Destination {
            return Err(HostError::Unsupported {
                kind: kind.to_string(),
                operation: "create",
            });
        }
        let id = HostNodeId(self.nodes.len() as u32);
        self.nodes.push(HostNode::new(kind.clone(), args));
        self.calls.push(HostCall::Create {
            node: id,
            kind: kind.clone(),
            args: args.to_vec(),
        });
        Ok(id)
    }

    fn create_buffer(
        &mut self,
        channels: usize,
        length: usize,
        sample_rate: f32,
    ) -> Result<BufferId, HostError> {
        if channels == 0 || length == 0 {
            return Err(HostError::InvalidValue {
                what: "buffer size",
                value: (channels * length) as f64,
            });
        }
        if sample_rate <= 0.0 || !sample_rate.is_finite() {
            return Err(HostError::InvalidValue {
                what: "buffer sample rate",
                value: sample_rate as f64,
            });
        }
        let buffer = BufferId(self.buffers.len() as u32);
        self.buffers.push(Buffer {
            channels: vec![vec![0.0; length]; channels],
            sample_rate,
        });
        self.calls.push(HostCall::CreateBuffer {
            buffer,
            channels,
            length,
        });
        Ok(buffer)
    }

    fn write_channel(
        &mut self,
        buffer: BufferId,
        channel: usize,
        data: &[f32],
    ) -> Result<(), HostError> {
        let target = self
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(HostError::UnknownBuffer(buffer))?
            .channels
            .get_mut(channel)
            .ok_or(HostError::ChannelOutOfRange { buffer, channel })?;
        let len = target.len().min(data.len());
        target[..len].copy_from_slice(&data[..len]);
        self.calls.push(HostCall::WriteChannel { buffer, channel });
        Ok(())
    }

    fn connect(
        &mut self,
        from: HostNodeId,
        output: usize,
        to: &HostTarget,
    ) -> Result<(), HostError> {
        let source = self.node(from)?;
        if source.kind == NodeKind::Destination {
            return Err(HostError::Unsupported {
                kind: source.kind.to_string(),
                operation: "connect",
            });
        }
        let target = self.node(to.host_node())?;
        if let HostTarget::Param(key) = to {
            if !target.params.contains_key(&key.name) {
                return Err(HostError::UnknownParam {
                    node: key.node,
                    name: key.name.clone(),
                });
            }
        }

        self.calls.push(HostCall::Connect {
            from,
            output,
            to: to.clone(),
        });
        // Connecting the same pair twice is a no-op on browser hosts.
        if !self.is_connected(from, to) {
            self.connections.push((from, output, to.clone()));
        }
        Ok(())
    }

    fn disconnect(&mut self, from: HostNodeId, to: Option<&HostTarget>) -> Result<(), HostError> {
        self.node(from)?;
        match to {
            Some(target) => {
                if !self.is_connected(from, target) {
                    return Err(HostError::NotConnected {
                        from,
                        to: target.clone(),
                    });
                }
                self.connections
                    .retain(|(source, _, t)| !(*source == from && t == target));
            }
            None => self.connections.retain(|(source, ..)| *source != from),
        }
        self.calls.push(HostCall::Disconnect {
            from,
            to: to.cloned(),
        });
        Ok(())
    }

    fn start(&mut self, id: HostNodeId, when: Seconds) -> Result<(), HostError> {
        if when < 0.0 || when.is_nan() {
            return Err(HostError::InvalidValue {
                what: "start time",
                value: when,
            });
        }
        let node = self.node_mut(id)?;
        if !node.is_source() {
            return Err(HostError::Unsupported {
                kind: node.kind.to_string(),
                operation: "start",
            });
        }
        if node.started.is_some() {
            return Err(HostError::InvalidState {
                node: id,
                reason: "source already started",
            });
        }
        node.started = Some(when);
        self.calls.push(HostCall::Start { node: id, when });
        Ok(())
    }

    fn stop(&mut self, id: HostNodeId, when: Seconds) -> Result<(), HostError> {
        if when < 0.0 || when.is_nan() {
            return Err(HostError::InvalidValue {
                what: "stop time",
                value: when,
            });
        }
        let node = self.node_mut(id)?;
        if !node.is_source() {
            return Err(HostError::Unsupported {
                kind: node.kind.to_string(),
                operation: "stop",
            });
        }
        if node.started.is_none() {
            return Err(HostError::InvalidState {
                node: id,
                reason: "source stopped before it was started",
            });
        }
        node.stopped = Some(when);
        self.calls.push(HostCall::Stop { node: id, when });
        Ok(())
    }

    fn set_property(
        &mut self,
        id: HostNodeId,
        name: &str,
        value: &Value,
    ) -> Result<(), HostError> {
        let node = self.node_mut(id)?;
        node.properties.insert(name.to_owned(), value.clone());
        self.calls.push(HostCall::SetProperty {
            node: id,
            name: name.to_owned(),
            value: value.clone(),
        });
        Ok(())
    }

    fn has_param(&self, id: HostNodeId, name: &str) -> bool {
        self.node(id).is_ok_and(|node| node.params.contains_key(name))
    }

    fn param_value(&self, param: &ParamKey) -> Result<f64, HostError> {
        self.node(param.node)?
            .params
            .get(&param.name)
            .map(|timeline| timeline.value_at(self.time))
            .ok_or_else(|| HostError::UnknownParam {
                node: param.node,
                name: param.name.clone(),
            })
    }

    fn set_param_value(&mut self, param: &ParamKey, value: f64) -> Result<(), HostError> {
        self.timeline_mut(param)?.set_value(value);
        self.calls.push(HostCall::SetParam {
            param: param.clone(),
            value,
        });
        Ok(())
    }

    fn set_value_at_time(
        &mut self,
        param: &ParamKey,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError> {
        self.schedule(param, AutomationKind::SetValue, value, time)
    }

    fn linear_ramp_to_value_at_time(
        &mut self,
        param: &ParamKey,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError> {
        self.schedule(param, AutomationKind::LinearRamp, value, time)
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        param: &ParamKey,
        value: f64,
        time: Seconds,
    ) -> Result<(), HostError> {
        if value <= 0.0 || !value.is_finite() {
            return Err(HostError::InvalidValue {
                what: "exponential ramp target",
                value,
            });
        }
        self.schedule(param, AutomationKind::ExponentialRamp, value, time)
    }

    fn cancel_scheduled_values(
        &mut self,
        param: &ParamKey,
        time: Seconds,
    ) -> Result<(), HostError> {
        self.timeline_mut(param)?.cancel_from(time);
        self.calls.push(HostCall::Cancel {
            param: param.clone(),
            time,
        });
        Ok(())
    }

    fn release(&mut self, id: HostNodeId) -> Result<(), HostError> {
        self.node_mut(id)?.released = true;
        self.connections
            .retain(|(source, _, target)| *source != id && target.host_node() != id);
        self.calls.push(HostCall::Release { node: id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{event_channel, WrapRule};

    #[test]
    fn nodes_get_default_params() {
        let mut host = OfflineHost::default();
        let osc = host.create_node(&NodeKind::Oscillator, &[]).unwrap();

        assert!(host.has_param(osc, "frequency"));
        assert!(!host.has_param(osc, "gain"));
        assert_eq!(host.param_value(&ParamKey::new(osc, "frequency")).unwrap(), 440.0);
    }

    #[test]
    fn sources_start_once_and_stop_after_start() {
        let mut host = OfflineHost::default();
        let osc = host.create_node(&NodeKind::Oscillator, &[]).unwrap();

        assert!(matches!(
            host.stop(osc, 1.0),
            Err(HostError::InvalidState { .. })
        ));
        host.start(osc, 0.5).unwrap();
        assert!(matches!(
            host.start(osc, 0.6),
            Err(HostError::InvalidState { .. })
        ));
        host.stop(osc, 1.0).unwrap();
        assert_eq!(host.start_time(osc), Some(0.5));
        assert_eq!(host.stop_time(osc), Some(1.0));
    }

    #[test]
    fn processors_cannot_start() {
        let mut host = OfflineHost::default();
        let gain = host.create_node(&NodeKind::Gain, &[]).unwrap();
        assert_eq!(
            host.start(gain, 0.0),
            Err(HostError::Unsupported {
                kind: "Gain".into(),
                operation: "start"
            })
        );
    }

    #[test]
    fn exponential_ramp_rejects_non_positive_targets() {
        let mut host = OfflineHost::default();
        let gain = host.create_node(&NodeKind::Gain, &[]).unwrap();
        let param = ParamKey::new(gain, "gain");

        assert!(host.exponential_ramp_to_value_at_time(&param, 0.0, 1.0).is_err());
        assert!(host.exponential_ramp_to_value_at_time(&param, f64::NAN, 1.0).is_err());
        assert!(host.exponential_ramp_to_value_at_time(&param, 0.5, 1.0).is_ok());
    }

    #[test]
    fn disconnecting_unknown_pair_fails() {
        let mut host = OfflineHost::default();
        let a = host.create_node(&NodeKind::Gain, &[]).unwrap();
        let b = host.create_node(&NodeKind::Gain, &[]).unwrap();

        let err = host.disconnect(a, Some(&HostTarget::node(b))).unwrap_err();
        assert!(matches!(err, HostError::NotConnected { .. }));

        host.connect(a, 0, &HostTarget::node(b)).unwrap();
        host.connect(a, 0, &HostTarget::node(b)).unwrap();
        assert_eq!(host.outputs(a).len(), 1);
        host.disconnect(a, Some(&HostTarget::node(b))).unwrap();
        assert!(host.outputs(a).is_empty());
    }

    #[test]
    fn destination_has_no_outputs() {
        let mut host = OfflineHost::default();
        let gain = host.create_node(&NodeKind::Gain, &[]).unwrap();
        let dest = host.destination();
        assert!(host.connect(dest, 0, &HostTarget::node(gain)).is_err());
    }

    #[test]
    fn advancing_reports_ended_sources() {
        let mut host = OfflineHost::default();
        let (sink, mut queue) = event_channel(8);
        host.subscribe(sink);

        let a = host.create_node(&NodeKind::Oscillator, &[]).unwrap();
        let b = host.create_node(&NodeKind::Oscillator, &[]).unwrap();
        host.start(a, 0.0).unwrap();
        host.stop(a, 1.0).unwrap();
        host.start(b, 0.0).unwrap();

        host.advance_to(0.5);
        assert!(queue.is_empty());

        host.advance_to(2.0);
        assert_eq!(queue.pop(), Some(HostEvent::Ended(a)));
        assert_eq!(queue.pop(), None);

        host.advance_to(3.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_keeps_events_for_later() {
        let mut host = OfflineHost::default();
        let (sink, mut queue) = event_channel(1);
        host.subscribe(sink);

        let a = host.create_node(&NodeKind::Oscillator, &[]).unwrap();
        let b = host.create_node(&NodeKind::Oscillator, &[]).unwrap();
        for id in [a, b] {
            host.start(id, 0.0).unwrap();
            host.stop(id, 1.0).unwrap();
        }

        host.advance_to(1.0);
        assert_eq!(host.undelivered(), 1);
        assert_eq!(queue.pop(), Some(HostEvent::Ended(a)));
        assert_eq!(queue.pop(), None);

        host.advance_by(0.0);
        assert_eq!(queue.pop(), Some(HostEvent::Ended(b)));
        assert_eq!(host.undelivered(), 0);
    }

    #[test]
    fn buffers_hold_written_samples() {
        let mut host = OfflineHost::default();
        let buffer = host.create_buffer(1, 2, 48_000.0).unwrap();
        host.write_channel(buffer, 0, &[0.25, 0.25]).unwrap();

        assert_eq!(host.channel_data(buffer, 0), Some(&[0.25, 0.25][..]));
        assert_eq!(
            host.write_channel(buffer, 1, &[1.0]),
            Err(HostError::ChannelOutOfRange { buffer, channel: 1 })
        );
    }

    #[test]
    fn release_drops_node_and_its_connections() {
        let mut host = OfflineHost::default();
        let gain = host.create_node(&NodeKind::Gain, &[]).unwrap();
        host.connect(gain, 0, &HostTarget::node(host.destination()))
            .unwrap();

        host.release(gain).unwrap();
        assert!(host.is_released(gain));
        assert!(host.inputs(host.destination()).is_empty());
        assert_eq!(host.node_count(), 0);
        assert_eq!(host.set_param_value(&ParamKey::new(gain, "gain"), 0.5), Err(HostError::UnknownNode(gain)));
    }

    #[test]
    fn extra_factories_are_advertised() {
        let host = OfflineHost::default().with_factory(Factory::other(
            "createGranulator",
            "Granulator",
            WrapRule::Source,
        ));
        let factories = host.factories();
        assert_eq!(factories.len(), DEFAULT_FACTORIES.len() + 1);
        assert_eq!(factories.last().map(|f| f.method.as_ref()), Some("createGranulator"));
    }
}
