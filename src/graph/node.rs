use std::{fmt, rc::Rc};

use crate::{
    graph::{composite::Composite, envelope::Envelope},
    host::{HostNodeId, NodeKind, ParamKey, Seconds, WrapRule},
};

/// Handle to a node owned by a [`GraphContext`](crate::graph::GraphContext).
///
/// Handles are generational: once a node has been reclaimed its handle stops
/// resolving instead of pointing at whatever reused the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Node {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// What a node can do, fixed when it is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub start: bool,
    pub stop: bool,
    /// The host reports when the node has finished playing.
    pub ended: bool,
    pub connect: bool,
}

impl Capabilities {
    pub const SOURCE: Self = Self {
        start: true,
        stop: true,
        ended: true,
        connect: true,
    };
    pub const PROCESSOR: Self = Self {
        start: false,
        stop: false,
        ended: false,
        connect: true,
    };
    pub const COMPOSITE: Self = Self {
        start: true,
        stop: true,
        ended: false,
        connect: true,
    };

    /// Both ends of a note can be scheduled, so `play` is available.
    pub fn playable(&self) -> bool {
        self.start && self.stop
    }
}

impl From<WrapRule> for Capabilities {
    fn from(rule: WrapRule) -> Self {
        match rule {
            WrapRule::Source => Capabilities::SOURCE,
            WrapRule::Processor => Capabilities::PROCESSOR,
        }
    }
}

/// Callback run after a node's own start or stop, with the same time.
pub type Hook = Rc<dyn Fn(Seconds)>;

/// Start/stop hooks attached to a node at creation.
///
/// A hook makes the node startable (or stoppable) even when the host node is
/// not, so a plain gain node with an `on_start` hook gets queued by its
/// composite like any source.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_start: Option<Hook>,
    pub on_stop: Option<Hook>,
}

impl Hooks {
    pub fn on_start(mut self, hook: impl Fn(Seconds) + 'static) -> Self {
        self.on_start = Some(Rc::new(hook));
        self
    }

    pub fn on_stop(mut self, hook: impl Fn(Seconds) + 'static) -> Self {
        self.on_stop = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// An envelope waiting for its node to start.
#[derive(Clone, Debug)]
pub(crate) struct DeferredEnvelope {
    pub(crate) param: ParamKey,
    pub(crate) envelope: Envelope,
}

#[derive(Debug)]
pub(crate) enum NodeBody {
    Host { id: HostNodeId, kind: NodeKind },
    Composite(Box<Composite>),
}

#[derive(Debug)]
pub(crate) struct NodeEntry {
    pub(crate) body: NodeBody,
    pub(crate) native: Capabilities,
    /// Welded gain node that output and `gain` are redirected to.
    pub(crate) gain_stage: Option<Node>,
    pub(crate) deferred: Vec<DeferredEnvelope>,
    pub(crate) hooks: Hooks,
    /// Composite this node was created inside.
    pub(crate) owner: Option<Node>,
    pub(crate) enhanced: bool,
    pub(crate) ended: bool,
}

impl NodeEntry {
    pub(crate) fn host(id: HostNodeId, kind: NodeKind, native: Capabilities) -> Self {
        Self::new(NodeBody::Host { id, kind }, native)
    }

    pub(crate) fn composite(composite: Composite) -> Self {
        Self::new(
            NodeBody::Composite(Box::new(composite)),
            Capabilities::COMPOSITE,
        )
    }

    fn new(body: NodeBody, native: Capabilities) -> Self {
        Self {
            body,
            native,
            gain_stage: None,
            deferred: Vec::new(),
            hooks: Hooks::default(),
            owner: None,
            enhanced: false,
            ended: false,
        }
    }

    /// Native capabilities plus whatever deferred envelopes and hooks add.
    pub(crate) fn capabilities(&self) -> Capabilities {
        Capabilities {
            start: self.native.start || !self.deferred.is_empty() || self.hooks.on_start.is_some(),
            stop: self.native.stop || self.hooks.on_stop.is_some(),
            ..self.native
        }
    }
}

/// A schedulable parameter.
///
/// Parameters made by a composite carry a drive node; connecting such a
/// parameter connects the drive node, so the parameter's modulated value can
/// feed other parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    pub(crate) key: ParamKey,
    pub(crate) driver: Option<HostNodeId>,
}

impl Param {
    pub(crate) fn native(key: ParamKey) -> Self {
        Self { key, driver: None }
    }

    pub(crate) fn driven(key: ParamKey, driver: HostNodeId) -> Self {
        Self {
            key,
            driver: Some(driver),
        }
    }

    pub fn key(&self) -> &ParamKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn driver(&self) -> Option<HostNodeId> {
        self.driver
    }
}

/// Where a connection goes.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    /// First input of a node (a composite's input is its destination gain).
    Node(Node),
    /// A specific input of a node.
    Input(Node, usize),
    /// An automation parameter (modulation).
    Param(Param),
}

impl From<Node> for Target {
    fn from(node: Node) -> Self {
        Target::Node(node)
    }
}

impl From<Param> for Target {
    fn from(param: Param) -> Self {
        Target::Param(param)
    }
}

impl From<&Param> for Target {
    fn from(param: &Param) -> Self {
        Target::Param(param.clone())
    }
}
