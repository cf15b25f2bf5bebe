use indexmap::IndexMap;
use std::{
    collections::HashSet,
    ops::{Deref, DerefMut},
};

use crate::{
    error::{Error, Result},
    graph::{
        context::GraphContext,
        node::{Hooks, Node, NodeBody, NodeEntry, Param},
        settings::{Settings, Value},
    },
    host::{AudioHost, HostError, HostTarget, ParamKey, Seconds},
    settings,
};

/*
Composite Nodes
===============

A composite is one logical node built from many. Its initializer creates the
children; everything it creates while it runs is registered with the
composite:

                      ┌───────────── composite ─────────────┐
                      │                                     │
    create_param ──►  │  one ──► gain(param) ──► osc.freq   │
                      │                          osc ──┐    │
                      │                                ▼    │
                      │                     destination gain ├──► connect()
                      └─────────────────────────────────────┘

  child can...     goes to
  ---------------  --------------------------------------------------
  start            start queue: started, in order, by `start(when)`
  stop             stop queue: stopped, in order, by `stop(when)`
  report its end   the pending set: when the last one ends, every
                   outgoing connection is removed, exactly once

The destination gain is the only way out. `connect`/`disconnect` on the
composite act on it and the composite remembers each pair so it can undo them
when it finishes or is cancelled.

Lifecycle
---------

    Pending ──start──► Active ──last child ended──► Finished
       │                  │
       └──cancel (before the stored start time)──► Cancelled

`cancel` is only honoured while the stored start time is still in the
future; afterwards the composite plays out and finishes normally.
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeState {
    Pending,
    Active,
    Cancelled,
    Finished,
}

#[derive(Debug)]
pub(crate) struct Composite {
    pub(crate) destination: Node,
    pub(crate) start_queue: Vec<Node>,
    pub(crate) stop_queue: Vec<Node>,
    /// Outgoing connections of the destination gain.
    pub(crate) connections: Vec<(usize, HostTarget)>,
    pub(crate) start_time: Option<Seconds>,
    pub(crate) state: CompositeState,
    /// Children that report their end and have not yet.
    pub(crate) pending: HashSet<Node>,
    pub(crate) one: Option<Node>,
    pub(crate) params: IndexMap<String, Param>,
    pub(crate) properties: IndexMap<String, Value>,
    pub(crate) children: Vec<Node>,
}

impl Composite {
    pub(crate) fn new(destination: Node) -> Self {
        Self {
            destination,
            start_queue: Vec::new(),
            stop_queue: Vec::new(),
            connections: Vec::new(),
            start_time: None,
            state: CompositeState::Pending,
            pending: HashSet::new(),
            one: None,
            params: IndexMap::new(),
            properties: IndexMap::new(),
            children: Vec::new(),
        }
    }
}

/// The context as seen from inside a composite initializer.
///
/// Dereferences to [`GraphContext`], so every creation method is available;
/// nodes created through it belong to the composite.
pub struct Scope<'c, H: AudioHost> {
    ctx: &'c mut GraphContext<H>,
    composite: Node,
}

impl<H: AudioHost> Scope<'_, H> {
    /// The composite being built.
    pub fn composite(&self) -> Node {
        self.composite
    }

    /// The composite's destination gain; connect children here.
    pub fn output(&self) -> Result<Node> {
        self.ctx.composite_output(self.composite)
    }

    pub fn create_param(&mut self, default: f64) -> Result<Param> {
        self.ctx.create_param(self.composite, default)
    }

    pub fn create_one(&mut self) -> Result<Node> {
        self.ctx.create_one(self.composite)
    }

    /// Make `param` settable on the composite under `name`.
    pub fn expose(&mut self, name: impl Into<String>, param: Param) -> Result<()> {
        self.ctx.expose(self.composite, name, param)
    }
}

impl<H: AudioHost> Deref for Scope<'_, H> {
    type Target = GraphContext<H>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl<H: AudioHost> DerefMut for Scope<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}

impl<H: AudioHost> GraphContext<H> {
    /// Build a composite.
    ///
    /// `init` runs before this returns and receives `settings`; afterwards
    /// the same settings are applied to the composite itself (exposed
    /// parameters, `gain`, or stored as properties).
    pub fn create_composite<F>(&mut self, init: F, settings: Settings) -> Result<Node>
    where
        F: FnOnce(&mut Scope<'_, H>, &Settings) -> Result<()>,
    {
        let destination = self.create_gain(Settings::new())?;
        let node = self.insert(NodeEntry::composite(Composite::new(destination)));
        log::debug!("building composite {node:?}");

        self.scopes.push(node);
        let built = init(
            &mut Scope {
                ctx: &mut *self,
                composite: node,
            },
            &settings,
        );
        self.scopes.pop();

        if let Err(err) = built {
            self.release_tree(node)?;
            return Err(err);
        }
        self.apply_settings(node, &settings)?;
        self.enhance(node, Hooks::default())
    }

    pub(crate) fn composite(&self, node: Node, operation: &'static str) -> Result<&Composite> {
        match &self.entry(node)?.body {
            NodeBody::Composite(composite) => Ok(&**composite),
            NodeBody::Host { .. } => Err(Error::Unsupported { node, operation }),
        }
    }

    pub(crate) fn composite_mut(
        &mut self,
        node: Node,
        operation: &'static str,
    ) -> Result<&mut Composite> {
        match &mut self.entry_mut(node)?.body {
            NodeBody::Composite(composite) => Ok(&mut **composite),
            NodeBody::Host { .. } => Err(Error::Unsupported { node, operation }),
        }
    }

    fn within<T>(&mut self, composite: Node, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(composite);
        let result = f(self);
        self.scopes.pop();
        result
    }

    pub(crate) fn register_child(&mut self, composite: Node, child: Node) -> Result<()> {
        let entry = self.entry_mut(child)?;
        entry.owner = Some(composite);
        let caps = entry.capabilities();

        let parent = self.composite_mut(composite, "register")?;
        parent.children.push(child);
        if caps.start {
            parent.start_queue.push(child);
        }
        if caps.stop {
            parent.stop_queue.push(child);
        }
        if caps.ended {
            parent.pending.insert(child);
        }
        Ok(())
    }

    /// A tracked child has ended. The last one tears the composite down.
    pub(crate) fn child_ended(&mut self, composite: Node, child: Node) -> Result<()> {
        let parent = self.composite_mut(composite, "track")?;
        if !parent.pending.remove(&child) {
            return Ok(());
        }
        if !parent.pending.is_empty() || parent.state == CompositeState::Finished {
            return Ok(());
        }
        parent.state = CompositeState::Finished;
        log::debug!("composite {composite:?} finished");
        self.disconnect_all(composite)?;
        Ok(())
    }

    /// Start every queued child, then record the start. A failed child
    /// leaves the composite as it was.
    pub(crate) fn start_composite(&mut self, node: Node, when: Seconds) -> Result<()> {
        let queue = self.composite(node, "start")?.start_queue.clone();
        for child in queue {
            self.start(child, Some(when))?;
        }
        let composite = self.composite_mut(node, "start")?;
        composite.start_time = Some(when);
        if composite.state == CompositeState::Pending {
            composite.state = CompositeState::Active;
        }
        Ok(())
    }

    pub(crate) fn stop_composite(&mut self, node: Node, when: Seconds) -> Result<()> {
        let queue = self.composite(node, "stop")?.stop_queue.clone();
        for child in queue {
            self.stop(child, Some(when))?;
        }
        Ok(())
    }

    /// Silence a composite that has not started yet.
    ///
    /// Only acts while the stored start time is in the future: every
    /// outgoing connection is removed and the composite is marked
    /// cancelled. The fade time is accepted but no fade is performed.
    pub fn cancel(&mut self, node: Node, _fade_time: Option<Seconds>) -> Result<Node> {
        let now = self.current_time();
        let composite = self.composite(node, "cancel")?;
        if composite.start_time.is_some_and(|start| start > now) {
            self.disconnect_all(node)?;
            self.composite_mut(node, "cancel")?.state = CompositeState::Cancelled;
            log::debug!("composite {node:?} cancelled");
        }
        Ok(node)
    }

    /// Undo every connection the composite recorded. Plain nodes lose all
    /// outgoing connections.
    pub fn disconnect_all(&mut self, node: Node) -> Result<Node> {
        if !matches!(self.entry(node)?.body, NodeBody::Composite(_)) {
            return self.disconnect(node, None);
        }
        let from = self.output_of(node)?;
        let connections = std::mem::take(&mut self.composite_mut(node, "disconnect_all")?.connections);
        for (_, target) in connections {
            match self.host.disconnect(from, Some(&target)) {
                // The far end may already have been released.
                Ok(()) | Err(HostError::NotConnected { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(node)
    }

    /// The composite's constant 1.0 source, created on first use.
    pub fn create_one(&mut self, composite: Node) -> Result<Node> {
        if let Some(one) = self.composite(composite, "create_one")?.one {
            return Ok(one);
        }
        let one = self.within(composite, |ctx| ctx.create_single_value_source(1.0))?;
        self.composite_mut(composite, "create_one")?.one = Some(one);
        Ok(one)
    }

    /// A parameter owned by the composite: a gain node holding `default`,
    /// driven by the shared constant source.
    pub fn create_param(&mut self, composite: Node, default: f64) -> Result<Param> {
        let gain = self.within(composite, |ctx| {
            ctx.create_gain(settings! { "gain" => default })
        })?;
        let one = self.create_one(composite)?;
        self.connect(one, gain)?;

        let id = self.host_id(gain)?;
        Ok(Param::driven(ParamKey::new(id, "gain"), id))
    }

    pub fn expose(&mut self, composite: Node, name: impl Into<String>, param: Param) -> Result<()> {
        self.composite_mut(composite, "expose")?
            .params
            .insert(name.into(), param);
        Ok(())
    }

    pub fn composite_state(&self, node: Node) -> Result<CompositeState> {
        Ok(self.composite(node, "state")?.state)
    }

    pub fn start_time(&self, node: Node) -> Result<Option<Seconds>> {
        Ok(self.composite(node, "start_time")?.start_time)
    }

    /// Tracked children that have not ended yet.
    pub fn incomplete_count(&self, node: Node) -> Result<usize> {
        Ok(self.composite(node, "incomplete_count")?.pending.len())
    }

    pub fn children(&self, node: Node) -> Result<&[Node]> {
        Ok(&self.composite(node, "children")?.children)
    }

    pub fn composite_output(&self, node: Node) -> Result<Node> {
        Ok(self.composite(node, "output")?.destination)
    }
}
