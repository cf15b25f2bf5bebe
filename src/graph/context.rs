use indexmap::IndexMap;
use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    graph::{
        composite::CompositeState,
        extensions::{NodeMut, ParamMut},
        node::{Capabilities, Hooks, Node, NodeBody, NodeEntry, Param, Target},
        settings::{Settings, Value},
    },
    host::{
        event_channel, AudioHost, BufferId, EventQueue, Factory, HostEvent, HostNodeId,
        HostTarget, NodeKind, ParamKey, Seconds,
    },
    settings, DEFAULT_PLAY_DURATION, EVENT_QUEUE_SIZE,
};

/*
Graph Context
=============

The context owns the host and every node the engine created on it. Nodes live
in an arena of slots; a `Node` handle is a slot index plus the generation the
slot had when the node was put there:

    slots: [ g0 osc ][ g3 gain ][ g1 --- ][ g0 composite ] ...
               ▲          ▲         ▲
    Node{0,0} ─┘          │         └─ free, next insert gets Node{2,2}
    Node{1,2} ──── stale ─┘

Reclaiming a node bumps its slot's generation, so old handles fail with
`UnknownNode` instead of silently addressing a newer node.

Creating a node goes through one path whatever the factory:

    method ──► capability table ──► host.create_node ──► setter (each setting)
                                                              │
                   composite scope open? ◄── enhance ◄────────┘
                           │
                           └─► register with the innermost open composite

The open-scope stack is how a composite collects the nodes its initializer
creates without the initializer passing the composite around.
*/

struct Slot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// Owner of a host and of every node created on it.
pub struct GraphContext<H: AudioHost> {
    pub(crate) host: H,
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_host: HashMap<HostNodeId, Node>,
    factories: IndexMap<String, Factory>,
    /// Composites whose initializer is running, innermost last.
    pub(crate) scopes: Vec<Node>,
    events: EventQueue,
    destination: Node,
}

impl<H: AudioHost> GraphContext<H> {
    pub fn new(mut host: H) -> Self {
        let (sink, events) = event_channel(EVENT_QUEUE_SIZE);
        host.subscribe(sink);

        let factories = host
            .factories()
            .into_iter()
            .map(|factory| (factory.method.to_string(), factory))
            .collect();
        let speakers = host.destination();

        let mut ctx = Self {
            host,
            slots: Vec::new(),
            free: Vec::new(),
            by_host: HashMap::new(),
            factories,
            scopes: Vec::new(),
            events,
            destination: Node {
                index: 0,
                generation: 0,
            },
        };
        ctx.destination = ctx.insert(NodeEntry::host(
            speakers,
            NodeKind::Destination,
            Capabilities::default(),
        ));
        ctx
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn current_time(&self) -> Seconds {
        self.host.current_time()
    }

    pub fn sample_rate(&self) -> f32 {
        self.host.sample_rate()
    }

    /// The speakers.
    pub fn destination(&self) -> Node {
        self.destination
    }

    pub fn factories(&self) -> impl Iterator<Item = &Factory> {
        self.factories.values()
    }

    pub fn factory(&self, method: &str) -> Option<&Factory> {
        self.factories.get(method)
    }

    /// `when` if it is set and non-zero, otherwise now.
    pub(crate) fn resolve_time(&self, when: Option<Seconds>) -> Seconds {
        match when {
            Some(t) if t != 0.0 && !t.is_nan() => t,
            _ => self.host.current_time(),
        }
    }

    // ----------------------------------------------------------------------
    // Arena
    // ----------------------------------------------------------------------

    pub(crate) fn insert(&mut self, entry: NodeEntry) -> Node {
        let host_id = match &entry.body {
            NodeBody::Host { id, .. } => Some(*id),
            NodeBody::Composite(_) => None,
        };
        let node = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                Node {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                Node {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        if let Some(id) = host_id {
            self.by_host.insert(id, node);
        }
        node
    }

    fn remove(&mut self, node: Node) -> Result<NodeEntry> {
        let slot = self
            .slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .ok_or(Error::UnknownNode(node))?;
        let entry = slot.entry.take().ok_or(Error::UnknownNode(node))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node.index);
        Ok(entry)
    }

    pub(crate) fn entry(&self, node: Node) -> Result<&NodeEntry> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(Error::UnknownNode(node))
    }

    pub(crate) fn entry_mut(&mut self, node: Node) -> Result<&mut NodeEntry> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(Error::UnknownNode(node))
    }

    pub fn is_live(&self, node: Node) -> bool {
        self.entry(node).is_ok()
    }

    /// Live nodes, the destination included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ----------------------------------------------------------------------
    // Introspection
    // ----------------------------------------------------------------------

    pub fn capabilities(&self, node: Node) -> Result<Capabilities> {
        Ok(self.entry(node)?.capabilities())
    }

    /// Host kind of a plain node; `None` for composites.
    pub fn kind(&self, node: Node) -> Result<Option<&NodeKind>> {
        Ok(match &self.entry(node)?.body {
            NodeBody::Host { kind, .. } => Some(kind),
            NodeBody::Composite(_) => None,
        })
    }

    /// The host node behind `node`. For a composite that is its destination
    /// gain.
    pub fn host_id(&self, node: Node) -> Result<HostNodeId> {
        match &self.entry(node)?.body {
            NodeBody::Host { id, .. } => Ok(*id),
            NodeBody::Composite(composite) => self.host_id(composite.destination),
        }
    }

    /// The welded gain stage, if `gain` was ever set on a node without a gain
    /// parameter.
    pub fn gain_stage(&self, node: Node) -> Result<Option<Node>> {
        Ok(self.entry(node)?.gain_stage)
    }

    pub fn has_ended(&self, node: Node) -> Result<bool> {
        Ok(self.entry(node)?.ended)
    }

    /// A plain property: the host's copy for host nodes is not visible here,
    /// so this only answers for composites.
    pub fn property(&self, node: Node, name: &str) -> Result<Option<&Value>> {
        Ok(match &self.entry(node)?.body {
            NodeBody::Composite(composite) => composite.properties.get(name),
            NodeBody::Host { .. } => None,
        })
    }

    /// Where outgoing connections of `node` leave from.
    pub(crate) fn output_of(&self, node: Node) -> Result<HostNodeId> {
        let entry = self.entry(node)?;
        if !entry.native.connect {
            return Err(Error::Unsupported {
                node,
                operation: "connect",
            });
        }
        match entry.gain_stage {
            Some(stage) => self.host_id(stage),
            None => self.host_id(node),
        }
    }

    pub(crate) fn resolve_target(&self, target: &Target) -> Result<HostTarget> {
        Ok(match target {
            Target::Node(node) => HostTarget::node(self.host_id(*node)?),
            Target::Input(node, input) => HostTarget::Input {
                node: self.host_id(*node)?,
                input: *input,
            },
            Target::Param(param) => HostTarget::Param(param.key.clone()),
        })
    }

    // ----------------------------------------------------------------------
    // Parameters
    // ----------------------------------------------------------------------

    /// Look up an automation parameter by member name.
    pub fn param(&self, node: Node, name: &str) -> Result<Param> {
        self.find_param(node, name)?
            .ok_or_else(|| Error::UnknownParam {
                node,
                name: name.to_owned(),
            })
    }

    pub(crate) fn find_param(&self, node: Node, name: &str) -> Result<Option<Param>> {
        let entry = self.entry(node)?;
        if name == "gain" {
            if let Some(stage) = entry.gain_stage {
                return Ok(Some(Param::native(ParamKey::new(self.host_id(stage)?, "gain"))));
            }
        }
        match &entry.body {
            NodeBody::Host { id, .. } => Ok(self
                .host
                .has_param(*id, name)
                .then(|| Param::native(ParamKey::new(*id, name)))),
            NodeBody::Composite(composite) => {
                if let Some(param) = composite.params.get(name) {
                    return Ok(Some(param.clone()));
                }
                if name == "gain" {
                    let gain = self.host_id(composite.destination)?;
                    return Ok(Some(Param::native(ParamKey::new(gain, "gain"))));
                }
                Ok(None)
            }
        }
    }

    pub fn param_mut(&mut self, param: Param) -> ParamMut<'_, H> {
        ParamMut::new(self, param)
    }

    /// Connect a composite-made parameter's drive node to `target`.
    pub fn connect_param(&mut self, param: &Param, target: impl Into<Target>) -> Result<()> {
        let driver = param
            .driver
            .ok_or_else(|| Error::ParamNotConnectable(param.key.name.clone()))?;
        let target = self.resolve_target(&target.into())?;
        self.host.connect(driver, 0, &target)?;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Creation
    // ----------------------------------------------------------------------

    /// Create a node through the capability table.
    ///
    /// `settings` are applied in order through the setter, then the node is
    /// enhanced (hooks attached, registered with the open composite).
    pub fn create_node(
        &mut self,
        method: &str,
        args: &[f64],
        settings: Settings,
        hooks: Hooks,
    ) -> Result<Node> {
        let factory = self
            .factories
            .get(method)
            .cloned()
            .ok_or_else(|| Error::UnknownFactory(method.to_owned()))?;
        let id = self.host.create_node(&factory.kind, args)?;
        let node = self.insert(NodeEntry::host(id, factory.kind, factory.rule.into()));
        self.apply_settings(node, &settings)?;
        self.enhance(node, hooks)
    }

    pub fn create(&mut self, method: &str, settings: Settings) -> Result<Node> {
        self.create_node(method, &[], settings, Hooks::default())
    }

    pub fn create_oscillator(&mut self, settings: Settings) -> Result<Node> {
        self.create("createOscillator", settings)
    }

    pub fn create_gain(&mut self, settings: Settings) -> Result<Node> {
        self.create("createGain", settings)
    }

    pub fn create_biquad_filter(&mut self, settings: Settings) -> Result<Node> {
        self.create("createBiquadFilter", settings)
    }

    pub fn create_buffer_source(&mut self, settings: Settings) -> Result<Node> {
        self.create("createBufferSource", settings)
    }

    pub fn create_constant_source(&mut self, settings: Settings) -> Result<Node> {
        self.create("createConstantSource", settings)
    }

    pub fn create_wave_shaper(&mut self, settings: Settings) -> Result<Node> {
        self.create("createWaveShaper", settings)
    }

    pub fn create_stereo_panner(&mut self, settings: Settings) -> Result<Node> {
        self.create("createStereoPanner", settings)
    }

    pub fn create_dynamics_compressor(&mut self, settings: Settings) -> Result<Node> {
        self.create("createDynamicsCompressor", settings)
    }

    pub fn create_convolver(&mut self, settings: Settings) -> Result<Node> {
        self.create("createConvolver", settings)
    }

    pub fn create_analyser(&mut self, settings: Settings) -> Result<Node> {
        self.create("createAnalyser", settings)
    }

    pub fn create_delay(&mut self, max_delay_time: Seconds, settings: Settings) -> Result<Node> {
        self.create_node("createDelay", &[max_delay_time], settings, Hooks::default())
    }

    pub fn create_channel_merger(&mut self, inputs: usize, settings: Settings) -> Result<Node> {
        self.create_node("createChannelMerger", &[inputs as f64], settings, Hooks::default())
    }

    pub fn create_channel_splitter(&mut self, outputs: usize, settings: Settings) -> Result<Node> {
        self.create_node("createChannelSplitter", &[outputs as f64], settings, Hooks::default())
    }

    pub fn create_script_processor(
        &mut self,
        buffer_size: usize,
        inputs: usize,
        outputs: usize,
        settings: Settings,
        hooks: Hooks,
    ) -> Result<Node> {
        self.create_node(
            "createScriptProcessor",
            &[buffer_size as f64, inputs as f64, outputs as f64],
            settings,
            hooks,
        )
    }

    pub fn create_buffer(
        &mut self,
        channels: usize,
        length: usize,
        sample_rate: f32,
    ) -> Result<BufferId> {
        Ok(self.host.create_buffer(channels, length, sample_rate)?)
    }

    pub fn write_channel(&mut self, buffer: BufferId, channel: usize, data: &[f32]) -> Result<()> {
        Ok(self.host.write_channel(buffer, channel, data)?)
    }

    /// A looping two-sample buffer source that outputs `value` forever.
    pub fn create_single_value_source(&mut self, value: f64) -> Result<Node> {
        let rate = self.host.sample_rate();
        let buffer = self.host.create_buffer(1, 2, rate)?;
        self.host.write_channel(buffer, 0, &[value as f32; 2])?;
        self.create_buffer_source(settings! { "buffer" => buffer, "loop" => true })
    }

    pub(crate) fn apply_settings(&mut self, node: Node, settings: &Settings) -> Result<()> {
        for (name, value) in settings.iter() {
            self.set_value(node, name, value)?;
        }
        Ok(())
    }

    /// Attach hooks and register with the open composite. Runs once per node.
    pub(crate) fn enhance(&mut self, node: Node, hooks: Hooks) -> Result<Node> {
        let entry = self.entry_mut(node)?;
        if entry.enhanced {
            return Ok(node);
        }
        entry.enhanced = true;
        entry.hooks = hooks;

        if let Some(&composite) = self.scopes.last() {
            self.register_child(composite, node)?;
        }
        Ok(node)
    }

    // ----------------------------------------------------------------------
    // Wiring and scheduling
    // ----------------------------------------------------------------------

    /// Fluent access to one node.
    pub fn node(&mut self, node: Node) -> NodeMut<'_, H> {
        NodeMut::new(self, node)
    }

    pub fn connect(&mut self, node: Node, target: impl Into<Target>) -> Result<Node> {
        self.connect_output(node, 0, target)
    }

    pub fn connect_output(
        &mut self,
        node: Node,
        output: usize,
        target: impl Into<Target>,
    ) -> Result<Node> {
        let from = self.output_of(node)?;
        let target = self.resolve_target(&target.into())?;
        self.host.connect(from, output, &target)?;

        if let NodeBody::Composite(composite) = &mut self.entry_mut(node)?.body {
            composite.connections.push((output, target));
        }
        Ok(node)
    }

    /// Remove one outgoing connection, or all of them when `target` is
    /// `None`.
    pub fn disconnect(&mut self, node: Node, target: Option<Target>) -> Result<Node> {
        let from = self.output_of(node)?;
        let target = target
            .map(|target| self.resolve_target(&target))
            .transpose()?;
        self.host.disconnect(from, target.as_ref())?;

        if let NodeBody::Composite(composite) = &mut self.entry_mut(node)?.body {
            match &target {
                Some(target) => composite.connections.retain(|(_, t)| t != target),
                None => composite.connections.clear(),
            }
        }
        Ok(node)
    }

    /// Start at `when` (now if unset or zero).
    ///
    /// Deferred envelopes are scheduled first, anchored at the start time,
    /// then the node itself starts, then the `on_start` hook runs.
    pub fn start(&mut self, node: Node, when: Option<Seconds>) -> Result<Node> {
        let when = self.resolve_time(when);
        let entry = self.entry(node)?;
        if !entry.capabilities().start {
            return Err(Error::Unsupported {
                node,
                operation: "start",
            });
        }
        let deferred = entry.deferred.clone();
        let hook = entry.hooks.on_start.clone();
        let native = entry.native.start;
        let host_id = match &entry.body {
            NodeBody::Host { id, .. } => Some(*id),
            NodeBody::Composite(_) => None,
        };

        for pending in &deferred {
            crate::graph::envelope::apply_envelope(
                &mut self.host,
                &pending.param,
                when,
                pending.envelope.steps(),
            )?;
        }
        match host_id {
            Some(id) if native => self.host.start(id, when)?,
            Some(_) => {}
            None => self.start_composite(node, when)?,
        }
        if let Some(hook) = hook {
            hook(when);
        }
        Ok(node)
    }

    /// Stop at `when` (now if unset or zero), then run the `on_stop` hook.
    pub fn stop(&mut self, node: Node, when: Option<Seconds>) -> Result<Node> {
        let when = self.resolve_time(when);
        let entry = self.entry(node)?;
        if !entry.capabilities().stop {
            return Err(Error::Unsupported {
                node,
                operation: "stop",
            });
        }
        let hook = entry.hooks.on_stop.clone();
        let native = entry.native.stop;
        let host_id = match &entry.body {
            NodeBody::Host { id, .. } => Some(*id),
            NodeBody::Composite(_) => None,
        };

        match host_id {
            Some(id) if native => self.host.stop(id, when)?,
            Some(_) => {}
            None => self.stop_composite(node, when)?,
        }
        if let Some(hook) = hook {
            hook(when);
        }
        Ok(node)
    }

    /// `start(when)` then `stop(when + duration)`. The duration defaults to
    /// a quarter second.
    pub fn play(
        &mut self,
        node: Node,
        duration: Option<Seconds>,
        when: Option<Seconds>,
    ) -> Result<Node> {
        if !self.capabilities(node)?.playable() {
            return Err(Error::Unsupported {
                node,
                operation: "play",
            });
        }
        let when = self.resolve_time(when);
        let duration = match duration {
            Some(d) if d != 0.0 && !d.is_nan() => d,
            _ => DEFAULT_PLAY_DURATION,
        };
        self.start(node, Some(when))?;
        self.stop(node, Some(when + duration))
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Drain host notifications and update composite completion. Returns the
    /// number of events handled.
    ///
    /// The event ring holds `EVENT_QUEUE_SIZE` events; a host that finds it
    /// full keeps the rest and delivers them on a later call, so calling this
    /// regularly keeps completion tracking current.
    pub fn process_events(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(event) = self.events.pop() {
            match event {
                HostEvent::Ended(id) => self.node_ended(id)?,
            }
            handled += 1;
        }
        Ok(handled)
    }

    fn node_ended(&mut self, id: HostNodeId) -> Result<()> {
        let Some(&node) = self.by_host.get(&id) else {
            log::trace!("ignoring end of untracked host node {id:?}");
            return Ok(());
        };
        let entry = self.entry_mut(node)?;
        entry.ended = true;
        let owner = entry.owner;
        match owner {
            Some(owner) if self.is_live(owner) => self.child_ended(owner, node),
            _ => Ok(()),
        }
    }

    /// Reclaim what can no longer sound, after draining pending host events:
    ///
    /// - finished or cancelled composites that no live composite owns, with
    ///   all of their children
    /// - ended host nodes created outside any composite, with their welded
    ///   gain stage
    ///
    /// The host is told it may release each node. Returns how many arena
    /// entries were freed.
    pub fn collect(&mut self) -> Result<usize> {
        self.process_events()?;

        let done: Vec<Node> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                let orphan = entry.owner.map_or(true, |owner| !self.is_live(owner));
                let done = match &entry.body {
                    NodeBody::Composite(composite) => matches!(
                        composite.state,
                        CompositeState::Finished | CompositeState::Cancelled
                    ),
                    NodeBody::Host { .. } => entry.ended,
                };
                (done && orphan).then_some(Node {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect();

        let mut freed = 0;
        for node in done {
            if self.is_live(node) {
                freed += self.release_tree(node)?;
            }
        }
        if freed > 0 {
            log::debug!("collected {freed} nodes");
        }
        Ok(freed)
    }

    /// Free `node` now, with its welded gain stage or, for a composite, all
    /// of its children. Returns how many arena entries were freed.
    ///
    /// Nodes that belong to a live composite are released with it and fail
    /// here with `Unsupported`.
    pub fn release(&mut self, node: Node) -> Result<usize> {
        if let Some(owner) = self.entry(node)?.owner {
            if self.is_live(owner) {
                return Err(Error::Unsupported {
                    node,
                    operation: "release",
                });
            }
        }
        self.release_tree(node)
    }

    pub(crate) fn release_tree(&mut self, node: Node) -> Result<usize> {
        let entry = self.remove(node)?;
        let mut freed = 1;
        if let Some(stage) = entry.gain_stage {
            if self.is_live(stage) {
                freed += self.release_tree(stage)?;
            }
        }
        match entry.body {
            NodeBody::Host { id, .. } => {
                self.by_host.remove(&id);
                self.host.release(id)?;
            }
            NodeBody::Composite(composite) => {
                for child in composite.children {
                    if self.is_live(child) {
                        freed += self.release_tree(child)?;
                    }
                }
                if self.is_live(composite.destination) {
                    freed += self.release_tree(composite.destination)?;
                }
            }
        }
        Ok(freed)
    }
}
