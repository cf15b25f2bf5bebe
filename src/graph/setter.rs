use crate::{
    error::Result,
    graph::{
        context::GraphContext,
        envelope::apply_envelope,
        node::{DeferredEnvelope, Node, NodeBody},
        settings::{Settings, Value},
    },
    host::{AudioHost, HostTarget, NodeKind},
};

/*
Setting a Member
================

Every entry of a settings map goes through `set_value`. What happens depends
on what the member turns out to be and on the value:

  member                          value       effect
  ------------------------------  ----------  ------------------------------
  automation parameter            number      assign the current value
  automation parameter            envelope    in a composite initializer:
                                              show the first value now and
                                              schedule the rest at start
                                              (queuing the node if it was
                                              registered as not startable);
                                              otherwise schedule from now
  automation parameter            other       plain property
  `gain`, connectable, no param   anything    weld a gain stage
  anything else                   anything    plain property

A member is an automation parameter when the host node has one by that name,
when it is `gain` on a node with a welded stage, or when a composite exposes
it (composites always expose `gain`, their destination gain).

Welding
-------

    before:  osc ──────────────► target
    after:   osc ──► gain stage ──► target

The stage is created once; later `gain` values go to the same stage and every
later `connect`/`disconnect` leaves from it.
*/

impl<H: AudioHost> GraphContext<H> {
    /// Apply one member of a settings map to `node`.
    pub fn set_value(&mut self, node: Node, name: &str, value: &Value) -> Result<()> {
        if let Some(param) = self.find_param(node, name)? {
            match value {
                Value::Number(number) => {
                    self.host.set_param_value(param.key(), *number)?;
                }
                Value::Envelope(envelope) if !self.scopes.is_empty() => {
                    if let Some(initial) = envelope.initial_value() {
                        self.host.set_param_value(param.key(), initial)?;
                    }
                    let entry = self.entry_mut(node)?;
                    let was_startable = entry.capabilities().start;
                    entry.deferred.push(DeferredEnvelope {
                        param: param.key().clone(),
                        envelope: envelope.clone(),
                    });
                    // Already registered as not startable: queue it now.
                    let queue_now = entry.enhanced && !was_startable;
                    let owner = entry.owner;
                    if let Some(owner) = owner.filter(|owner| queue_now && self.is_live(*owner)) {
                        self.composite_mut(owner, "register")?.start_queue.push(node);
                    }
                }
                Value::Envelope(envelope) => {
                    let now = self.host.current_time();
                    apply_envelope(&mut self.host, param.key(), now, envelope.steps())?;
                }
                other => self.set_property(node, name, other)?,
            }
            return Ok(());
        }

        if name == "gain" && self.is_weldable(node)? {
            self.with_gain(node, value.clone())?;
            return Ok(());
        }
        self.set_property(node, name, value)
    }

    /// Apply every entry of `settings`, in order.
    pub fn set_values(&mut self, node: Node, settings: &Settings) -> Result<()> {
        self.apply_settings(node, settings)
    }

    fn set_property(&mut self, node: Node, name: &str, value: &Value) -> Result<()> {
        let host_id = match &mut self.entry_mut(node)?.body {
            NodeBody::Host { id, .. } => Some(*id),
            NodeBody::Composite(composite) => {
                composite.properties.insert(name.to_owned(), value.clone());
                None
            }
        };
        if let Some(id) = host_id {
            self.host.set_property(id, name, value)?;
        }
        Ok(())
    }

    fn is_weldable(&self, node: Node) -> Result<bool> {
        let entry = self.entry(node)?;
        Ok(entry.native.connect && matches!(entry.body, NodeBody::Host { .. }))
    }

    /// Give `node` a gain stage and set its level.
    ///
    /// Gain nodes and composites already have one and are simply set. Any
    /// other node gets a gain node welded onto its output the first time;
    /// later calls set the existing stage.
    pub fn with_gain(&mut self, node: Node, gain: impl Into<Value>) -> Result<Node> {
        let gain = gain.into();
        let entry = self.entry(node)?;
        let own_gain = match (&entry.gain_stage, &entry.body) {
            (Some(stage), _) => Some(*stage),
            (None, NodeBody::Composite(_)) | (None, NodeBody::Host { kind: NodeKind::Gain, .. }) => {
                Some(node)
            }
            (None, NodeBody::Host { .. }) => None,
        };
        if let Some(target) = own_gain {
            self.set_value(target, "gain", &gain)?;
            return Ok(node);
        }

        let from = self.output_of(node)?;
        let stage = self.create_gain(Settings::new().with("gain", gain))?;
        let stage_id = self.host_id(stage)?;
        self.host.connect(from, 0, &HostTarget::node(stage_id))?;
        self.entry_mut(node)?.gain_stage = Some(stage);
        log::debug!("welded gain stage {stage:?} onto {node:?}");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        envelope,
        host::{
            offline::{HostCall, OfflineHost},
            AudioHost, HostTarget, NodeKind,
        },
        settings, GraphContext, Settings, Value,
    };

    fn ctx() -> GraphContext<OfflineHost> {
        GraphContext::new(OfflineHost::default())
    }

    #[test]
    fn gain_on_oscillator_welds_one_stage() {
        let mut ctx = ctx();
        let osc = ctx.create_oscillator(settings! { "gain" => 0.5 }).unwrap();
        ctx.with_gain(osc, 0.25).unwrap();
        ctx.set_value(osc, "gain", &Value::from(0.125)).unwrap();

        assert_eq!(ctx.host().count(&NodeKind::Gain), 1);
        let stage = ctx.gain_stage(osc).unwrap().unwrap();
        let key = ctx.param(stage, "gain").unwrap().key().clone();
        assert_eq!(ctx.host().param_value(&key).unwrap(), 0.125);
        assert_eq!(ctx.param(osc, "gain").unwrap().key(), &key);
    }

    #[test]
    fn connections_leave_from_the_stage() {
        let mut ctx = ctx();
        let dest = ctx.destination();
        let osc = ctx.create_oscillator(settings! { "gain" => 0.5 }).unwrap();
        ctx.connect(osc, dest).unwrap();

        let osc_id = ctx.host_id(osc).unwrap();
        let stage_id = ctx.host_id(ctx.gain_stage(osc).unwrap().unwrap()).unwrap();
        let speakers = ctx.host_id(dest).unwrap();
        assert_eq!(ctx.host().outputs(osc_id), vec![&HostTarget::node(stage_id)]);
        assert_eq!(ctx.host().outputs(stage_id), vec![&HostTarget::node(speakers)]);

        ctx.disconnect(osc, None).unwrap();
        assert!(ctx.host().outputs(stage_id).is_empty());
        assert_eq!(ctx.host().outputs(osc_id).len(), 1);
    }

    #[test]
    fn gain_nodes_set_their_own_param() {
        let mut ctx = ctx();
        let gain = ctx.create_gain(Settings::new()).unwrap();
        ctx.with_gain(gain, 0.3).unwrap();

        assert_eq!(ctx.gain_stage(gain).unwrap(), None);
        assert_eq!(ctx.host().count(&NodeKind::Gain), 1);
        let key = ctx.param(gain, "gain").unwrap().key().clone();
        assert_eq!(ctx.host().param_value(&key).unwrap(), 0.3);
    }

    #[test]
    fn unknown_members_become_properties() {
        let mut ctx = ctx();
        let filter = ctx
            .create_biquad_filter(settings! { "type" => "lowpass", "Q" => 4.0 })
            .unwrap();
        let id = ctx.host_id(filter).unwrap();

        assert_eq!(ctx.host().property(id, "type"), Some(&Value::from("lowpass")));
        assert!(ctx
            .host()
            .calls()
            .iter()
            .any(|call| matches!(call, HostCall::SetParam { param, value } if param.name == "Q" && *value == 4.0)));
    }

    #[test]
    fn text_on_a_param_is_handed_to_the_host() {
        let mut ctx = ctx();
        let osc = ctx.create_oscillator(settings! { "frequency" => "A4" }).unwrap();
        let id = ctx.host_id(osc).unwrap();
        assert_eq!(ctx.host().property(id, "frequency"), Some(&Value::from("A4")));
    }

    #[test]
    fn welded_envelope_outside_scope_runs_now() {
        let mut ctx = ctx();
        ctx.host_mut().advance_to(1.0);
        let osc = ctx
            .create_oscillator(settings! { "gain" => envelope![0.0, (1.0, 0.1)] })
            .unwrap();

        let key = ctx.param(osc, "gain").unwrap().key().clone();
        let timeline = ctx.host().timeline(&key).unwrap();
        assert_eq!(timeline.value_at(1.0), 0.0);
        assert_eq!(timeline.value_at(1.1), 1.0);
    }

    #[test]
    fn set_values_applies_in_order() {
        let mut ctx = ctx();
        let osc = ctx.create_oscillator(Settings::new()).unwrap();
        ctx.set_values(osc, &settings! { "frequency" => 100.0, "detune" => 5.0 })
            .unwrap();

        let sets: Vec<_> = ctx
            .host()
            .calls()
            .iter()
            .filter_map(|call| match call {
                HostCall::SetParam { param, .. } => Some(param.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sets, ["frequency", "detune"]);
    }
}
