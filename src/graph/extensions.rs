use crate::{
    error::Result,
    graph::{
        context::GraphContext,
        envelope::{apply_envelope, Envelope},
        node::{Node, Param, Target},
        settings::Value,
    },
    host::{AudioHost, Seconds},
};

/// Chainable operations on one node.
///
/// ```
/// # use tony_graph::{host::offline::OfflineHost, settings, GraphContext};
/// # fn main() -> tony_graph::Result<()> {
/// let mut ctx = GraphContext::new(OfflineHost::default());
/// let dest = ctx.destination();
/// let osc = ctx.create_oscillator(settings! { "type" => "sawtooth" })?;
/// ctx.node(osc).with_gain(0.2)?.connect(dest)?.play(None, Some(1.0))?;
/// # Ok(())
/// # }
/// ```
pub struct NodeMut<'c, H: AudioHost> {
    ctx: &'c mut GraphContext<H>,
    node: Node,
}

impl<'c, H: AudioHost> NodeMut<'c, H> {
    pub(crate) fn new(ctx: &'c mut GraphContext<H>, node: Node) -> Self {
        Self { ctx, node }
    }

    pub fn id(&self) -> Node {
        self.node
    }

    pub fn connect(self, target: impl Into<Target>) -> Result<Self> {
        self.ctx.connect(self.node, target)?;
        Ok(self)
    }

    pub fn connect_output(self, output: usize, target: impl Into<Target>) -> Result<Self> {
        self.ctx.connect_output(self.node, output, target)?;
        Ok(self)
    }

    pub fn disconnect(self, target: Option<Target>) -> Result<Self> {
        self.ctx.disconnect(self.node, target)?;
        Ok(self)
    }

    pub fn disconnect_all(self) -> Result<Self> {
        self.ctx.disconnect_all(self.node)?;
        Ok(self)
    }

    pub fn set(self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.ctx.set_value(self.node, name, &value.into())?;
        Ok(self)
    }

    pub fn with_gain(self, gain: impl Into<Value>) -> Result<Self> {
        self.ctx.with_gain(self.node, gain)?;
        Ok(self)
    }

    pub fn start(self, when: Option<Seconds>) -> Result<Self> {
        self.ctx.start(self.node, when)?;
        Ok(self)
    }

    pub fn stop(self, when: Option<Seconds>) -> Result<Self> {
        self.ctx.stop(self.node, when)?;
        Ok(self)
    }

    pub fn play(self, duration: Option<Seconds>, when: Option<Seconds>) -> Result<Self> {
        self.ctx.play(self.node, duration, when)?;
        Ok(self)
    }

    pub fn cancel(self, fade_time: Option<Seconds>) -> Result<Self> {
        self.ctx.cancel(self.node, fade_time)?;
        Ok(self)
    }

    pub fn param(&mut self, name: &str) -> Result<ParamMut<'_, H>> {
        let param = self.ctx.param(self.node, name)?;
        Ok(ParamMut::new(&mut *self.ctx, param))
    }
}

/// Chainable operations on one automation parameter.
pub struct ParamMut<'c, H: AudioHost> {
    ctx: &'c mut GraphContext<H>,
    param: Param,
}

impl<'c, H: AudioHost> ParamMut<'c, H> {
    pub(crate) fn new(ctx: &'c mut GraphContext<H>, param: Param) -> Self {
        Self { ctx, param }
    }

    pub fn param(&self) -> &Param {
        &self.param
    }

    /// The value the host reports right now.
    pub fn value(&self) -> Result<f64> {
        Ok(self.ctx.host.param_value(self.param.key())?)
    }

    pub fn set(self, value: f64) -> Result<Self> {
        self.ctx.host.set_param_value(self.param.key(), value)?;
        Ok(self)
    }

    /// Schedule `envelope` anchored at `when` (now if unset or zero).
    pub fn apply(self, envelope: &Envelope, when: Option<Seconds>) -> Result<Self> {
        let anchor = self.ctx.resolve_time(when);
        apply_envelope(&mut self.ctx.host, self.param.key(), anchor, envelope.steps())?;
        Ok(self)
    }

    /// Route the parameter's drive node to `target`. Only parameters made by
    /// a composite have one.
    pub fn connect(self, target: impl Into<Target>) -> Result<Self> {
        self.ctx.connect_param(&self.param, target)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        envelope,
        error::Error,
        host::{offline::OfflineHost, HostTarget},
        settings, GraphContext, Settings,
    };

    #[test]
    fn chain_returns_the_node() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let dest = ctx.destination();
        let osc = ctx.create_oscillator(Settings::new()).unwrap();

        let chained = ctx
            .node(osc)
            .set("detune", 10.0)
            .and_then(|n| n.connect(dest))
            .and_then(|n| n.start(Some(0.5)))
            .map(|n| n.id())
            .unwrap();
        assert_eq!(chained, osc);

        let id = ctx.host_id(osc).unwrap();
        assert_eq!(ctx.host().start_time(id), Some(0.5));
        assert!(ctx
            .host()
            .is_connected(id, &HostTarget::node(ctx.host_id(dest).unwrap())));
    }

    #[test]
    fn param_handles_schedule_and_read() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let filter = ctx.create_biquad_filter(settings! { "frequency" => 800.0 }).unwrap();

        let mut node = ctx.node(filter);
        let param = node.param("frequency").unwrap();
        assert_eq!(param.value().unwrap(), 800.0);
        param
            .apply(&envelope![800.0, (200.0, 0.5)], Some(1.0))
            .unwrap();

        let key = ctx.param(filter, "frequency").unwrap().key().clone();
        assert_eq!(ctx.host().timeline(&key).unwrap().value_at(1.5), 200.0);
    }

    #[test]
    fn native_params_cannot_be_connected() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let osc = ctx.create_oscillator(Settings::new()).unwrap();
        let gain = ctx.create_gain(Settings::new()).unwrap();
        let detune = ctx.param(osc, "detune").unwrap();

        assert_eq!(
            ctx.param_mut(detune).connect(gain).err(),
            Some(Error::ParamNotConnectable("detune".into()))
        );
    }
}
