use std::{borrow::Cow, fmt};

/*
Capability Table
================

Every node the engine creates comes from a named host factory:
`createOscillator`, `createGain`, `createBiquadFilter` and so on. Instead of
probing the host at runtime for whatever it happens to expose, each factory is
declared once here together with the rule used to wrap what it returns.

  method             kind             rule
  ------------------ ---------------- ---------
  createOscillator   Oscillator       Source
  createBufferSource BufferSource     Source
  createGain         Gain             Processor
  createBiquadFilter BiquadFilter     Processor
  ...

Wrap Rules
----------

  Source     The node can be started and stopped on the host clock and tells
             us when it has ended. Composites queue it for start/stop and
             count it towards completion.

  Processor  The node only processes whatever is connected to it. It can be
             connected onwards, nothing more.

A host that offers node types not listed here returns extra entries from
`AudioHost::factories` using `NodeKind::Other`; the context builds its lookup
from that list, so new node types need no engine change.
*/

/// The kinds of node the engine knows how to ask a host for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Oscillator,
    Gain,
    BiquadFilter,
    BufferSource,
    ConstantSource,
    WaveShaper,
    ChannelMerger,
    ChannelSplitter,
    Delay,
    StereoPanner,
    DynamicsCompressor,
    Convolver,
    Analyser,
    ScriptProcessor,
    /// The host's output. Never created through a factory.
    Destination,
    /// A host-specific node type.
    Other(String),
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Other(name) => f.write_str(name),
            kind => write!(f, "{kind:?}"),
        }
    }
}

/// How the node returned by a factory is wrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapRule {
    Source,
    Processor,
}

/// One entry in the capability table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Factory {
    pub method: Cow<'static, str>,
    pub kind: NodeKind,
    pub rule: WrapRule,
}

impl Factory {
    pub const fn new(method: &'static str, kind: NodeKind, rule: WrapRule) -> Self {
        Self {
            method: Cow::Borrowed(method),
            kind,
            rule,
        }
    }

    /// Declare a host-specific factory.
    pub fn other(method: impl Into<String>, kind: impl Into<String>, rule: WrapRule) -> Self {
        Self {
            method: Cow::Owned(method.into()),
            kind: NodeKind::Other(kind.into()),
            rule,
        }
    }
}

/// Factories every Web-Audio-shaped host provides.
pub const DEFAULT_FACTORIES: &[Factory] = &[
    Factory::new("createOscillator", NodeKind::Oscillator, WrapRule::Source),
    Factory::new("createBufferSource", NodeKind::BufferSource, WrapRule::Source),
    Factory::new("createConstantSource", NodeKind::ConstantSource, WrapRule::Source),
    Factory::new("createGain", NodeKind::Gain, WrapRule::Processor),
    Factory::new("createBiquadFilter", NodeKind::BiquadFilter, WrapRule::Processor),
    Factory::new("createWaveShaper", NodeKind::WaveShaper, WrapRule::Processor),
    Factory::new("createChannelMerger", NodeKind::ChannelMerger, WrapRule::Processor),
    Factory::new("createChannelSplitter", NodeKind::ChannelSplitter, WrapRule::Processor),
    Factory::new("createDelay", NodeKind::Delay, WrapRule::Processor),
    Factory::new("createStereoPanner", NodeKind::StereoPanner, WrapRule::Processor),
    Factory::new("createDynamicsCompressor", NodeKind::DynamicsCompressor, WrapRule::Processor),
    Factory::new("createConvolver", NodeKind::Convolver, WrapRule::Processor),
    Factory::new("createAnalyser", NodeKind::Analyser, WrapRule::Processor),
    Factory::new("createScriptProcessor", NodeKind::ScriptProcessor, WrapRule::Processor),
];
