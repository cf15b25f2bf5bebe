//! Supersaw: seven detuned sawtooths around a centre oscillator.
//!
//! # How It Works
//!
//! 1. Seven sawtooth oscillators share the exposed `frequency` and `detune`
//! 2. Six of them are pushed off-centre by `frequency * width² * factor`,
//!    where the factors are the classic hardware spread
//! 3. The centre oscillator goes to a bus at level `1 - mix`, the six detuned
//!    ones to a bus at level `mix`
//!
//! Half of the detuned oscillators run at negative gain, which keeps their
//! sum from piling up into clipping.
//!
//! # Parameters
//!
//! - `frequency` (440): centre pitch in Hz
//! - `detune` (0): cents, applied to every oscillator
//! - `width` (0.5): spread; squared before it scales the detune factors
//! - `mix` (0.7): balance between centre and detuned oscillators

use crate::{
    error::Result,
    graph::{
        composite::Scope,
        context::GraphContext,
        node::{Node, Target},
        settings::Settings,
    },
    host::AudioHost,
    settings,
};

struct SawFactor {
    /// Frequency multiplier offset relative to the centre.
    detune: f64,
    gain: f64,
    centre: bool,
}

const fn saw(detune: f64, gain: f64) -> SawFactor {
    SawFactor {
        detune,
        gain,
        centre: false,
    }
}

const SAWS: [SawFactor; 7] = [
    saw(-0.107, 1.0 / 6.0),
    saw(-0.061, -1.0 / 6.0),
    saw(-0.0157, 1.0 / 6.0),
    SawFactor {
        detune: 0.0,
        gain: 1.0,
        centre: true,
    },
    saw(0.02, 1.0 / 6.0),
    saw(0.064, -1.0 / 6.0),
    saw(0.11, 1.0 / 6.0),
];

/// Composite initializer for the supersaw.
pub fn supersaw<H: AudioHost>(scope: &mut Scope<'_, H>, _settings: &Settings) -> Result<()> {
    let frequency = scope.create_param(440.0)?;
    let detune = scope.create_param(0.0)?;
    let width = scope.create_param(0.5)?;
    let mix = scope.create_param(0.7)?;
    let out = scope.output()?;

    // centre level = 1 - mix
    let centre_bus = scope.create_gain(settings! { "gain" => 1.0 })?;
    scope.connect(centre_bus, out)?;
    let invert = scope.create_gain(settings! { "gain" => -1.0 })?;
    let centre_level = scope.param(centre_bus, "gain")?;
    scope.connect(invert, centre_level)?;
    scope.connect_param(&mix, invert)?;

    // detuned level = mix
    let detune_bus = scope.create_gain(settings! { "gain" => 0.0 })?;
    scope.connect(detune_bus, out)?;
    let detune_level = scope.param(detune_bus, "gain")?;
    scope.connect_param(&mix, detune_level)?;

    // width² : width into a gain whose own level is driven by width
    let spread = scope.create_gain(settings! { "gain" => 0.0 })?;
    scope.connect_param(&width, spread)?;
    let spread_level = scope.param(spread, "gain")?;
    scope.connect(spread, spread_level)?;

    for factor in &SAWS {
        let osc = scope.create_oscillator(settings! {
            "type" => "sawtooth",
            "frequency" => 0.0,
            "gain" => factor.gain,
        })?;
        let osc_frequency = scope.param(osc, "frequency")?;
        let osc_detune = scope.param(osc, "detune")?;
        scope.connect_param(&frequency, osc_frequency.clone())?;
        scope.connect_param(&detune, osc_detune)?;

        if factor.centre {
            scope.connect(osc, centre_bus)?;
            continue;
        }

        // frequency * (width² * factor) added onto the oscillator's frequency
        let offset = scope.create_gain(settings! { "gain" => 0.0 })?;
        scope.connect(offset, osc_frequency)?;
        scope.connect_param(&frequency, offset)?;
        let amount = scope.create_gain(settings! { "gain" => factor.detune })?;
        let offset_level = scope.param(offset, "gain")?;
        scope.connect(amount, Target::Param(offset_level))?;
        scope.connect(spread, amount)?;

        scope.connect(osc, detune_bus)?;
    }

    scope.expose("frequency", frequency)?;
    scope.expose("detune", detune)?;
    scope.expose("width", width)?;
    scope.expose("mix", mix)?;
    Ok(())
}

impl<H: AudioHost> GraphContext<H> {
    /// Create a [`supersaw`] composite.
    pub fn create_supersaw(&mut self, settings: Settings) -> Result<Node> {
        self.create_composite(supersaw, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{offline::OfflineHost, HostTarget, NodeKind};

    #[test]
    fn factors_are_symmetric_in_count() {
        assert_eq!(SAWS.iter().filter(|f| f.centre).count(), 1);
        assert_eq!(SAWS.iter().filter(|f| f.detune < 0.0).count(), 3);
        assert_eq!(SAWS.iter().filter(|f| f.detune > 0.0).count(), 3);
        let detuned_gain: f64 = SAWS.iter().filter(|f| !f.centre).map(|f| f.gain).sum();
        assert!((detuned_gain - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn graph_shape() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let saw = ctx.create_supersaw(settings! { "mix" => 0.5 }).unwrap();
        let host = ctx.host();

        assert_eq!(host.count(&NodeKind::Oscillator), 7);
        assert_eq!(host.count(&NodeKind::BufferSource), 1);
        // output, 4 params, 2 buses, invert, spread, 7 welded stages, 6 × (offset, amount)
        assert_eq!(host.count(&NodeKind::Gain), 1 + 4 + 2 + 1 + 1 + 7 + 12);

        let mix = ctx.param(saw, "mix").unwrap();
        assert_eq!(host.param_value(mix.key()).unwrap(), 0.5);
        // mix drives the invert gain and the detune bus level
        assert_eq!(host.outputs(mix.driver().unwrap()).len(), 2);

        // frequency drives 7 oscillators and 6 offsets
        let frequency = ctx.param(saw, "frequency").unwrap();
        let driven = host.outputs(frequency.driver().unwrap());
        assert_eq!(driven.len(), 13);
        let params = driven
            .iter()
            .filter(|t| matches!(t, HostTarget::Param(key) if key.name == "frequency"))
            .count();
        assert_eq!(params, 7);
    }

    #[test]
    fn width_is_squared_by_feedback_into_its_own_level() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let saw = ctx.create_supersaw(Settings::new()).unwrap();
        let width = ctx.param(saw, "width").unwrap();
        let host = ctx.host();

        let spread = host.outputs(width.driver().unwrap())[0].host_node();
        let feeds_own_gain = host
            .outputs(spread)
            .iter()
            .any(|t| matches!(t, HostTarget::Param(key) if key.node == spread && key.name == "gain"));
        assert!(feeds_own_gain);
    }
}
