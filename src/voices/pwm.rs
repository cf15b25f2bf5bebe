//! Pulse-width-modulated oscillator.
//!
//! A square-ish wave whose mark/space ratio can be set and modulated.
//!
//! # How It Works
//!
//! 1. A triangle oscillator runs at the exposed `frequency`/`detune`
//! 2. A 256-point wave shaper hard-clips it: negative input → -1, positive → +1
//! 3. The exposed `width` parameter is added to the shaper's input, moving the
//!    clipping threshold up or down the triangle, which changes the duty cycle
//!
//! `width = 0` gives a square wave; values towards ±1 give thinner pulses.

use crate::{
    error::Result,
    graph::{composite::Scope, context::GraphContext, node::Node, settings::Settings},
    host::AudioHost,
    settings,
};

const CURVE_POINTS: usize = 256;

/// Hard-clipping transfer curve: first half -1, second half +1.
pub fn pulse_curve() -> Vec<f32> {
    (0..CURVE_POINTS)
        .map(|i| if i < CURVE_POINTS / 2 { -1.0 } else { 1.0 })
        .collect()
}

/// Composite initializer for the PWM oscillator.
///
/// Exposes `frequency` (440), `detune` (0) and `width` (0).
pub fn pwm_oscillator<H: AudioHost>(scope: &mut Scope<'_, H>, _settings: &Settings) -> Result<()> {
    let frequency = scope.create_param(440.0)?;
    let detune = scope.create_param(0.0)?;
    let width = scope.create_param(0.0)?;

    let osc = scope.create_oscillator(settings! { "type" => "triangle", "frequency" => 0.0 })?;
    let osc_frequency = scope.param(osc, "frequency")?;
    let osc_detune = scope.param(osc, "detune")?;
    scope.connect_param(&frequency, osc_frequency)?;
    scope.connect_param(&detune, osc_detune)?;

    let shaper = scope.create_wave_shaper(settings! { "curve" => pulse_curve() })?;
    scope.connect(osc, shaper)?;
    scope.connect_param(&width, shaper)?;

    let out = scope.output()?;
    scope.connect(shaper, out)?;

    scope.expose("frequency", frequency)?;
    scope.expose("detune", detune)?;
    scope.expose("width", width)?;
    Ok(())
}

impl<H: AudioHost> GraphContext<H> {
    /// Create a [`pwm_oscillator`] composite.
    pub fn create_pwm_oscillator(&mut self, settings: Settings) -> Result<Node> {
        self.create_composite(pwm_oscillator, settings)
    }
}
