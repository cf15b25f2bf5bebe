use std::{fmt, rc::Rc};

use crate::{
    error::Result,
    graph::{
        composite::Scope,
        context::GraphContext,
        node::{Node, Target},
        settings::{Settings, Value},
    },
    host::{AudioHost, Seconds},
    sequencing::notes::note_to_frequency,
    FALLBACK_FREQUENCY,
};

/// A composite initializer that can be run any number of times.
pub type Init<H> = Rc<dyn Fn(&mut Scope<'_, H>, &Settings) -> Result<()>>;

/// What to play: a bare note, or a full settings map.
#[derive(Clone, Debug, PartialEq)]
pub enum Performance {
    /// A note name (`"C#4"`) or note number.
    Note(Value),
    Settings(Settings),
}

impl Performance {
    /// Settings for one performance. A note without a usable frequency gets
    /// one derived from the note, falling back to 440 Hz.
    pub fn into_settings(self) -> Settings {
        let mut settings = match self {
            Performance::Note(note) => Settings::new().with("note", note),
            Performance::Settings(settings) => settings,
        };

        let needs_frequency = settings.get("note").is_some_and(Value::is_truthy)
            && !settings.get("frequency").is_some_and(Value::is_truthy);
        if needs_frequency {
            let frequency = settings
                .get("note")
                .and_then(note_to_frequency)
                .filter(|f| *f != 0.0 && f.is_finite())
                .unwrap_or(FALLBACK_FREQUENCY);
            settings.set("frequency", frequency);
        }
        settings
    }
}

impl Default for Performance {
    fn default() -> Self {
        Performance::Settings(Settings::new())
    }
}

impl From<&str> for Performance {
    fn from(note: &str) -> Self {
        Performance::Note(note.into())
    }
}

impl From<String> for Performance {
    fn from(note: String) -> Self {
        Performance::Note(note.into())
    }
}

impl From<u8> for Performance {
    fn from(note: u8) -> Self {
        Performance::Note(note.into())
    }
}

impl From<f64> for Performance {
    fn from(note: f64) -> Self {
        Performance::Note(note.into())
    }
}

impl From<Settings> for Performance {
    fn from(settings: Settings) -> Self {
        Performance::Settings(settings)
    }
}

/// A reusable sound: an initializer plus default settings.
///
/// Every `play`/`start` builds a fresh composite, so one instrument can sound
/// any number of overlapping notes.
pub struct Instrument<H: AudioHost> {
    init: Init<H>,
    defaults: Settings,
    destination: Option<Target>,
}

impl<H: AudioHost> Clone for Instrument<H> {
    fn clone(&self) -> Self {
        Self {
            init: Rc::clone(&self.init),
            defaults: self.defaults.clone(),
            destination: self.destination.clone(),
        }
    }
}

impl<H: AudioHost> fmt::Debug for Instrument<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("defaults", &self.defaults)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl<H: AudioHost> Instrument<H> {
    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    /// Merge `startTime`, the defaults and the performance, later entries
    /// winning.
    pub fn create_settings(
        &self,
        ctx: &GraphContext<H>,
        perf: impl Into<Performance>,
        when: Option<Seconds>,
    ) -> Settings {
        let perf = perf.into().into_settings();
        let mut settings = Settings::new().with("startTime", ctx.resolve_time(when));
        settings.merge(&self.defaults);
        settings.merge(&perf);
        settings
    }

    /// Build the sound, connect it and schedule start and stop. The stop
    /// comes `duration` seconds after the start (0.25 when unset).
    pub fn play(
        &self,
        ctx: &mut GraphContext<H>,
        perf: impl Into<Performance>,
        when: Option<Seconds>,
    ) -> Result<Node> {
        let settings = self.create_settings(ctx, perf, when);
        let node = self.build(ctx, &settings)?;
        ctx.play(node, settings.number("duration"), settings.number("startTime"))
    }

    /// Build the sound, connect it and start it. Stopping is up to the
    /// caller.
    pub fn start(
        &self,
        ctx: &mut GraphContext<H>,
        perf: impl Into<Performance>,
        when: Option<Seconds>,
    ) -> Result<Node> {
        let settings = self.create_settings(ctx, perf, when);
        let node = self.build(ctx, &settings)?;
        ctx.start(node, settings.number("startTime"))
    }

    fn build(&self, ctx: &mut GraphContext<H>, settings: &Settings) -> Result<Node> {
        let init = Rc::clone(&self.init);
        let node = ctx.create_composite(move |scope, s| init(scope, s), settings.clone())?;
        let destination = self
            .destination
            .clone()
            .unwrap_or_else(|| Target::Node(ctx.destination()));
        ctx.connect(node, destination)
    }
}

impl<H: AudioHost> GraphContext<H> {
    /// Bind an initializer and defaults into an [`Instrument`]. Sounds go to
    /// `destination`, or to the speakers.
    pub fn create_instrument<F>(
        &self,
        init: F,
        defaults: Settings,
        destination: Option<Target>,
    ) -> Instrument<H>
    where
        F: Fn(&mut Scope<'_, H>, &Settings) -> Result<()> + 'static,
    {
        Instrument {
            init: Rc::new(init),
            defaults,
            destination,
        }
    }

    /// One-shot: build a composite from `init`, connect it and play it.
    pub fn play_function<F>(
        &mut self,
        init: F,
        perf: impl Into<Performance>,
        duration: Option<Seconds>,
        when: Option<Seconds>,
        destination: Option<Target>,
    ) -> Result<Node>
    where
        F: FnOnce(&mut Scope<'_, H>, &Settings) -> Result<()>,
    {
        let node = self.create_composite(init, perf.into().into_settings())?;
        let destination = destination.unwrap_or_else(|| Target::Node(self.destination()));
        self.connect(node, destination)?;
        self.play(node, duration, when)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::{offline::OfflineHost, NodeKind},
        settings,
    };
    use float_cmp::approx_eq;

    fn beep<H: AudioHost>(scope: &mut Scope<'_, H>, settings: &Settings) -> Result<()> {
        let frequency = settings.number("frequency").unwrap_or(FALLBACK_FREQUENCY);
        let osc = scope.create_oscillator(settings! { "frequency" => frequency })?;
        let out = scope.output()?;
        scope.connect(osc, out)?;
        Ok(())
    }

    fn oscillator(ctx: &GraphContext<OfflineHost>, composite: Node) -> Node {
        ctx.children(composite)
            .unwrap()
            .iter()
            .copied()
            .find(|n| ctx.kind(*n).unwrap() == Some(&NodeKind::Oscillator))
            .unwrap()
    }

    #[test]
    fn bare_note_becomes_note_and_frequency() {
        let settings = Performance::from("A4").into_settings();
        assert_eq!(settings.get("note"), Some(&Value::from("A4")));
        assert_eq!(settings.number("frequency"), Some(440.0));
    }

    #[test]
    fn explicit_frequency_wins() {
        let settings =
            Performance::from(settings! { "note" => "A4", "frequency" => 300.0 }).into_settings();
        assert_eq!(settings.number("frequency"), Some(300.0));
    }

    #[test]
    fn unknown_note_falls_back() {
        let settings = Performance::from("Z9").into_settings();
        assert_eq!(settings.number("frequency"), Some(FALLBACK_FREQUENCY));
    }

    #[test]
    fn zero_note_sets_nothing() {
        let settings = Performance::from(0.0).into_settings();
        assert!(!settings.contains("frequency"));
    }

    #[test]
    fn settings_merge_in_order() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        ctx.host_mut().advance_to(3.0);
        let inst = ctx.create_instrument(beep, settings! { "duration" => 1.0, "gain" => 0.5 }, None);

        let settings = inst.create_settings(&ctx, settings! { "gain" => 0.25 }, None);
        let names: Vec<_> = settings.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["startTime", "duration", "gain"]);
        assert_eq!(settings.number("startTime"), Some(3.0));
        assert_eq!(settings.number("gain"), Some(0.25));

        let later = inst.create_settings(&ctx, Performance::default(), Some(5.0));
        assert_eq!(later.number("startTime"), Some(5.0));
    }

    #[test]
    fn play_schedules_quarter_second_by_default() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let inst = ctx.create_instrument(beep, Settings::new(), None);
        let note = inst.play(&mut ctx, "A4", Some(2.0)).unwrap();

        let osc = ctx.host_id(oscillator(&ctx, note)).unwrap();
        let frequency = ctx.host().param_value(&crate::host::ParamKey::new(osc, "frequency"));
        assert_eq!(frequency, Ok(440.0));
        assert_eq!(ctx.host().start_time(osc), Some(2.0));
        assert_eq!(ctx.host().stop_time(osc), Some(2.25));

        let speakers = ctx.host_id(ctx.destination()).unwrap();
        assert!(ctx.host().inputs(speakers).contains(&ctx.host_id(note).unwrap()));
    }

    #[test]
    fn play_honours_duration() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let inst = ctx.create_instrument(beep, settings! { "duration" => 0.5 }, None);
        let note = inst.play(&mut ctx, "C4", Some(2.0)).unwrap();

        let osc = oscillator(&ctx, note);
        let id = ctx.host_id(osc).unwrap();
        assert_eq!(ctx.host().stop_time(id), Some(2.5));
        let frequency = ctx
            .host()
            .param_value(&crate::host::ParamKey::new(id, "frequency"))
            .unwrap();
        assert!(approx_eq!(f64, frequency, 261.625_565_300_598_6, epsilon = 1e-9));
    }

    #[test]
    fn start_leaves_stop_to_the_caller() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let inst = ctx.create_instrument(beep, Settings::new(), None);
        let note = inst.start(&mut ctx, 60u8, Some(1.0)).unwrap();

        let id = ctx.host_id(oscillator(&ctx, note)).unwrap();
        assert_eq!(ctx.host().start_time(id), Some(1.0));
        assert_eq!(ctx.host().stop_time(id), None);
    }

    #[test]
    fn instrument_destination_is_used() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let bus = ctx.create_gain(Settings::new()).unwrap();
        let inst = ctx.create_instrument(beep, Settings::new(), Some(Target::Node(bus)));
        let note = inst.play(&mut ctx, "E4", None).unwrap();

        let bus_id = ctx.host_id(bus).unwrap();
        assert_eq!(ctx.host().inputs(bus_id), vec![ctx.host_id(note).unwrap()]);
    }

    #[test]
    fn play_function_is_one_shot() {
        let mut ctx = GraphContext::new(OfflineHost::default());
        let note = ctx
            .play_function(beep, "A3", Some(1.0), Some(0.5), None)
            .unwrap();

        let id = ctx.host_id(oscillator(&ctx, note)).unwrap();
        assert_eq!(ctx.host().start_time(id), Some(0.5));
        assert_eq!(ctx.host().stop_time(id), Some(1.5));
        assert_eq!(
            ctx.host().param_value(&crate::host::ParamKey::new(id, "frequency")),
            Ok(220.0)
        );
    }
}
