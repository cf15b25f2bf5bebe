use super::Seconds;

/*
Automation Timeline
===================

A schedulable parameter holds an intrinsic value plus an ordered list of
future events. Reading the parameter at time `t` walks the list:

  - events at or before `t` have happened; the last one sets the value
  - the first event after `t` decides what happens in between:
      SetValue         hold the previous value until the event time
      LinearRamp       interpolate linearly from the previous event
      ExponentialRamp  interpolate geometrically from the previous event

    value
      1 ┤●
        │ ╲
        │  ╲__
        │     ╲___
        │         ╲______
 0.0001 ┤                ●╲
      0 ┤                  ●────
        └─┬──────────────┬─┬────→ time
          T            T+d T+d+0.0001

Exponential interpolation is only defined between two values of the same sign
that are both non-zero. When that does not hold the previous value is held
until the ramp's end time, which is how browser hosts behave.

Cancelling at time `c` removes every event at or after `c` and leaves earlier
ones alone.
*/

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AutomationKind {
    SetValue,
    LinearRamp,
    ExponentialRamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationEvent {
    pub kind: AutomationKind,
    pub value: f64,
    pub time: Seconds,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamTimeline {
    value: f64,
    events: Vec<AutomationEvent>,
}

impl ParamTimeline {
    pub fn new(default: f64) -> Self {
        Self {
            value: default,
            events: Vec::new(),
        }
    }

    /// The intrinsic value, ignoring scheduled events.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Insert an event, keeping the list ordered by time. Events sharing a
    /// time stay in the order they were scheduled.
    pub fn schedule(&mut self, kind: AutomationKind, value: f64, time: Seconds) {
        let index = self.events.partition_point(|event| event.time <= time);
        self.events
            .insert(index, AutomationEvent { kind, value, time });
    }

    pub fn cancel_from(&mut self, time: Seconds) {
        self.events.retain(|event| event.time < time);
    }

    /// Evaluate the parameter at `time`.
    pub fn value_at(&self, time: Seconds) -> f64 {
        let mut previous_value = self.value;
        let mut previous_time = 0.0;

        for event in &self.events {
            if event.time <= time {
                previous_value = event.value;
                previous_time = event.time;
                continue;
            }

            let progress = (time - previous_time) / (event.time - previous_time);
            return match event.kind {
                AutomationKind::SetValue => previous_value,
                AutomationKind::LinearRamp => {
                    previous_value + (event.value - previous_value) * progress
                }
                AutomationKind::ExponentialRamp => {
                    if previous_value == 0.0 || previous_value * event.value <= 0.0 {
                        previous_value
                    } else {
                        previous_value * (event.value / previous_value).powf(progress)
                    }
                }
            };
        }

        previous_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn intrinsic_value_without_events() {
        let mut timeline = ParamTimeline::new(440.0);
        timeline.set_value(220.0);
        assert_eq!(timeline.value_at(0.0), 220.0);
        assert_eq!(timeline.value_at(100.0), 220.0);
    }

    #[test]
    fn set_value_holds_until_its_time() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.schedule(AutomationKind::SetValue, 1.0, 2.0);
        assert_eq!(timeline.value_at(1.9), 0.0);
        assert_eq!(timeline.value_at(2.0), 1.0);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.schedule(AutomationKind::SetValue, 0.0, 1.0);
        timeline.schedule(AutomationKind::LinearRamp, -1.0, 1.2);
        assert!(approx_eq!(f64, timeline.value_at(1.1), -0.5, epsilon = 1e-9));
        assert_eq!(timeline.value_at(1.2), -1.0);
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.schedule(AutomationKind::SetValue, 1.0, 0.0);
        timeline.schedule(AutomationKind::ExponentialRamp, 100.0, 2.0);
        assert!(approx_eq!(f64, timeline.value_at(1.0), 10.0, epsilon = 1e-9));
    }

    #[test]
    fn exponential_ramp_from_zero_holds() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.schedule(AutomationKind::SetValue, 0.0, 0.0);
        timeline.schedule(AutomationKind::ExponentialRamp, 1.0, 1.0);
        assert_eq!(timeline.value_at(0.5), 0.0);
        assert_eq!(timeline.value_at(1.0), 1.0);
    }

    #[test]
    fn cancel_is_forward_looking() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.schedule(AutomationKind::SetValue, 1.0, 1.0);
        timeline.schedule(AutomationKind::LinearRamp, 2.0, 2.0);
        timeline.schedule(AutomationKind::LinearRamp, 3.0, 3.0);
        timeline.cancel_from(2.0);

        assert_eq!(timeline.events().len(), 1);
        assert_eq!(timeline.value_at(5.0), 1.0);
    }

    #[test]
    fn same_time_events_keep_schedule_order() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.schedule(AutomationKind::SetValue, 1.0, 1.0);
        timeline.schedule(AutomationKind::SetValue, 2.0, 1.0);
        assert_eq!(timeline.events()[1].value, 2.0);
        assert_eq!(timeline.value_at(1.0), 2.0);
    }
}
