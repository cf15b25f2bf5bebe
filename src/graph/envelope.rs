use crate::{
    host::{AudioHost, HostError, ParamKey, Seconds},
    DEFAULT_STEP_DURATION, SILENCE_FLOOR, SILENCE_TAIL,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Parameter Envelopes
===================

An envelope is a list of steps applied to one automation parameter, starting
at an anchor time:

    [1.0, (0.0, 0.5)]                 start at 1, fall to silence over 0.5s
    [0.0, (1.0, 0.01), (0.3, 0.2)]    attack to 1, decay to 0.3

  step          meaning
  ------------  ------------------------------------------------------------
  v             a bare value; as the first step it is the starting value
  (v, d)        ramp to v, finishing d seconds after the previous ramp ended

Each ramp advances a running cursor, so durations are relative to the end of
the previous ramp, not to the anchor. A ramp without a duration (or with a
zero duration) takes 0.1 seconds.


Choosing the Curve
------------------

Hosts ramp exponentially for natural-sounding level changes, but an
exponential ramp can never reach zero and is undefined for non-positive
targets. Each ramp therefore picks its curve from its target:

    target < 0   linear ramp
    target = 0   exponential ramp to 0.0001, then, if this is the final
                 step, a linear ramp to exactly 0 over 0.0001s
    target > 0   exponential ramp

    1 ┤●
      │ ╲
      │  ╲___
      │      ╲______
      │             ●  0.0001
    0 ┤              ●────────
      └──────────────┬┬───────→
                     │└ cursor + 0.0001 (last step only)
                     └ cursor

The zero rule is what lets `(0.0, d)` fade to real silence without the host
rejecting a zero exponential target or leaving a residual hiss.


Known Gap
---------

Steps are not validated. A NaN target is handed to the host as an exponential
ramp and the host decides what to do with it; negative durations move the
cursor backwards.
*/

/// One point of an envelope.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawStep", into = "RawStep")
)]
pub enum EnvelopeStep {
    /// A bare value. Only meaningful as the first step.
    Value(f64),
    /// Ramp to `target` over `duration` seconds (default 0.1).
    Ramp { target: f64, duration: Option<Seconds> },
}

impl EnvelopeStep {
    pub fn ramp(target: f64, duration: Seconds) -> Self {
        EnvelopeStep::Ramp {
            target,
            duration: Some(duration),
        }
    }
}

impl From<f64> for EnvelopeStep {
    fn from(value: f64) -> Self {
        EnvelopeStep::Value(value)
    }
}

impl From<(f64, f64)> for EnvelopeStep {
    fn from((target, duration): (f64, f64)) -> Self {
        EnvelopeStep::ramp(target, duration)
    }
}

/// Serialized form: `1.0` or `[target]` / `[target, duration]`.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Value(f64),
    Ramp(Vec<f64>),
}

#[cfg(feature = "serde")]
impl TryFrom<RawStep> for EnvelopeStep {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        match raw {
            RawStep::Value(value) => Ok(EnvelopeStep::Value(value)),
            RawStep::Ramp(pair) => match pair.as_slice() {
                [target] => Ok(EnvelopeStep::Ramp {
                    target: *target,
                    duration: None,
                }),
                [target, duration] => Ok(EnvelopeStep::ramp(*target, *duration)),
                other => Err(format!(
                    "an envelope ramp is [target] or [target, duration], got {} numbers",
                    other.len()
                )),
            },
        }
    }
}

#[cfg(feature = "serde")]
impl From<EnvelopeStep> for RawStep {
    fn from(step: EnvelopeStep) -> Self {
        match step {
            EnvelopeStep::Value(value) => RawStep::Value(value),
            EnvelopeStep::Ramp {
                target,
                duration: Some(duration),
            } => RawStep::Ramp(vec![target, duration]),
            EnvelopeStep::Ramp {
                target,
                duration: None,
            } => RawStep::Ramp(vec![target]),
        }
    }
}

/// An ordered list of [`EnvelopeStep`]s.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Envelope {
    steps: Vec<EnvelopeStep>,
}

impl Envelope {
    /// Start an envelope at `value`.
    pub fn starting_at(value: f64) -> Self {
        Self {
            steps: vec![EnvelopeStep::Value(value)],
        }
    }

    /// Append a ramp to `target` lasting `duration` seconds.
    pub fn ramp(mut self, target: f64, duration: Seconds) -> Self {
        self.steps.push(EnvelopeStep::ramp(target, duration));
        self
    }

    pub fn push(&mut self, step: impl Into<EnvelopeStep>) {
        self.steps.push(step.into());
    }

    pub fn steps(&self) -> &[EnvelopeStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The value the parameter shows before the envelope runs: the first step
    /// when it is a bare value.
    pub fn initial_value(&self) -> Option<f64> {
        match self.steps.first() {
            Some(EnvelopeStep::Value(value)) => Some(*value),
            _ => None,
        }
    }

    /// Time from the anchor until the last ramp ends.
    pub fn length(&self) -> Seconds {
        self.steps
            .iter()
            .filter_map(|step| match step {
                EnvelopeStep::Ramp { duration, .. } => Some(step_duration(*duration)),
                EnvelopeStep::Value(_) => None,
            })
            .sum()
    }
}

impl From<Vec<EnvelopeStep>> for Envelope {
    fn from(steps: Vec<EnvelopeStep>) -> Self {
        Self { steps }
    }
}

impl FromIterator<EnvelopeStep> for Envelope {
    fn from_iter<I: IntoIterator<Item = EnvelopeStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Build an [`Envelope`] from bare values and `(target, duration)` pairs.
///
/// ```
/// use tony_graph::envelope;
///
/// let pluck = envelope![0.0, (1.0, 0.01), (0.0, 0.4)];
/// assert_eq!(pluck.steps().len(), 3);
/// ```
#[macro_export]
macro_rules! envelope {
    ($($step:expr),* $(,)?) => {
        $crate::graph::envelope::Envelope::from(vec![
            $($crate::graph::envelope::EnvelopeStep::from($step)),*
        ])
    };
}

/// Zero, NaN and absent durations fall back to the default step length.
fn step_duration(duration: Option<Seconds>) -> Seconds {
    match duration {
        Some(d) if d != 0.0 && !d.is_nan() => d,
        _ => DEFAULT_STEP_DURATION,
    }
}

/// Schedule `steps` on `param`, anchored at `anchor`.
///
/// Anything already scheduled at or after the anchor is cancelled first, so
/// re-applying an envelope on every start replaces the previous one.
pub fn apply_envelope<H: AudioHost + ?Sized>(
    host: &mut H,
    param: &ParamKey,
    anchor: Seconds,
    steps: &[EnvelopeStep],
) -> Result<(), HostError> {
    host.cancel_scheduled_values(param, anchor)?;

    if let Some(EnvelopeStep::Value(value)) = steps.first() {
        host.set_value_at_time(param, *value, anchor)?;
    }

    let mut cursor = anchor;
    for (index, step) in steps.iter().enumerate() {
        let EnvelopeStep::Ramp { target, duration } = *step else {
            continue;
        };
        cursor += step_duration(duration);
        log::trace!("{}.{}: ramp to {target} at {cursor}", param.node.0, param.name);

        if target < 0.0 {
            host.linear_ramp_to_value_at_time(param, target, cursor)?;
        } else if target == 0.0 {
            host.exponential_ramp_to_value_at_time(param, SILENCE_FLOOR, cursor)?;
            if index + 1 == steps.len() {
                host.linear_ramp_to_value_at_time(param, 0.0, cursor + SILENCE_TAIL)?;
            }
        } else {
            host.exponential_ramp_to_value_at_time(param, target, cursor)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        offline::{HostCall, OfflineHost},
        timeline::AutomationKind,
        NodeKind,
    };
    use float_cmp::approx_eq;

    fn gain_param(host: &mut OfflineHost) -> ParamKey {
        let node = host.create_node(&NodeKind::Gain, &[]).unwrap();
        ParamKey::new(node, "gain")
    }

    fn kinds(host: &OfflineHost, param: &ParamKey) -> Vec<(AutomationKind, f64, f64)> {
        host.timeline(param)
            .unwrap()
            .events()
            .iter()
            .map(|e| (e.kind, e.value, e.time))
            .collect()
    }

    #[test]
    fn two_ramps_complete_at_cumulative_times() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        let env = envelope![0.5, (1.0, 0.25), (0.2, 0.5)];
        apply_envelope(&mut host, &param, 2.0, env.steps()).unwrap();

        let timeline = host.timeline(&param).unwrap();
        assert_eq!(timeline.value_at(2.0), 0.5);
        assert!(approx_eq!(f64, timeline.value_at(2.25), 1.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, timeline.value_at(2.75), 0.2, epsilon = 1e-12));
    }

    #[test]
    fn final_zero_target_reaches_true_silence() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        apply_envelope(&mut host, &param, 0.0, envelope![1.0, (0.0, 0.5)].steps()).unwrap();

        assert_eq!(
            kinds(&host, &param),
            vec![
                (AutomationKind::SetValue, 1.0, 0.0),
                (AutomationKind::ExponentialRamp, SILENCE_FLOOR, 0.5),
                (AutomationKind::LinearRamp, 0.0, 0.5 + SILENCE_TAIL),
            ]
        );
        let timeline = host.timeline(&param).unwrap();
        assert_eq!(timeline.value_at(0.0), 1.0);
        assert_eq!(timeline.value_at(0.5), SILENCE_FLOOR);
        assert_eq!(timeline.value_at(0.5 + SILENCE_TAIL), 0.0);
    }

    #[test]
    fn inner_zero_target_has_no_silence_tail() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        apply_envelope(
            &mut host,
            &param,
            0.0,
            envelope![1.0, (0.0, 0.2), (1.0, 0.2)].steps(),
        )
        .unwrap();

        let linear = kinds(&host, &param)
            .into_iter()
            .filter(|(kind, ..)| *kind == AutomationKind::LinearRamp)
            .count();
        assert_eq!(linear, 0);
    }

    #[test]
    fn negative_target_ramps_linearly() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        apply_envelope(&mut host, &param, 0.0, envelope![0.0, (-1.0, 0.2)].steps()).unwrap();

        assert_eq!(
            kinds(&host, &param)[1],
            (AutomationKind::LinearRamp, -1.0, 0.2)
        );
        let timeline = host.timeline(&param).unwrap();
        assert!(approx_eq!(f64, timeline.value_at(0.1), -0.5, epsilon = 1e-12));
    }

    #[test]
    fn missing_or_zero_duration_defaults() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        let steps = [
            EnvelopeStep::Value(1.0),
            EnvelopeStep::Ramp {
                target: 2.0,
                duration: None,
            },
            EnvelopeStep::ramp(3.0, 0.0),
        ];
        apply_envelope(&mut host, &param, 1.0, &steps).unwrap();

        let times: Vec<_> = kinds(&host, &param).iter().map(|e| e.2).collect();
        assert!(approx_eq!(f64, times[1], 1.1, epsilon = 1e-12));
        assert!(approx_eq!(f64, times[2], 1.2, epsilon = 1e-12));
    }

    #[test]
    fn bare_values_after_the_first_do_not_move_the_cursor() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        let env = envelope![1.0, 5.0, (2.0, 0.3)];
        apply_envelope(&mut host, &param, 0.0, env.steps()).unwrap();

        assert_eq!(
            kinds(&host, &param),
            vec![
                (AutomationKind::SetValue, 1.0, 0.0),
                (AutomationKind::ExponentialRamp, 2.0, 0.3),
            ]
        );
    }

    #[test]
    fn reapplying_cancels_from_new_anchor_only() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        apply_envelope(&mut host, &param, 0.0, envelope![1.0, (2.0, 1.0)].steps()).unwrap();
        apply_envelope(&mut host, &param, 0.5, envelope![3.0].steps()).unwrap();

        let events = kinds(&host, &param);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], (AutomationKind::SetValue, 1.0, 0.0));
        assert_eq!(events[1], (AutomationKind::SetValue, 3.0, 0.5));
        assert!(host
            .calls()
            .iter()
            .any(|call| matches!(call, HostCall::Cancel { time, .. } if *time == 0.5)));
    }

    #[test]
    fn first_ramp_starts_from_anchor() {
        let mut host = OfflineHost::default();
        let param = gain_param(&mut host);

        apply_envelope(&mut host, &param, 1.0, envelope![(0.5, 0.5)].steps()).unwrap();
        assert_eq!(
            kinds(&host, &param),
            vec![(AutomationKind::ExponentialRamp, 0.5, 1.5)]
        );
    }

    #[test]
    fn length_sums_ramp_durations() {
        let env = envelope![0.0, (1.0, 0.01), (0.3, 0.2), 4.0];
        assert!(approx_eq!(f64, env.length(), 0.21, epsilon = 1e-12));
        assert_eq!(env.initial_value(), Some(0.0));
        assert_eq!(envelope![(1.0, 0.1)].initial_value(), None);
    }
}
