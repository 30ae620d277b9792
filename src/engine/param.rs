//! Parameter Automation
//!
//! An `AudioParam` is a value on the context timeline (a gain, an oscillator
//! frequency) whose changes are scheduled as automation events rather than
//! written directly. The render side samples it per frame, so scheduled
//! changes are sample-accurate and never jump unless a `Set` asks for it.

use std::sync::{Arc, Mutex};

/// One scheduled change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Jump to `value` at `time`
    Set { time: f64, value: f32 },
    /// Straight line from `from` at `start_time` to `to` at `end_time`
    LinearRamp {
        start_time: f64,
        end_time: f64,
        from: f32,
        to: f32,
    },
    /// Exponential approach from `from` toward `target`
    ///
    /// After one `time_constant` about 63% of the distance is covered.
    TargetApproach {
        start_time: f64,
        from: f32,
        target: f32,
        time_constant: f64,
    },
}

impl Automation {
    /// Time at which this event takes over
    pub fn start_time(&self) -> f64 {
        match *self {
            Automation::Set { time, .. } => time,
            Automation::LinearRamp { start_time, .. } => start_time,
            Automation::TargetApproach { start_time, .. } => start_time,
        }
    }

    /// Value this event produces at `t`, assuming `t >= start_time()`
    fn value_at(&self, t: f64) -> f32 {
        match *self {
            Automation::Set { value, .. } => value,
            Automation::LinearRamp {
                start_time,
                end_time,
                from,
                to,
            } => {
                let span = end_time - start_time;
                if span <= 0.0 || t >= end_time {
                    to
                } else {
                    let progress = ((t - start_time) / span).clamp(0.0, 1.0) as f32;
                    from + (to - from) * progress
                }
            }
            Automation::TargetApproach {
                start_time,
                from,
                target,
                time_constant,
            } => {
                if time_constant <= 0.0 {
                    return target;
                }
                let decay = (-(t - start_time).max(0.0) / time_constant).exp() as f32;
                target + (from - target) * decay
            }
        }
    }

    /// Value this event holds before it begins
    fn initial_value(&self) -> f32 {
        match *self {
            Automation::Set { value, .. } => value,
            Automation::LinearRamp { from, .. } => from,
            Automation::TargetApproach { from, .. } => from,
        }
    }
}

/// A schedulable value
#[derive(Debug, Clone)]
pub struct AudioParam {
    default_value: f32,
    min: f32,
    max: f32,
    events: Vec<Automation>,
}

/// An AudioParam shared between the control side and a render source
pub type SharedParam = Arc<Mutex<AudioParam>>;

impl AudioParam {
    /// Create a parameter holding `default_value`, clamped to `min..=max`
    pub fn new(default_value: f32, min: f32, max: f32) -> Self {
        Self {
            default_value: default_value.clamp(min, max),
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Gain parameter (0.0 to 1.0)
    pub fn gain(initial: f32) -> Self {
        Self::new(initial, 0.0, 1.0)
    }

    /// Frequency parameter in Hz
    pub fn frequency(initial: f32) -> Self {
        Self::new(initial, 0.0, 24000.0)
    }

    pub fn into_shared(self) -> SharedParam {
        Arc::new(Mutex::new(self))
    }

    /// Scheduled events, oldest first
    pub fn events(&self) -> &[Automation] {
        &self.events
    }

    /// Value at context time `t`
    pub fn value_at(&self, t: f64) -> f32 {
        let active = self.events.iter().rev().find(|e| e.start_time() <= t);
        let value = match active {
            Some(event) => event.value_at(t),
            None => self
                .events
                .first()
                .map(|e| e.initial_value())
                .unwrap_or(self.default_value),
        };
        value.clamp(self.min, self.max)
    }

    /// Jump to `value` at `time`
    pub fn set_value_at(&mut self, time: f64, value: f32) {
        self.supersede(time);
        self.events.push(Automation::Set {
            time,
            value: value.clamp(self.min, self.max),
        });
    }

    /// Straight-line glide from the current value to `target` over `duration`
    pub fn linear_ramp(&mut self, now: f64, target: f32, duration: f64) {
        let from = self.value_at(now);
        self.supersede(now);
        self.events.push(Automation::LinearRamp {
            start_time: now,
            end_time: now + duration.max(0.0),
            from,
            to: target.clamp(self.min, self.max),
        });
    }

    /// Exponential approach from the current value toward `target`
    ///
    /// The time constant is a third of `duration`, so roughly 95% of the
    /// change has happened when `duration` has elapsed.
    pub fn set_target(&mut self, now: f64, target: f32, duration: f64) {
        let from = self.value_at(now);
        self.supersede(now);
        self.events.push(Automation::TargetApproach {
            start_time: now,
            from,
            target: target.clamp(self.min, self.max),
            time_constant: duration.max(0.0) / 3.0,
        });
    }

    /// Approach `target` starting from an explicit value
    ///
    /// Used when a fresh source starts from silence.
    pub fn set_target_from(&mut self, now: f64, from: f32, target: f32, duration: f64) {
        self.supersede(now);
        self.events.push(Automation::TargetApproach {
            start_time: now,
            from: from.clamp(self.min, self.max),
            target: target.clamp(self.min, self.max),
            time_constant: duration.max(0.0) / 3.0,
        });
    }

    /// Drop events at or after `time` and history that can no longer matter
    fn supersede(&mut self, time: f64) {
        self.events.retain(|e| e.start_time() < time);
        // Only the most recent earlier event is still needed, for renders
        // that lag slightly behind the control clock.
        if self.events.len() > 1 {
            let keep_from = self.events.len() - 1;
            self.events.drain(..keep_from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_value_without_events() {
        let param = AudioParam::gain(0.4);
        assert_relative_eq!(param.value_at(0.0), 0.4);
        assert_relative_eq!(param.value_at(100.0), 0.4);
    }

    #[test]
    fn test_default_is_clamped() {
        assert_relative_eq!(AudioParam::gain(3.0).value_at(0.0), 1.0);
    }

    #[test]
    fn test_linear_ramp_records_endpoints() {
        let mut param = AudioParam::frequency(124.0);
        param.linear_ramp(5.0, 112.0, 10.0);

        assert_eq!(
            param.events().last(),
            Some(&Automation::LinearRamp {
                start_time: 5.0,
                end_time: 15.0,
                from: 124.0,
                to: 112.0,
            })
        );
        assert_relative_eq!(param.value_at(5.0), 124.0);
        assert_relative_eq!(param.value_at(10.0), 118.0);
        assert_relative_eq!(param.value_at(15.0), 112.0);
        assert_relative_eq!(param.value_at(99.0), 112.0);
    }

    #[test]
    fn test_target_approach_converges() {
        let mut param = AudioParam::gain(1.0);
        param.set_target(0.0, 0.0, 0.3);

        assert_relative_eq!(param.value_at(0.0), 1.0);
        assert!(param.value_at(0.1) < 1.0);
        assert!(param.value_at(0.3) < 0.06);
        assert!(param.value_at(2.0) < 1e-6);
    }

    #[test]
    fn test_new_ramp_starts_from_inflight_value() {
        let mut param = AudioParam::gain(0.0);
        param.linear_ramp(0.0, 1.0, 2.0);
        param.linear_ramp(1.0, 0.0, 1.0);

        match param.events().last() {
            Some(Automation::LinearRamp { from, .. }) => assert_relative_eq!(*from, 0.5),
            other => panic!("unexpected event {:?}", other),
        }
        assert_relative_eq!(param.value_at(1.5), 0.25);
    }

    #[test]
    fn test_supersede_drops_future_events_and_old_history() {
        let mut param = AudioParam::gain(0.0);
        param.set_value_at(1.0, 0.2);
        param.set_value_at(2.0, 0.4);
        param.set_value_at(3.0, 0.6);
        param.set_target(2.5, 1.0, 1.0);

        // The 3.0 event is gone, only the 2.0 anchor remains before the new one
        assert_eq!(param.events().len(), 2);
        assert_eq!(param.events()[0].start_time(), 2.0);
    }

    #[test]
    fn test_value_before_first_event_uses_its_start_value() {
        let mut param = AudioParam::gain(0.9);
        param.set_target_from(1.0, 0.0, 1.0, 0.01);
        assert_relative_eq!(param.value_at(0.5), 0.0);
    }

    #[test]
    fn test_ramp_target_is_clamped() {
        let mut param = AudioParam::gain(0.5);
        param.linear_ramp(0.0, 7.0, 1.0);
        assert_relative_eq!(param.value_at(1.0), 1.0);
    }
}
