//! Per-property value transitions.
//!
//! A [`Transition`] is bound 1:1 to one `(component, property)` slot and
//! moves that property's immediate value toward a target over time. The
//! interpolation (numeric lerp vs. per-channel color merge) follows the
//! property's kind. A settled transition costs nothing per frame: it only
//! registers with the frame driver again when a retarget actually changes
//! the target value.

use crate::ease::Ease;
use crate::property::Property;

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransitionSettings {
    /// Seconds to wait before interpolation starts.
    pub delay: f64,
    /// Seconds from start value to target value.
    pub duration: f64,
    pub ease: Ease,
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            delay: 0.0,
            duration: 1.0,
            ease: Ease::default(),
        }
    }
}

/// Outcome of one frame step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionStep {
    /// The interpolated value to push into the immediate property slot.
    pub value: f64,
    /// True exactly once, on the step that reaches the target.
    pub finished: bool,
}

#[derive(Debug)]
pub struct Transition {
    property: Property,
    pub settings: TransitionSettings,
    start_value: f64,
    target_value: f64,
    /// Progress in [0,1]; 1 means settled.
    p: f64,
    delay_left: f64,
    /// Whether this transition is currently registered with the frame driver.
    active: bool,
}

impl Transition {
    /// A settled transition at `value`.
    pub fn new(property: Property, value: f64) -> Self {
        Self {
            property,
            settings: TransitionSettings::default(),
            start_value: value,
            target_value: value,
            p: 1.0,
            delay_left: 0.0,
            active: false,
        }
    }

    pub fn property(&self) -> Property {
        self.property
    }

    pub fn set(&mut self, settings: TransitionSettings) {
        self.settings = settings;
    }

    pub fn target_value(&self) -> f64 {
        self.target_value
    }

    /// Whether interpolation is still in flight.
    pub fn is_running(&self) -> bool {
        self.p < 1.0
    }

    pub fn is_registered(&self) -> bool {
        self.active
    }

    pub fn mark_registered(&mut self, registered: bool) {
        self.active = registered;
    }

    /// Retargets the transition. When the new target differs from `current`
    /// the interpolation restarts from `current`; otherwise the transition
    /// snaps to settled. Returns true when the caller must (re)register this
    /// transition with the frame driver.
    pub fn update_target_value(&mut self, target: f64, current: f64) -> bool {
        if target == current {
            self.reset(target, target, 1.0);
            false
        } else {
            self.start_value = current;
            self.target_value = target;
            self.p = 0.0;
            self.delay_left = self.settings.delay;
            !std::mem::replace(&mut self.active, true)
        }
    }

    /// Forces the interpolation state. `reset(t, t, 1.0)` settles at `t`;
    /// `reset(0.0, 1.0, 0.0)` restarts a 0→1 sweep (used by the stop-fade).
    pub fn reset(&mut self, start: f64, target: f64, p: f64) {
        self.start_value = start;
        self.target_value = target;
        self.p = p;
        self.delay_left = 0.0;
    }

    /// Eased progress in [0,1].
    pub fn eased_progress(&self) -> f64 {
        self.settings.ease.apply(self.p)
    }

    /// Current interpolated value.
    pub fn value(&self) -> f64 {
        self.property
            .merge(self.start_value, self.target_value, self.eased_progress())
    }

    /// Advances by `dt` seconds. Remaining start delay is consumed first and
    /// any surplus carries into interpolation within the same step.
    pub fn progress(&mut self, mut dt: f64) -> TransitionStep {
        if self.p >= 1.0 {
            return TransitionStep {
                value: self.value(),
                finished: false,
            };
        }

        if self.delay_left > 0.0 {
            self.delay_left -= dt;
            if self.delay_left < 0.0 {
                dt = -self.delay_left;
                self.delay_left = 0.0;
            } else {
                return TransitionStep {
                    value: self.value(),
                    finished: false,
                };
            }
        }

        if self.settings.duration <= 0.0 {
            self.p = 1.0;
        } else {
            self.p += dt / self.settings.duration;
        }

        let finished = self.p >= 1.0;
        if finished {
            self.p = 1.0;
        }
        TransitionStep {
            value: self.value(),
            finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color;

    fn numeric() -> Transition {
        let mut t = Transition::new(Property::X, 0.0);
        t.set(TransitionSettings {
            delay: 0.0,
            duration: 1.0,
            ease: Ease::Linear,
        });
        t
    }

    #[test]
    fn settled_transition_reports_nothing() {
        let mut t = numeric();
        assert!(!t.is_running());
        let step = t.progress(0.5);
        assert!(!step.finished);
        assert_eq!(step.value, 0.0);
    }

    #[test]
    fn retarget_restarts_from_current_value() {
        let mut t = numeric();
        assert!(t.update_target_value(10.0, 0.0));
        t.progress(0.5);
        assert_eq!(t.value(), 5.0);

        // Retargeting mid-flight keeps the interpolated value as new start.
        t.update_target_value(0.0, t.value());
        let step = t.progress(0.5);
        assert_eq!(step.value, 2.5);
    }

    #[test]
    fn retarget_to_current_value_settles() {
        let mut t = numeric();
        assert!(!t.update_target_value(0.0, 0.0));
        assert!(!t.is_running());
    }

    #[test]
    fn registration_happens_once_per_activation() {
        let mut t = numeric();
        assert!(t.update_target_value(10.0, 0.0));
        // Already registered; a second retarget must not ask again.
        assert!(!t.update_target_value(20.0, 5.0));
        t.mark_registered(false);
        assert!(t.update_target_value(30.0, 20.0));
    }

    #[test]
    fn delay_surplus_carries_into_progress() {
        let mut t = numeric();
        t.set(TransitionSettings {
            delay: 0.4,
            duration: 1.0,
            ease: Ease::Linear,
        });
        t.update_target_value(10.0, 0.0);
        let step = t.progress(0.2);
        assert_eq!(step.value, 0.0); // still delayed
        let step = t.progress(0.7); // 0.2 delay + 0.5 progress
        assert_eq!(step.value, 5.0);
        assert!(!step.finished);
    }

    #[test]
    fn zero_duration_snaps() {
        let mut t = numeric();
        t.set(TransitionSettings {
            delay: 0.0,
            duration: 0.0,
            ease: Ease::Linear,
        });
        t.update_target_value(10.0, 0.0);
        let step = t.progress(0.001);
        assert!(step.finished);
        assert_eq!(step.value, 10.0);
    }

    #[test]
    fn finish_is_reported_once() {
        let mut t = numeric();
        t.update_target_value(1.0, 0.0);
        assert!(t.progress(2.0).finished);
        assert!(!t.progress(1.0).finished);
    }

    #[test]
    fn color_transition_merges_channels() {
        let mut t = Transition::new(Property::ColorTopLeft, color::to_slot(0xff000000));
        t.set(TransitionSettings {
            delay: 0.0,
            duration: 1.0,
            ease: Ease::Linear,
        });
        t.update_target_value(color::to_slot(0xff0000ff), color::to_slot(0xff000000));
        let step = t.progress(0.5);
        assert_eq!(color::from_slot(step.value), 0xff000080);
    }
}
