//! Timed animations: a progress state machine plus value tracks applied to a
//! subject component and its tagged descendants.
//!
//! An animation owns no component data. Each frame the stage advances the
//! state machine with [`TimedAnimation::progress`] and then writes the
//! sampled action values into the subject tree. Lifecycle notifications are
//! queued as [`AnimationEvent`]s and drained by the caller.

use serde::{Deserialize, Serialize};

use crate::color::{merge_colors, to_slot};
use crate::component::ComponentId;
use crate::ease::Ease;
use crate::property::Property;
use crate::transition::{Transition, TransitionSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationState {
    Idle,
    Playing,
    Stopping,
    Stopped,
    Finished,
}

/// How a playing animation winds down after [`TimedAnimation::stop`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopMethod {
    /// Keep playing while a separate fade factor runs 1 -> 0.
    #[default]
    Fade,
    /// Run progress back down to 0.
    Reverse,
    /// Run remaining progress forward to 1, ignoring repeats.
    Forward,
    /// Stop on the next frame.
    Immediate,
    /// Finish the 0..1 ramp, then continue into an extended 1..2 phase.
    OneToTwo,
}

/// Overrides applied only while stopping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StopMethodOptions {
    pub duration: Option<f64>,
    pub delay: Option<f64>,
    pub ease: Option<Ease>,
}

/// Lifecycle notifications, in emission order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationEvent {
    Start,
    DelayEnd,
    Repeat { repeats_left: i32 },
    Finish,
    Stop,
    StopDelayEnd,
    StopContinue,
    StopFinish,
}

/// Keyframe track for one action. Points are (progress, value) pairs sorted
/// by progress; sampling clamps to the first and last points.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionValue {
    Number(Vec<(f64, f64)>),
    Color(Vec<(f64, u32)>),
}

impl ActionValue {
    pub fn constant(value: f64) -> Self {
        Self::Number(vec![(0.0, value)])
    }

    /// Samples the track at `p`, returning the property-slot encoding.
    pub fn sample(&self, p: f64) -> f64 {
        match self {
            Self::Number(points) => sample_number(points, p),
            Self::Color(points) => sample_color(points, p),
        }
    }
}

fn sample_number(points: &[(f64, f64)], p: f64) -> f64 {
    match locate(points, p) {
        Located::Empty => 0.0,
        Located::At(v) => v,
        Located::Between((p0, v0), (p1, v1)) => {
            let t = (p - p0) / (p1 - p0);
            v0 + (v1 - v0) * t
        }
    }
}

fn sample_color(points: &[(f64, u32)], p: f64) -> f64 {
    match locate(points, p) {
        Located::Empty => to_slot(crate::color::WHITE),
        Located::At(v) => to_slot(v),
        Located::Between((p0, v0), (p1, v1)) => {
            let t = (p - p0) / (p1 - p0);
            to_slot(merge_colors(v0, v1, t))
        }
    }
}

enum Located<T> {
    Empty,
    At(T),
    Between((f64, T), (f64, T)),
}

fn locate<T: Copy>(points: &[(f64, T)], p: f64) -> Located<T> {
    let Some(&first) = points.first() else {
        return Located::Empty;
    };
    if p <= first.0 {
        return Located::At(first.1);
    }
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if p < b.0 {
            if b.0 - a.0 <= 0.0 {
                return Located::At(b.1);
            }
            return Located::Between(a, b);
        }
    }
    Located::At(points[points.len() - 1].1)
}

/// One animated property track. An empty tag list targets the subject
/// itself; otherwise every descendant carrying one of the tags is animated.
#[derive(Clone, Debug)]
pub struct AnimationAction {
    pub tags: Vec<String>,
    pub property: Property,
    pub value: ActionValue,
}

impl AnimationAction {
    pub fn new(property: Property, value: ActionValue) -> Self {
        Self {
            tags: Vec::new(),
            property,
            value,
        }
    }

    pub fn with_tags(property: Property, tags: Vec<String>, value: ActionValue) -> Self {
        Self {
            tags,
            property,
            value,
        }
    }

    /// Value written when the animation's transforms are reset.
    pub fn reset_value(&self) -> f64 {
        self.value.sample(0.0)
    }

    /// Value for eased progress `p` scaled by the stopping fade `factor`.
    pub fn apply_value(&self, p: f64, factor: f64) -> f64 {
        self.property
            .merge(self.reset_value(), self.value.sample(p), factor)
    }
}

#[derive(Debug)]
pub struct TimedAnimation {
    pub actions: Vec<AnimationAction>,
    delay: f64,
    duration: f64,
    /// Extra play count after the first; -1 repeats forever.
    repeat: i32,
    repeat_progress: f64,
    repeat_delay: f64,
    autostop: bool,
    stop_method: StopMethod,
    stop_method_options: StopMethodOptions,
    ease: Ease,
    subject: Option<ComponentId>,
    state: AnimationState,
    p: f64,
    delay_left: f64,
    repeats_left: i32,
    stop_delay_left: f64,
    /// Progress 0..1 of the fade-out while stopping with `StopMethod::Fade`.
    fade: Transition,
    run_active: bool,
    stop_finished: bool,
    events: Vec<AnimationEvent>,
}

impl Default for TimedAnimation {
    fn default() -> Self {
        Self::new()
    }
}

impl TimedAnimation {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            delay: 0.0,
            duration: 1.0,
            repeat: 0,
            repeat_progress: 0.0,
            repeat_delay: 0.0,
            autostop: false,
            stop_method: StopMethod::default(),
            stop_method_options: StopMethodOptions::default(),
            ease: Ease::Linear,
            subject: None,
            state: AnimationState::Idle,
            p: 0.0,
            delay_left: 0.0,
            repeats_left: 0,
            stop_delay_left: 0.0,
            fade: Transition::new(Property::Alpha, 1.0),
            run_active: false,
            stop_finished: false,
            events: Vec::new(),
        }
    }

    pub fn set_delay(&mut self, delay: f64) -> &mut Self {
        self.delay = delay;
        self
    }

    pub fn set_duration(&mut self, duration: f64) -> &mut Self {
        self.duration = duration;
        self
    }

    pub fn set_repeat(&mut self, repeat: i32) -> &mut Self {
        self.repeat = repeat;
        self
    }

    pub fn set_repeat_progress(&mut self, progress: f64) -> &mut Self {
        self.repeat_progress = progress;
        self
    }

    pub fn set_repeat_delay(&mut self, delay: f64) -> &mut Self {
        self.repeat_delay = delay;
        self
    }

    pub fn set_autostop(&mut self, autostop: bool) -> &mut Self {
        self.autostop = autostop;
        self
    }

    pub fn set_stop_method(&mut self, method: StopMethod) -> &mut Self {
        self.stop_method = method;
        self
    }

    pub fn set_stop_method_options(&mut self, options: StopMethodOptions) -> &mut Self {
        self.stop_method_options = options;
        self
    }

    pub fn set_ease(&mut self, ease: Ease) -> &mut Self {
        self.ease = ease;
        self
    }

    pub fn add_action(&mut self, action: AnimationAction) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn progress_value(&self) -> f64 {
        self.p
    }

    pub fn subject(&self) -> Option<ComponentId> {
        self.subject
    }

    pub fn set_subject(&mut self, subject: Option<ComponentId>) {
        self.subject = subject;
    }

    /// Whether the stage should keep ticking this animation.
    pub fn is_active(&self) -> bool {
        self.subject.is_some()
            && matches!(self.state, AnimationState::Playing | AnimationState::Stopping)
    }

    pub(crate) fn is_run_active(&self) -> bool {
        self.run_active
    }

    pub(crate) fn set_run_active(&mut self, run_active: bool) {
        self.run_active = run_active;
    }

    /// True once per StopFinish emission; lets the caller detach a run-mode
    /// subject after applying the final reset.
    pub(crate) fn take_stop_finished(&mut self) -> bool {
        std::mem::take(&mut self.stop_finished)
    }

    /// Drains queued lifecycle events in emission order.
    pub fn take_events(&mut self) -> Vec<AnimationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Restarts from the beginning regardless of the current state.
    pub fn start(&mut self) {
        self.p = 0.0;
        self.delay_left = self.delay;
        self.repeats_left = self.repeat;
        self.state = AnimationState::Playing;
        self.events.push(AnimationEvent::Start);
    }

    /// Starts playing, or cancels a reversing stop in place.
    pub fn play(&mut self) {
        if self.state == AnimationState::Stopping && self.stop_method == StopMethod::Reverse {
            // Continue forward from wherever the reverse got to.
            self.state = AnimationState::Playing;
            self.events.push(AnimationEvent::StopContinue);
        } else if self.state != AnimationState::Playing && self.state != AnimationState::Finished {
            self.start();
        }
    }

    /// Like [`TimedAnimation::play`], but a finished animation starts over.
    pub fn replay(&mut self) {
        if self.state == AnimationState::Finished {
            self.start();
        } else {
            self.play();
        }
    }

    /// Begins winding down using the configured stop method.
    pub fn stop(&mut self) {
        if self.state == AnimationState::Stopped || self.state == AnimationState::Idle {
            return;
        }
        self.stop_delay_left = self.stop_method_options.delay.unwrap_or(0.0);
        if self.stop_method == StopMethod::Fade && self.stop_delay_left == 0.0 {
            self.init_fade();
        }
        self.state = AnimationState::Stopping;
        self.events.push(AnimationEvent::Stop);
    }

    /// Stops on the spot, skipping the stop method entirely. The caller is
    /// expected to reset transforms afterwards.
    pub fn stop_now(&mut self) {
        if self.state == AnimationState::Stopped || self.state == AnimationState::Idle {
            return;
        }
        self.state = AnimationState::Stopping;
        self.p = 0.0;
        self.events.push(AnimationEvent::Stop);
        self.state = AnimationState::Stopped;
        self.events.push(AnimationEvent::StopFinish);
        self.stop_finished = true;
    }

    /// Skips any remaining start or stop delay.
    pub fn skip_delay(&mut self) {
        self.delay_left = 0.0;
        self.stop_delay_left = 0.0;
    }

    /// Jumps a playing animation to the end of the current cycle; the finish
    /// logic runs on the next progress step.
    pub fn fast_forward(&mut self) {
        if self.state == AnimationState::Playing {
            self.delay_left = 0.0;
            self.p = 1.0;
        }
    }

    fn init_fade(&mut self) {
        let duration = self.stop_method_options.duration.unwrap_or(self.duration);
        self.fade.set(TransitionSettings {
            delay: 0.0,
            duration,
            ease: self.stop_method_options.ease.unwrap_or_default(),
        });
        self.fade.reset(0.0, 1.0, 0.0);
    }

    /// Advances the state machine by `dt` seconds. Does nothing without a
    /// subject.
    pub fn progress(&mut self, dt: f64) {
        if self.subject.is_none() {
            return;
        }
        match self.state {
            AnimationState::Stopping => self.stop_progress(dt),
            AnimationState::Playing => self.play_progress(dt),
            _ => {}
        }
    }

    fn play_progress(&mut self, mut dt: f64) {
        if self.p >= 1.0 {
            return;
        }
        if self.delay_left > 0.0 {
            self.delay_left -= dt;
            if self.delay_left < 0.0 {
                dt = -self.delay_left;
                self.delay_left = 0.0;
                self.events.push(AnimationEvent::DelayEnd);
            } else {
                return;
            }
        }
        if self.duration == 0.0 {
            self.p = 1.0;
        } else {
            self.p += dt / self.duration;
        }
        if self.p >= 1.0 {
            if self.repeat == -1 || self.repeats_left > 0 {
                if self.repeats_left > 0 {
                    self.repeats_left -= 1;
                }
                self.p = self.repeat_progress;
                if self.repeat_delay > 0.0 {
                    self.delay_left = self.repeat_delay;
                }
                self.events.push(AnimationEvent::Repeat {
                    repeats_left: self.repeats_left,
                });
            } else {
                self.p = 1.0;
                self.state = AnimationState::Finished;
                self.events.push(AnimationEvent::Finish);
                if self.autostop || self.run_active {
                    self.stop();
                }
            }
        }
    }

    fn stop_progress(&mut self, mut dt: f64) {
        if self.delay_left > 0.0 {
            // Stopped before the start delay ran out; nothing ever showed,
            // so finish right away.
            self.delay_left = 0.0;
            self.finish_stop();
            return;
        }
        if self.stop_delay_left > 0.0 {
            self.stop_delay_left -= dt;
            if self.stop_delay_left < 0.0 {
                dt = -self.stop_delay_left;
                self.stop_delay_left = 0.0;
                if self.stop_method == StopMethod::Fade {
                    self.init_fade();
                }
                self.events.push(AnimationEvent::StopDelayEnd);
            } else {
                return;
            }
        }
        let duration = self.stop_method_options.duration.unwrap_or(self.duration);
        match self.stop_method {
            StopMethod::Immediate => self.finish_stop(),
            StopMethod::Reverse => {
                if duration == 0.0 {
                    self.p = 0.0;
                } else {
                    self.p -= dt / duration;
                }
                if self.p <= 0.0 {
                    self.p = 0.0;
                    self.finish_stop();
                }
            }
            StopMethod::Fade => {
                let step = self.fade.progress(dt);
                if step.finished || !self.fade.is_running() {
                    self.finish_stop();
                }
            }
            StopMethod::OneToTwo => {
                if self.p < 2.0 {
                    if self.p < 1.0 {
                        // First finish the regular cycle at its own pace,
                        // regardless of remaining repeats.
                        if self.duration == 0.0 {
                            self.p = 1.0;
                        } else {
                            self.p += dt / self.duration;
                        }
                    } else if duration == 0.0 {
                        self.p = 2.0;
                    } else {
                        self.p += dt / duration;
                    }
                }
                if self.p >= 2.0 {
                    self.p = 2.0;
                    self.finish_stop();
                }
            }
            StopMethod::Forward => {
                if self.p < 1.0 {
                    if duration == 0.0 {
                        self.p = 1.0;
                    } else {
                        self.p += dt / duration;
                    }
                }
                if self.p >= 1.0 {
                    self.p = 1.0;
                    self.finish_stop();
                }
            }
        }
    }

    fn finish_stop(&mut self) {
        self.state = AnimationState::Stopped;
        self.events.push(AnimationEvent::StopFinish);
        self.stop_finished = true;
    }

    /// Eased progress fed to the actions. Past 1 (the OneToTwo tail) the raw
    /// value passes through so tracks keyed beyond 1 stay reachable.
    pub fn eased_progress(&self) -> f64 {
        if self.p <= 1.0 {
            self.ease.apply(self.p)
        } else {
            self.p
        }
    }

    /// Strength of the applied values: 1 while playing, fading to 0 during a
    /// `StopMethod::Fade` wind-down.
    pub fn factor(&self) -> f64 {
        if self.state == AnimationState::Stopping && self.stop_method == StopMethod::Fade {
            1.0 - self.fade.eased_progress()
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::from_slot;

    fn subject() -> Option<ComponentId> {
        Some(ComponentId::from_index(0))
    }

    fn playing(duration: f64) -> TimedAnimation {
        let mut anim = TimedAnimation::new();
        anim.set_duration(duration);
        anim.set_subject(subject());
        anim.start();
        anim.take_events();
        anim
    }

    #[test]
    fn needs_subject_to_progress() {
        let mut anim = TimedAnimation::new();
        anim.start();
        anim.progress(0.5);
        assert_eq!(anim.progress_value(), 0.0);
    }

    #[test]
    fn plays_through_delay_and_finishes() {
        let mut anim = TimedAnimation::new();
        anim.set_duration(1.0).set_delay(0.5);
        anim.set_subject(subject());
        anim.start();
        assert_eq!(anim.take_events(), vec![AnimationEvent::Start]);

        anim.progress(0.25);
        assert_eq!(anim.progress_value(), 0.0);
        assert!(anim.take_events().is_empty());

        // Surplus past the delay carries into progress.
        anim.progress(0.75);
        assert_eq!(anim.take_events(), vec![AnimationEvent::DelayEnd]);
        assert!((anim.progress_value() - 0.5).abs() < 1e-12);

        anim.progress(0.5);
        assert_eq!(anim.state(), AnimationState::Finished);
        assert_eq!(anim.take_events(), vec![AnimationEvent::Finish]);
    }

    #[test]
    fn repeats_then_finishes() {
        let mut anim = TimedAnimation::new();
        anim.set_duration(2.0).set_repeat(1).set_repeat_progress(0.0);
        anim.set_subject(subject());
        anim.start();
        anim.take_events();

        anim.progress(2.0);
        assert_eq!(
            anim.take_events(),
            vec![AnimationEvent::Repeat { repeats_left: 0 }]
        );
        assert_eq!(anim.progress_value(), 0.0);
        assert_eq!(anim.state(), AnimationState::Playing);

        anim.progress(2.0);
        assert_eq!(anim.take_events(), vec![AnimationEvent::Finish]);
        assert_eq!(anim.state(), AnimationState::Finished);
    }

    #[test]
    fn infinite_repeat_never_finishes() {
        let mut anim = playing(1.0);
        anim.set_repeat(-1).set_repeat_progress(0.25);
        for _ in 0..5 {
            anim.progress(1.0);
            assert_eq!(anim.state(), AnimationState::Playing);
        }
        assert_eq!(anim.progress_value(), 0.25);
    }

    #[test]
    fn repeat_delay_applies_between_cycles() {
        let mut anim = playing(1.0);
        anim.set_repeat(1).set_repeat_delay(0.5);
        anim.progress(1.0);
        anim.take_events();
        anim.progress(0.25);
        assert_eq!(anim.progress_value(), 0.0);
        anim.progress(0.25);
        assert_eq!(anim.take_events(), vec![AnimationEvent::DelayEnd]);
    }

    #[test]
    fn zero_duration_snaps_to_end() {
        let mut anim = playing(0.0);
        anim.progress(0.001);
        assert_eq!(anim.state(), AnimationState::Finished);
    }

    #[test]
    fn autostop_chains_into_stopping() {
        let mut anim = playing(1.0);
        anim.set_autostop(true).set_stop_method(StopMethod::Immediate);
        anim.progress(1.0);
        assert_eq!(anim.state(), AnimationState::Stopping);
        assert_eq!(
            anim.take_events(),
            vec![AnimationEvent::Finish, AnimationEvent::Stop]
        );
        anim.progress(0.0);
        assert_eq!(anim.state(), AnimationState::Stopped);
        assert_eq!(anim.take_events(), vec![AnimationEvent::StopFinish]);
    }

    #[test]
    fn fade_stop_keeps_progress_and_fades_factor() {
        let mut anim = playing(1.0);
        anim.set_stop_method(StopMethod::Fade);
        anim.set_stop_method_options(StopMethodOptions {
            duration: Some(0.5),
            ease: Some(Ease::Linear),
            ..Default::default()
        });
        anim.progress(0.4);
        anim.stop();
        assert_eq!(anim.take_events(), vec![AnimationEvent::Stop]);
        let p_at_stop = anim.progress_value();

        anim.progress(0.25);
        assert_eq!(anim.progress_value(), p_at_stop);
        assert!((anim.factor() - 0.5).abs() < 1e-12);
        assert_eq!(anim.state(), AnimationState::Stopping);

        anim.progress(0.25);
        assert_eq!(anim.state(), AnimationState::Stopped);
        assert_eq!(anim.take_events(), vec![AnimationEvent::StopFinish]);
    }

    #[test]
    fn reverse_stop_runs_back_and_play_continues() {
        let mut anim = playing(1.0);
        anim.set_stop_method(StopMethod::Reverse);
        anim.progress(0.6);
        anim.stop();
        anim.take_events();
        anim.progress(0.2);
        assert!((anim.progress_value() - 0.4).abs() < 1e-12);

        // play() during a reverse continues forward in place.
        anim.play();
        assert_eq!(anim.take_events(), vec![AnimationEvent::StopContinue]);
        assert_eq!(anim.state(), AnimationState::Playing);
        assert!((anim.progress_value() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn one_to_two_runs_past_one_ignoring_repeats() {
        let mut anim = playing(1.0);
        anim.set_repeat(3).set_stop_method(StopMethod::OneToTwo);
        anim.set_stop_method_options(StopMethodOptions {
            duration: Some(2.0),
            ..Default::default()
        });
        anim.progress(0.5);
        anim.stop();
        anim.take_events();

        // Finish the regular cycle at the animation's own duration.
        anim.progress(0.5);
        assert!((anim.progress_value() - 1.0).abs() < 1e-12);
        assert_eq!(anim.state(), AnimationState::Stopping);

        // The 1..2 tail uses the stop duration override.
        anim.progress(1.0);
        assert!((anim.progress_value() - 1.5).abs() < 1e-12);
        anim.progress(1.0);
        assert_eq!(anim.progress_value(), 2.0);
        assert_eq!(anim.state(), AnimationState::Stopped);
    }

    #[test]
    fn stop_during_start_delay_finishes_immediately() {
        let mut anim = TimedAnimation::new();
        anim.set_delay(1.0);
        anim.set_subject(subject());
        anim.start();
        anim.progress(0.2);
        anim.stop();
        anim.take_events();
        anim.progress(0.016);
        assert_eq!(anim.state(), AnimationState::Stopped);
        assert_eq!(anim.take_events(), vec![AnimationEvent::StopFinish]);
    }

    #[test]
    fn stop_delay_defers_the_wind_down() {
        let mut anim = playing(1.0);
        anim.set_stop_method(StopMethod::Immediate);
        anim.set_stop_method_options(StopMethodOptions {
            delay: Some(0.5),
            ..Default::default()
        });
        anim.progress(0.3);
        anim.stop();
        anim.take_events();
        anim.progress(0.25);
        assert_eq!(anim.state(), AnimationState::Stopping);
        anim.progress(0.5);
        assert_eq!(anim.state(), AnimationState::Stopped);
        assert_eq!(
            anim.take_events(),
            vec![AnimationEvent::StopDelayEnd, AnimationEvent::StopFinish]
        );
    }

    #[test]
    fn stop_now_jumps_to_stopped() {
        let mut anim = playing(1.0);
        anim.progress(0.7);
        anim.stop_now();
        assert_eq!(anim.state(), AnimationState::Stopped);
        assert_eq!(anim.progress_value(), 0.0);
        assert_eq!(
            anim.take_events(),
            vec![AnimationEvent::Stop, AnimationEvent::StopFinish]
        );
        // Already stopped; a second call is a no-op.
        anim.stop_now();
        assert!(anim.take_events().is_empty());
    }

    #[test]
    fn replay_restarts_a_finished_animation() {
        let mut anim = playing(1.0);
        anim.progress(1.0);
        assert_eq!(anim.state(), AnimationState::Finished);
        anim.play();
        assert_eq!(anim.state(), AnimationState::Finished);
        anim.replay();
        assert_eq!(anim.state(), AnimationState::Playing);
        assert_eq!(anim.progress_value(), 0.0);
    }

    #[test]
    fn number_track_samples_piecewise() {
        let value = ActionValue::Number(vec![(0.0, 0.0), (0.5, 10.0), (1.0, 0.0)]);
        assert_eq!(value.sample(0.0), 0.0);
        assert_eq!(value.sample(0.25), 5.0);
        assert_eq!(value.sample(0.5), 10.0);
        assert_eq!(value.sample(0.75), 5.0);
        assert_eq!(value.sample(2.0), 0.0);
    }

    #[test]
    fn color_track_blends_channels() {
        let value = ActionValue::Color(vec![(0.0, 0xff000000), (1.0, 0xff0000ff)]);
        assert_eq!(from_slot(value.sample(0.5)), 0xff000080);
        assert_eq!(from_slot(value.sample(1.5)), 0xff0000ff);
    }

    #[test]
    fn action_scales_by_factor_from_reset_value() {
        let action = AnimationAction::new(
            Property::X,
            ActionValue::Number(vec![(0.0, 0.0), (1.0, 100.0)]),
        );
        assert_eq!(action.apply_value(1.0, 1.0), 100.0);
        assert_eq!(action.apply_value(1.0, 0.5), 50.0);
        assert_eq!(action.apply_value(1.0, 0.0), 0.0);
    }
}
