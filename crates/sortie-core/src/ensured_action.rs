//! Ensured actions: inject an input, then verify the screen reached one of
//! the expected outcomes, retrying a bounded number of times.
//!
//! The action is re-sent verbatim on every attempt, so a retry after a lost
//! tap and a retry after a slow screen look the same to the device.

use crate::screen::Screen;
use sortie_proto::{PatternId, Point, Region};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_STABILITY_SAMPLES: u32 = 100;
const DEFAULT_SIMILARITY: f32 = 0.95;

/// The input to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Tap(Point),
    /// Tap a random point inside the region.
    TapRegion(Region),
    Swipe { from: Point, to: Point, duration_ms: u32 },
}

/// Which attempts verify the precondition before injecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreconditionPolicy {
    #[default]
    BeforeFirst,
    BeforeSecond,
    BeforeEvery,
    BeforeEveryExceptFirst,
}

impl PreconditionPolicy {
    /// Whether attempt number `attempt` (zero-based) checks the precondition.
    pub fn applies_to(self, attempt: u32) -> bool {
        match self {
            PreconditionPolicy::BeforeFirst => attempt == 0,
            PreconditionPolicy::BeforeSecond => attempt == 1,
            PreconditionPolicy::BeforeEvery => true,
            PreconditionPolicy::BeforeEveryExceptFirst => attempt != 0,
        }
    }
}

/// Wait until consecutive frames stop changing before judging the outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCheck {
    /// Consecutive similar frame pairs required.
    pub frames: u32,
    pub region: Option<Region>,
    pub max_samples: u32,
}

impl StabilityCheck {
    pub fn frames(frames: u32) -> Self {
        Self {
            frames,
            region: None,
            max_samples: DEFAULT_STABILITY_SAMPLES,
        }
    }

    #[must_use]
    pub fn in_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    #[must_use]
    pub fn with_max_samples(mut self, max_samples: u32) -> Self {
        self.max_samples = max_samples;
        self
    }
}

/// An input plus the screens that prove it landed.
#[derive(Debug, Clone)]
pub struct EnsuredAction {
    pub action: Action,
    pub precondition: Option<PatternId>,
    pub precondition_policy: PreconditionPolicy,
    pub precondition_similarity: f32,
    /// Expected result screens, in priority order.
    pub outcomes: Vec<PatternId>,
    pub outcome_similarity: f32,
    /// Wait between injecting and capturing.
    pub settle: Duration,
    pub max_attempts: Option<u32>,
    pub stability: Option<StabilityCheck>,
    /// Unverified taps sent after each attempt, e.g. to skip an animation.
    pub extra_taps: Vec<Region>,
    /// Capture a fresh frame before the first precondition check.
    pub refresh_first: bool,
}

impl EnsuredAction {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            precondition: None,
            precondition_policy: PreconditionPolicy::default(),
            precondition_similarity: DEFAULT_SIMILARITY,
            outcomes: Vec::new(),
            outcome_similarity: DEFAULT_SIMILARITY,
            settle: Duration::from_millis(1000),
            max_attempts: None,
            stability: None,
            extra_taps: Vec::new(),
            refresh_first: false,
        }
    }

    pub fn tap(at: Point) -> Self {
        Self::new(Action::Tap(at))
    }

    pub fn tap_region(region: Region) -> Self {
        Self::new(Action::TapRegion(region))
    }

    #[must_use]
    pub fn requires(mut self, pattern: impl Into<PatternId>, policy: PreconditionPolicy) -> Self {
        self.precondition = Some(pattern.into());
        self.precondition_policy = policy;
        self
    }

    #[must_use]
    pub fn expect<I, P>(mut self, outcomes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PatternId>,
    {
        self.outcomes = outcomes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_similarity(mut self, precondition: f32, outcome: f32) -> Self {
        self.precondition_similarity = precondition;
        self.outcome_similarity = outcome;
        self
    }

    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn with_stability(mut self, check: StabilityCheck) -> Self {
        self.stability = Some(check);
        self
    }

    #[must_use]
    pub fn with_extra_tap(mut self, region: Region) -> Self {
        self.extra_taps.push(region);
        self
    }

    #[must_use]
    pub fn refresh_first(mut self) -> Self {
        self.refresh_first = true;
        self
    }
}

/// Successful result of an ensured action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 1-based index of the first expected pattern found.
    Matched(usize),
    /// No outcomes were expected; the action was sent once.
    Dispatched,
}

impl Outcome {
    pub fn index(self) -> Option<usize> {
        match self {
            Outcome::Matched(i) => Some(i),
            Outcome::Dispatched => None,
        }
    }

    pub fn is(self, index: usize) -> bool {
        self == Outcome::Matched(index)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionFailure {
    #[error("precondition {pattern} not visible before attempt {attempt}")]
    PreconditionMissing { pattern: PatternId, attempt: u32 },

    #[error("no expected outcome after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("screen did not settle within {samples} samples")]
    Unstable { samples: u32 },

    #[error(transparent)]
    Device(#[from] sortie_proto::Error),
}

impl Screen {
    /// Runs an ensured action to completion.
    pub fn perform(&mut self, action: &EnsuredAction) -> Result<Outcome, ActionFailure> {
        let max_attempts = action.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1);
        if action.refresh_first {
            self.refresh()?;
        }

        let mut attempts = 0;
        loop {
            if let Some(pattern) = &action.precondition
                && action.precondition_policy.applies_to(attempts)
                && self
                    .find(pattern.as_str(), action.precondition_similarity)
                    .is_none()
            {
                warn!(%pattern, attempt = attempts + 1, "Precondition not met, action not sent");
                return Err(ActionFailure::PreconditionMissing {
                    pattern: pattern.clone(),
                    attempt: attempts + 1,
                });
            }

            self.inject(action.action)?;
            self.wait(action.settle);
            attempts += 1;
            for region in &action.extra_taps {
                self.tap_region(*region)?;
            }
            self.refresh()?;

            if let Some(check) = action.stability {
                self.wait_until_stable(check)?;
            }

            if action.outcomes.is_empty() {
                return Ok(Outcome::Dispatched);
            }

            if let Some(index) = action
                .outcomes
                .iter()
                .position(|p| self.find(p.as_str(), action.outcome_similarity).is_some())
            {
                debug!(outcome = %action.outcomes[index], attempts, "Ensured action landed");
                return Ok(Outcome::Matched(index + 1));
            }

            if attempts >= max_attempts {
                warn!(attempts, action = ?action.action, "Ensured action gave up");
                return Err(ActionFailure::Exhausted { attempts });
            }
            debug!(attempts, "No expected outcome yet, retrying");
        }
    }

    fn inject(&mut self, action: Action) -> sortie_proto::Result<()> {
        match action {
            Action::Tap(at) => self.tap(at),
            Action::TapRegion(region) => self.tap_region(region).map(|_| ()),
            Action::Swipe {
                from,
                to,
                duration_ms,
            } => self.swipe(from, to, duration_ms),
        }
    }

    /// Refreshes until `check.frames` consecutive frame pairs are similar.
    /// Returns the number of frames sampled.
    pub fn wait_until_stable(&mut self, check: StabilityCheck) -> Result<u32, ActionFailure> {
        let interval = self.timing().stability_interval();
        let threshold = self.timing().stability_similarity;
        let mut stable = 0;
        let mut samples = 0;
        let mut previous = self.frame().clone();

        loop {
            self.wait(interval);
            self.refresh()?;
            samples += 1;

            if self.similarity(&previous, self.frame(), check.region) >= threshold {
                stable += 1;
            } else {
                stable = 0;
            }
            if stable >= check.frames {
                return Ok(samples);
            }
            if samples >= check.max_samples {
                return Err(ActionFailure::Unstable { samples });
            }
            previous = self.frame().clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::testing::{Scenario, Scene, ScriptedDevice};

    const BUTTON: Region = Region::new(100, 100, 50, 50);
    const ELSEWHERE: Region = Region::new(900, 900, 10, 10);

    fn screen_for(scenario: Scenario) -> (ScriptedDevice, Screen) {
        let device = ScriptedDevice::new(scenario);
        let screen = device.screen(TimingConfig::default()).unwrap().with_seed(1);
        (device, screen)
    }

    #[test]
    fn test_policy_schedule() {
        use PreconditionPolicy::*;
        let checked = |p: PreconditionPolicy| (0..4).map(|a| p.applies_to(a)).collect::<Vec<_>>();
        assert_eq!(checked(BeforeFirst), [true, false, false, false]);
        assert_eq!(checked(BeforeSecond), [false, true, false, false]);
        assert_eq!(checked(BeforeEvery), [true, true, true, true]);
        assert_eq!(checked(BeforeEveryExceptFirst), [false, true, true, true]);
    }

    #[test]
    fn test_returns_index_of_first_visible_outcome() {
        let scenario = Scenario::new("menu")
            .scene(Scene::new("menu").show("menu/attack", ELSEWHERE).on_tap(BUTTON, "result"))
            .scene(
                Scene::new("result")
                    .show("combat/button_go", ELSEWHERE)
                    .show("menu/button_confirm", ELSEWHERE),
            );
        let (device, mut screen) = screen_for(scenario);

        let outcome = screen
            .perform(
                &EnsuredAction::tap_region(BUTTON)
                    .requires("menu/attack", PreconditionPolicy::BeforeFirst)
                    .expect(["menu/button_confirm", "combat/button_go"]),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Matched(1));
        assert_eq!(device.taps().len(), 1);
    }

    #[test]
    fn test_empty_outcomes_dispatch_once() {
        let (device, mut screen) = screen_for(Scenario::new("idle").scene(Scene::new("idle")));
        let outcome = screen.perform(&EnsuredAction::tap(Point::new(5, 5))).unwrap();
        assert_eq!(outcome, Outcome::Dispatched);
        assert_eq!(outcome.index(), None);
        assert_eq!(device.taps(), vec![Point::new(5, 5)]);
    }

    #[test]
    fn test_missing_precondition_sends_nothing() {
        let (device, mut screen) = screen_for(Scenario::new("idle").scene(Scene::new("idle")));
        let err = screen
            .perform(
                &EnsuredAction::tap(Point::new(5, 5))
                    .requires("menu/attack", PreconditionPolicy::BeforeEvery)
                    .expect(["menu/button_confirm"]),
            )
            .unwrap_err();
        assert!(matches!(err, ActionFailure::PreconditionMissing { attempt: 1, .. }));
        assert!(device.taps().is_empty());
    }

    #[test]
    fn test_attempt_count_is_bounded_and_deterministic() {
        for max in [1, 3, 7] {
            let (device, mut screen) = screen_for(Scenario::new("idle").scene(Scene::new("idle")));
            let err = screen
                .perform(
                    &EnsuredAction::tap(Point::new(5, 5))
                        .expect(["menu/button_confirm"])
                        .with_max_attempts(max),
                )
                .unwrap_err();
            assert!(matches!(err, ActionFailure::Exhausted { attempts } if attempts == max));
            assert_eq!(device.taps().len(), max as usize);
        }
    }

    #[test]
    fn test_precondition_checked_only_before_second_attempt() {
        // First tap goes to "blank" where the precondition is gone; BeforeSecond then fails.
        let scenario = Scenario::new("menu")
            .scene(Scene::new("menu").show("menu/attack", ELSEWHERE).on_any_tap("blank"))
            .scene(Scene::new("blank"));
        let (device, mut screen) = screen_for(scenario);
        let err = screen
            .perform(
                &EnsuredAction::tap(Point::new(5, 5))
                    .requires("menu/attack", PreconditionPolicy::BeforeSecond)
                    .expect(["menu/button_confirm"]),
            )
            .unwrap_err();
        assert!(matches!(err, ActionFailure::PreconditionMissing { attempt: 2, .. }));
        assert_eq!(device.taps().len(), 1);
    }

    #[test]
    fn test_retries_until_outcome_appears() {
        let scenario = Scenario::new("a")
            .scene(Scene::new("a").on_any_tap("b"))
            .scene(Scene::new("b").on_any_tap("c"))
            .scene(Scene::new("c").show("menu/button_confirm", ELSEWHERE));
        let (device, mut screen) = screen_for(scenario);
        let outcome = screen
            .perform(&EnsuredAction::tap(Point::new(5, 5)).expect(["menu/button_confirm"]))
            .unwrap();
        assert!(outcome.is(1));
        assert_eq!(device.taps().len(), 2);
    }

    #[test]
    fn test_extra_taps_follow_each_attempt() {
        let scenario = Scenario::new("a")
            .scene(Scene::new("a").on_tap(BUTTON, "b"))
            .scene(Scene::new("b").show("menu/button_confirm", ELSEWHERE));
        let (device, mut screen) = screen_for(scenario);
        screen
            .perform(
                &EnsuredAction::tap_region(BUTTON)
                    .with_extra_tap(ELSEWHERE)
                    .expect(["menu/button_confirm"]),
            )
            .unwrap();
        let taps = device.taps();
        assert_eq!(taps.len(), 2);
        assert!(BUTTON.contains(taps[0]));
        assert!(ELSEWHERE.contains(taps[1]));
    }

    #[test]
    fn test_stability_waits_for_consecutive_similar_frames() {
        let scenario = Scenario::new("idle").scene(Scene::new("idle").show("menu/attack", ELSEWHERE));
        let (device, mut screen) = screen_for(scenario);
        let before = device.captures();
        let samples = screen.wait_until_stable(StabilityCheck::frames(2)).unwrap();
        assert_eq!(samples, 2);
        assert_eq!(device.captures() - before, 2);
    }

    #[test]
    fn test_unstable_screen_fails_after_sample_cap() {
        let scenario = Scenario::new("anim").scene(Scene::new("anim").animated());
        let (device, mut screen) = screen_for(scenario);
        let before = device.captures();
        let err = screen
            .wait_until_stable(StabilityCheck::frames(2).with_max_samples(12))
            .unwrap_err();
        assert!(matches!(err, ActionFailure::Unstable { samples: 12 }));
        assert_eq!(device.captures() - before, 12);
    }
}
