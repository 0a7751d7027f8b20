//! Concurrent event polling.
//!
//! Checks a set of independent patterns against one frame in parallel. The
//! frame is captured once and shared read-only by every check, so all answers
//! describe the same instant.

use crate::screen::Screen;
use rayon::prelude::*;
use sortie_proto::{Frame, PatternId, PerceptionPort, patterns};
use std::collections::HashMap;
use tracing::trace;

/// Which patterns were visible in a polled frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    hits: HashMap<PatternId, bool>,
}

impl PollResult {
    /// True if `pattern` was polled and seen.
    pub fn seen(&self, pattern: &str) -> bool {
        self.hits.get(&PatternId::from(pattern)).copied().unwrap_or(false)
    }

    pub fn any(&self) -> bool {
        self.hits.values().any(|&hit| hit)
    }

    /// Patterns that were seen, sorted for stable logging.
    pub fn visible(&self) -> Vec<&PatternId> {
        let mut seen: Vec<_> = self
            .hits
            .iter()
            .filter_map(|(p, &hit)| hit.then_some(p))
            .collect();
        seen.sort();
        seen
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A fixed set of patterns to check on every tick.
#[derive(Debug, Clone)]
pub struct EventPoller {
    watch: Vec<PatternId>,
    similarity: f32,
}

impl EventPoller {
    pub fn new(similarity: f32) -> Self {
        Self {
            watch: Vec::new(),
            similarity,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<PatternId>) -> Self {
        let pattern = pattern.into();
        if !self.watch.contains(&pattern) {
            self.watch.push(pattern);
        }
        self
    }

    /// Events watched while a fleet is moving.
    ///
    /// Story maps add supply and item pickups; outside clearing mode, ambush
    /// prompts are watched too.
    pub fn movement(similarity: f32, story_map: bool, clearing_mode: bool) -> Self {
        let mut poller = Self::new(similarity)
            .with_pattern(patterns::MENU_FORMATION)
            .with_pattern(patterns::MENU_LOADING)
            .with_pattern(patterns::MENU_ALERT_INFO);
        if story_map {
            poller = poller
                .with_pattern(patterns::ALERT_AMMO_SUPPLIES)
                .with_pattern(patterns::MENU_ITEM_FOUND);
            if !clearing_mode {
                poller = poller
                    .with_pattern(patterns::BUTTON_EVADE)
                    .with_pattern(patterns::ALERT_FAILED_EVADE);
            }
        }
        poller
    }

    pub fn patterns(&self) -> &[PatternId] {
        &self.watch
    }

    /// Polls the screen's current frame.
    pub fn poll(&self, screen: &Screen) -> PollResult {
        poll_frame(screen.perception(), screen.frame(), &self.watch, self.similarity)
    }
}

/// Probes every pattern against `frame` in parallel.
pub fn poll_frame(
    perception: &dyn PerceptionPort,
    frame: &Frame,
    patterns: &[PatternId],
    similarity: f32,
) -> PollResult {
    let hits: HashMap<PatternId, bool> = patterns
        .par_iter()
        .map(|p| (p.clone(), perception.find(frame, p, similarity, None).is_some()))
        .collect();
    let result = PollResult { hits };
    trace!(seq = frame.seq(), visible = ?result.visible(), "Polled events");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortie_proto::{Match, Region, Result, ScaleRange};
    use std::sync::Mutex;

    /// Sees every pattern whose name ends in "_on"; records which frames it was asked about.
    struct SuffixPerception {
        seen_frames: Mutex<Vec<u64>>,
    }

    impl PerceptionPort for SuffixPerception {
        fn capture(&self) -> Result<Frame> {
            Ok(Frame::new(1, ()))
        }

        fn find(&self, frame: &Frame, pattern: &PatternId, _: f32, _: Option<Region>) -> Option<Match> {
            self.seen_frames.lock().unwrap().push(frame.seq());
            pattern.as_str().ends_with("_on").then_some(Match {
                region: Region::new(0, 0, 1, 1),
                confidence: 1.0,
            })
        }

        fn find_all(&self, _: &Frame, _: &PatternId, _: f32) -> Vec<Match> {
            Vec::new()
        }

        fn find_scaled(&self, _: &Frame, _: &PatternId, _: f32, _: ScaleRange, _: Option<Region>) -> Option<Match> {
            None
        }

        fn similarity(&self, _: &Frame, _: &Frame, _: Option<Region>) -> f32 {
            1.0
        }
    }

    #[test]
    fn test_poll_reports_each_pattern() {
        let perception = SuffixPerception { seen_frames: Mutex::new(Vec::new()) };
        let frame = Frame::new(42, ());
        let patterns: Vec<PatternId> = ["a_on", "b_off", "c_on", "d_off"].into_iter().map(Into::into).collect();

        let result = poll_frame(&perception, &frame, &patterns, 0.9);

        assert_eq!(result.len(), 4);
        assert!(result.seen("a_on"));
        assert!(result.seen("c_on"));
        assert!(!result.seen("b_off"));
        assert!(!result.seen("never_polled"));
        assert_eq!(result.visible(), vec![&PatternId::from("a_on"), &PatternId::from("c_on")]);
    }

    #[test]
    fn test_every_check_reads_the_same_frame() {
        let perception = SuffixPerception { seen_frames: Mutex::new(Vec::new()) };
        let frame = Frame::new(9, ());
        let patterns: Vec<PatternId> = (0..32).map(|i| PatternId::new(format!("p{i}_off"))).collect();

        let result = poll_frame(&perception, &frame, &patterns, 0.9);

        assert!(!result.any());
        let seen = perception.seen_frames.lock().unwrap();
        assert_eq!(seen.len(), 32);
        assert!(seen.iter().all(|&seq| seq == 9));
    }

    #[test]
    fn test_movement_watch_depends_on_map_and_mode() {
        let story = EventPoller::movement(0.9, true, false);
        assert_eq!(story.patterns().len(), 7);

        let clearing = EventPoller::movement(0.9, true, true);
        assert!(!clearing.patterns().contains(&PatternId::from(patterns::BUTTON_EVADE)));
        assert_eq!(clearing.patterns().len(), 5);

        let event = EventPoller::movement(0.9, false, false);
        assert_eq!(event.patterns().len(), 3);
        assert!(event.patterns().contains(&PatternId::from(patterns::MENU_ALERT_INFO)));
    }

    #[test]
    fn test_with_pattern_deduplicates() {
        let poller = EventPoller::new(0.9).with_pattern("x").with_pattern("x");
        assert_eq!(poller.patterns().len(), 1);
    }
}
