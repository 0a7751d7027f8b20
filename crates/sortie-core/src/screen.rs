//! The device as the engine sees it: the latest frame plus an input channel.
//!
//! `Screen` owns the current [`Frame`]. Every `find*` call reads that frame;
//! nothing changes until [`Screen::refresh`] captures a new one.

use crate::config::TimingConfig;
use crate::layout::Pan;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sortie_proto::{
    Frame, InputTransport, Match, PatternId, PerceptionPort, Point, Region, Result, ScaleRange,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Blocks the calling thread. Abstracted so tests run without wall-clock waits.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately. Used for replays and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

pub struct Screen {
    perception: Arc<dyn PerceptionPort>,
    input: Box<dyn InputTransport>,
    sleeper: Box<dyn Sleeper>,
    frame: Frame,
    rng: StdRng,
    timing: TimingConfig,
}

impl Screen {
    /// Connects to the ports and captures an initial frame.
    pub fn new(
        perception: Arc<dyn PerceptionPort>,
        input: Box<dyn InputTransport>,
        sleeper: Box<dyn Sleeper>,
        timing: TimingConfig,
    ) -> Result<Self> {
        let frame = perception.capture()?;
        Ok(Self {
            perception,
            input,
            sleeper,
            frame,
            rng: StdRng::from_entropy(),
            timing,
        })
    }

    /// Makes random tap points and jitter reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn perception(&self) -> &dyn PerceptionPort {
        self.perception.as_ref()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Captures a new frame, replacing the current one.
    pub fn refresh(&mut self) -> Result<()> {
        self.frame = self.perception.capture()?;
        trace!(seq = self.frame.seq(), "Frame captured");
        Ok(())
    }

    /// Sleeps exactly `duration`.
    pub fn wait(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }

    /// Sleeps `base` plus a random extra of up to `jitter * base`.
    pub fn pause(&mut self, base: Duration) {
        let jitter = self.timing.jitter;
        let extra = if jitter > 0.0 {
            base.mul_f64(self.rng.gen_range(0.0..=jitter))
        } else {
            Duration::ZERO
        };
        self.sleeper.sleep(base + extra);
    }

    pub fn wait_refresh(&mut self, duration: Duration) -> Result<()> {
        self.wait(duration);
        self.refresh()
    }

    pub fn tap(&mut self, at: Point) -> Result<()> {
        trace!(%at, "Tap");
        self.input.tap(at)?;
        self.pause(self.timing.tap_delay());
        Ok(())
    }

    /// Taps a uniformly random point inside `region` and returns it.
    pub fn tap_region(&mut self, region: Region) -> Result<Point> {
        let at = Point::new(
            self.rng.gen_range(region.x..region.x + region.w.max(1)),
            self.rng.gen_range(region.y..region.y + region.h.max(1)),
        );
        self.tap(at)?;
        Ok(at)
    }

    pub fn swipe(&mut self, from: Point, to: Point, duration_ms: u32) -> Result<()> {
        trace!(%from, %to, duration_ms, "Swipe");
        self.input.swipe(from, to, duration_ms)?;
        self.pause(self.timing.tap_delay());
        Ok(())
    }

    pub fn pan(&mut self, pan: Pan) -> Result<()> {
        let (from, to, duration_ms) = pan.swipe();
        self.swipe(from, to, duration_ms)
    }

    pub fn find(&self, pattern: &str, similarity: f32) -> Option<Match> {
        self.perception
            .find(&self.frame, &PatternId::from(pattern), similarity, None)
    }

    pub fn find_in(&self, pattern: &str, similarity: f32, region: Region) -> Option<Match> {
        self.perception
            .find(&self.frame, &PatternId::from(pattern), similarity, Some(region))
    }

    pub fn find_all(&self, pattern: &str, similarity: f32) -> Vec<Match> {
        self.perception
            .find_all(&self.frame, &PatternId::from(pattern), similarity)
    }

    pub fn find_scaled(&self, pattern: &str, similarity: f32, region: Option<Region>) -> Option<Match> {
        self.perception.find_scaled(
            &self.frame,
            &PatternId::from(pattern),
            similarity,
            ScaleRange::default(),
            region,
        )
    }

    /// Visibility check at the default similarity.
    pub fn is_visible(&self, pattern: &str) -> bool {
        self.find(pattern, self.timing.default_similarity).is_some()
    }

    pub fn similarity(&self, a: &Frame, b: &Frame, region: Option<Region>) -> f32 {
        self.perception.similarity(a, b, region)
    }

    /// Asks the perception port to persist the current frame.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        self.perception.save_snapshot(&self.frame, path)
    }
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen")
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scenario, Scene, ScriptedDevice};

    fn screen(device: &ScriptedDevice) -> Screen {
        device.screen(TimingConfig::default()).unwrap()
    }

    #[test]
    fn test_find_reads_current_frame_until_refresh() {
        let scenario = Scenario::new("map")
            .scene(Scene::new("map").show("combat/button_retreat", Region::new(10, 10, 20, 20)).after_captures(1, "menu"))
            .scene(Scene::new("menu").show("menu/attack", Region::new(10, 10, 20, 20)));
        let device = ScriptedDevice::new(scenario);
        let mut screen = screen(&device);

        assert!(screen.is_visible("combat/button_retreat"));
        assert!(!screen.is_visible("menu/attack"));

        screen.refresh().unwrap();
        assert!(screen.is_visible("menu/attack"));
        assert!(!screen.is_visible("combat/button_retreat"));
    }

    #[test]
    fn test_tap_region_stays_inside_region() {
        let device = ScriptedDevice::new(Scenario::new("idle").scene(Scene::new("idle")));
        let mut screen = screen(&device).with_seed(7);
        let region = Region::new(100, 200, 30, 10);
        for _ in 0..50 {
            let at = screen.tap_region(region).unwrap();
            assert!(region.contains(at), "{at} outside {region}");
        }
        assert_eq!(device.taps().len(), 50);
    }
}
