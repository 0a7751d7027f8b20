//! A fake device driven by a scene graph.
//!
//! Each [`Scene`] lists the patterns visible on screen and where. Taps,
//! swipes and captures move the device between scenes, so a test can script
//! a whole sortie without images or a phone.

use crate::config::TimingConfig;
use crate::screen::{NoopSleeper, Screen};
use serde::{Deserialize, Serialize};
use sortie_proto::{
    Error, Frame, InputTransport, Match, PatternId, PerceptionPort, Point, Region, Result,
    ScaleRange,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

fn full_confidence() -> f32 {
    1.0
}

/// One pattern drawn on a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub pattern: PatternId,
    pub region: Region,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

/// Where a tap leads. A rule without a region matches every tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapRule {
    #[serde(default)]
    pub region: Option<Region>,
    pub goto: String,
}

/// Moves on by itself once the scene has been captured `captures` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterCaptures {
    pub captures: u32,
    pub goto: String,
}

/// A named screen state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    #[serde(default)]
    pub show: Vec<Sighting>,
    #[serde(default)]
    pub taps: Vec<TapRule>,
    #[serde(default)]
    pub on_swipe: Option<String>,
    #[serde(default)]
    pub after: Option<AfterCaptures>,
    /// Consecutive captures of an animated scene never compare as similar.
    #[serde(default)]
    pub animated: bool,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            show: Vec::new(),
            taps: Vec::new(),
            on_swipe: None,
            after: None,
            animated: false,
        }
    }

    #[must_use]
    pub fn show(self, pattern: impl Into<PatternId>, region: Region) -> Self {
        self.show_with(pattern, region, 1.0)
    }

    #[must_use]
    pub fn show_with(mut self, pattern: impl Into<PatternId>, region: Region, confidence: f32) -> Self {
        self.show.push(Sighting {
            pattern: pattern.into(),
            region,
            confidence,
        });
        self
    }

    #[must_use]
    pub fn on_tap(mut self, region: Region, goto: impl Into<String>) -> Self {
        self.taps.push(TapRule {
            region: Some(region),
            goto: goto.into(),
        });
        self
    }

    #[must_use]
    pub fn on_any_tap(mut self, goto: impl Into<String>) -> Self {
        self.taps.push(TapRule {
            region: None,
            goto: goto.into(),
        });
        self
    }

    #[must_use]
    pub fn on_swipe(mut self, goto: impl Into<String>) -> Self {
        self.on_swipe = Some(goto.into());
        self
    }

    #[must_use]
    pub fn after_captures(mut self, captures: u32, goto: impl Into<String>) -> Self {
        self.after = Some(AfterCaptures {
            captures,
            goto: goto.into(),
        });
        self
    }

    #[must_use]
    pub fn animated(mut self) -> Self {
        self.animated = true;
        self
    }

    fn sightings<'a>(&'a self, pattern: &'a PatternId) -> impl Iterator<Item = &'a Sighting> {
        self.show.iter().filter(move |s| &s.pattern == pattern)
    }

    fn tap_target(&self, at: Point) -> Option<&str> {
        self.taps
            .iter()
            .find(|rule| rule.region.is_none_or(|r| r.contains(at)))
            .map(|rule| rule.goto.as_str())
    }
}

/// A scene graph plus the scene the device starts in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub start: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Scenario {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            scenes: Vec::new(),
        }
    }

    #[must_use]
    pub fn scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name == name)
    }

    /// Returns every scene name that is referenced but not defined.
    pub fn dangling(&self) -> Vec<String> {
        let mut referenced = vec![self.start.as_str()];
        for scene in &self.scenes {
            referenced.extend(scene.taps.iter().map(|t| t.goto.as_str()));
            referenced.extend(scene.on_swipe.as_deref());
            referenced.extend(scene.after.as_ref().map(|a| a.goto.as_str()));
        }
        let mut missing: Vec<String> = referenced
            .into_iter()
            .filter(|name| self.get(name).is_none())
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

/// Payload of frames produced by [`ScriptedDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFrame {
    pub scene: String,
    pub animated: bool,
}

#[derive(Debug)]
struct DeviceState {
    scenario: Scenario,
    current: String,
    captures_in_scene: u32,
    captures: usize,
    taps: Vec<Point>,
    swipes: Vec<(Point, Point)>,
    visited: Vec<String>,
}

impl DeviceState {
    fn enter(&mut self, scene: &str) {
        if self.current != scene {
            trace!(from = %self.current, to = scene, "Scene transition");
            self.current = scene.to_string();
            self.visited.push(self.current.clone());
        }
        self.captures_in_scene = 0;
    }

    fn current_scene(&self) -> Result<&Scene> {
        self.scenario
            .get(&self.current)
            .ok_or_else(|| Error::Capture(format!("scenario has no scene named '{}'", self.current)))
    }
}

/// Implements both device ports over a [`Scenario`].
///
/// Clones share state, so one clone can be handed to a [`Screen`] while the
/// test keeps another to inspect taps and captures.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ScriptedDevice {
    pub fn new(scenario: Scenario) -> Self {
        let current = scenario.start.clone();
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                visited: vec![current.clone()],
                scenario,
                current,
                captures_in_scene: 0,
                captures: 0,
                taps: Vec::new(),
                swipes: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A screen wired to this device that never sleeps.
    pub fn screen(&self, timing: TimingConfig) -> Result<Screen> {
        Screen::new(
            Arc::new(self.clone()),
            Box::new(self.clone()),
            Box::new(NoopSleeper),
            timing,
        )
    }

    pub fn taps(&self) -> Vec<Point> {
        self.lock().taps.clone()
    }

    pub fn swipes(&self) -> Vec<(Point, Point)> {
        self.lock().swipes.clone()
    }

    pub fn captures(&self) -> usize {
        self.lock().captures
    }

    pub fn current_scene(&self) -> String {
        self.lock().current.clone()
    }

    /// Scenes entered so far, in order, starting with the start scene.
    pub fn visited(&self) -> Vec<String> {
        self.lock().visited.clone()
    }

    fn scene_of<'a>(state: &'a DeviceState, frame: &Frame) -> Option<&'a Scene> {
        frame
            .payload::<SceneFrame>()
            .and_then(|payload| state.scenario.get(&payload.scene))
    }
}

impl PerceptionPort for ScriptedDevice {
    fn capture(&self) -> Result<Frame> {
        let mut state = self.lock();
        let after = state.current_scene()?.after.clone();
        if let Some(after) = after
            && state.captures_in_scene >= after.captures
        {
            state.enter(&after.goto);
        }
        state.captures_in_scene += 1;
        state.captures += 1;

        let scene = state.current_scene()?;
        let payload = SceneFrame {
            scene: scene.name.clone(),
            animated: scene.animated,
        };
        Ok(Frame::new(state.captures as u64, payload))
    }

    fn find(&self, frame: &Frame, pattern: &PatternId, min_confidence: f32, region: Option<Region>) -> Option<Match> {
        let state = self.lock();
        let scene = Self::scene_of(&state, frame)?;
        scene
            .sightings(pattern)
            .find(|s| s.confidence >= min_confidence && region.is_none_or(|r| r.contains(s.region.center())))
            .map(|s| Match {
                region: s.region,
                confidence: s.confidence,
            })
    }

    fn find_all(&self, frame: &Frame, pattern: &PatternId, min_confidence: f32) -> Vec<Match> {
        let state = self.lock();
        let Some(scene) = Self::scene_of(&state, frame) else {
            return Vec::new();
        };
        scene
            .sightings(pattern)
            .filter(|s| s.confidence >= min_confidence)
            .map(|s| Match {
                region: s.region,
                confidence: s.confidence,
            })
            .collect()
    }

    fn find_scaled(
        &self,
        frame: &Frame,
        pattern: &PatternId,
        min_confidence: f32,
        _scales: ScaleRange,
        region: Option<Region>,
    ) -> Option<Match> {
        self.find(frame, pattern, min_confidence, region)
    }

    fn similarity(&self, a: &Frame, b: &Frame, _region: Option<Region>) -> f32 {
        match (a.payload::<SceneFrame>(), b.payload::<SceneFrame>()) {
            (Some(a), Some(b)) if a == b && !a.animated => 1.0,
            (Some(_), Some(_)) => 0.5,
            _ => 0.0,
        }
    }
}

impl InputTransport for ScriptedDevice {
    fn tap(&mut self, at: Point) -> Result<()> {
        let mut state = self.lock();
        state.taps.push(at);
        let next = state.current_scene()?.tap_target(at).map(str::to_string);
        if let Some(next) = next {
            state.enter(&next);
        }
        Ok(())
    }

    fn swipe(&mut self, from: Point, to: Point, _duration_ms: u32) -> Result<()> {
        let mut state = self.lock();
        state.swipes.push((from, to));
        let next = state.current_scene()?.on_swipe.clone();
        if let Some(next) = next {
            state.enter(&next);
        }
        Ok(())
    }
}
