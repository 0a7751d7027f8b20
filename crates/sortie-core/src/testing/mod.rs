//! Scripted devices and scenario replay.
//!
//! [`ScriptedDevice`] stands in for a phone in unit tests. [`ScenarioRunner`]
//! loads a YAML fixture (scene graph plus configuration) and replays it
//! through a single map clear or a full sortie run.

mod device;
mod runner;

pub use device::{AfterCaptures, Scenario, Scene, SceneFrame, ScriptedDevice, Sighting, TapRule};
pub use runner::{
    Expectation, Fixture, ReplayConfig, ReplayError, ReplayMode, ReplayResult, ScenarioRunner, list_fixtures,
};
