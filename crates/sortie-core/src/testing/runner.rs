//! Replays YAML scenario fixtures through the engine.
//!
//! A fixture looks like:
//!
//! ```yaml
//! name: successful_clear
//! mode: clear_map
//! config:
//!   combat:
//!     map: "1-1"
//!     kills_before_boss: 1
//! scenario:
//!   start: map
//!   scenes:
//!     - name: map
//!       show:
//!         - { pattern: combat/button_retreat, region: { x: 1130, y: 985, w: 243, h: 60 } }
//! expect:
//!   exit_code: boss_defeated
//! ```

use super::device::{Scenario, ScriptedDevice};
use crate::config::{ConfigError, SortieConfig};
use crate::map_clear::CombatEngine;
use crate::orchestrator::{SortieOrchestrator, TerminationReason};
use crate::session::SessionReport;
use crate::status_manager::SortieStats;
use crate::strategy::StrategyTable;
use serde::Deserialize;
use sortie_proto::{ExitCode, Point};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

fn default_seed() -> u64 {
    7
}

/// What a fixture drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// One `clear_map` call on the map the scenario starts on.
    #[default]
    ClearMap,
    /// A full orchestrator run starting from the map selection screen.
    Sortie,
}

/// Assertions a fixture makes about its own replay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Expectation {
    pub exit_code: Option<ExitCode>,
    /// `TerminationReason::as_str` of a sortie run.
    pub termination: Option<String>,
    pub kills: Option<u32>,
    /// Loop named in the abort reason.
    pub abort_loop: Option<String>,
    pub final_scene: Option<String>,
    /// Points that must have been tapped, in any order.
    pub tapped: Vec<Point>,
    /// Points that must never have been tapped.
    pub not_tapped: Vec<Point>,
}

/// A replayable scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mode: ReplayMode,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub config: SortieConfig,
    pub scenario: Scenario,
    #[serde(default)]
    pub expect: Expectation,
}

impl Fixture {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ReplayError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("fixture parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("scenario references undefined scenes: {}", .0.join(", "))]
    DanglingScenes(Vec<String>),

    #[error(transparent)]
    Device(#[from] sortie_proto::Error),
}

/// Where to find a fixture and where the replay may write diagnostics.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub fixture: PathBuf,
    /// Incident and status files go here. `None` disables diagnostics.
    pub diagnostics_dir: Option<PathBuf>,
}

impl ReplayConfig {
    pub fn new(fixture: impl AsRef<Path>) -> Self {
        Self {
            fixture: fixture.as_ref().to_path_buf(),
            diagnostics_dir: None,
        }
    }

    #[must_use]
    pub fn with_diagnostics_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.diagnostics_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Everything observable after a replay.
#[derive(Debug, Clone)]
pub struct ReplayResult {
    name: String,
    exit_code: ExitCode,
    termination: Option<TerminationReason>,
    report: Option<SessionReport>,
    stats: SortieStats,
    taps: Vec<Point>,
    swipes: usize,
    captures: usize,
    visited: Vec<String>,
    final_scene: String,
}

impl ReplayResult {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exit code of the last session.
    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    /// Set for sortie replays only.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    pub fn stats(&self) -> &SortieStats {
        &self.stats
    }

    pub fn taps(&self) -> &[Point] {
        &self.taps
    }

    pub fn swipes(&self) -> usize {
        self.swipes
    }

    pub fn captures(&self) -> usize {
        self.captures
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn final_scene(&self) -> &str {
        &self.final_scene
    }

    /// True when the run ended in a way that allows another sortie.
    pub fn completed_successfully(&self) -> bool {
        match self.termination {
            Some(reason) => reason.is_success(),
            None => self.exit_code.disposition() == sortie_proto::Disposition::Repeat,
        }
    }

    /// Describes every way this result differs from `expect`.
    pub fn mismatches(&self, expect: &Expectation) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(code) = expect.exit_code
            && code != self.exit_code
        {
            problems.push(format!("exit code: expected {code}, got {}", self.exit_code));
        }
        if let Some(reason) = &expect.termination {
            let actual = self.termination.map_or("none", |t| t.as_str());
            if reason != actual {
                problems.push(format!("termination: expected {reason}, got {actual}"));
            }
        }
        let report = self.report.as_ref();
        if let Some(kills) = expect.kills {
            let actual = report.map_or(0, |r| r.kills_count);
            if kills != actual {
                problems.push(format!("kills: expected {kills}, got {actual}"));
            }
        }
        if let Some(name) = &expect.abort_loop {
            let actual = report
                .and_then(|r| r.abort_reason.as_ref())
                .and_then(|a| a.loop_name.as_deref());
            if actual != Some(name.as_str()) {
                problems.push(format!("abort loop: expected {name}, got {}", actual.unwrap_or("none")));
            }
        }
        if let Some(scene) = &expect.final_scene
            && scene != &self.final_scene
        {
            problems.push(format!("final scene: expected {scene}, got {}", self.final_scene));
        }
        for point in &expect.tapped {
            if !self.taps.contains(point) {
                problems.push(format!("expected a tap at {point}"));
            }
        }
        for point in &expect.not_tapped {
            if self.taps.contains(point) {
                problems.push(format!("unexpected tap at {point}"));
            }
        }
        problems
    }
}

/// Replays fixtures against a [`ScriptedDevice`].
pub struct ScenarioRunner;

impl ScenarioRunner {
    pub fn run(config: &ReplayConfig) -> Result<ReplayResult, ReplayError> {
        let fixture = Fixture::from_file(&config.fixture)?;
        Self::replay(fixture, config.diagnostics_dir.as_deref())
    }

    pub fn replay(fixture: Fixture, diagnostics_dir: Option<&Path>) -> Result<ReplayResult, ReplayError> {
        let dangling = fixture.scenario.dangling();
        if !dangling.is_empty() {
            return Err(ReplayError::DanglingScenes(dangling));
        }
        fixture.config.validate()?;

        let mut config = fixture.config;
        match diagnostics_dir {
            Some(dir) => config.diagnostics.dir = dir.to_path_buf(),
            None => config.diagnostics.enabled = false,
        }
        info!(fixture = %fixture.name, mode = ?fixture.mode, "Replaying scenario");

        let device = ScriptedDevice::new(fixture.scenario);
        let screen = device.screen(config.timing.clone())?.with_seed(fixture.seed);
        let engine = CombatEngine::new(screen, config);

        let (exit_code, termination, report, stats) = match fixture.mode {
            ReplayMode::ClearMap => {
                let strategy = StrategyTable::builtin()
                    .with_overrides(&engine.config().strategies)
                    .resolve(&engine.config().combat);
                let mut engine = engine;
                let code = engine.clear_map(&strategy);
                (code, None, engine.last_report().cloned(), engine.stats().clone())
            }
            ReplayMode::Sortie => {
                let mut orchestrator = SortieOrchestrator::new(engine);
                let reason = orchestrator.run();
                let engine = orchestrator.engine();
                let code = engine.stats().last_exit_code.unwrap_or_default();
                (code, Some(reason), engine.last_report().cloned(), engine.stats().clone())
            }
        };

        Ok(ReplayResult {
            name: fixture.name,
            exit_code,
            termination,
            report,
            stats,
            taps: device.taps(),
            swipes: device.swipes().len(),
            captures: device.captures(),
            visited: device.visited(),
            final_scene: device.current_scene(),
        })
    }
}

/// Lists `.yaml`/`.yml` fixtures in `dir`, sorted by name.
pub fn list_fixtures(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut fixtures: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    fixtures.sort();
    Ok(fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
name: minimal
scenario:
  start: menu
  scenes:
    - name: menu
      show:
        - { pattern: menu/attack, region: { x: 1500, y: 900, w: 100, h: 60 } }
"#;

    #[test]
    fn test_fixture_defaults() {
        let fixture = Fixture::from_yaml(MINIMAL).unwrap();
        assert_eq!(fixture.mode, ReplayMode::ClearMap);
        assert_eq!(fixture.seed, 7);
        assert_eq!(fixture.config.combat.map, "1-1");
        assert!(fixture.expect.exit_code.is_none());
        assert_eq!(fixture.scenario.scenes[0].show[0].confidence, 1.0);
    }

    #[test]
    fn test_dangling_scene_is_rejected() {
        let yaml = r#"
name: broken
scenario:
  start: map
  scenes:
    - name: map
      taps:
        - { goto: nowhere }
"#;
        let err = ScenarioRunner::replay(Fixture::from_yaml(yaml).unwrap(), None).unwrap_err();
        assert!(matches!(err, ReplayError::DanglingScenes(ref names) if names == &["nowhere"]));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let yaml = format!("{MINIMAL}config:\n  combat:\n    rotation_slot: 3\n");
        let err = ScenarioRunner::replay(Fixture::from_yaml(&yaml).unwrap(), None).unwrap_err();
        assert!(matches!(err, ReplayError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_mismatches_name_each_difference() {
        let result = ReplayResult {
            name: "r".into(),
            exit_code: ExitCode::Aborted,
            termination: None,
            report: None,
            stats: SortieStats::default(),
            taps: vec![Point::new(1, 1)],
            swipes: 0,
            captures: 3,
            visited: vec!["map".into()],
            final_scene: "map".into(),
        };
        let expect = Expectation {
            exit_code: Some(ExitCode::BossDefeated),
            tapped: vec![Point::new(2, 2)],
            not_tapped: vec![Point::new(1, 1)],
            final_scene: Some("map".into()),
            ..Expectation::default()
        };
        let problems = result.mismatches(&expect);
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("boss_defeated"));
        assert!(!result.completed_successfully());
    }

    #[test]
    fn test_list_fixtures_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.yaml", "a.yml", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<String> = list_fixtures(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.yml", "b.yaml"]);
    }
}
