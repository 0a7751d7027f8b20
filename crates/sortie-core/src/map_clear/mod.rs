//! The map-clear state machine.
//!
//! [`CombatEngine`] is the entry point. Each [`CombatEngine::clear_map`]
//! call builds a [`MapClear`] that owns the session state, drives it to a
//! terminal exit code and is dropped when the call returns.
//!
//! Control flow inside a session:
//!
//! ```text
//! pick target -> tap -> Moving -> (Blocked | Arrived | CombatStarted)
//!                                     |                     |
//!                          recover_blocked        resolve_battle
//!                                     \____________________/
//!                                               |
//!                      kill threshold reached -> boss -> retreat
//! ```
//!
//! Any [`SessionError`] ends the session with `ExitCode::Aborted`.

mod battle;
mod boss;
mod movement;
mod recovery;
mod retreat;

pub use battle::BattleOutcome;
pub use boss::centering_swipe;
pub use movement::{MovementOutcome, StallDetector};
pub use retreat::drain_retreat;

use crate::anchor;
use crate::config::SortieConfig;
use crate::dock::{DockHandler, DockRelief, Relief};
use crate::ensured_action::{EnsuredAction, Outcome, StabilityCheck};
use crate::error::{Result, SessionError};
use crate::incident_log::IncidentLog;
use crate::layout;
use crate::poller::EventPoller;
use crate::screen::Screen;
use crate::session::{AbortReason, ClearSession, SessionReport};
use crate::status_manager::SortieStats;
use crate::strategy::{MapStrategy, MidSessionSwitch, OpeningStep};
use crate::targeting::{TargetAcquisition, TargetQuery};
use sortie_proto::{ExitCode, Point, Target, TargetKind, patterns};
use std::fs;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Movement events are matched a little below the default similarity.
const MOVEMENT_EVENT_SIMILARITY: f32 = 0.9;
const MAP_SETTLE: Duration = Duration::from_millis(2500);
const FLEET_SWITCH_SETTLE: Duration = Duration::from_secs(2);
const OPENING_ENGAGE_WAIT: Duration = Duration::from_secs(3);
const FLEET_LOCK_SIMILARITY: f32 = 0.99;

/// Runs map-clear sessions against one device.
pub struct CombatEngine {
    screen: Screen,
    config: SortieConfig,
    dock: DockRelief,
    stats: SortieStats,
    incidents: Option<IncidentLog>,
    last_report: Option<SessionReport>,
}

impl CombatEngine {
    pub fn new(screen: Screen, config: SortieConfig) -> Self {
        let incidents = config
            .diagnostics
            .enabled
            .then(|| IncidentLog::new(&config.diagnostics.dir));
        Self {
            screen,
            config,
            dock: DockRelief::new(),
            stats: SortieStats::default(),
            incidents,
            last_report: None,
        }
    }

    /// Adds a handler tried, in registration order, when the dock is full.
    #[must_use]
    pub fn with_dock_handler(mut self, handler: Box<dyn DockHandler>) -> Self {
        self.dock = std::mem::take(&mut self.dock).with_handler(handler);
        self
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    pub fn config(&self) -> &SortieConfig {
        &self.config
    }

    pub fn stats(&self) -> &SortieStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SortieStats {
        &mut self.stats
    }

    pub fn dock_mut(&mut self) -> &mut DockRelief {
        &mut self.dock
    }

    /// Report of the most recent session, if any ran.
    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    /// Clears the map currently on screen. The fleet must already be on the map.
    pub fn clear_map(&mut self, strategy: &MapStrategy) -> ExitCode {
        self.run_session(strategy, |clear| clear.run())
    }

    /// Attacks a boss already located on screen, without retreating afterwards.
    pub fn engage_boss(&mut self, strategy: &MapStrategy, boss: Target) -> ExitCode {
        self.run_session(strategy, |clear| clear.engage_boss(boss))
    }

    /// Leaves the map, pressing retreat if needed.
    pub fn retreat(&mut self) -> Result<()> {
        drain_retreat(&mut self.screen, &self.config.limits, true)
    }

    /// Asks the dock handlers for room while the sort screen is up.
    pub fn relieve_dock(&mut self) -> Result<Relief> {
        self.dock.relieve(&mut self.screen)
    }

    fn run_session<F>(&mut self, strategy: &MapStrategy, body: F) -> ExitCode
    where
        F: FnOnce(&mut MapClear<'_>) -> Result<()>,
    {
        self.dock.reset();
        let mut clear = MapClear::new(
            &mut self.screen,
            &self.config,
            strategy,
            &mut self.dock,
            &mut self.stats,
        );
        let result = body(&mut clear);
        let report = clear.conclude(result, self.incidents.as_ref());

        let code = report.exit_code;
        self.stats.last_exit_code = Some(code);
        info!(
            map = %report.map,
            exit = %code,
            kills = report.kills_count,
            combats = report.combats_done,
            elapsed_s = report.elapsed_seconds,
            "Map clear finished"
        );
        self.last_report = Some(report);
        code
    }
}

impl std::fmt::Debug for CombatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatEngine")
            .field("map", &self.config.combat.map)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// One map-clear session.
pub struct MapClear<'a> {
    screen: &'a mut Screen,
    config: &'a SortieConfig,
    strategy: &'a MapStrategy,
    dock: &'a mut DockRelief,
    stats: &'a mut SortieStats,
    targets: TargetAcquisition,
    session: ClearSession,
    poller: EventPoller,
}

impl<'a> MapClear<'a> {
    fn new(
        screen: &'a mut Screen,
        config: &'a SortieConfig,
        strategy: &'a MapStrategy,
        dock: &'a mut DockRelief,
        stats: &'a mut SortieStats,
    ) -> Self {
        let targets = TargetAcquisition::new(config.targeting.clone(), config.limits.clone())
            .with_siren_elites(config.combat.siren_elites);
        let session = ClearSession::new(strategy.map.clone(), config.targeting.blacklist_radius);
        let poller = EventPoller::movement(
            MOVEMENT_EVENT_SIMILARITY,
            strategy.is_story_map(),
            config.combat.clearing_mode,
        );
        Self {
            screen,
            config,
            strategy,
            dock,
            stats,
            targets,
            session,
            poller,
        }
    }

    pub fn session(&self) -> &ClearSession {
        &self.session
    }

    fn run(&mut self) -> Result<()> {
        info!(
            map = %self.strategy.map,
            kills_before_boss = self.strategy.kills_before_boss,
            "Started map clear"
        );
        self.screen.wait_refresh(MAP_SETTLE)?;
        self.dismiss_commissions()?;
        if self.config.combat.clearing_mode {
            self.lock_fleet()?;
        }
        self.prepare_map()?;
        self.run_opening()?;
        if self.strategy.reset_camera_at_start {
            self.reset_camera()?;
        }

        let cap = self.config.limits.session_ticks;
        let mut target: Option<Target> = None;
        for _ in 0..cap {
            self.screen.refresh()?;

            if self.screen.is_visible(patterns::ALERT_UNABLE_BATTLE) {
                warn!("No fleet is able to battle");
                self.screen.tap_region(layout::CLOSE_INFO_DIALOG)?;
                self.session.finish(ExitCode::FleetDefeated);
            }
            let retreat_after = self.config.combat.retreat_after;
            if retreat_after != 0
                && self.session.kills_count >= retreat_after
                && target.is_some_and(|t| t.kind == TargetKind::Enemy)
            {
                info!(kills = self.session.kills_count, "Retreating after {retreat_after} kills");
                self.session.finish(ExitCode::RetreatAfterN);
            }
            if self.session.is_finished() {
                let force = self.session.exit_code() != ExitCode::BossDefeated;
                return self.retreat(force);
            }

            if let Some(switch) = self.strategy.mid_session_switch
                && !self.session.fleet_switched
                && self.session.kills_count == switch.after_kills
            {
                self.mid_session_switch(switch)?;
                continue;
            }

            if self.session.kills_count >= self.strategy.kills_before_boss {
                if self.find_boss().is_some() {
                    self.prepare_boss()?;
                    continue;
                }
                if self.config.combat.clearing_mode {
                    self.uncover_boss()?;
                    continue;
                }
            }

            let Some(current) = target else {
                target = Some(self.next_target()?);
                continue;
            };

            self.screen.tap(current.location)?;
            self.screen.refresh()?;
            if self.screen.is_visible(patterns::ALERT_UNABLE_REACH) {
                warn!(target = %current, "Unable to reach the target");
                self.screen.wait(Duration::from_secs(1));
                if self.config.combat.focus_on_mystery_nodes && current.kind == TargetKind::MysteryNode {
                    self.targets.clear_enemies();
                    self.recover_blocked(current.location, false)?;
                } else {
                    self.session.blacklist.push(current.location);
                }
                target = None;
                continue;
            }

            if self.move_to(current, true)? == MovementOutcome::CombatStarted {
                self.resolve_battle(false, true)?;
            }
            let reached = self.session.target.unwrap_or(current);
            if reached.kind == TargetKind::MysteryNode
                && let Some(pan) = self.strategy.post_mystery_pan
            {
                info!("Relocating the camera after the mystery node");
                self.screen.swipe(pan.from, pan.to, pan.duration_ms)?;
                self.camera_moved();
            }
            target = None;
            self.session.blacklist.clear();
        }
        Err(SessionError::exhausted("session", cap))
    }

    fn target_query(&self) -> TargetQuery {
        TargetQuery {
            fleet: None,
            reference: None,
            include_mystery_nodes: self.strategy.has_mystery_nodes() && !self.config.combat.ignore_mystery_nodes,
            priority_mystery_nodes: self.config.combat.focus_on_mystery_nodes,
            boss_mode: false,
            focus_main_fleet: self.strategy.focus_main_fleet,
            mystery_confidence: self.strategy.mystery_confidence,
        }
    }

    fn next_target(&mut self) -> Result<Target> {
        let target = self.pick_target(self.target_query())?;
        self.session.target = Some(target);
        Ok(target)
    }

    /// Closest target for `query`, measured from the known fleet location.
    fn pick_target(&mut self, query: TargetQuery) -> Result<Target> {
        let fleet = self.fleet_location()?;
        let pans = self.targets.pans();
        let query = TargetQuery {
            fleet: Some(fleet),
            ..query
        };
        let target = self
            .targets
            .closest_target(self.screen, &self.session.blacklist, query)?;
        if self.targets.pans() != pans {
            debug!("Camera panned during the target scan, fleet location dropped");
            self.session.fleet_location = None;
        }
        Ok(target)
    }

    /// The fleet's location, scanning for its marker only when unknown.
    fn fleet_location(&mut self) -> Result<Point> {
        if let Some(fleet) = self.session.fleet_location {
            return Ok(fleet);
        }
        let fleet = self.targets.locate_fleet(self.screen)?;
        self.session.fleet_location = Some(fleet);
        Ok(fleet)
    }

    /// Screen positions seen before a camera move no longer apply.
    fn camera_moved(&mut self) {
        self.targets.invalidate();
        self.session.fleet_location = None;
    }

    fn dismiss_commissions(&mut self) -> Result<()> {
        let cap = self.config.limits.ensured_attempts;
        let mut seen = 0;
        while self.screen.is_visible(patterns::MENU_BUTTON_CONFIRM) {
            seen += 1;
            if seen > cap {
                return Err(SessionError::exhausted("commission_popup", cap));
            }
            info!("Found commission info message");
            self.stats.record_commission();
            self.screen.tap_region(layout::COMMISSION_CONFIRM)?;
            self.screen.wait_refresh(Duration::from_secs(1))?;
        }
        Ok(())
    }

    fn lock_fleet(&mut self) -> Result<()> {
        let cap = self.config.limits.ensured_attempts;
        for _ in 0..cap {
            if self.screen.find(patterns::FLEET_LOCK, FLEET_LOCK_SIMILARITY).is_some() {
                return Ok(());
            }
            warn!("Using fleet lock");
            self.screen.tap_region(layout::FLEET_LOCK)?;
            self.screen.wait_refresh(Duration::from_secs(1))?;
        }
        Err(SessionError::exhausted("fleet_lock", cap))
    }

    fn prepare_map(&mut self) -> Result<()> {
        let strategy = self.strategy;
        if self.config.combat.fleet_switch_at_beginning {
            self.switch_fleet()?;
            if strategy.reset_camera_after_switch {
                self.reset_camera()?;
            }
        }
        for pan in &strategy.opening_pans {
            debug!(from = %pan.from, to = %pan.to, "Opening camera pan");
            self.screen.swipe(pan.from, pan.to, pan.duration_ms)?;
            self.camera_moved();
        }
        if self.config.combat.hide_subs_hunting_range {
            self.screen.wait(Duration::from_millis(500));
            for region in [
                layout::OPEN_STRATEGY_MENU,
                layout::DISABLE_SUBS_HUNTING_RANGE,
                layout::CLOSE_STRATEGY_MENU,
            ] {
                self.screen.tap_region(region)?;
            }
        }
        Ok(())
    }

    fn run_opening(&mut self) -> Result<()> {
        let strategy = self.strategy;
        for step in &strategy.opening {
            if self.session.is_finished() {
                break;
            }
            match *step {
                OpeningStep::CollectMysteryNode => {
                    let query = TargetQuery {
                        include_mystery_nodes: true,
                        priority_mystery_nodes: true,
                        ..self.target_query()
                    };
                    let target = self.pick_target(query)?;
                    info!(%target, "Opening: collecting a mystery node");
                    self.screen.tap(target.location)?;
                    if self.move_to(target, true)? == MovementOutcome::CombatStarted {
                        self.resolve_battle(false, true)?;
                    }
                    self.session.blacklist.clear();
                }
                OpeningStep::SwitchFleet => self.switch_fleet()?,
                OpeningStep::ResetCamera => self.reset_camera()?,
                OpeningStep::Engage(tile) => {
                    info!(%tile, "Opening: engaging");
                    self.screen.tap(tile)?;
                    self.screen.wait_refresh(OPENING_ENGAGE_WAIT)?;
                    self.resolve_battle(false, true)?;
                }
            }
        }
        Ok(())
    }

    fn mid_session_switch(&mut self, switch: MidSessionSwitch) -> Result<()> {
        info!(waypoint = %switch.waypoint, "Moving to the waypoint before switching fleets");
        self.screen.tap(switch.waypoint)?;
        match self.move_to(Target::empty(switch.waypoint), true)? {
            MovementOutcome::Unreachable => info!("Current fleet is not blocking the boss spawn"),
            MovementOutcome::CombatStarted => {
                warn!("Enemy found at the waypoint");
                if self.resolve_battle(false, true)? == BattleOutcome::Defeat {
                    self.reset_camera()?;
                }
            }
            MovementOutcome::Interrupted => return Ok(()),
            MovementOutcome::Arrived => {}
        }

        self.screen.wait(Duration::from_secs(1));
        info!(kills = self.session.kills_count, "Switching fleets mid-session");
        self.screen.tap_region(layout::SWITCH_FLEET)?;
        self.reset_camera()?;
        self.session.fleet_switched = true;
        self.screen.wait(Duration::from_secs(1));
        Ok(())
    }

    fn switch_fleet(&mut self) -> Result<()> {
        info!("Switching fleet");
        self.screen.tap_region(layout::SWITCH_FLEET)?;
        self.screen.wait_refresh(FLEET_SWITCH_SETTLE)?;
        self.camera_moved();
        Ok(())
    }

    fn reset_camera(&mut self) -> Result<()> {
        anchor::reset_camera(
            self.screen,
            &self.strategy.map,
            self.strategy.anchor.as_ref(),
            &self.config.limits,
        )?;
        self.camera_moved();
        Ok(())
    }

    /// Handles a low-morale alert. Returns true if the session is over.
    fn handle_low_morale(&mut self) -> Result<bool> {
        if self.config.combat.ignore_morale {
            if let Some(m) = self.screen.find(patterns::MENU_BUTTON_CONFIRM, self.config.timing.default_similarity) {
                info!("Low morale ignored");
                self.screen.tap(m.region.center())?;
            }
            return Ok(false);
        }
        self.screen.tap_region(layout::CLOSE_INFO_DIALOG)?;
        let code = if self.config.combat.low_mood_rotation {
            warn!("Low morale detected, the next sortie will use another fleet");
            ExitCode::FleetSwitchPending
        } else {
            warn!("Low morale detected, stopping");
            ExitCode::MoraleLow
        };
        self.session.finish(code);
        Ok(true)
    }

    /// Runs an ensured action with the configured attempt cap unless it sets its own.
    fn perform(&mut self, action: EnsuredAction) -> Result<Outcome> {
        let action = match action.max_attempts {
            Some(_) => action,
            None => action.with_max_attempts(self.config.limits.ensured_attempts),
        };
        Ok(self.screen.perform(&action)?)
    }

    fn stable(&self, frames: u32) -> StabilityCheck {
        StabilityCheck::frames(frames).with_max_samples(self.config.limits.stability_samples)
    }

    fn retreat(&mut self, force: bool) -> Result<()> {
        drain_retreat(self.screen, &self.config.limits, force)
    }

    /// Turns the session result into a report. Errors abort the session,
    /// record an incident and try to leave the map.
    fn conclude(mut self, result: Result<()>, incidents: Option<&IncidentLog>) -> SessionReport {
        let Err(err) = result else {
            return self.session.report();
        };

        error!(map = %self.session.map, error = %err, "Session aborted");
        self.session.abort();

        let snapshot = incidents.and_then(|log| {
            let path = log.snapshot_path(&self.session.map);
            if let Some(parent) = path.parent()
                && let Err(e) = fs::create_dir_all(parent)
            {
                warn!(error = %e, dir = %parent.display(), "Could not create the snapshot directory");
                return None;
            }
            match self.screen.save_snapshot(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!(error = %e, "Could not save a snapshot");
                    None
                }
            }
        });

        if let Err(e) = drain_retreat(self.screen, &self.config.limits, true) {
            warn!(error = %e, "Retreat after abort failed");
        }

        let mut report = self.session.report();
        report.abort_reason = Some(AbortReason {
            loop_name: err.exhausted_loop().map(str::to_string),
            message: err.to_string(),
        });
        if let Some(log) = incidents {
            log.record(&report, snapshot.as_deref());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BudgetPolicy;
    use crate::testing::{Scenario, Scene, ScriptedDevice};
    use sortie_proto::{Point, Region};
    use tempfile::TempDir;

    const SPOT: Region = Region::new(900, 500, 100, 40);

    /// Borrowable pieces of a [`MapClear`] over a scripted device.
    pub(super) struct Rig {
        pub(super) device: ScriptedDevice,
        pub(super) screen: Screen,
        pub(super) config: SortieConfig,
        pub(super) strategy: MapStrategy,
        pub(super) dock: DockRelief,
        pub(super) stats: SortieStats,
    }

    impl Rig {
        pub(super) fn new(scenario: Scenario) -> Self {
            let device = ScriptedDevice::new(scenario);
            let config = SortieConfig::default();
            let screen = device.screen(config.timing.clone()).unwrap().with_seed(11);
            Self {
                device,
                screen,
                config,
                strategy: MapStrategy::generic("1-1", 2),
                dock: DockRelief::new(),
                stats: SortieStats::default(),
            }
        }

        pub(super) fn clear(&mut self) -> MapClear<'_> {
            MapClear::new(
                &mut self.screen,
                &self.config,
                &self.strategy,
                &mut self.dock,
                &mut self.stats,
            )
        }
    }

    /// Region of an enemy level badge whose tile is `at`.
    pub(super) fn enemy_at(at: Point) -> Region {
        Region::new(at.x + 3, at.y + 27, 40, 20)
    }

    /// Region of the fleet ammo marker for a fleet standing on `fleet`.
    pub(super) fn fleet_marker_at(fleet: Point) -> Region {
        Region::new(fleet.x - 140, fleet.y - 205, 30, 30)
    }

    fn boss_at(boss: Point) -> Region {
        Region::new(boss.x - 50, boss.y - 25, 60, 40)
    }

    /// Adds a won battle entered at scene `entry`; the summary leads to `after_summary`.
    pub(super) fn with_battle(scenario: Scenario, entry: &str, after_summary: &str) -> Scenario {
        let battle = format!("{entry}/battle");
        let done = format!("{entry}/done");
        let summary = format!("{entry}/summary");
        scenario
            .scene(Scene::new(entry).show(patterns::MENU_LOADING, SPOT).after_captures(1, battle.as_str()))
            .scene(Scene::new(battle.as_str()).show(patterns::COMBAT_PAUSE, SPOT).after_captures(2, done.as_str()))
            .scene(
                Scene::new(done.as_str())
                    .show(patterns::MENU_TOUCH_TO_CONTINUE, SPOT)
                    .on_tap(layout::BATTLE_SAFE_TOUCH, summary.as_str()),
            )
            .scene(
                Scene::new(summary.as_str())
                    .show(patterns::COMBAT_BUTTON_CONFIRM, SPOT)
                    .on_tap(layout::COMBAT_END_CONFIRM, after_summary),
            )
    }

    const FLEET: Point = Point::new(600, 800);
    const ENEMY: Point = Point::new(900, 450);
    const BOSS: Point = Point::new(1300, 350);

    /// One enemy, then the boss, then the stage menu.
    fn one_kill_map() -> Scenario {
        let first = Scene::new("map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY))
            .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
            .on_tap(Region::centered(ENEMY, 20, 20), "fight");
        let boss = Scene::new("boss_map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(Point::new(900, 600)))
            .show(patterns::ENEMY_FLEET_BOSS, boss_at(BOSS))
            .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
            .on_tap(Region::centered(BOSS, 20, 20), "boss_fight");
        let scenario = Scenario::new("map").scene(first).scene(boss);
        let scenario = with_battle(scenario, "fight", "boss_map");
        with_battle(scenario, "boss_fight", "stage")
            .scene(Scene::new("stage").show(patterns::MENU_ATTACK, Region::new(1500, 900, 100, 60)))
    }

    fn engine(device: &ScriptedDevice, diagnostics: &TempDir) -> CombatEngine {
        let mut config = SortieConfig::default();
        config.diagnostics.dir = diagnostics.path().to_path_buf();
        config.limits.retreat = 5;
        let screen = device.screen(config.timing.clone()).unwrap().with_seed(5);
        CombatEngine::new(screen, config)
    }

    #[test]
    fn test_clear_map_kills_then_defeats_boss() {
        let device = ScriptedDevice::new(one_kill_map());
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&device, &dir);

        let code = engine.clear_map(&MapStrategy::generic("1-1", 1));

        assert_eq!(code, ExitCode::BossDefeated);
        let report = engine.last_report().unwrap();
        assert_eq!(report.kills_count, 2);
        assert_eq!(report.combats_done, 2);
        assert!(report.abort_reason.is_none());
        assert_eq!(engine.stats().victories, 2);
        assert_eq!(engine.stats().last_exit_code, Some(ExitCode::BossDefeated));
        assert_eq!(device.current_scene(), "stage");
        assert!(!dir.path().join("incidents.md").exists());
    }

    #[test]
    fn test_retreat_after_kills() {
        let second = Point::new(1100, 650);
        let confirm = Region::new(1100, 700, 200, 60);
        let map = Scene::new("map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY))
            .on_tap(Region::centered(ENEMY, 20, 20), "fight");
        let after = Scene::new("after")
            .show(patterns::FLEET_AMMO, fleet_marker_at(Point::new(900, 600)))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(second))
            .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
            .on_tap(layout::RETREAT_BUTTON, "confirm");
        let scenario = with_battle(Scenario::new("map").scene(map), "fight", "after")
            .scene(after)
            .scene(Scene::new("confirm").show(patterns::MENU_BUTTON_CONFIRM, confirm).on_tap(confirm, "menu"))
            .scene(Scene::new("menu").show(patterns::MENU_ATTACK, Region::new(1500, 900, 100, 60)));
        let device = ScriptedDevice::new(scenario);
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&device, &dir);
        engine.config.combat.retreat_after = 1;

        let code = engine.clear_map(&MapStrategy::generic("3-4", 5));

        assert_eq!(code, ExitCode::RetreatAfterN);
        assert_eq!(engine.last_report().unwrap().kills_count, 1);
        assert_eq!(device.current_scene(), "menu");
        // the second enemy was picked but never tapped
        assert!(!device.taps().contains(&second));
    }

    #[test]
    fn test_movement_breach_aborts_with_incident() {
        let map = Scene::new("map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY))
            .on_tap(Region::centered(ENEMY, 20, 20), "stuck");
        let stuck = Scene::new("stuck");
        let device = ScriptedDevice::new(Scenario::new("map").scene(map).scene(stuck));
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&device, &dir);
        let mut strategy = MapStrategy::generic("2-1", 3);
        strategy.budget_policy = BudgetPolicy::Abort;
        strategy.movement_budget = 4;

        let code = engine.clear_map(&strategy);

        assert_eq!(code, ExitCode::Aborted);
        let reason = engine.last_report().unwrap().abort_reason.clone().unwrap();
        assert_eq!(reason.loop_name.as_deref(), Some("movement"));
        let incidents = fs::read_to_string(dir.path().join("incidents.md")).unwrap();
        assert!(incidents.contains("| 2-1 | aborted | movement |"));
        assert_eq!(engine.stats().last_exit_code, Some(ExitCode::Aborted));
    }

    #[test]
    fn test_unwritable_snapshot_dir_still_records_incident() {
        let map = Scene::new("map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY))
            .on_tap(Region::centered(ENEMY, 20, 20), "stuck");
        let device = ScriptedDevice::new(Scenario::new("map").scene(map).scene(Scene::new("stuck")));
        let dir = TempDir::new().unwrap();
        // a plain file where the snapshot directory should go
        fs::write(dir.path().join("snapshots"), "").unwrap();
        let mut engine = engine(&device, &dir);
        let mut strategy = MapStrategy::generic("2-1", 3);
        strategy.budget_policy = BudgetPolicy::Abort;
        strategy.movement_budget = 4;

        let code = engine.clear_map(&strategy);

        assert_eq!(code, ExitCode::Aborted);
        let incidents = fs::read_to_string(dir.path().join("incidents.md")).unwrap();
        assert!(incidents.contains("| 2-1 | aborted | movement |"));
        assert!(incidents.trim_end().ends_with("| - |"));
    }

    #[test]
    fn test_unable_to_battle_ends_session() {
        let map = Scene::new("map")
            .show(patterns::ALERT_UNABLE_BATTLE, SPOT)
            .on_tap(layout::CLOSE_INFO_DIALOG, "menu");
        let menu = Scene::new("menu").show(patterns::MENU_ATTACK, Region::new(1500, 900, 100, 60));
        let device = ScriptedDevice::new(Scenario::new("map").scene(map).scene(menu));
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&device, &dir);

        let code = engine.clear_map(&MapStrategy::generic("3-4", 5));
        assert_eq!(code, ExitCode::FleetDefeated);
        assert!(engine.last_report().unwrap().abort_reason.is_none());
    }

    fn two_enemies(name: &str, near: Point) -> Scene {
        Scene::new(name)
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(near))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY))
            .on_tap(Region::centered(ENEMY, 20, 20), "fight")
    }

    #[test]
    fn test_unreachable_target_is_blacklisted_and_next_one_taken() {
        let near = Point::new(700, 700);
        let map = two_enemies("map", near).on_tap(Region::centered(near, 20, 20), "refused");
        let refused = two_enemies("refused", near).show(patterns::ALERT_UNABLE_REACH, Region::new(700, 300, 300, 60));
        let after = Scene::new("after")
            .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
            .show(patterns::ALERT_UNABLE_BATTLE, SPOT)
            .on_tap(layout::CLOSE_INFO_DIALOG, "menu");
        let scenario = with_battle(Scenario::new("map").scene(map).scene(refused), "fight", "after")
            .scene(after)
            .scene(Scene::new("menu").show(patterns::MENU_ATTACK, Region::new(1500, 900, 100, 60)));
        let mut rig = Rig::new(scenario);
        rig.strategy = MapStrategy::generic("3-4", 1);

        let mut clear = rig.clear();
        clear.run().unwrap();
        assert_eq!(clear.session.kills_count, 1);
        assert_eq!(clear.session.exit_code(), ExitCode::FleetDefeated);
        drop(clear);
        assert_eq!(rig.device.taps()[..2], [near, ENEMY]);
    }

    #[test]
    fn test_known_fleet_location_is_reused_for_targeting() {
        // The marker is hidden, as when the fleet stands on a node it just reached.
        let scene = Scene::new("map").show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY));
        let mut rig = Rig::new(Scenario::new("map").scene(scene));
        let mut clear = rig.clear();
        clear.session.fleet_location = Some(Point::new(600, 700));

        let target = clear.next_target().unwrap();
        assert_eq!(target, Target::enemy(ENEMY));
        assert_eq!(clear.session.fleet_location, Some(Point::new(600, 700)));
    }

    #[test]
    fn test_fleet_location_scanned_once_and_dropped_when_the_camera_moves() {
        let scene = Scene::new("map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(ENEMY));
        let mut rig = Rig::new(Scenario::new("map").scene(scene));
        let mut clear = rig.clear();

        clear.next_target().unwrap();
        assert_eq!(clear.session.fleet_location, Some(FLEET));

        clear.switch_fleet().unwrap();
        assert_eq!(clear.session.fleet_location, None);
    }
}
