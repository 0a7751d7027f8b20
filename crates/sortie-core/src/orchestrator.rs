//! Repeats map-clear sessions until a sortie limit or a stopping exit code.
//!
//! Each iteration enters the configured map from the map selection screen,
//! pressing through the map summary and fleet selection, hands the map to
//! [`CombatEngine::clear_map`] and interprets the returned [`ExitCode`]:
//!
//! | Disposition | Action |
//! | --- | --- |
//! | `Repeat` | enter the map again (rotating fleets on `FleetSwitchPending`) |
//! | `Stop` | return the matching [`TerminationReason`] |
//! | `Escalate` | return [`TerminationReason::Aborted`] |

use crate::dock::Relief;
use crate::error::{Result, SessionError};
use crate::layout;
use crate::map_clear::CombatEngine;
use crate::status_manager::StatusManager;
use crate::strategy::{MapStrategy, StrategyTable};
use sortie_proto::{Disposition, ExitCode, patterns};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const MENU_SETTLE: Duration = Duration::from_secs(1);
const MAP_TILE_SIMILARITY: f32 = 0.85;

/// Why the orchestrator handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Completed the configured number of clears before a retirement pass.
    RetireCycle,
    /// Reached `sortie.max_sorties`.
    MaxSorties,
    /// Ran past `sortie.max_runtime_seconds`.
    MaxRuntime,
    /// Hit the outer loop cap without any other stop condition.
    SortieCap,
    MoraleLow,
    DockFull,
    FleetDefeated,
    /// A session or the map entry hit a fatal error.
    Aborted,
}

impl TerminationReason {
    /// Process exit code for this reason.
    ///
    /// - 0: a planned hand-back (retire cycle, sortie count)
    /// - 1: the run cannot continue unattended
    /// - 2: a time or iteration limit was reached
    pub fn exit_code(&self) -> i32 {
        match self {
            TerminationReason::RetireCycle | TerminationReason::MaxSorties => 0,
            TerminationReason::MoraleLow
            | TerminationReason::DockFull
            | TerminationReason::FleetDefeated
            | TerminationReason::Aborted => 1,
            TerminationReason::MaxRuntime | TerminationReason::SortieCap => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::RetireCycle => "retire_cycle",
            TerminationReason::MaxSorties => "max_sorties",
            TerminationReason::MaxRuntime => "max_runtime",
            TerminationReason::SortieCap => "sortie_cap",
            TerminationReason::MoraleLow => "morale_low",
            TerminationReason::DockFull => "dock_full",
            TerminationReason::FleetDefeated => "fleet_defeated",
            TerminationReason::Aborted => "aborted",
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// Reason for a session that ended with a stopping exit code.
    fn from_exit_code(code: ExitCode) -> Self {
        match code {
            ExitCode::MoraleLow => TerminationReason::MoraleLow,
            ExitCode::DockFull => TerminationReason::DockFull,
            ExitCode::FleetDefeated => TerminationReason::FleetDefeated,
            _ => TerminationReason::Aborted,
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an attempt to enter the map ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    OnMap,
    /// Something between sessions ended the run.
    Stopped(ExitCode),
}

/// Runs sorties on one map with one engine.
pub struct SortieOrchestrator {
    engine: CombatEngine,
    strategy: MapStrategy,
    status: Option<StatusManager>,
    started: Instant,
    /// Index into `combat.rotation_fleets` of the fleet in use.
    fleet_index: usize,
    rotation_pending: bool,
}

impl SortieOrchestrator {
    /// Resolves the strategy for the configured map from the built-in table
    /// and the configuration's overrides.
    pub fn new(engine: CombatEngine) -> Self {
        let config = engine.config();
        let strategy = StrategyTable::builtin()
            .with_overrides(&config.strategies)
            .resolve(&config.combat);
        let status = config
            .diagnostics
            .enabled
            .then(|| StatusManager::new(&config.diagnostics.dir));
        Self {
            engine,
            strategy,
            status,
            started: Instant::now(),
            fleet_index: 0,
            rotation_pending: false,
        }
    }

    /// Replaces the resolved strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: MapStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn engine(&self) -> &CombatEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CombatEngine {
        &mut self.engine
    }

    pub fn strategy(&self) -> &MapStrategy {
        &self.strategy
    }

    /// Fleet currently sent out, from `combat.rotation_fleets`.
    pub fn current_fleet(&self) -> Option<u32> {
        self.engine.config().combat.rotation_fleets.get(self.fleet_index).copied()
    }

    /// Runs sorties until one of the stop conditions holds.
    pub fn run(&mut self) -> TerminationReason {
        let sortie = self.engine.config().sortie.clone();
        let cap = self.engine.config().limits.sortie_ticks;
        let mut cleared_this_cycle = 0;
        info!(map = %self.strategy.map, "Sortie run started");

        for _ in 0..cap {
            if self.started.elapsed().as_secs() >= sortie.max_runtime_seconds {
                return self.terminate(TerminationReason::MaxRuntime);
            }

            match self.enter_map() {
                Ok(Entry::OnMap) => {}
                Ok(Entry::Stopped(code)) => {
                    self.record(code);
                    return self.terminate(TerminationReason::from_exit_code(code));
                }
                Err(e) => {
                    error!(error = %e, "Could not enter the map");
                    self.record(ExitCode::Aborted);
                    return self.terminate(TerminationReason::Aborted);
                }
            }

            let code = self.engine.clear_map(&self.strategy);
            self.record(code);

            match code.disposition() {
                Disposition::Repeat => {
                    cleared_this_cycle += 1;
                    if code == ExitCode::FleetSwitchPending {
                        self.rotate_fleet();
                    }
                }
                Disposition::Stop => return self.terminate(TerminationReason::from_exit_code(code)),
                Disposition::Escalate | Disposition::Continue => {
                    return self.terminate(TerminationReason::Aborted);
                }
            }

            if sortie
                .max_sorties
                .is_some_and(|max| self.engine.stats().combats_done >= max)
            {
                return self.terminate(TerminationReason::MaxSorties);
            }
            if sortie.retire_cycle != 0 && cleared_this_cycle >= sortie.retire_cycle {
                return self.terminate(TerminationReason::RetireCycle);
            }
        }
        warn!(cap, "Sortie loop cap reached");
        self.terminate(TerminationReason::SortieCap)
    }

    fn terminate(&self, reason: TerminationReason) -> TerminationReason {
        let stats = self.engine.stats();
        info!(
            reason = %reason,
            sorties = stats.sorties,
            combats_done = stats.combats_done,
            "Sortie run finished"
        );
        reason
    }

    fn record(&mut self, code: ExitCode) {
        let stats = self.engine.stats_mut();
        stats.sorties += 1;
        stats.last_exit_code = Some(code);
        if code.disposition() == Disposition::Repeat {
            stats.combats_done += 1;
        } else {
            stats.combats_attempted += 1;
        }
        if let Some(status) = &self.status {
            status.update(&self.strategy.map, self.engine.stats(), self.started.elapsed().as_secs());
        }
    }

    fn rotate_fleet(&mut self) {
        let fleets = self.engine.config().combat.rotation_fleets.len();
        if fleets == 0 {
            return;
        }
        self.fleet_index = (self.fleet_index + 1) % fleets;
        self.rotation_pending = true;
        info!(fleet = ?self.current_fleet(), "Rotating to the next fleet");
    }

    /// Walks from the map selection screen onto the map.
    fn enter_map(&mut self) -> Result<Entry> {
        let cap = self.engine.config().limits.map_wait;
        let tile = patterns::map_tile(&self.strategy.map);
        let ignore_morale = self.engine.config().combat.ignore_morale;
        let low_mood_rotation = self.engine.config().combat.low_mood_rotation;
        let mut rotated_for_morale = false;

        for _ in 0..cap {
            let screen = self.engine.screen_mut();
            screen.refresh()?;

            if screen.is_visible(patterns::BUTTON_RETREAT) {
                debug!(map = %self.strategy.map, "On the map");
                return Ok(Entry::OnMap);
            }

            if screen.is_visible(patterns::MENU_BUTTON_SORT) {
                if self.engine.relieve_dock()? == Relief::Exhausted {
                    warn!("Dock is full before the sortie");
                    self.engine.screen_mut().tap_region(layout::CLOSE_INFO_DIALOG)?;
                    return Ok(Entry::Stopped(ExitCode::DockFull));
                }
                continue;
            }

            if screen.is_visible(patterns::ALERT_MORALE_LOW) {
                if ignore_morale {
                    screen.tap_region(layout::COMMISSION_CONFIRM)?;
                    continue;
                }
                let rotate = low_mood_rotation && !rotated_for_morale;
                screen.tap_region(layout::CLOSE_INFO_DIALOG)?;
                if !rotate {
                    warn!("Low morale before the sortie");
                    return Ok(Entry::Stopped(ExitCode::MoraleLow));
                }
                rotated_for_morale = true;
                self.rotate_fleet();
                continue;
            }

            if screen.is_visible(patterns::MENU_SELECT_FLEET) {
                self.select_fleet()?;
                continue;
            }

            if screen.is_visible(patterns::BUTTON_GO) {
                debug!("Map summary");
                screen.tap_region(layout::MAP_SUMMARY_GO)?;
                screen.wait(MENU_SETTLE);
                continue;
            }

            if screen.is_visible(patterns::MENU_BUTTON_CONFIRM) {
                info!("Commission popup on the way to the map");
                screen.tap_region(layout::COMMISSION_CONFIRM)?;
                self.engine.stats_mut().record_commission();
                continue;
            }

            if screen.is_visible(patterns::MENU_ATTACK) {
                let Some(m) = screen.find(tile.as_str(), MAP_TILE_SIMILARITY) else {
                    return Err(SessionError::UnexpectedScreen("map tile not on the selection screen"));
                };
                debug!(map = %self.strategy.map, "Opening map");
                screen.tap(m.region.center())?;
                screen.wait(MENU_SETTLE);
                continue;
            }

            screen.wait(MENU_SETTLE);
        }
        Err(SessionError::exhausted("map_entry", cap))
    }

    /// Picks the rotation fleet if one is pending, then sorties.
    fn select_fleet(&mut self) -> Result<()> {
        let slot = self.engine.config().combat.rotation_slot;
        let fleet = self.current_fleet();
        let pending = std::mem::take(&mut self.rotation_pending);
        let screen = self.engine.screen_mut();

        if pending && let Some(fleet) = fleet {
            info!(fleet, slot, "Selecting fleet");
            screen.tap_region(layout::FLEET_SLOT_CHOOSE[if slot == 2 { 1 } else { 0 }])?;
            screen.wait(Duration::from_millis(500));
            screen.tap(layout::fleet_row(slot, fleet))?;
            screen.wait(Duration::from_millis(500));
        }
        screen.tap_region(layout::FLEET_MENU_GO)?;
        screen.wait(MENU_SETTLE);
        Ok(())
    }
}

impl std::fmt::Debug for SortieOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortieOrchestrator")
            .field("map", &self.strategy.map)
            .field("fleet_index", &self.fleet_index)
            .finish_non_exhaustive()
    }
}
