use super::{MOVEMENT_EVENT_SIMILARITY, MapClear};
use crate::ensured_action::{ActionFailure, EnsuredAction};
use crate::error::{Result, SessionError};
use crate::layout;
use crate::screen::Screen;
use crate::strategy::BudgetPolicy;
use sortie_proto::{Frame, Target, TargetKind, patterns};
use std::time::Duration;
use tracing::{debug, info, warn};

const BATTLE_LOADING_SIMILARITY: f32 = 0.8;
const BATTLE_PAUSE_SIMILARITY: f32 = 0.7;
/// Consecutive sightings of the fleet on a passive target that count as arrival.
const ARRIVAL_SIGHTINGS: u32 = 3;
const SUPPLY_WAIT: Duration = Duration::from_secs(2);

/// How a move ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementOutcome {
    /// A battle is loading or the formation screen is up.
    CombatStarted,
    Arrived,
    /// The game refused the move.
    Unreachable,
    /// Something ended the session mid-move.
    Interrupted,
}

/// Detects a frozen screen: `frames` consecutive near-identical frames.
#[derive(Debug)]
pub struct StallDetector {
    previous: Option<Frame>,
    still: u32,
    frames: u32,
    similarity: f32,
}

impl StallDetector {
    pub fn new(frames: u32, similarity: f32) -> Self {
        Self {
            previous: None,
            still: 0,
            frames: frames.max(1),
            similarity,
        }
    }

    /// Compares the screen's frame with the last one observed. Returns true
    /// when the stall threshold is reached, then starts counting again.
    pub fn observe(&mut self, screen: &Screen) -> bool {
        let current = screen.frame().clone();
        let still = self
            .previous
            .as_ref()
            .is_some_and(|prev| screen.similarity(prev, &current, None) >= self.similarity);
        self.previous = Some(current);

        self.still = if still { self.still + 1 } else { 0 };
        if self.still >= self.frames {
            self.still = 0;
            return true;
        }
        false
    }
}

impl MapClear<'_> {
    /// Follows the fleet after the target has been tapped.
    ///
    /// Returns once a battle starts, the fleet arrives, the move is refused
    /// or the session ends. The tick budget is handled by the map's
    /// [`BudgetPolicy`].
    pub(super) fn move_to(&mut self, target: Target, try_touch: bool) -> Result<MovementOutcome> {
        let strategy = self.strategy;
        let policy = strategy.budget_policy_for(self.config.combat.clearing_mode);
        let reissue_every = strategy.reissue_every.max(1);

        let mut target = target;
        let mut arrow_region = layout::target_arrow_region(target.location);
        let mut arrival_region = layout::fleet_arrival_region(target.location);
        let mut arrow_found = false;
        let mut count = 0;
        let mut replans = 0;
        let mut sightings = 0;
        let mut stall = StallDetector::new(self.config.timing.stall_frames, self.config.timing.stall_similarity);
        info!(%target, "Moving");

        let cap = self.config.limits.movement_ticks;
        for _ in 0..cap {
            self.screen.refresh()?;
            let stalled = stall.observe(self.screen);
            if stalled {
                debug!("Screen stalled while moving");
                arrow_found = false;
            }
            let events = self.poller.poll(self.screen);

            if !arrow_found
                && self
                    .screen
                    .find_in(patterns::FLEET_ARROW, MOVEMENT_EVENT_SIMILARITY, arrow_region)
                    .is_some()
            {
                debug!("Destination arrow seen");
                arrow_found = true;
            }

            if strategy.detect_unreachable_while_moving
                && self.screen.find(patterns::ALERT_UNABLE_REACH, MOVEMENT_EVENT_SIMILARITY).is_some()
            {
                warn!(%target, "Target became unreachable while moving");
                return Ok(MovementOutcome::Unreachable);
            }

            if events.seen(patterns::ALERT_AMMO_SUPPLIES) {
                info!("Received ammo supplies");
                if target.kind == TargetKind::MysteryNode {
                    return Ok(MovementOutcome::Arrived);
                }
                arrow_found = false;
                self.screen.wait(SUPPLY_WAIT);
                continue;
            }

            if events.seen(patterns::BUTTON_EVADE) {
                info!("Ambush encountered, evading");
                self.screen.tap_region(layout::AMBUSH_EVADE)?;
                self.screen.wait(Duration::from_secs(1));
                continue;
            }

            if events.seen(patterns::ALERT_FAILED_EVADE) {
                warn!("Failed to evade the ambush");
                self.screen.tap_region(layout::MENU_COMBAT_START)?;
                self.resolve_battle(false, false)?;
                if self.session.is_finished() {
                    return Ok(MovementOutcome::Interrupted);
                }
                arrow_found = false;
                continue;
            }

            if events.seen(patterns::MENU_ITEM_FOUND) {
                info!("Item found on the node");
                self.screen.tap_region(layout::TAP_TO_CONTINUE)?;
                self.screen.wait(Duration::from_secs(1));
                if strategy.use_emergency_repair {
                    self.emergency_repair()?;
                }
                if target.kind == TargetKind::MysteryNode {
                    return Ok(MovementOutcome::Arrived);
                }
                continue;
            }

            if self.screen.is_visible(patterns::ALERT_MORALE_LOW) {
                if self.handle_low_morale()? {
                    return Ok(MovementOutcome::Interrupted);
                }
                continue;
            }

            if events.seen(patterns::MENU_ALERT_INFO) {
                debug!("Info dialog over the map, closing it");
                self.screen.tap_region(layout::CLOSE_INFO_DIALOG)?;
                continue;
            }

            if target.kind.is_passive() {
                let here = self
                    .targets
                    .spot_fleet(self.screen)
                    .is_some_and(|p| arrival_region.contains(p));
                sightings = if here { sightings + 1 } else { 0 };
                if sightings >= ARRIVAL_SIGHTINGS {
                    info!(%target, "Fleet arrived");
                    self.session.fleet_location = Some(target.location);
                    return Ok(MovementOutcome::Arrived);
                }
            }

            if events.seen(patterns::MENU_LOADING)
                || self.screen.find(patterns::MENU_LOADING, BATTLE_LOADING_SIMILARITY).is_some()
                || self.screen.find(patterns::COMBAT_PAUSE, BATTLE_PAUSE_SIMILARITY).is_some()
            {
                self.session.fleet_location = Some(target.location);
                return Ok(MovementOutcome::CombatStarted);
            }
            if events.seen(patterns::MENU_FORMATION) {
                if let Some(m) = self.screen.find(patterns::AUTO_COMBAT_OFF, MOVEMENT_EVENT_SIMILARITY) {
                    self.screen.tap(m.region.center())?;
                }
                self.session.fleet_location = Some(target.location);
                return Ok(MovementOutcome::CombatStarted);
            }

            count += 1;
            if try_touch && stalled {
                debug!(count, "Move command lost, tapping the target again");
                self.screen.tap(target.location)?;
            } else if try_touch && !arrow_found && count % reissue_every == 0 {
                debug!(count, "No arrow yet, tapping the target again");
                self.screen.tap(target.location)?;
            }

            if count < strategy.movement_budget {
                continue;
            }
            match policy {
                BudgetPolicy::AssumeArrived => {
                    info!(%target, ticks = count, "Movement budget spent, assuming arrival");
                    self.session.fleet_location = Some(target.location);
                    return Ok(MovementOutcome::Arrived);
                }
                BudgetPolicy::Abort => {
                    warn!(%target, ticks = count, "Movement budget spent");
                    return Err(SessionError::exhausted("movement", strategy.movement_budget));
                }
                BudgetPolicy::BlacklistAndReplan => {
                    if matches!(target.kind, TargetKind::Boss | TargetKind::Empty) {
                        warn!(%target, "Movement budget spent on a fixed destination");
                        self.session.fleet_location = None;
                        return Ok(MovementOutcome::Unreachable);
                    }
                    replans += 1;
                    if replans > self.config.limits.max_replans {
                        return Err(SessionError::exhausted("movement_replan", self.config.limits.max_replans));
                    }
                    warn!(%target, replans, "Target not reached in time, picking another");
                    self.session.blacklist.push(target.location);
                    self.session.fleet_location = None;

                    target = self.next_target()?;
                    arrow_region = layout::target_arrow_region(target.location);
                    arrival_region = layout::fleet_arrival_region(target.location);
                    arrow_found = false;
                    sightings = 0;
                    count = 0;
                    self.screen.tap(target.location)?;
                }
            }
        }
        Err(SessionError::exhausted("movement_ticks", cap))
    }

    fn emergency_repair(&mut self) -> Result<()> {
        let open = EnsuredAction::tap_region(layout::EMERGENCY_REPAIR_IN_MAP)
            .expect([patterns::MENU_EMERGENCY_REPAIR])
            .with_max_attempts(2);
        match self.perform(open) {
            Ok(_) => match self.screen.find(patterns::BUTTON_USE_REPAIR, MOVEMENT_EVENT_SIMILARITY) {
                Some(m) => {
                    info!("Using emergency repair");
                    self.screen.tap(m.region.center())?;
                }
                None => info!("No emergency repairs left"),
            },
            Err(SessionError::Action(ActionFailure::Exhausted { .. })) => {
                warn!("Emergency repair unavailable");
            }
            Err(e) => return Err(e),
        }
        self.screen.tap_region(layout::CLOSE_STRATEGY_MENU)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Rig, enemy_at, fleet_marker_at};
    use super::*;
    use crate::testing::{Scenario, Scene};
    use sortie_proto::{ExitCode, Point, Region};

    const TARGET: Point = Point::new(800, 600);
    const LOADING: Region = Region::new(900, 500, 100, 40);

    #[test]
    fn test_stall_detector_fires_after_still_frames() {
        let rig = Rig::new(Scenario::new("map").scene(Scene::new("map")));
        let mut screen = rig.device.screen(rig.config.timing.clone()).unwrap();
        let mut stall = StallDetector::new(3, 0.9);

        let fired: Vec<bool> = (0..7)
            .map(|_| {
                screen.refresh().unwrap();
                stall.observe(&screen)
            })
            .collect();
        assert_eq!(fired, [false, false, false, true, false, false, true]);
    }

    #[test]
    fn test_stall_detector_resets_on_change() {
        let rig = Rig::new(Scenario::new("anim").scene(Scene::new("anim").animated()));
        let mut screen = rig.device.screen(rig.config.timing.clone()).unwrap();
        let mut stall = StallDetector::new(2, 0.9);
        for _ in 0..10 {
            screen.refresh().unwrap();
            assert!(!stall.observe(&screen));
        }
    }

    #[test]
    fn test_loading_screen_means_combat() {
        let scenario = Scenario::new("moving")
            .scene(Scene::new("moving").after_captures(3, "loading"))
            .scene(Scene::new("loading").show(patterns::MENU_LOADING, LOADING));
        let mut rig = Rig::new(scenario);
        let outcome = rig.clear().move_to(Target::enemy(TARGET), true).unwrap();
        assert_eq!(outcome, MovementOutcome::CombatStarted);
    }

    #[test]
    fn test_passive_target_arrives_when_fleet_seen_on_it() {
        let scenario = Scenario::new("moving")
            .scene(Scene::new("moving").after_captures(2, "there"))
            .scene(Scene::new("there").show(patterns::FLEET_AMMO, fleet_marker_at(TARGET.offset(0, -40))));
        let mut rig = Rig::new(scenario);
        let mut clear = rig.clear();
        let outcome = clear.move_to(Target::mystery_node(TARGET), true).unwrap();
        assert_eq!(outcome, MovementOutcome::Arrived);
        assert_eq!(clear.session.fleet_location, Some(TARGET));
    }

    #[test]
    fn test_reissues_tap_while_no_arrow() {
        let scenario = Scenario::new("moving")
            .scene(Scene::new("moving").after_captures(7, "loading"))
            .scene(Scene::new("loading").show(patterns::MENU_LOADING, LOADING));
        let mut rig = Rig::new(scenario);
        rig.clear().move_to(Target::enemy(TARGET), true).unwrap();
        // Ticks 3 and 6 re-tap; tick 7 sees the loading screen.
        assert_eq!(rig.device.taps(), vec![TARGET, TARGET]);
    }

    #[test]
    fn test_no_reissue_once_arrow_seen() {
        let arrow = Region::new(TARGET.x - 20, TARGET.y - 100, 40, 40);
        let scenario = Scenario::new("moving")
            .scene(Scene::new("moving").show(patterns::FLEET_ARROW, arrow).after_captures(7, "loading"))
            .scene(Scene::new("loading").show(patterns::MENU_LOADING, LOADING));
        let mut rig = Rig::new(scenario);
        rig.clear().move_to(Target::enemy(TARGET), true).unwrap();
        assert!(rig.device.taps().is_empty());
    }

    #[test]
    fn test_abort_policy_is_fatal() {
        let mut rig = Rig::new(Scenario::new("moving").scene(Scene::new("moving")));
        rig.strategy.budget_policy = BudgetPolicy::Abort;
        rig.strategy.movement_budget = 5;
        let err = rig.clear().move_to(Target::enemy(TARGET), true).unwrap_err();
        assert!(matches!(err, SessionError::LoopExhausted { loop_name: "movement", cap: 5 }));
    }

    #[test]
    fn test_assume_arrived_policy() {
        let mut rig = Rig::new(Scenario::new("moving").scene(Scene::new("moving")));
        rig.strategy.budget_policy = BudgetPolicy::AssumeArrived;
        rig.strategy.movement_budget = 4;
        let outcome = rig.clear().move_to(Target::enemy(TARGET), true).unwrap();
        assert_eq!(outcome, MovementOutcome::Arrived);
    }

    #[test]
    fn test_replan_blacklists_and_retargets_until_ceiling() {
        let other = Point::new(400, 400);
        let scene = Scene::new("map")
            .show(patterns::FLEET_AMMO, fleet_marker_at(Point::new(1000, 700)))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(TARGET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(other));
        let mut rig = Rig::new(Scenario::new("map").scene(scene));
        rig.strategy.movement_budget = 2;
        rig.config.limits.max_replans = 1;

        let mut clear = rig.clear();
        let err = clear.move_to(Target::enemy(TARGET), false).unwrap_err();
        assert!(matches!(err, SessionError::LoopExhausted { loop_name: "movement_replan", cap: 1 }));
        assert!(clear.session.blacklist.contains(TARGET));
        assert_eq!(clear.session.target, Some(Target::enemy(other)));
        drop(clear);
        assert_eq!(rig.device.taps(), vec![other]);
    }

    #[test]
    fn test_fixed_destination_is_not_replanned() {
        let mut rig = Rig::new(Scenario::new("moving").scene(Scene::new("moving")));
        rig.strategy.movement_budget = 3;
        let outcome = rig.clear().move_to(Target::empty(TARGET), false).unwrap();
        assert_eq!(outcome, MovementOutcome::Unreachable);
    }

    #[test]
    fn test_low_morale_interrupts_movement() {
        let scenario = Scenario::new("moving")
            .scene(Scene::new("moving").show(patterns::ALERT_MORALE_LOW, Region::new(700, 400, 200, 60)));
        let mut rig = Rig::new(scenario);
        let mut clear = rig.clear();
        let outcome = clear.move_to(Target::enemy(TARGET), true).unwrap();
        assert_eq!(outcome, MovementOutcome::Interrupted);
        assert_eq!(clear.session.exit_code(), ExitCode::MoraleLow);
    }

    #[test]
    fn test_unreachable_while_moving() {
        let scenario = Scenario::new("moving")
            .scene(Scene::new("moving").show(patterns::ALERT_UNABLE_REACH, Region::new(700, 400, 200, 60)));
        let mut rig = Rig::new(scenario);
        rig.strategy.detect_unreachable_while_moving = true;
        let outcome = rig.clear().move_to(Target::enemy(TARGET), true).unwrap();
        assert_eq!(outcome, MovementOutcome::Unreachable);
    }

    #[test]
    fn test_movement_ticks_are_capped() {
        let mut rig = Rig::new(Scenario::new("moving").scene(Scene::new("moving")));
        rig.strategy.movement_budget = 1000;
        rig.config.limits.movement_ticks = 12;
        let err = rig.clear().move_to(Target::enemy(TARGET), false).unwrap_err();
        assert!(matches!(err, SessionError::LoopExhausted { loop_name: "movement_ticks", cap: 12 }));
    }

    #[test]
    fn test_stalled_move_is_reissued() {
        // The arrow is up, so only a frozen screen triggers another tap.
        let arrow = Region::new(TARGET.x - 20, TARGET.y - 100, 40, 40);
        let scenario = Scenario::new("frozen")
            .scene(Scene::new("frozen").show(patterns::FLEET_ARROW, arrow).after_captures(7, "loading"))
            .scene(Scene::new("loading").show(patterns::MENU_LOADING, LOADING));
        let mut rig = Rig::new(scenario);
        rig.config.timing.stall_frames = 3;

        let outcome = rig.clear().move_to(Target::enemy(TARGET), true).unwrap();
        assert_eq!(outcome, MovementOutcome::CombatStarted);
        // Ticks 4 and 7 complete a run of three still frames.
        assert_eq!(rig.device.taps(), vec![TARGET, TARGET]);
    }

    #[test]
    fn test_info_dialog_closed_without_spending_budget() {
        let dialog = Scene::new("dialog")
            .show(patterns::MENU_ALERT_INFO, Region::new(700, 300, 500, 300))
            .on_tap(layout::CLOSE_INFO_DIALOG, "moving");
        let scenario = Scenario::new("dialog")
            .scene(dialog)
            .scene(Scene::new("moving").after_captures(2, "loading"))
            .scene(Scene::new("loading").show(patterns::MENU_LOADING, LOADING));
        let mut rig = Rig::new(scenario);
        rig.strategy.budget_policy = BudgetPolicy::Abort;
        rig.strategy.movement_budget = 3;

        let outcome = rig.clear().move_to(Target::enemy(TARGET), false).unwrap();
        assert_eq!(outcome, MovementOutcome::CombatStarted);
        let taps = rig.device.taps();
        assert_eq!(taps.len(), 1);
        assert!(layout::CLOSE_INFO_DIALOG.contains(taps[0]));
    }

    #[test]
    fn test_emergency_repair_waits_for_the_repair_menu() {
        let menu = Region::new(700, 300, 500, 400);
        let use_repair = Region::new(1000, 750, 200, 60);
        let scenario = Scenario::new("map")
            .scene(Scene::new("map").on_tap(layout::EMERGENCY_REPAIR_IN_MAP, "repair"))
            .scene(
                Scene::new("repair")
                    .show(patterns::MENU_EMERGENCY_REPAIR, menu)
                    .show(patterns::BUTTON_USE_REPAIR, use_repair)
                    .on_tap(use_repair, "repaired"),
            )
            .scene(
                Scene::new("repaired")
                    .show(patterns::MENU_EMERGENCY_REPAIR, menu)
                    .on_tap(layout::CLOSE_STRATEGY_MENU, "map"),
            );
        let mut rig = Rig::new(scenario);

        rig.clear().emergency_repair().unwrap();
        assert_eq!(rig.device.visited(), ["map", "repair", "repaired", "map"]);
    }

    #[test]
    fn test_emergency_repair_menu_missing_is_not_fatal() {
        let mut rig = Rig::new(Scenario::new("map").scene(Scene::new("map")));

        rig.clear().emergency_repair().unwrap();
        let taps = rig.device.taps();
        assert_eq!(taps.len(), 3);
        assert!(layout::EMERGENCY_REPAIR_IN_MAP.contains(taps[0]));
        assert!(layout::CLOSE_STRATEGY_MENU.contains(taps[2]));
    }
}
