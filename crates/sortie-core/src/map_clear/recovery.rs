use super::{BattleOutcome, MapClear, MovementOutcome};
use crate::error::{Result, SessionError};
use crate::targeting::TargetQuery;
use sortie_proto::{Point, patterns};
use std::time::Duration;
use tracing::{info, warn};

impl MapClear<'_> {
    /// Clears the way to a location the game refused to path to.
    ///
    /// Attacks the enemy closest to `blocked`. Blockers that are themselves
    /// unreachable are blacklisted and the next closest is tried. Returns the
    /// battle outcome if a battle was fought.
    pub(super) fn recover_blocked(&mut self, blocked: Point, boss: bool) -> Result<Option<BattleOutcome>> {
        self.session.blacklist.clear();
        let query = TargetQuery {
            reference: Some(blocked),
            include_mystery_nodes: false,
            priority_mystery_nodes: false,
            boss_mode: boss,
            ..self.target_query()
        };

        let cap = self.config.limits.blocked_recovery;
        let mut tries = 0;
        let blocker = loop {
            let blocker = self.pick_target(query)?;
            self.session.target = Some(blocker);
            info!(%blocker, %blocked, "Attacking what blocks the path");

            self.screen.wait(Duration::from_secs(1));
            self.screen.tap(blocker.location)?;
            self.screen.refresh()?;
            if !self.screen.is_visible(patterns::ALERT_UNABLE_REACH) {
                break blocker;
            }

            tries += 1;
            if tries >= cap {
                return Err(SessionError::exhausted("blocked_recovery", cap));
            }
            warn!(%blocker, "Blocker is unreachable too");
            self.session.blacklist.push(blocker.location);
        };

        match self.move_to(blocker, true)? {
            MovementOutcome::CombatStarted => Ok(Some(self.resolve_battle(false, true)?)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Rig, enemy_at, fleet_marker_at, with_battle};
    use super::*;
    use crate::layout;
    use crate::testing::{Scenario, Scene};
    use sortie_proto::Region;

    const BLOCKED: Point = Point::new(1000, 300);
    const NEAR: Point = Point::new(950, 350);
    const FAR: Point = Point::new(400, 700);
    const FLEET: Point = Point::new(600, 800);

    fn map_scene(name: &str) -> Scene {
        Scene::new(name)
            .show(patterns::FLEET_AMMO, fleet_marker_at(FLEET))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(NEAR))
            .show(patterns::ENEMY_FLEET_LEVEL, enemy_at(FAR))
            .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
    }

    #[test]
    fn test_unreachable_blocker_is_skipped() {
        let map = map_scene("map").on_tap(Region::centered(NEAR, 20, 20), "refused");
        let refused = map_scene("refused")
            .show(patterns::ALERT_UNABLE_REACH, Region::new(700, 450, 300, 60))
            .on_tap(Region::centered(FAR, 20, 20), "loading");
        let scenario = with_battle(Scenario::new("map").scene(map).scene(refused), "loading", "after")
            .scene(Scene::new("after").show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON));
        let mut rig = Rig::new(scenario);
        let mut clear = rig.clear();

        let outcome = clear.recover_blocked(BLOCKED, false).unwrap();
        assert_eq!(outcome, Some(BattleOutcome::Victory));
        assert!(clear.session.blacklist.contains(NEAR));
        drop(clear);
        assert_eq!(rig.device.taps()[..2], [NEAR, FAR]);
    }

    #[test]
    fn test_recovery_attempts_are_bounded() {
        let map = map_scene("map")
            .show(patterns::ALERT_UNABLE_REACH, Region::new(700, 450, 300, 60));
        let mut rig = Rig::new(Scenario::new("map").scene(map));
        rig.config.limits.blocked_recovery = 2;
        let err = rig.clear().recover_blocked(BLOCKED, false).unwrap_err();
        assert!(matches!(err, SessionError::LoopExhausted { loop_name: "blocked_recovery", cap: 2 }));
    }
}
