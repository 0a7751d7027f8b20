use super::{BattleOutcome, MapClear, MovementOutcome};
use crate::error::{Result, SessionError};
use crate::layout::{self, FLEET_STEP, Pan, SCREEN_CENTER};
use sortie_proto::{ExitCode, Point, Target, patterns};
use std::time::Duration;
use tracing::{debug, info, warn};

const BOSS_SIMILARITY: f32 = 0.9;
/// From the boss template's match origin to the tile to tap.
const BOSS_OFFSET: (i32, i32) = (50, 25);
const CENTERING_SWIPE_MS: u32 = 300;

/// Swipe that drags a boss at `boss` towards the middle of the screen.
///
/// Both endpoints are shifted sideways (further for bosses low on the
/// screen) along the line through the boss and the screen center, so the
/// drag never starts on the boss tile itself.
pub fn centering_swipe(boss: Point) -> (Point, Point) {
    let sign = if boss.x < SCREEN_CENTER.x { 1 } else { -1 };
    let module = if boss.y > 300 { 175 } else { 75 };
    let h = sign * module;

    let run = f64::from(SCREEN_CENTER.x - boss.x);
    let slope = if run == 0.0 {
        0.0
    } else {
        -f64::from(SCREEN_CENTER.y - boss.y) / run
    };
    let dy = (slope * f64::from(h)).round() as i32;

    (
        Point::new(boss.x + h, boss.y + dy),
        Point::new(SCREEN_CENTER.x + h, SCREEN_CENTER.y + dy),
    )
}

impl MapClear<'_> {
    pub(super) fn find_boss(&self) -> Option<Point> {
        self.screen
            .find_scaled(patterns::ENEMY_FLEET_BOSS, BOSS_SIMILARITY, None)
            .map(|m| m.region.origin().offset(BOSS_OFFSET.0, BOSS_OFFSET.1))
    }

    /// Pans around the map until the boss shows up.
    fn search_boss(&mut self, start: usize) -> Result<Point> {
        let cap = self.config.limits.boss_search_pans;
        for pans in 0..cap {
            self.screen.refresh()?;
            if let Some(boss) = self.find_boss() {
                return Ok(boss);
            }
            let pan = Pan::nth(start + pans as usize);
            debug!(?pan, "Looking for the boss");
            self.screen.pan(pan)?;
            self.camera_moved();
        }
        self.screen.refresh()?;
        self.find_boss()
            .ok_or_else(|| SessionError::exhausted("boss_search", cap))
    }

    fn wait_through_mist(&mut self) -> Result<Point> {
        let cap = self.config.limits.mist_wait;
        for _ in 0..cap {
            self.screen.wait_refresh(Duration::from_secs(1))?;
            if let Some(boss) = self.find_boss() {
                return Ok(boss);
            }
            debug!("Boss hidden, waiting for the mist to clear");
        }
        Err(SessionError::exhausted("mist_wait", cap))
    }

    /// Everything between "boss spotted" and the boss battle.
    pub(super) fn prepare_boss(&mut self) -> Result<()> {
        info!(kills = self.session.kills_count, "Boss found");
        if self.strategy.collect_mystery_before_boss && self.collect_mystery_before_boss()? {
            return Ok(());
        }

        let boss = if self.config.combat.boss_fleet {
            self.switch_to_boss_fleet()?
        } else {
            self.screen.refresh()?;
            match self.find_boss() {
                Some(boss) => boss,
                None => self.wait_through_mist()?,
            }
        };
        self.engage_boss(Target::boss(boss))
    }

    /// Returns true if the session ended on the way.
    fn collect_mystery_before_boss(&mut self) -> Result<bool> {
        self.reset_camera()?;
        let confidence = self.strategy.mystery_confidence;
        let nodes = self
            .targets
            .find_mystery_nodes(self.screen, &self.session.blacklist, confidence)?;
        let Some(&node) = nodes.first() else {
            return Ok(false);
        };

        info!(%node, "Collecting the mystery node before the boss");
        self.screen.tap(node)?;
        match self.move_to(Target::mystery_node(node), true)? {
            MovementOutcome::CombatStarted => {
                self.resolve_battle(false, true)?;
            }
            MovementOutcome::Interrupted => return Ok(true),
            MovementOutcome::Arrived | MovementOutcome::Unreachable => {}
        }
        self.targets.invalidate();
        Ok(self.session.is_finished())
    }

    fn switch_to_boss_fleet(&mut self) -> Result<Point> {
        info!("Switching to the boss fleet");
        self.screen.tap_region(layout::SWITCH_FLEET)?;
        self.screen.wait_refresh(Duration::from_secs(2))?;
        self.camera_moved();

        let boss = self.search_boss(self.strategy.boss_pan_start)?;
        let (from, to) = centering_swipe(boss);
        debug!(%boss, %from, %to, "Centering the boss");
        self.screen.swipe(from, to, CENTERING_SWIPE_MS)?;
        self.camera_moved();
        self.screen.wait_refresh(Duration::from_secs(1))?;
        match self.find_boss() {
            Some(boss) => Ok(boss),
            None => self.wait_through_mist(),
        }
    }

    /// Walks to the boss and fights it, clearing blockers on the way.
    pub(super) fn engage_boss(&mut self, boss: Target) -> Result<()> {
        let cap = self.config.limits.boss_engage;
        let mut boss = boss;

        for attempt in 1..=cap {
            self.targets.invalidate();
            self.session.blacklist.clear();
            self.session.fleet_location = None;
            self.session.target = Some(boss);
            info!(%boss, attempt, "Engaging the boss");

            self.screen.tap(boss.location)?;
            self.screen.wait_refresh(Duration::from_millis(500))?;

            if self.screen.is_visible(patterns::ALERT_UNABLE_REACH) {
                warn!("Boss unreachable, clearing the way");
                self.screen.wait(Duration::from_secs(1));
                let outcome = self.recover_blocked(boss.location, true)?;
                if outcome == Some(BattleOutcome::Defeat) || self.session.is_finished() {
                    return Ok(());
                }
                boss = Target::boss(self.relocate_boss()?);
                continue;
            }

            match self.move_to(boss, true)? {
                MovementOutcome::Interrupted => return Ok(()),
                MovementOutcome::CombatStarted => match self.resolve_battle(true, true)? {
                    BattleOutcome::Victory => {
                        self.session.finish(ExitCode::BossDefeated);
                    }
                    BattleOutcome::Defeat => {
                        self.session.finish(ExitCode::FleetDefeated);
                    }
                    BattleOutcome::Interrupted => return Ok(()),
                },
                MovementOutcome::Arrived | MovementOutcome::Unreachable => {
                    debug!("No battle after moving towards the boss");
                }
            }

            self.screen.refresh()?;
            if self.session.exit_code() == ExitCode::BossDefeated {
                if !self.screen.is_visible(patterns::BUTTON_RETREAT) {
                    return Ok(());
                }
                warn!("Still on the map, the battle was not against the boss");
                self.session.reopen();
            } else if self.session.is_finished() {
                return Ok(());
            }
            boss = Target::boss(self.relocate_boss()?);
        }
        Err(SessionError::exhausted("boss_engage", cap))
    }

    fn relocate_boss(&mut self) -> Result<Point> {
        self.screen.refresh()?;
        match self.find_boss() {
            Some(boss) => Ok(boss),
            None => self.search_boss(0),
        }
    }

    /// Steps the fleet sideways, alternating left and right, in case it is
    /// standing on the boss spawn.
    pub(super) fn uncover_boss(&mut self) -> Result<()> {
        let limit = self.config.limits.boss_uncover;
        if self.session.boss_uncover_attempts >= limit {
            return Err(SessionError::BossUnreachable(limit));
        }
        self.session.boss_uncover_attempts += 1;
        let attempt = self.session.boss_uncover_attempts;

        self.session.fleet_location = None;
        let fleet = self.fleet_location()?;
        let step = if attempt % 2 == 1 { -FLEET_STEP } else { FLEET_STEP };
        let aside = fleet.offset(step, 0);
        info!(%fleet, %aside, attempt, "Boss not visible, moving the fleet aside");

        self.screen.tap(aside)?;
        if self.move_to(Target::empty(aside), false)? == MovementOutcome::CombatStarted {
            self.resolve_battle(false, true)?;
        }
        self.screen.wait_refresh(Duration::from_secs(2))?;
        Ok(())
    }
}
