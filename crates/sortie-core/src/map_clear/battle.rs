use super::MapClear;
use crate::dock::Relief;
use crate::ensured_action::{EnsuredAction, Outcome};
use crate::error::{Result, SessionError};
use crate::layout;
use sortie_proto::{ExitCode, Region, patterns};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOADING_SIMILARITY: f32 = 0.8;
const PAUSE_SIMILARITY: f32 = 0.7;
const SUMMARY_SIMILARITY: f32 = 0.9;

/// Screens between the battle result and the summary confirm button.
/// Overlays come first so they win over the summary underneath.
const SUMMARY_SCREENS: [&str; 7] = [
    patterns::ALERT_LOCK,
    patterns::COMBAT_COMMANDER,
    patterns::MENU_DROP_SSR,
    patterns::MENU_DROP_ELITE,
    patterns::MENU_DROP_RARE,
    patterns::MENU_DROP_COMMON,
    patterns::COMBAT_BUTTON_CONFIRM,
];

/// How a battle ended for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    Victory,
    Defeat,
    /// The battle never started; the session exit code says why.
    Interrupted,
}

/// Where the screens after the battle summary lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aftermath {
    Commission,
    BackOnMap,
    StageCleared,
    Defeat,
}

impl MapClear<'_> {
    /// Starts the battle the fleet walked into, waits for it to finish and
    /// works through the result screens.
    ///
    /// `counts_as_kill` is false for ambushes; they count as combats only.
    pub(super) fn resolve_battle(&mut self, boss: bool, counts_as_kill: bool) -> Result<BattleOutcome> {
        if !self.start_battle()? {
            return Ok(BattleOutcome::Interrupted);
        }
        self.screen
            .wait(Duration::from_millis(self.config.timing.battle_intro_ms));
        self.wait_battle_end()?;
        self.dismiss_summary()?;

        let aftermath = if boss && !self.strategy.is_story_map() {
            self.event_boss_aftermath()?
        } else {
            self.aftermath()?
        };
        debug!(?aftermath, boss, "Battle aftermath");

        if aftermath == Aftermath::Defeat {
            self.handle_defeat(boss)?;
            return Ok(BattleOutcome::Defeat);
        }
        if aftermath == Aftermath::Commission {
            info!("Commission received");
            self.stats.record_commission();
            let next = if boss { patterns::MENU_ATTACK } else { patterns::BUTTON_RETREAT };
            self.perform(EnsuredAction::tap_region(layout::COMMISSION_CONFIRM).expect([next]))?;
        }

        self.session.record_victory(counts_as_kill);
        self.stats.record_victory();
        info!(
            kills = self.session.kills_count,
            combats = self.session.combats_done,
            boss,
            "Battle won"
        );
        Ok(BattleOutcome::Victory)
    }

    /// Returns false when the battle could not start and the session is over.
    fn start_battle(&mut self) -> Result<bool> {
        let cap = self.config.limits.battle_start;
        for _ in 0..cap {
            self.screen.refresh()?;
            if self.screen.find(patterns::MENU_LOADING, LOADING_SIMILARITY).is_some() {
                return Ok(true);
            }

            if self.screen.is_visible(patterns::MENU_BUTTON_SORT) {
                match self.dock.relieve(self.screen)? {
                    Relief::Freed => continue,
                    Relief::Exhausted => {
                        warn!("Dock is full and no handler could make room");
                        self.screen.tap_region(layout::CLOSE_INFO_DIALOG)?;
                        self.session.finish(ExitCode::DockFull);
                        return Ok(false);
                    }
                }
            }

            if self.screen.is_visible(patterns::ALERT_MORALE_LOW) {
                if self.handle_low_morale()? {
                    return Ok(false);
                }
                continue;
            }

            if self.screen.find(patterns::COMBAT_PAUSE, PAUSE_SIMILARITY).is_some() {
                return Ok(true);
            }
            if self.screen.is_visible(patterns::BUTTON_RETREAT) {
                return Err(SessionError::UnexpectedScreen("map shown while starting a battle"));
            }

            self.screen.tap_region(layout::MENU_COMBAT_START)?;
            self.screen.wait(Duration::from_secs(1));
        }
        Err(SessionError::exhausted("battle_start", cap))
    }

    fn wait_battle_end(&mut self) -> Result<()> {
        let cap = self.config.limits.battle_ticks;
        let poll = Duration::from_millis(self.config.timing.battle_poll_ms);
        let mut automation_fixed = false;

        for _ in 0..cap {
            self.screen.refresh()?;
            if self.screen.find(patterns::COMBAT_PAUSE, PAUSE_SIMILARITY).is_none()
                && self
                    .screen
                    .find(patterns::MENU_TOUCH_TO_CONTINUE, SUMMARY_SIMILARITY)
                    .is_some()
            {
                return Ok(());
            }
            if !automation_fixed && self.screen.is_visible(patterns::AUTOMATION_DISENGAGE) {
                warn!("Auto battle is off, turning it on");
                self.screen.tap_region(layout::COMBAT_AUTOMATION)?;
                automation_fixed = true;
            }
            self.screen.wait(poll);
        }
        Err(SessionError::exhausted("battle", cap))
    }

    /// Taps through the result screens until the summary confirm button shows.
    fn dismiss_summary(&mut self) -> Result<()> {
        let cap = self.config.limits.ensured_attempts;
        let mut shown = self.summary_tap(layout::BATTLE_SAFE_TOUCH, None)?;
        for _ in 0..cap {
            let region = match shown {
                patterns::COMBAT_BUTTON_CONFIRM => return Ok(()),
                patterns::ALERT_LOCK => {
                    info!("Locking the new ship");
                    layout::LOCK_SHIP_BUTTON
                }
                patterns::COMBAT_COMMANDER => {
                    debug!("Closing the submarine fleet summary");
                    layout::DISMISS_SURFACE_FLEET_SUMMARY
                }
                screen => {
                    info!(screen, "Ship dropped");
                    layout::DISMISS_SHIP_DROP
                }
            };
            shown = self.summary_tap(region, Some(shown))?;
        }
        Err(SessionError::exhausted("battle_summary", cap))
    }

    /// Taps `region` and waits for any result screen other than `current`.
    fn summary_tap(&mut self, region: Region, current: Option<&str>) -> Result<&'static str> {
        let screens: Vec<&'static str> = SUMMARY_SCREENS
            .into_iter()
            .filter(|screen| Some(*screen) != current)
            .collect();
        let action = EnsuredAction::tap_region(region)
            .expect(screens.iter().copied())
            .with_similarity(SUMMARY_SIMILARITY, SUMMARY_SIMILARITY)
            .with_settle(Duration::from_millis(100));
        let outcome = self.perform(action)?;
        outcome
            .index()
            .and_then(|i| screens.get(i - 1).copied())
            .ok_or(SessionError::UnexpectedScreen("battle summary"))
    }

    fn aftermath(&mut self) -> Result<Aftermath> {
        let confirm = EnsuredAction::tap_region(layout::COMBAT_END_CONFIRM)
            .expect([
                patterns::MENU_BUTTON_CONFIRM,
                patterns::BUTTON_RETREAT,
                patterns::MENU_ATTACK,
                patterns::DEFEAT_CLOSE_BUTTON,
            ])
            .with_settle(Duration::from_secs(3))
            .with_stability(self.stable(2));
        Ok(match self.perform(confirm)? {
            Outcome::Matched(1) => Aftermath::Commission,
            Outcome::Matched(2) => Aftermath::BackOnMap,
            Outcome::Matched(3) => Aftermath::StageCleared,
            _ => Aftermath::Defeat,
        })
    }

    /// Event bosses may drop an item before the commission or stage screens.
    /// Landing back on the map means the fight was not the boss after all.
    fn event_boss_aftermath(&mut self) -> Result<Aftermath> {
        let confirm = EnsuredAction::tap_region(layout::COMBAT_END_CONFIRM)
            .expect([
                patterns::MENU_ITEM_FOUND,
                patterns::MENU_BUTTON_CONFIRM,
                patterns::MENU_ATTACK,
                patterns::DEFEAT_CLOSE_BUTTON,
                patterns::BUTTON_RETREAT,
            ])
            .with_settle(Duration::from_secs(3))
            .with_stability(self.stable(2));
        match self.perform(confirm)? {
            Outcome::Matched(1) => {
                info!("Boss dropped an item");
                let item = EnsuredAction::tap_region(layout::BATTLE_SAFE_TOUCH)
                    .expect([patterns::MENU_BUTTON_CONFIRM, patterns::MENU_ATTACK]);
                Ok(if self.perform(item)?.is(1) {
                    Aftermath::Commission
                } else {
                    Aftermath::StageCleared
                })
            }
            Outcome::Matched(2) => Ok(Aftermath::Commission),
            Outcome::Matched(3) => Ok(Aftermath::StageCleared),
            Outcome::Matched(5) => Ok(Aftermath::BackOnMap),
            _ => Ok(Aftermath::Defeat),
        }
    }

    fn handle_defeat(&mut self, boss: bool) -> Result<()> {
        warn!(boss, "Fleet defeated");
        self.stats.record_defeat();

        let close = EnsuredAction::tap_region(layout::DEFEAT_CLOSE_TOUCH)
            .expect([
                patterns::BUTTON_RETREAT,
                patterns::ALERT_FLEET_CANNOT_BE_FORMED,
                patterns::ALERT_UNABLE_BATTLE,
            ])
            .with_settle(Duration::from_secs(2))
            .with_stability(self.stable(1));
        match self.perform(close)? {
            Outcome::Matched(2) => {
                info!("Fleet cannot be formed, continuing with the remaining fleet");
                self.perform(
                    EnsuredAction::tap_region(layout::CLOSE_INFO_DIALOG).expect([patterns::BUTTON_RETREAT]),
                )?;
                self.targets.invalidate();
                self.session.blacklist.clear();
                self.session.fleet_location = None;
                if boss {
                    self.session.finish(ExitCode::FleetDefeated);
                }
            }
            Outcome::Matched(3) => {
                self.perform(EnsuredAction::tap_region(layout::CLOSE_INFO_DIALOG).expect([patterns::MENU_ATTACK]))?;
                self.session.finish(ExitCode::FleetDefeated);
            }
            _ => {
                self.session.finish(ExitCode::FleetDefeated);
            }
        }
        Ok(())
    }
}
