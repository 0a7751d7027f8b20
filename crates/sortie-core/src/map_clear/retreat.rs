use crate::config::LoopLimits;
use crate::ensured_action::{EnsuredAction, PreconditionPolicy, StabilityCheck};
use crate::error::{Result, SessionError};
use crate::layout;
use crate::screen::Screen;
use sortie_proto::patterns;
use std::time::Duration;
use tracing::{debug, info};

const REWARD_WAIT: Duration = Duration::from_secs(10);

/// Leaves the map and waits for the stage menu.
///
/// With `force`, retreat is pressed while the map is up. Without it only
/// the screens that follow a cleared stage are worked through.
pub fn drain_retreat(screen: &mut Screen, limits: &LoopLimits, force: bool) -> Result<()> {
    let similarity = screen.timing().default_similarity;
    for _ in 0..limits.retreat {
        screen.refresh()?;

        if screen.is_visible(patterns::MENU_ATTACK) {
            info!("Back at the stage menu");
            return Ok(());
        }
        if screen.is_visible(patterns::MENU_FORMATION) {
            debug!("Leaving the formation screen");
            screen.tap_region(layout::MENU_NAV_BACK)?;
            continue;
        }
        if force && screen.is_visible(patterns::BUTTON_RETREAT) {
            info!("Retreating from the map");
            let press = EnsuredAction::tap_region(layout::RETREAT_BUTTON)
                .requires(patterns::BUTTON_RETREAT, PreconditionPolicy::BeforeFirst)
                .expect([patterns::MENU_BUTTON_CONFIRM])
                .with_settle(Duration::from_millis(500))
                .with_stability(StabilityCheck::frames(2).with_max_samples(limits.stability_samples))
                .with_max_attempts(limits.ensured_attempts);
            screen.perform(&press)?;
            continue;
        }
        if let Some(m) = screen.find(patterns::MENU_BUTTON_CONFIRM, similarity) {
            screen.tap(m.region.center())?;
            continue;
        }
        if let Some(m) = screen.find(patterns::COMBAT_BUTTON_CONFIRM, similarity) {
            debug!("Confirming rewards");
            screen.tap(m.region.center())?;
            screen.wait(REWARD_WAIT);
            continue;
        }
        screen.wait(Duration::from_secs(1));
    }
    Err(SessionError::exhausted("retreat", limits.retreat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::testing::{Scenario, Scene, ScriptedDevice};
    use sortie_proto::Region;

    const CONFIRM: Region = Region::new(1100, 700, 200, 60);

    fn screen(scenario: Scenario) -> (ScriptedDevice, Screen) {
        let device = ScriptedDevice::new(scenario);
        let screen = device.screen(TimingConfig::default()).unwrap().with_seed(3);
        (device, screen)
    }

    #[test]
    fn test_forced_retreat_reaches_stage_menu() {
        let scenario = Scenario::new("map")
            .scene(
                Scene::new("map")
                    .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
                    .on_tap(layout::RETREAT_BUTTON, "confirm"),
            )
            .scene(
                Scene::new("confirm")
                    .show(patterns::MENU_BUTTON_CONFIRM, CONFIRM)
                    .on_tap(CONFIRM, "menu"),
            )
            .scene(Scene::new("menu").show(patterns::MENU_ATTACK, Region::new(1500, 900, 100, 60)));
        let (device, mut screen) = screen(scenario);

        drain_retreat(&mut screen, &LoopLimits::default(), true).unwrap();
        assert_eq!(device.visited(), ["map", "confirm", "menu"]);
    }

    #[test]
    fn test_unforced_drain_leaves_map_alone() {
        let scenario = Scenario::new("map").scene(
            Scene::new("map")
                .show(patterns::BUTTON_RETREAT, layout::RETREAT_BUTTON)
                .on_tap(layout::RETREAT_BUTTON, "confirm"),
        );
        let (device, mut screen) = screen(scenario);
        let limits = LoopLimits {
            retreat: 5,
            ..LoopLimits::default()
        };
        let err = drain_retreat(&mut screen, &limits, false).unwrap_err();
        assert!(matches!(err, SessionError::LoopExhausted { loop_name: "retreat", cap: 5 }));
        assert!(device.taps().is_empty());
    }

    #[test]
    fn test_formation_screen_is_backed_out() {
        let scenario = Scenario::new("formation")
            .scene(
                Scene::new("formation")
                    .show(patterns::MENU_FORMATION, Region::new(800, 60, 300, 50))
                    .on_tap(layout::MENU_NAV_BACK, "menu"),
            )
            .scene(Scene::new("menu").show(patterns::MENU_ATTACK, Region::new(1500, 900, 100, 60)));
        let (device, mut screen) = screen(scenario);
        drain_retreat(&mut screen, &LoopLimits::default(), false).unwrap();
        assert_eq!(device.taps().len(), 1);
    }
}
