//! Catalogue of reference templates the engine asks the perception port for.
//!
//! Names mirror the template asset layout (`family/name`).

// Menus and dialogs
pub const MENU_ATTACK: &str = "menu/attack";
pub const MENU_BUTTON_CONFIRM: &str = "menu/button_confirm";
pub const MENU_BUTTON_SORT: &str = "menu/button_sort";
pub const MENU_ITEM_FOUND: &str = "menu/item_found";
pub const MENU_ALERT_INFO: &str = "menu/alert_info";
pub const MENU_TOUCH_TO_CONTINUE: &str = "menu/touch_to_continue";
pub const MENU_DROP_COMMON: &str = "menu/drop_common";
pub const MENU_DROP_RARE: &str = "menu/drop_rare";
pub const MENU_DROP_ELITE: &str = "menu/drop_elite";
pub const MENU_DROP_SSR: &str = "menu/drop_ssr";

// Sortie flow
pub const BUTTON_GO: &str = "combat/button_go";
pub const MENU_SELECT_FLEET: &str = "combat/menu_select_fleet";
pub const MENU_FORMATION: &str = "combat/menu_formation";
pub const MENU_LOADING: &str = "combat/menu_loading";
pub const AUTO_COMBAT_OFF: &str = "combat/auto_combat_off";

// In-map state
pub const BUTTON_RETREAT: &str = "combat/button_retreat";
pub const FLEET_ARROW: &str = "combat/fleet_arrow";
pub const FLEET_AMMO: &str = "combat/fleet_ammo";
pub const FLEET_LOCK: &str = "combat/fleet_lock";
pub const QUESTION_MARK: &str = "combat/question_mark";
pub const ALERT_UNABLE_REACH: &str = "combat/alert_unable_reach";
pub const ALERT_UNABLE_BATTLE: &str = "combat/alert_unable_battle";
pub const ALERT_AMMO_SUPPLIES: &str = "combat/alert_ammo_supplies";
pub const ALERT_MORALE_LOW: &str = "combat/alert_morale_low";
pub const BUTTON_EVADE: &str = "combat/button_evade";
pub const ALERT_FAILED_EVADE: &str = "combat/alert_failed_evade";
pub const MENU_EMERGENCY_REPAIR: &str = "combat/menu_emergency_repair";
pub const BUTTON_USE_REPAIR: &str = "combat/button_use_repair";

// Battle
pub const COMBAT_PAUSE: &str = "combat/combat_pause";
pub const AUTOMATION_DISENGAGE: &str = "combat/automation_disengage";
pub const COMBAT_BUTTON_CONFIRM: &str = "combat/button_confirm";
pub const ALERT_LOCK: &str = "combat/alert_lock";
pub const DEFEAT_CLOSE_BUTTON: &str = "combat/defeat_close_button";
pub const COMBAT_COMMANDER: &str = "combat/commander";
pub const ALERT_FLEET_CANNOT_BE_FORMED: &str = "combat/alert_fleet_cannot_be_formed";

// Enemy markers
pub const ENEMY_FLEET_BOSS: &str = "enemy/fleet_boss";
pub const ENEMY_MAIN_FLEET: &str = "enemy/main_fleet";
pub const ENEMY_FLEET_LEVEL: &str = "enemy/fleet_level";
pub const ENEMY_FLEET_1_DOWN: &str = "enemy/fleet_1_down";
pub const ENEMY_FLEET_2_DOWN: &str = "enemy/fleet_2_down";
pub const ENEMY_FLEET_2_UP: &str = "enemy/fleet_2_up";
pub const ENEMY_FLEET_3_DOWN: &str = "enemy/fleet_3_down";
pub const ENEMY_FLEET_3_UP: &str = "enemy/fleet_3_up";
pub const ENEMY_SIREN_ELITE: &str = "enemy/siren_elite";
pub const ENEMY_SIREN_SCOUT: &str = "enemy/siren_scout";

/// Template of the map tile on the map selection screen.
pub fn map_tile(map: &str) -> String {
    format!("maps/map_{map}")
}

/// Template of the fixed landmark used to reposition the camera on a map.
pub fn map_anchor(map: &str) -> String {
    format!("map_anchors/map_{map}")
}
