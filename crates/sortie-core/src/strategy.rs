//! Per-map clearing strategy.
//!
//! Most maps run the generic loop with only a kill threshold. A handful need
//! extra camera work, scripted openings or a different answer to "the fleet
//! has been walking for too long".

use crate::config::CombatConfig;
use serde::{Deserialize, Serialize};
use sortie_proto::Point;
use std::collections::BTreeMap;
use tracing::debug;

/// What the movement loop does when its tick budget runs out without a
/// definitive event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Treat the target as reached.
    AssumeArrived,
    /// Blacklist the target and walk towards the next closest one.
    BlacklistAndReplan,
    /// Give up on the session.
    Abort,
}

/// A landmark used to put the camera back in a known position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Where the anchor's match origin sits when the camera is reset.
    pub expected: Point,
    pub tolerance: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSwipe {
    pub from: Point,
    pub to: Point,
    pub duration_ms: u32,
}

impl CameraSwipe {
    pub const fn new(from: (i32, i32), to: (i32, i32), duration_ms: u32) -> Self {
        Self {
            from: Point::new(from.0, from.1),
            to: Point::new(to.0, to.1),
            duration_ms,
        }
    }
}

/// A scripted move made before the generic loop takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningStep {
    /// Walk to the closest mystery node.
    CollectMysteryNode,
    SwitchFleet,
    ResetCamera,
    /// Tap a tile and fight whatever is there.
    Engage(Point),
}

/// Walk a fleet to a waypoint and hand over to the other fleet after a number of kills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidSessionSwitch {
    pub after_kills: u32,
    pub waypoint: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStrategy {
    pub map: String,
    pub kills_before_boss: u32,
    pub anchor: Option<Anchor>,
    pub reset_camera_at_start: bool,
    pub reset_camera_after_switch: bool,
    pub opening_pans: Vec<CameraSwipe>,
    pub opening: Vec<OpeningStep>,
    /// Camera move after collecting a mystery node.
    pub post_mystery_pan: Option<CameraSwipe>,
    pub mid_session_switch: Option<MidSessionSwitch>,
    pub collect_mystery_before_boss: bool,
    /// First pan of the boss search cycle after switching to the boss fleet.
    pub boss_pan_start: usize,
    /// Only target enemies wearing the main-fleet badge, when any do.
    pub focus_main_fleet: bool,
    /// Never target mystery nodes regardless of configuration.
    pub skip_mystery_nodes: bool,
    pub detect_unreachable_while_moving: bool,
    pub mystery_confidence: f32,
    /// Movement ticks before the budget policy applies.
    pub movement_budget: u32,
    /// Re-tap the target every this many ticks while no arrow is seen.
    pub reissue_every: u32,
    pub budget_policy: BudgetPolicy,
    /// Replaces `budget_policy` in clearing mode.
    pub clearing_budget_policy: Option<BudgetPolicy>,
    pub use_emergency_repair: bool,
}

impl MapStrategy {
    /// The generic strategy for a map without special handling.
    pub fn generic(map: impl Into<String>, kills_before_boss: u32) -> Self {
        Self {
            map: map.into(),
            kills_before_boss,
            anchor: None,
            reset_camera_at_start: false,
            reset_camera_after_switch: false,
            opening_pans: Vec::new(),
            opening: Vec::new(),
            post_mystery_pan: None,
            mid_session_switch: None,
            collect_mystery_before_boss: false,
            boss_pan_start: 0,
            focus_main_fleet: false,
            skip_mystery_nodes: false,
            detect_unreachable_while_moving: false,
            mystery_confidence: 0.95,
            movement_budget: 41,
            reissue_every: 3,
            budget_policy: BudgetPolicy::BlacklistAndReplan,
            clearing_budget_policy: None,
            use_emergency_repair: false,
        }
    }

    /// Story maps are numbered (`3-4`); event maps are lettered (`E-B3`).
    pub fn is_story_map(&self) -> bool {
        self.map.starts_with(|c: char| c.is_ascii_digit())
    }

    /// Event maps have no mystery nodes.
    pub fn has_mystery_nodes(&self) -> bool {
        self.is_story_map() && !self.skip_mystery_nodes
    }

    pub fn budget_policy_for(&self, clearing_mode: bool) -> BudgetPolicy {
        match self.clearing_budget_policy {
            Some(policy) if clearing_mode => policy,
            _ => self.budget_policy,
        }
    }

    fn apply(&mut self, over: &StrategyOverride) {
        if let Some(k) = over.kills_before_boss {
            self.kills_before_boss = k;
        }
        if let Some(policy) = over.budget_policy {
            self.budget_policy = policy;
        }
        if let Some(budget) = over.movement_budget {
            self.movement_budget = budget;
        }
        if let Some(every) = over.reissue_every {
            self.reissue_every = every;
        }
        if over.anchor.is_some() {
            self.anchor = over.anchor;
        }
        if let Some(pans) = &over.opening_pans {
            self.opening_pans = pans.clone();
        }
        if let Some(opening) = &over.opening {
            self.opening = opening.clone();
        }
        if let Some(focus) = over.focus_main_fleet {
            self.focus_main_fleet = focus;
        }
        if let Some(conf) = over.mystery_confidence {
            self.mystery_confidence = conf;
        }
    }
}

/// User-supplied changes to a map's strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyOverride {
    pub kills_before_boss: Option<u32>,
    pub budget_policy: Option<BudgetPolicy>,
    pub movement_budget: Option<u32>,
    pub reissue_every: Option<u32>,
    pub anchor: Option<Anchor>,
    pub opening_pans: Option<Vec<CameraSwipe>>,
    pub opening: Option<Vec<OpeningStep>>,
    pub focus_main_fleet: Option<bool>,
    pub mystery_confidence: Option<f32>,
}

/// Strategies for every known map.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    maps: BTreeMap<String, MapStrategy>,
}

#[rustfmt::skip]
const KILLS_BEFORE_BOSS: &[(&str, u32)] = &[
    ("1-1", 1), ("1-2", 2), ("1-3", 2), ("1-4", 3),
    ("2-1", 2), ("2-2", 3), ("2-3", 3), ("2-4", 3),
    ("3-1", 3), ("3-2", 3), ("3-3", 3), ("3-4", 3),
    ("4-1", 3), ("4-2", 3), ("4-3", 3), ("4-4", 4),
    ("5-1", 4), ("5-2", 4), ("5-3", 4), ("5-4", 4),
    ("6-1", 4), ("6-2", 4), ("6-3", 4), ("6-4", 5),
    ("7-1", 5), ("7-2", 5), ("7-3", 5), ("7-4", 5),
    ("8-1", 4), ("8-2", 4), ("8-3", 4), ("8-4", 4),
    ("9-1", 5), ("9-2", 5), ("9-3", 5), ("9-4", 5),
    ("10-1", 6), ("10-2", 6), ("10-3", 6), ("10-4", 6),
    ("11-1", 6), ("11-2", 6), ("11-3", 6), ("11-4", 6),
    ("12-1", 6), ("12-2", 6), ("12-3", 6), ("12-4", 6),
    ("13-1", 6), ("13-2", 6), ("13-3", 6), ("13-4", 7),
];

const OPENING_PANS: &[(&str, CameraSwipe)] = &[
    ("E-B3", CameraSwipe::new((960, 540), (1060, 670), 300)),
    ("E-C3", CameraSwipe::new((1200, 540), (800, 540), 300)),
    ("4-2", CameraSwipe::new((1000, 700), (1000, 400), 300)),
    ("5-1", CameraSwipe::new((1000, 400), (1000, 700), 300)),
    ("12-2", CameraSwipe::new((1000, 570), (1300, 540), 300)),
    ("12-3", CameraSwipe::new((1250, 530), (1300, 540), 300)),
    ("12-4", CameraSwipe::new((960, 300), (960, 540), 300)),
    ("13-1", CameraSwipe::new((1020, 500), (1300, 540), 300)),
    ("13-2", CameraSwipe::new((1125, 550), (1300, 540), 300)),
    ("13-3", CameraSwipe::new((1150, 510), (1300, 540), 300)),
    ("13-4", CameraSwipe::new((1200, 450), (1300, 540), 300)),
];

const ANCHORS: &[(&str, Anchor)] = &[
    ("7-2", Anchor { expected: Point::new(1564, 677), tolerance: 30 }),
    ("6-1", Anchor { expected: Point::new(313, 738), tolerance: 10 }),
    ("2-1", Anchor { expected: Point::new(500, 557), tolerance: 30 }),
    ("E-C1", Anchor { expected: Point::new(1410, 252), tolerance: 30 }),
    ("E-C3", Anchor { expected: Point::new(1748, 406), tolerance: 30 }),
    ("E-D3", Anchor { expected: Point::new(818, 748), tolerance: 30 }),
];

impl Default for StrategyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StrategyTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        let mut maps: BTreeMap<String, MapStrategy> = KILLS_BEFORE_BOSS
            .iter()
            .map(|&(map, kills)| (map.to_string(), MapStrategy::generic(map, kills)))
            .collect();

        // Event maps have no default kill count; the configuration supplies it.
        for map in ["E-B3", "E-C1", "E-C3", "E-D3"] {
            maps.insert(map.to_string(), MapStrategy::generic(map, 0));
        }

        for (map, swipe) in OPENING_PANS {
            if let Some(s) = maps.get_mut(*map) {
                s.opening_pans.push(*swipe);
            }
        }
        for (map, anchor) in ANCHORS {
            if let Some(s) = maps.get_mut(*map) {
                s.anchor = Some(*anchor);
            }
        }

        if let Some(s) = maps.get_mut("1-3") {
            s.skip_mystery_nodes = true;
        }
        if let Some(s) = maps.get_mut("2-1") {
            s.budget_policy = BudgetPolicy::Abort;
        }
        if let Some(s) = maps.get_mut("2-3") {
            s.post_mystery_pan = Some(CameraSwipe::new((1000, 350), (1000, 700), 1500));
        }
        if let Some(s) = maps.get_mut("5-1") {
            s.opening = vec![OpeningStep::CollectMysteryNode, OpeningStep::SwitchFleet];
            s.clearing_budget_policy = Some(BudgetPolicy::AssumeArrived);
        }
        if let Some(s) = maps.get_mut("6-1") {
            s.reset_camera_at_start = true;
            s.focus_main_fleet = true;
            s.detect_unreachable_while_moving = true;
            s.mystery_confidence = 0.75;
            s.collect_mystery_before_boss = true;
            s.mid_session_switch = Some(MidSessionSwitch {
                after_kills: 2,
                waypoint: Point::new(475, 575),
            });
            s.clearing_budget_policy = Some(BudgetPolicy::AssumeArrived);
        }
        if let Some(s) = maps.get_mut("7-2") {
            s.use_emergency_repair = true;
            s.clearing_budget_policy = Some(BudgetPolicy::AssumeArrived);
        }
        for map in ["E-B3", "E-D3"] {
            if let Some(s) = maps.get_mut(map) {
                s.boss_pan_start = 3;
            }
        }
        if let Some(s) = maps.get_mut("E-D3") {
            s.reset_camera_after_switch = true;
            s.opening = vec![
                OpeningStep::Engage(Point::new(980, 140)),
                OpeningStep::Engage(Point::new(1155, 240)),
                OpeningStep::Engage(Point::new(1630, 900)),
            ];
        }

        Self { maps }
    }

    /// Applies user overrides, adding maps the table does not know.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, StrategyOverride>) -> Self {
        for (map, over) in overrides {
            self.maps
                .entry(map.clone())
                .or_insert_with(|| MapStrategy::generic(map.clone(), 0))
                .apply(over);
        }
        self
    }

    pub fn get(&self, map: &str) -> Option<&MapStrategy> {
        self.maps.get(map)
    }

    /// Strategy for the configured map. A non-zero `kills_before_boss` in
    /// the combat section always wins; unknown maps fall back to it.
    pub fn resolve(&self, combat: &CombatConfig) -> MapStrategy {
        let mut strategy = self
            .maps
            .get(&combat.map)
            .cloned()
            .unwrap_or_else(|| MapStrategy::generic(combat.map.clone(), combat.kills_before_boss));
        if combat.kills_before_boss != 0 {
            strategy.kills_before_boss = combat.kills_before_boss;
        }
        debug!(map = %strategy.map, kills_before_boss = strategy.kills_before_boss, "Resolved map strategy");
        strategy
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapStrategy> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combat(map: &str, kills: u32) -> CombatConfig {
        CombatConfig {
            map: map.to_string(),
            kills_before_boss: kills,
            ..CombatConfig::default()
        }
    }

    #[test]
    fn test_builtin_kill_thresholds() {
        let table = StrategyTable::builtin();
        assert_eq!(table.get("1-1").unwrap().kills_before_boss, 1);
        assert_eq!(table.get("4-4").unwrap().kills_before_boss, 4);
        assert_eq!(table.get("6-4").unwrap().kills_before_boss, 5);
        assert_eq!(table.get("13-4").unwrap().kills_before_boss, 7);
        assert_eq!(table.get("11-2").unwrap().kills_before_boss, 6);
    }

    #[test]
    fn test_config_threshold_overrides_table() {
        let table = StrategyTable::builtin();
        assert_eq!(table.resolve(&combat("3-4", 0)).kills_before_boss, 3);
        assert_eq!(table.resolve(&combat("3-4", 5)).kills_before_boss, 5);
    }

    #[test]
    fn test_unknown_map_uses_config_threshold() {
        let table = StrategyTable::builtin();
        let strategy = table.resolve(&combat("14-1", 8));
        assert_eq!(strategy.kills_before_boss, 8);
        assert_eq!(strategy.budget_policy, BudgetPolicy::BlacklistAndReplan);
    }

    #[test]
    fn test_special_maps() {
        let table = StrategyTable::builtin();
        let six_one = table.get("6-1").unwrap();
        assert_eq!(six_one.anchor.unwrap().tolerance, 10);
        assert!(six_one.focus_main_fleet);
        assert_eq!(six_one.budget_policy_for(true), BudgetPolicy::AssumeArrived);
        assert_eq!(six_one.budget_policy_for(false), BudgetPolicy::BlacklistAndReplan);

        assert_eq!(table.get("2-1").unwrap().budget_policy_for(true), BudgetPolicy::Abort);
        assert_eq!(table.get("5-1").unwrap().opening.len(), 2);
        assert!(!table.get("1-3").unwrap().has_mystery_nodes());
        assert_eq!(table.get("4-2").unwrap().opening_pans.len(), 1);
    }

    #[test]
    fn test_event_maps_have_no_mystery_nodes() {
        let table = StrategyTable::builtin();
        let event = table.get("E-D3").unwrap();
        assert!(!event.is_story_map());
        assert!(!event.has_mystery_nodes());
        assert!(table.get("3-2").unwrap().has_mystery_nodes());
    }

    #[test]
    fn test_overrides_add_and_modify_maps() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "3-4".to_string(),
            StrategyOverride {
                budget_policy: Some(BudgetPolicy::Abort),
                movement_budget: Some(10),
                ..StrategyOverride::default()
            },
        );
        overrides.insert(
            "E-A1".to_string(),
            StrategyOverride {
                kills_before_boss: Some(2),
                ..StrategyOverride::default()
            },
        );
        let table = StrategyTable::builtin().with_overrides(&overrides);

        let modified = table.get("3-4").unwrap();
        assert_eq!(modified.budget_policy, BudgetPolicy::Abort);
        assert_eq!(modified.movement_budget, 10);
        assert_eq!(modified.kills_before_boss, 3);
        assert_eq!(table.get("E-A1").unwrap().kills_before_boss, 2);
    }
}
