//! Configuration types for the Sortie engine.
//!
//! Every section is `#[serde(default)]`, so a YAML file only needs the keys it
//! changes.

use crate::strategy::StrategyOverride;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortieConfig {
    pub combat: CombatConfig,
    pub sortie: SortieLimits,
    pub timing: TimingConfig,
    pub limits: LoopLimits,
    pub targeting: TargetingConfig,
    /// Per-map overrides of the built-in strategy table, keyed by map id.
    pub strategies: BTreeMap<String, StrategyOverride>,
    pub diagnostics: DiagnosticsConfig,
}

impl SortieConfig {
    /// Loads and validates configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parses and validates configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let combat = &self.combat;
        if combat.map.trim().is_empty() {
            return Err(ConfigError::Invalid("combat.map must not be empty".into()));
        }
        if !matches!(combat.rotation_slot, 1 | 2) {
            return Err(ConfigError::Invalid(format!(
                "combat.rotation_slot must be 1 or 2, got {}",
                combat.rotation_slot
            )));
        }
        if combat.low_mood_rotation && combat.rotation_fleets.len() < 2 {
            return Err(ConfigError::Invalid(
                "combat.low_mood_rotation needs at least two rotation_fleets".into(),
            ));
        }

        for (name, cap) in self.limits.named() {
            if cap == 0 {
                return Err(ConfigError::Invalid(format!("limits.{name} must be at least 1")));
            }
        }

        let t = &self.targeting;
        for (name, radius) in [
            ("enemy_merge_radius", t.enemy_merge_radius),
            ("mystery_merge_radius", t.mystery_merge_radius),
            ("blacklist_radius", t.blacklist_radius),
        ] {
            if radius <= 0.0 {
                return Err(ConfigError::Invalid(format!("targeting.{name} must be positive")));
            }
        }

        let timing = &self.timing;
        for (name, value) in [
            ("stability_similarity", timing.stability_similarity),
            ("stall_similarity", timing.stall_similarity),
            ("default_similarity", timing.default_similarity),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "timing.{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if timing.stall_frames == 0 {
            return Err(ConfigError::Invalid("timing.stall_frames must be at least 1".into()));
        }
        Ok(())
    }
}

/// What to clear and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Map id, e.g. `3-4` or `E-B3`.
    pub map: String,

    /// Battles before looking for the boss. Zero keeps the built-in value.
    pub kills_before_boss: u32,

    /// Retreat after this many kills. Zero disables.
    pub retreat_after: u32,

    /// Farm normal fleets: lock the fleet, skip evasion, uncover the boss by stepping the fleet.
    pub clearing_mode: bool,

    pub ignore_mystery_nodes: bool,

    /// Prefer mystery nodes over enemies whenever any are visible.
    pub focus_on_mystery_nodes: bool,

    /// Switch to the second fleet before engaging the boss.
    pub boss_fleet: bool,

    /// Confirm low-morale warnings and keep going.
    pub ignore_morale: bool,

    /// Rotate to the next fleet on low morale instead of stopping.
    pub low_mood_rotation: bool,

    /// Fleet numbers to rotate through on low morale.
    pub rotation_fleets: Vec<u32>,

    /// Which fleet slot (1 or 2) the rotation replaces.
    pub rotation_slot: u32,

    /// Switch fleets as soon as the map opens.
    pub fleet_switch_at_beginning: bool,

    pub hide_subs_hunting_range: bool,

    /// Also target siren elite and scout fleets.
    pub siren_elites: bool,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            map: "1-1".to_string(),
            kills_before_boss: 0,
            retreat_after: 0,
            clearing_mode: false,
            ignore_mystery_nodes: false,
            focus_on_mystery_nodes: false,
            boss_fleet: false,
            ignore_morale: false,
            low_mood_rotation: false,
            rotation_fleets: vec![1, 2],
            rotation_slot: 1,
            fleet_switch_at_beginning: false,
            hide_subs_hunting_range: false,
            siren_elites: false,
        }
    }
}

/// When the orchestrator stops repeating sorties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortieLimits {
    /// Hand control back after this many completed clears.
    pub retire_cycle: u32,

    /// Hard stop on completed clears. `None` means unlimited.
    pub max_sorties: Option<u32>,

    pub max_runtime_seconds: u64,
}

impl Default for SortieLimits {
    fn default() -> Self {
        Self {
            retire_cycle: 1,
            max_sorties: None,
            max_runtime_seconds: 4 * 60 * 60,
        }
    }
}

/// Waits and similarity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after every tap or swipe.
    pub tap_delay_ms: u64,

    /// Upper bound of the random extra wait, as a fraction of the requested pause.
    pub jitter: f64,

    /// Threshold used by plain visibility checks.
    pub default_similarity: f32,

    pub stability_interval_ms: u64,
    pub stability_similarity: f32,

    /// Consecutive near-identical frames that count as a stalled move.
    pub stall_frames: u32,
    pub stall_similarity: f32,

    /// Fixed wait after a battle starts loading.
    pub battle_intro_ms: u64,

    /// Cadence of the in-battle completion check.
    pub battle_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tap_delay_ms: 300,
            jitter: 0.5,
            default_similarity: 0.95,
            stability_interval_ms: 200,
            stability_similarity: 0.95,
            stall_frames: 20,
            stall_similarity: 0.9,
            battle_intro_ms: 4000,
            battle_poll_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn tap_delay(&self) -> Duration {
        Duration::from_millis(self.tap_delay_ms)
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms)
    }
}

/// Iteration caps for every polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopLimits {
    pub ensured_attempts: u32,
    pub stability_samples: u32,
    pub fleet_scan: u32,
    pub enemy_scan: u32,
    pub movement_ticks: u32,
    pub max_replans: u32,
    pub blocked_recovery: u32,
    pub battle_start: u32,
    pub battle_ticks: u32,
    pub boss_search_pans: u32,
    pub boss_uncover: u32,
    pub boss_engage: u32,
    pub mist_wait: u32,
    pub retreat: u32,
    pub anchor_pans: u32,
    pub anchor_drags: u32,
    pub session_ticks: u32,
    pub sortie_ticks: u32,
    pub map_wait: u32,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            ensured_attempts: 10,
            stability_samples: 100,
            fleet_scan: 10,
            enemy_scan: 100,
            movement_ticks: 1000,
            max_replans: 3,
            blocked_recovery: 5,
            battle_start: 100,
            battle_ticks: 300,
            boss_search_pans: 15,
            boss_uncover: 3,
            boss_engage: 10,
            mist_wait: 50,
            retreat: 100,
            anchor_pans: 15,
            anchor_drags: 15,
            session_ticks: 500,
            sortie_ticks: 1000,
            map_wait: 600,
        }
    }
}

impl LoopLimits {
    fn named(&self) -> [(&'static str, u32); 19] {
        [
            ("ensured_attempts", self.ensured_attempts),
            ("stability_samples", self.stability_samples),
            ("fleet_scan", self.fleet_scan),
            ("enemy_scan", self.enemy_scan),
            ("movement_ticks", self.movement_ticks),
            ("max_replans", self.max_replans),
            ("blocked_recovery", self.blocked_recovery),
            ("battle_start", self.battle_start),
            ("battle_ticks", self.battle_ticks),
            ("boss_search_pans", self.boss_search_pans),
            ("boss_uncover", self.boss_uncover),
            ("boss_engage", self.boss_engage),
            ("mist_wait", self.mist_wait),
            ("retreat", self.retreat),
            ("anchor_pans", self.anchor_pans),
            ("anchor_drags", self.anchor_drags),
            ("session_ticks", self.session_ticks),
            ("sortie_ticks", self.sortie_ticks),
            ("map_wait", self.map_wait),
        ]
    }
}

/// Detection post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    pub enemy_merge_radius: f64,
    pub mystery_merge_radius: f64,

    /// Points closer than this to a blacklisted location are excluded.
    pub blacklist_radius: f64,

    /// Cached detections are dropped once the blacklist grows past this size.
    pub rescan_threshold: usize,

    /// Blacklist size past which enemy scans start panning the camera.
    pub pan_threshold: usize,

    /// Same, while hunting the boss.
    pub boss_pan_threshold: usize,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            enemy_merge_radius: 67.0,
            mystery_merge_radius: 50.0,
            blacklist_radius: 65.0,
            rescan_threshold: 2,
            pan_threshold: 3,
            boss_pan_threshold: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Where incident logs, snapshots and status files are written.
    pub dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".sortie"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
