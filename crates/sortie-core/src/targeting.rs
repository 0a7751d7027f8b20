//! Target acquisition: turn raw template hits into a prioritized target.
//!
//! Detections are cached per session. A cached list is reused until the
//! caller picks from it (which empties it) or the blacklist grows past the
//! rescan threshold, which forces a fresh scan.

use crate::config::{LoopLimits, TargetingConfig};
use crate::error::{Result, SessionError};
use crate::layout::{self, Pan, PROHIBITED_REGIONS};
use crate::screen::Screen;
use crate::session::Blacklist;
use sortie_proto::{Point, Target, TargetKind, patterns};
use tracing::{debug, info, warn};

/// Starting confidence for enemy scans; it drifts down as scans come up empty.
const ENEMY_START_CONFIDENCE: f32 = 0.99;
/// Below this confidence the scan starts panning instead of loosening further.
const ENEMY_PAN_CONFIDENCE: f32 = 0.985;
const CONFIDENCE_STEP: f32 = 0.005;
const MYSTERY_FLOOR: f32 = 0.93;
const QUESTION_MARK_PROBE: f32 = 0.75;
const QUESTION_MARK_OFFSET: (i32, i32) = (0, 140);
const MAIN_FLEET_CONFIDENCE: f32 = 0.8;

/// An enemy template and how to get from its match origin to the tile the fleet should tap.
#[derive(Debug, Clone, Copy)]
struct EnemyTemplate {
    pattern: &'static str,
    /// Subtracted from the scan confidence.
    slack: f32,
    offset: (i32, i32),
}

const ENEMY_TEMPLATES: [EnemyTemplate; 6] = [
    EnemyTemplate { pattern: patterns::ENEMY_FLEET_LEVEL, slack: 0.025, offset: (-3, -27) },
    EnemyTemplate { pattern: patterns::ENEMY_FLEET_1_DOWN, slack: 0.02, offset: (75, 110) },
    EnemyTemplate { pattern: patterns::ENEMY_FLEET_2_DOWN, slack: 0.02, offset: (75, 90) },
    EnemyTemplate { pattern: patterns::ENEMY_FLEET_3_UP, slack: 0.035, offset: (75, 125) },
    EnemyTemplate { pattern: patterns::ENEMY_FLEET_3_DOWN, slack: 0.035, offset: (75, 100) },
    EnemyTemplate { pattern: patterns::ENEMY_FLEET_2_UP, slack: 0.025, offset: (75, 110) },
];

const SIREN_TEMPLATES: [EnemyTemplate; 2] = [
    EnemyTemplate { pattern: patterns::ENEMY_SIREN_ELITE, slack: 0.05, offset: (60, 100) },
    EnemyTemplate { pattern: patterns::ENEMY_SIREN_SCOUT, slack: 0.05, offset: (60, 100) },
];

/// How the fleet marker is located, in the order tried.
#[derive(Debug, Clone, Copy)]
struct FleetMarker {
    pattern: &'static str,
    confidence: f32,
    offset: (i32, i32),
}

const FLEET_MARKERS: [FleetMarker; 2] = [
    FleetMarker { pattern: patterns::FLEET_AMMO, confidence: 0.8, offset: (140, 225) },
    FleetMarker { pattern: patterns::FLEET_ARROW, confidence: 0.9, offset: (25, 320) },
];

/// Misses after which the fleet scan nudges the camera.
const FLEET_NUDGE_AFTER: u32 = 4;

/// Parameters of one `closest_target` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetQuery {
    /// Last known fleet location. The fleet marker is scanned for when unset.
    pub fleet: Option<Point>,
    /// Distance is measured from here; defaults to the fleet's location.
    pub reference: Option<Point>,
    pub include_mystery_nodes: bool,
    /// With mystery nodes present, ignore enemies entirely.
    pub priority_mystery_nodes: bool,
    pub boss_mode: bool,
    pub focus_main_fleet: bool,
    pub mystery_confidence: f32,
}

impl Default for TargetQuery {
    fn default() -> Self {
        Self {
            fleet: None,
            reference: None,
            include_mystery_nodes: false,
            priority_mystery_nodes: false,
            boss_mode: false,
            focus_main_fleet: false,
            mystery_confidence: 0.95,
        }
    }
}

/// Session-scoped detection caches.
#[derive(Debug, Clone)]
pub struct TargetAcquisition {
    enemies: Vec<Point>,
    mystery_nodes: Vec<Point>,
    pan_cursor: usize,
    settings: TargetingConfig,
    limits: LoopLimits,
    siren_elites: bool,
}

impl TargetAcquisition {
    pub fn new(settings: TargetingConfig, limits: LoopLimits) -> Self {
        Self {
            enemies: Vec::new(),
            mystery_nodes: Vec::new(),
            pan_cursor: 0,
            settings,
            limits,
            siren_elites: false,
        }
    }

    #[must_use]
    pub fn with_siren_elites(mut self, enabled: bool) -> Self {
        self.siren_elites = enabled;
        self
    }

    /// Drops every cached detection.
    pub fn invalidate(&mut self) {
        self.enemies.clear();
        self.mystery_nodes.clear();
    }

    pub fn clear_enemies(&mut self) {
        self.enemies.clear();
    }

    pub fn cached_enemies(&self) -> &[Point] {
        &self.enemies
    }

    pub fn cached_mystery_nodes(&self) -> &[Point] {
        &self.mystery_nodes
    }

    /// Camera pans made by enemy scans so far.
    pub fn pans(&self) -> usize {
        self.pan_cursor
    }

    /// Returns enemy locations, scanning (and panning if needed) until at least one is found.
    pub fn find_enemies(
        &mut self,
        screen: &mut Screen,
        blacklist: &Blacklist,
        boss_mode: bool,
    ) -> Result<Vec<Point>> {
        if blacklist.len() > self.settings.rescan_threshold {
            debug!(blacklist = blacklist.len(), "Blacklist past threshold, rescanning enemies");
            self.enemies.clear();
        }

        let pan_threshold = if boss_mode {
            self.settings.boss_pan_threshold
        } else {
            self.settings.pan_threshold
        };
        let mut confidence = ENEMY_START_CONFIDENCE;
        let mut scans = 0;

        while self.enemies.is_empty() {
            scans += 1;
            if scans > self.limits.enemy_scan {
                return Err(SessionError::exhausted("enemy_scan", self.limits.enemy_scan));
            }
            if blacklist.len() > pan_threshold || confidence < ENEMY_PAN_CONFIDENCE {
                let pan = Pan::nth(self.pan_cursor);
                debug!(?pan, "Panning to look for enemies");
                screen.pan(pan)?;
                self.pan_cursor += 1;
                confidence += CONFIDENCE_STEP;
            }
            screen.refresh()?;

            let templates = ENEMY_TEMPLATES
                .iter()
                .chain(SIREN_TEMPLATES.iter().filter(|_| self.siren_elites));
            let mut raw = Vec::new();
            for template in templates {
                raw.extend(
                    screen
                        .find_all(template.pattern, confidence - template.slack)
                        .into_iter()
                        .map(|m| m.region.origin().offset(template.offset.0, template.offset.1)),
                );
            }
            let candidates = keep_targetable(raw, blacklist);
            self.enemies = merge_nearby(&candidates, self.settings.enemy_merge_radius);
            confidence -= CONFIDENCE_STEP;
        }

        debug!(enemies = ?self.enemies, "Enemies found");
        Ok(self.enemies.clone())
    }

    /// Returns mystery node locations. Empty when no question mark is on screen.
    pub fn find_mystery_nodes(
        &mut self,
        screen: &mut Screen,
        blacklist: &Blacklist,
        confidence: f32,
    ) -> Result<Vec<Point>> {
        if blacklist.len() > self.settings.rescan_threshold {
            self.mystery_nodes.clear();
        }
        if self.mystery_nodes.is_empty() && screen.find(patterns::QUESTION_MARK, QUESTION_MARK_PROBE).is_none() {
            return Ok(Vec::new());
        }

        let mut confidence = confidence;
        while self.mystery_nodes.is_empty() {
            screen.refresh()?;
            let raw: Vec<Point> = screen
                .find_all(patterns::QUESTION_MARK, confidence)
                .into_iter()
                .map(|m| m.region.origin().offset(QUESTION_MARK_OFFSET.0, QUESTION_MARK_OFFSET.1))
                .collect();
            let candidates = keep_targetable(raw, blacklist);
            self.mystery_nodes = merge_nearby(&candidates, self.settings.mystery_merge_radius);
            confidence -= CONFIDENCE_STEP;
            if confidence <= MYSTERY_FLOOR {
                break;
            }
        }

        debug!(nodes = ?self.mystery_nodes, "Mystery nodes found");
        Ok(self.mystery_nodes.clone())
    }

    /// Enemies wearing the main-fleet badge.
    pub fn focused_enemies(&self, screen: &Screen, enemies: &[Point]) -> Vec<Point> {
        enemies
            .iter()
            .copied()
            .filter(|&enemy| {
                screen
                    .find_scaled(
                        patterns::ENEMY_MAIN_FLEET,
                        MAIN_FLEET_CONFIDENCE,
                        Some(layout::enemy_badge_region(enemy)),
                    )
                    .is_some()
            })
            .collect()
    }

    /// Locates the active fleet. Returns the tile under the flagship.
    pub fn locate_fleet(&self, screen: &mut Screen) -> Result<Point> {
        for attempt in 1..=self.limits.fleet_scan {
            screen.refresh()?;
            let nudge = (attempt > FLEET_NUDGE_AFTER).then(|| 150 + attempt as i32 * 20);
            if let Some(dy) = nudge {
                screen.swipe(layout::SCREEN_CENTER, layout::SCREEN_CENTER.offset(0, dy), 100)?;
                screen.refresh()?;
            }

            let found = detect_fleet(screen, attempt);

            if let Some(dy) = nudge {
                screen.swipe(layout::SCREEN_CENTER.offset(0, dy), layout::SCREEN_CENTER, 100)?;
                if let Some(location) = found {
                    return Ok(location);
                }
                continue;
            }

            match found {
                Some(location)
                    if location.within(layout::AMBIGUOUS_FLEET_POSITION, layout::AMBIGUOUS_FLEET_TOLERANCE) =>
                {
                    debug!(%location, "Fleet marker matched the HUD, retrying");
                }
                Some(location) => return Ok(location),
                None => {}
            }
        }
        warn!(attempts = self.limits.fleet_scan, "Fleet marker not found");
        Err(SessionError::exhausted("fleet_location", self.limits.fleet_scan))
    }

    /// Single-frame fleet check with no camera nudge and no retries.
    pub fn spot_fleet(&self, screen: &Screen) -> Option<Point> {
        detect_fleet(screen, 1)
            .filter(|p| !p.within(layout::AMBIGUOUS_FLEET_POSITION, layout::AMBIGUOUS_FLEET_TOLERANCE))
    }

    /// Picks the target closest to the query's reference point.
    ///
    /// The list the winner came from is emptied so the next call scans again.
    pub fn closest_target(
        &mut self,
        screen: &mut Screen,
        blacklist: &Blacklist,
        query: TargetQuery,
    ) -> Result<Target> {
        let fleet = match query.fleet {
            Some(fleet) => fleet,
            None => self.locate_fleet(screen)?,
        };
        let reference = query.reference.unwrap_or(fleet);

        let mut candidates: Vec<Target> = Vec::new();
        let mut nodes = Vec::new();
        if query.include_mystery_nodes {
            nodes = self.find_mystery_nodes(screen, blacklist, query.mystery_confidence)?;
        }

        if query.priority_mystery_nodes && !nodes.is_empty() {
            info!(count = nodes.len(), "Prioritizing mystery nodes");
        } else {
            let enemies = self.find_enemies(screen, blacklist, query.boss_mode)?;
            let enemies = if query.focus_main_fleet {
                let focused = self.focused_enemies(screen, &enemies);
                if focused.is_empty() { enemies } else { focused }
            } else {
                enemies
            };
            candidates.extend(enemies.into_iter().map(Target::enemy));
        }
        candidates.extend(nodes.into_iter().map(Target::mystery_node));

        let locations: Vec<Point> = candidates.iter().map(|t| t.location).collect();
        let index = nearest(&locations, reference)
            .ok_or(SessionError::UnexpectedScreen("no targets on the map"))?;
        let target = candidates[index];

        match target.kind {
            TargetKind::MysteryNode => self.mystery_nodes.clear(),
            _ => self.enemies.clear(),
        }
        info!(fleet = %fleet, %target, candidates = candidates.len(), "Closest target selected");
        Ok(target)
    }
}

/// The fleet marker's foot point. The marker-to-foot distance shrinks a
/// little with every scan attempt.
fn detect_fleet(screen: &Screen, attempt: u32) -> Option<Point> {
    FLEET_MARKERS.iter().find_map(|marker| {
        screen
            .find(marker.pattern, marker.confidence)
            .map(|m| m.region.origin().offset(marker.offset.0, marker.offset.1 - attempt as i32 * 20))
    })
}

/// Drops points on the HUD or near a blacklisted location.
fn keep_targetable(points: Vec<Point>, blacklist: &Blacklist) -> Vec<Point> {
    points
        .into_iter()
        .filter(|&p| !PROHIBITED_REGIONS.iter().any(|r| r.contains(p)))
        .filter(|&p| !blacklist.contains(p))
        .collect()
}

/// Greedy de-duplication: a point is kept only if every previously kept point
/// is farther than `radius` away. Order of the input decides which of two
/// close points survives.
pub fn merge_nearby(points: &[Point], radius: f64) -> Vec<Point> {
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if kept.iter().all(|k| k.distance(p) > radius) {
            kept.push(p);
        }
    }
    kept
}

/// Index of the point closest to `reference`. Ties go to the earliest point.
pub fn nearest(points: &[Point], reference: Point) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| p.distance_squared(reference))
        .map(|(i, _)| i)
}
