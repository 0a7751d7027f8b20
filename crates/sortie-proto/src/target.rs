//! Movement targets.

use crate::Point;
use serde::{Deserialize, Serialize};

/// What kind of tile a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Enemy,
    MysteryNode,
    Boss,
    /// A tile the fleet walks to without expecting a fight.
    Empty,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Enemy => "enemy",
            TargetKind::MysteryNode => "mystery_node",
            TargetKind::Boss => "boss",
            TargetKind::Empty => "empty",
        }
    }

    /// Targets whose arrival is detected by watching the fleet marker rather than a battle.
    pub fn is_passive(&self) -> bool {
        matches!(self, TargetKind::MysteryNode | TargetKind::Empty)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location on the map the fleet can be sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub location: Point,
    pub kind: TargetKind,
}

impl Target {
    pub fn new(location: Point, kind: TargetKind) -> Self {
        Self { location, kind }
    }

    pub fn enemy(location: Point) -> Self {
        Self::new(location, TargetKind::Enemy)
    }

    pub fn mystery_node(location: Point) -> Self {
        Self::new(location, TargetKind::MysteryNode)
    }

    pub fn boss(location: Point) -> Self {
        Self::new(location, TargetKind::Boss)
    }

    pub fn empty(location: Point) -> Self {
        Self::new(location, TargetKind::Empty)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.kind, self.location)
    }
}
