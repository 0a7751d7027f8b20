//! Fixed UI layout for a 1920x1080 screen.

use sortie_proto::{Point, Region};

pub const SCREEN_CENTER: Point = Point::new(960, 540);

// Buttons and tap areas
pub const RETREAT_BUTTON: Region = Region::new(1130, 985, 243, 60);
pub const CLOSE_INFO_DIALOG: Region = Region::new(1326, 274, 35, 35);
pub const MENU_COMBAT_START: Region = Region::new(1578, 921, 270, 70);
pub const COMBAT_END_CONFIRM: Region = Region::new(1613, 947, 30, 25);
pub const BATTLE_SAFE_TOUCH: Region = Region::new(40, 180, 110, 110);
pub const DEFEAT_CLOSE_TOUCH: Region = Region::new(880, 900, 100, 40);
pub const COMMISSION_CONFIRM: Region = Region::new(848, 740, 224, 56);
pub const AMBUSH_EVADE: Region = Region::new(1493, 682, 208, 56);
pub const TAP_TO_CONTINUE: Region = Region::new(661, 840, 598, 203);
pub const SWITCH_FLEET: Region = Region::new(1430, 985, 240, 60);
pub const MENU_NAV_BACK: Region = Region::new(54, 57, 67, 67);
pub const LOCK_SHIP_BUTTON: Region = Region::new(1086, 739, 200, 55);
pub const DISMISS_SHIP_DROP: Region = Region::new(1228, 103, 692, 500);
pub const DISMISS_SURFACE_FLEET_SUMMARY: Region = Region::new(790, 950, 250, 65);
pub const EMERGENCY_REPAIR_IN_MAP: Region = Region::new(1800, 620, 80, 100);
pub const FLEET_LOCK: Region = Region::new(1790, 750, 130, 30);
pub const COMBAT_AUTOMATION: Region = Region::new(20, 50, 200, 35);
pub const MAP_SUMMARY_GO: Region = Region::new(1289, 743, 280, 79);
pub const FLEET_MENU_GO: Region = Region::new(1485, 872, 200, 74);
pub const OPEN_STRATEGY_MENU: Region = Region::new(1797, 617, 105, 90);
pub const DISABLE_SUBS_HUNTING_RANGE: Region = Region::new(1655, 615, 108, 108);
pub const CLOSE_STRATEGY_MENU: Region = Region::new(1590, 615, 40, 105);

/// Slot dropdowns on the fleet selection screen.
pub const FLEET_SLOT_CHOOSE: [Region; 2] = [Region::new(1550, 270, 70, 60), Region::new(1550, 460, 70, 60)];
/// First row of each slot's dropdown; fleet `n` sits `n - 1` rows below.
pub const FLEET_SLOT_FIRST_ROW: [Point; 2] = [Point::new(1650, 393), Point::new(1650, 593)];
pub const FLEET_ROW_SPACING: i32 = 64;

/// HUD areas where template hits are never real map tiles.
pub const PROHIBITED_REGIONS: [Region; 8] = [
    Region::new(0, 162, 190, 926),   // left side bar
    Region::new(0, 0, 1920, 114),    // top bar
    Region::new(0, 114, 1728, 56),   // fleet info
    Region::new(190, 170, 575, 75),  // fleet bonuses
    Region::new(1837, 130, 83, 220), // mission conditions
    Region::new(1770, 590, 150, 136), // strategy tab
    Region::new(1755, 726, 165, 90), // fleet lock button
    Region::new(965, 940, 955, 140), // command buttons
];

/// Where the fleet marker sits when detection latched onto the HUD instead of the map.
pub const AMBIGUOUS_FLEET_POSITION: Point = Point::new(160, 142);
pub const AMBIGUOUS_FLEET_TOLERANCE: i32 = 30;

/// Dropdown row of `fleet` (1-based) for `slot` (1 or 2).
pub fn fleet_row(slot: u32, fleet: u32) -> Point {
    let first = FLEET_SLOT_FIRST_ROW[if slot == 2 { 1 } else { 0 }];
    first.offset(0, FLEET_ROW_SPACING * (fleet.max(1) as i32 - 1))
}

/// Grid step used to walk the fleet aside when it hides the boss.
pub const FLEET_STEP: i32 = 180;

/// A camera drag that brings another part of the map into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pan {
    /// Reveal what is above the viewport.
    Up,
    /// Reveal what is right of the viewport.
    Right,
    /// Reveal what is below the viewport.
    Down,
    /// Reveal what is left of the viewport.
    Left,
}

impl Pan {
    /// Cycle used when scanning for targets.
    pub const CYCLE: [Pan; 4] = [Pan::Up, Pan::Right, Pan::Down, Pan::Left];

    /// Swipe endpoints and duration in milliseconds.
    pub fn swipe(self) -> (Point, Point, u32) {
        match self {
            Pan::Up => (Point::new(960, 240), Point::new(960, 940), 300),
            Pan::Right => (Point::new(1560, 540), Point::new(260, 540), 300),
            Pan::Down => (Point::new(960, 940), Point::new(960, 240), 300),
            Pan::Left => (Point::new(260, 540), Point::new(1560, 540), 300),
        }
    }

    /// The `n`-th pan of the scan cycle.
    pub fn nth(n: usize) -> Pan {
        Self::CYCLE[n % Self::CYCLE.len()]
    }
}

/// A `w`x`h` region whose bottom edge sits on `anchor`, clipped to the screen.
fn region_above(anchor: Point, w: i32, h: i32) -> Region {
    let x = (anchor.x - w / 2).max(0);
    let y = (anchor.y - h).max(0);
    Region::new(x, y, w.min(1920 - x), h)
}

/// Region above a target where the destination arrow appears once a move is accepted.
pub fn target_arrow_region(target: Point) -> Region {
    region_above(target, 160, 160)
}

/// Region where the fleet marker sits once the fleet stands on `target`.
pub fn fleet_arrival_region(target: Point) -> Region {
    region_above(target, 170, 150)
}

/// Region above an enemy where a main-fleet badge would be drawn.
pub fn enemy_badge_region(enemy: Point) -> Region {
    Region::new(enemy.x - 70, enemy.y - 130, 140, 110)
}
