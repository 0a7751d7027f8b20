//! Screen geometry in device pixels.
//!
//! The engine works on a fixed 1920x1080 landscape coordinate space with the
//! origin in the top-left corner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pixel coordinate on the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns this point moved by the given delta.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Euclidean distance between two points.
    pub fn distance(self, other: Point) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }

    /// Squared distance, exact in integer arithmetic.
    pub fn distance_squared(self, other: Point) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dy = i64::from(self.y - other.y);
        dx * dx + dy * dy
    }

    /// Returns true if both axes differ by at most `tolerance` pixels.
    pub fn within(self, other: Point, tolerance: i32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// An axis-aligned rectangle: origin plus width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// A region of the given size whose top-left corner is `origin`.
    pub const fn at(origin: Point, w: i32, h: i32) -> Self {
        Self::new(origin.x, origin.y, w, h)
    }

    /// A region of the given size centered on `center`.
    pub const fn centered(center: Point, w: i32, h: i32) -> Self {
        Self::new(center.x - w / 2, center.y - h / 2, w, h)
    }

    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub const fn center(&self) -> Point {
        Point::new(self.x + self.w / 2, self.y + self.h / 2)
    }

    /// Returns true if the point lies inside the region (right and bottom edges exclusive).
    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }

    /// Returns true if the two regions overlap.
    pub const fn intersects(&self, other: &Region) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {} {}x{}]", self.x, self.y, self.w, self.h)
    }
}
