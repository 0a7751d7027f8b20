//! Per-session state of a map clear.
//!
//! A `ClearSession` is created when a map opens and dropped when the session
//! returns its exit code. Nothing in it outlives the map.

use serde::Serialize;
use sortie_proto::{ExitCode, Point, Target};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Locations the targeting logic must skip for now.
///
/// Entries are only added during a targeting attempt; the whole list is
/// cleared between attempts.
#[derive(Debug, Clone)]
pub struct Blacklist {
    entries: Vec<Point>,
    radius: f64,
}

impl Blacklist {
    pub fn new(radius: f64) -> Self {
        Self {
            entries: Vec::new(),
            radius,
        }
    }

    pub fn push(&mut self, location: Point) {
        debug!(%location, size = self.entries.len() + 1, "Blacklisted");
        self.entries.push(location);
    }

    /// True if `p` is within the blacklist radius of any entry.
    pub fn contains(&self, p: Point) -> bool {
        self.entries.iter().any(|e| e.distance(p) < self.radius)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Point] {
        &self.entries
    }
}

/// Counters and flags for one map clear.
#[derive(Debug, Clone)]
pub struct ClearSession {
    pub map: String,
    pub kills_count: u32,
    pub combats_done: u32,
    pub target: Option<Target>,
    pub blacklist: Blacklist,
    /// Where the fleet last stood, if known.
    pub fleet_location: Option<Point>,
    pub boss_uncover_attempts: u32,
    pub fleet_switched: bool,
    exit_code: ExitCode,
    started_at: Instant,
}

impl ClearSession {
    pub fn new(map: impl Into<String>, blacklist_radius: f64) -> Self {
        Self {
            map: map.into(),
            kills_count: 0,
            combats_done: 0,
            target: None,
            blacklist: Blacklist::new(blacklist_radius),
            fleet_location: None,
            boss_uncover_attempts: 0,
            fleet_switched: false,
            exit_code: ExitCode::InProgress,
            started_at: Instant::now(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    pub fn is_finished(&self) -> bool {
        self.exit_code.is_terminal()
    }

    /// Sets the exit code unless one is already set. Returns whether it was set.
    pub fn finish(&mut self, code: ExitCode) -> bool {
        if self.exit_code.is_terminal() {
            debug!(current = %self.exit_code, ignored = %code, "Exit code already set");
            return false;
        }
        info!(map = %self.map, exit = %code, "Session finishing");
        self.exit_code = code;
        true
    }

    /// Forces `Aborted`, replacing any exit code already set.
    pub fn abort(&mut self) {
        if self.exit_code != ExitCode::Aborted {
            info!(map = %self.map, previous = %self.exit_code, "Session aborted");
        }
        self.exit_code = ExitCode::Aborted;
    }

    /// Clears a terminal exit code that turned out to be wrong.
    pub fn reopen(&mut self) {
        self.exit_code = ExitCode::InProgress;
    }

    pub fn record_victory(&mut self, counts_as_kill: bool) {
        self.combats_done += 1;
        if counts_as_kill {
            self.kills_count += 1;
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            map: self.map.clone(),
            exit_code: self.exit_code,
            kills_count: self.kills_count,
            combats_done: self.combats_done,
            elapsed_seconds: self.elapsed().as_secs(),
            abort_reason: None,
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub map: String,
    pub exit_code: ExitCode,
    pub kills_count: u32,
    pub combats_done: u32,
    pub elapsed_seconds: u64,
    /// Set when the session aborted.
    pub abort_reason: Option<AbortReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortReason {
    /// The loop that breached its cap, if any.
    pub loop_name: Option<String>,
    pub message: String,
}
