//! Session exit codes.

use serde::{Deserialize, Serialize};

/// Result of a map-clear session.
///
/// Exactly one value is active per session. Anything other than
/// `InProgress` is terminal and short-circuits the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    #[default]
    InProgress,
    /// The boss fleet was defeated and the stage cleared.
    BossDefeated,
    /// The configured number of battles was reached before the boss.
    RetreatAfterN,
    /// A low-morale alert stopped the sortie.
    MoraleLow,
    /// The dock is full and no dock handler could make room.
    DockFull,
    /// The fleet was defeated or forced to retreat.
    FleetDefeated,
    /// Low morale with fleet rotation enabled; the next sortie uses the other fleet.
    FleetSwitchPending,
    /// A bounded loop was exhausted or an unexpected screen was reached.
    Aborted,
}

/// What the orchestrator does with a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Session still running.
    Continue,
    /// Sortie again.
    Repeat,
    /// Stop sortieing; the condition is expected and handled elsewhere.
    Stop,
    /// Stop and report to the caller as a failure.
    Escalate,
}

impl ExitCode {
    /// Numeric code, stable for logs and status files.
    pub fn code(&self) -> u8 {
        match self {
            ExitCode::InProgress => 0,
            ExitCode::BossDefeated => 1,
            ExitCode::RetreatAfterN => 2,
            ExitCode::MoraleLow => 3,
            ExitCode::DockFull => 4,
            ExitCode::FleetDefeated => 5,
            ExitCode::FleetSwitchPending => 6,
            ExitCode::Aborted => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitCode::InProgress => "in_progress",
            ExitCode::BossDefeated => "boss_defeated",
            ExitCode::RetreatAfterN => "retreat_after_n",
            ExitCode::MoraleLow => "morale_low",
            ExitCode::DockFull => "dock_full",
            ExitCode::FleetDefeated => "fleet_defeated",
            ExitCode::FleetSwitchPending => "fleet_switch_pending",
            ExitCode::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExitCode::InProgress)
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            ExitCode::InProgress => Disposition::Continue,
            ExitCode::BossDefeated | ExitCode::RetreatAfterN | ExitCode::FleetSwitchPending => {
                Disposition::Repeat
            }
            ExitCode::MoraleLow | ExitCode::DockFull | ExitCode::FleetDefeated => Disposition::Stop,
            ExitCode::Aborted => Disposition::Escalate,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
