//! # sortie-core
//!
//! The map-clearing engine for the Sortie control engine.
//!
//! This crate provides:
//! - `Screen`, the owner of the current frame and the input transport
//! - The ensured-action protocol (tap, verify, retry)
//! - Parallel event polling and target acquisition
//! - The movement, battle and boss state machine (`CombatEngine`)
//! - The sortie orchestrator that repeats map clears
//! - Configuration, incident logging and status artifacts
//! - A scripted device and scenario replay for tests

pub mod anchor;
mod config;
mod dock;
mod ensured_action;
mod error;
mod incident_log;
pub mod layout;
mod map_clear;
mod orchestrator;
mod poller;
mod screen;
mod session;
mod status_manager;
mod strategy;
mod targeting;
pub mod testing;

pub use config::{
    CombatConfig, ConfigError, DiagnosticsConfig, LoopLimits, SortieConfig, SortieLimits, TargetingConfig,
    TimingConfig,
};
pub use dock::{DockHandler, DockRelief, Relief};
pub use ensured_action::{
    Action, ActionFailure, EnsuredAction, Outcome, PreconditionPolicy, StabilityCheck, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_STABILITY_SAMPLES,
};
pub use error::{Result, SessionError};
pub use incident_log::IncidentLog;
pub use map_clear::{
    BattleOutcome, CombatEngine, MapClear, MovementOutcome, StallDetector, centering_swipe, drain_retreat,
};
pub use orchestrator::{SortieOrchestrator, TerminationReason};
pub use poller::{EventPoller, PollResult, poll_frame};
pub use screen::{NoopSleeper, Screen, Sleeper, ThreadSleeper};
pub use session::{AbortReason, Blacklist, ClearSession, SessionReport};
pub use status_manager::{SortieStats, StatusManager};
pub use strategy::{
    Anchor, BudgetPolicy, CameraSwipe, MapStrategy, MidSessionSwitch, OpeningStep, StrategyOverride, StrategyTable,
};
pub use targeting::{TargetAcquisition, TargetQuery, merge_nearby, nearest};
