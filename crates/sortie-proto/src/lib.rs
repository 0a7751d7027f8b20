//! # sortie-proto
//!
//! Shared types, error definitions, and traits for the Sortie control engine.
//!
//! This crate provides the foundational abstractions used across all Sortie crates,
//! including:
//! - Screen geometry (`Point`, `Region`)
//! - Pattern identifiers and the catalogue of known on-screen elements
//! - Targets and the session `ExitCode`
//! - The perception and input ports the engine drives
//! - Common error types

mod error;
mod exit_code;
mod geometry;
mod input;
mod pattern;
pub mod patterns;
mod perception;
mod target;

pub use error::{Error, Result};
pub use exit_code::{Disposition, ExitCode};
pub use geometry::{Point, Region};
pub use input::InputTransport;
pub use pattern::PatternId;
pub use perception::{Frame, Match, PerceptionPort, ScaleRange};
pub use target::{Target, TargetKind};
