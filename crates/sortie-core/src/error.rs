//! Session-level errors.
//!
//! Any `SessionError` that reaches the map-clear loop ends the session with
//! `ExitCode::Aborted`.

use crate::ensured_action::ActionFailure;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A polling loop hit its iteration cap.
    #[error("{loop_name} loop exceeded its cap of {cap} iterations")]
    LoopExhausted { loop_name: &'static str, cap: u32 },

    #[error("ensured action failed: {0}")]
    Action(#[from] ActionFailure),

    #[error(transparent)]
    Device(#[from] sortie_proto::Error),

    /// A screen appeared that the current phase has no transition for.
    #[error("unexpected screen: {0}")]
    UnexpectedScreen(&'static str),

    #[error("no camera anchor is known for map {0}")]
    NoAnchor(String),

    #[error("boss still hidden after {0} attempts to uncover it")]
    BossUnreachable(u32),
}

impl SessionError {
    pub(crate) fn exhausted(loop_name: &'static str, cap: u32) -> Self {
        SessionError::LoopExhausted { loop_name, cap }
    }

    /// Name of the loop that breached its cap, if that is what happened.
    pub fn exhausted_loop(&self) -> Option<&'static str> {
        match self {
            SessionError::LoopExhausted { loop_name, .. } => Some(loop_name),
            SessionError::Action(ActionFailure::Unstable { .. }) => Some("stability"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
