//! The perception port: frames in, pattern matches out.
//!
//! The engine never looks at pixels. It holds opaque [`Frame`]s and asks the
//! port whether a named pattern is visible in one, where, and with what
//! confidence.

use crate::{PatternId, Region, Result};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// An immutable screen capture.
///
/// Cloning is cheap; the pixel payload is shared. Only the perception port
/// that produced a frame knows how to read its payload.
#[derive(Clone)]
pub struct Frame {
    seq: u64,
    captured_at: DateTime<Utc>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Frame {
    pub fn new(seq: u64, payload: impl Any + Send + Sync) -> Self {
        Self {
            seq,
            captured_at: Utc::now(),
            payload: Arc::new(payload),
        }
    }

    /// Monotonic capture number assigned by the port.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Borrows the payload as the concrete type the port stored.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

/// A located pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Bounding box of the match.
    pub region: Region,
    /// Normalized match confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Template scale range for multi-scale matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRange {
    pub min: f32,
    pub max: f32,
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self { min: 0.8, max: 1.2 }
    }
}

/// Screen capture and pattern matching, implemented outside the engine.
///
/// Implementations must be shareable across threads: the event poller runs
/// independent `find` calls against the same frame in parallel.
pub trait PerceptionPort: Send + Sync {
    /// Captures the current screen.
    fn capture(&self) -> Result<Frame>;

    /// Best match of `pattern` with confidence at least `min_confidence`,
    /// optionally restricted to `region`.
    fn find(
        &self,
        frame: &Frame,
        pattern: &PatternId,
        min_confidence: f32,
        region: Option<Region>,
    ) -> Option<Match>;

    /// Every non-overlapping match of `pattern` at or above `min_confidence`.
    fn find_all(&self, frame: &Frame, pattern: &PatternId, min_confidence: f32) -> Vec<Match>;

    /// Best match of `pattern` across a range of template scales.
    fn find_scaled(
        &self,
        frame: &Frame,
        pattern: &PatternId,
        min_confidence: f32,
        scale: ScaleRange,
        region: Option<Region>,
    ) -> Option<Match>;

    /// Normalized cross-correlation of two frames, optionally over a sub-region.
    fn similarity(&self, a: &Frame, b: &Frame, region: Option<Region>) -> f32;

    /// Persists a frame for post-mortem inspection.
    fn save_snapshot(&self, _frame: &Frame, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_payload_downcast() {
        let frame = Frame::new(7, 42_u32);
        assert_eq!(frame.seq(), 7);
        assert_eq!(frame.payload::<u32>(), Some(&42));
        assert!(frame.payload::<String>().is_none());
    }

    #[test]
    fn test_frame_clone_shares_payload() {
        let frame = Frame::new(1, String::from("pixels"));
        let copy = frame.clone();
        assert_eq!(copy.payload::<String>().map(String::as_str), Some("pixels"));
        assert_eq!(copy.captured_at(), frame.captured_at());
    }
}
