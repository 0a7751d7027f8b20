//! The input port.

use crate::{Point, Result};

/// Delivers synthetic touches to the device.
pub trait InputTransport: Send {
    fn tap(&mut self, at: Point) -> Result<()>;

    /// Drags from `from` to `to` over `duration_ms` milliseconds.
    fn swipe(&mut self, from: Point, to: Point, duration_ms: u32) -> Result<()>;
}
