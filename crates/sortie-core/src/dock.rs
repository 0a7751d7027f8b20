//! Hand-off to sibling modules when the dock is full.
//!
//! The game shows its sort screen when no dock slot is free. Handlers such
//! as enhancement or retirement get a chance to free space; each one is
//! abandoned after its first failure until another handler succeeds.

use crate::error::Result;
use crate::screen::Screen;
use tracing::{info, warn};

/// A module that can free dock space starting from the sort screen.
pub trait DockHandler: Send {
    fn name(&self) -> &str;

    /// Returns `Ok(true)` if space was freed and the caller may retry.
    fn free_space(&mut self, screen: &mut Screen) -> Result<bool>;
}

/// Result of asking the handlers for room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relief {
    Freed,
    /// Every handler has failed; the dock stays full.
    Exhausted,
}

struct Slot {
    handler: Box<dyn DockHandler>,
    failed: bool,
}

/// Ordered dock handlers with their failure flags.
#[derive(Default)]
pub struct DockRelief {
    slots: Vec<Slot>,
}

impl DockRelief {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Box<dyn DockHandler>) -> Self {
        self.slots.push(Slot {
            handler,
            failed: false,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Clears every failure flag.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.failed = false;
        }
    }

    /// Tries handlers in order until one frees space.
    ///
    /// A success clears the failure flags of the handlers before it, since
    /// their work may be possible again.
    pub fn relieve(&mut self, screen: &mut Screen) -> Result<Relief> {
        for i in 0..self.slots.len() {
            if self.slots[i].failed {
                continue;
            }
            let slot = &mut self.slots[i];
            if slot.handler.free_space(screen)? {
                info!(handler = slot.handler.name(), "Dock space freed");
                for earlier in &mut self.slots[..i] {
                    earlier.failed = false;
                }
                return Ok(Relief::Freed);
            }
            warn!(handler = slot.handler.name(), "Dock handler could not free space");
            slot.failed = true;
        }
        Ok(Relief::Exhausted)
    }
}

impl std::fmt::Debug for DockRelief {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|s| (s.handler.name(), s.failed)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::testing::{Scenario, Scene, ScriptedDevice};
    use std::sync::{Arc, Mutex};

    /// Answers from a script and records each call.
    struct Scripted {
        name: &'static str,
        answers: Vec<bool>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DockHandler for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn free_space(&mut self, _screen: &mut Screen) -> Result<bool> {
            self.calls.lock().unwrap().push(self.name);
            Ok(if self.answers.is_empty() { false } else { self.answers.remove(0) })
        }
    }

    fn screen() -> Screen {
        ScriptedDevice::new(Scenario::new("sort").scene(Scene::new("sort")))
            .screen(TimingConfig::default())
            .unwrap()
    }

    #[test]
    fn test_no_handlers_is_exhausted() {
        let mut relief = DockRelief::new();
        assert!(relief.is_empty());
        assert_eq!(relief.relieve(&mut screen()).unwrap(), Relief::Exhausted);
    }

    #[test]
    fn test_failed_handler_is_skipped_until_a_later_one_succeeds() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut relief = DockRelief::new()
            .with_handler(Box::new(Scripted {
                name: "enhance",
                answers: vec![false, true],
                calls: Arc::clone(&calls),
            }))
            .with_handler(Box::new(Scripted {
                name: "retire",
                answers: vec![true, false],
                calls: Arc::clone(&calls),
            }));
        let mut screen = screen();

        // enhance fails, retire frees space and re-arms enhance.
        assert_eq!(relief.relieve(&mut screen).unwrap(), Relief::Freed);
        // enhance succeeds this time.
        assert_eq!(relief.relieve(&mut screen).unwrap(), Relief::Freed);
        // enhance has no more answers, retire fails: nothing left.
        assert_eq!(relief.relieve(&mut screen).unwrap(), Relief::Exhausted);
        assert_eq!(relief.relieve(&mut screen).unwrap(), Relief::Exhausted);

        assert_eq!(
            *calls.lock().unwrap(),
            ["enhance", "retire", "enhance", "enhance", "retire"]
        );

        relief.reset();
        assert_eq!(relief.relieve(&mut screen).unwrap(), Relief::Exhausted);
        assert_eq!(calls.lock().unwrap().len(), 7);
    }
}
