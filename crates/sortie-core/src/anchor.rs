//! Camera repositioning by anchor template.

use crate::config::LoopLimits;
use crate::error::{Result, SessionError};
use crate::layout::{Pan, SCREEN_CENTER};
use crate::screen::Screen;
use crate::strategy::Anchor;
use sortie_proto::{Match, patterns};
use std::time::Duration;
use tracing::{debug, info, warn};

const ANCHOR_SIMILARITY: f32 = 0.95;
const SEARCH_ORDER: [Pan; 4] = [Pan::Left, Pan::Down, Pan::Right, Pan::Up];
const SEARCH_SWIPE_MS: u32 = 500;
const DRAG_MS: u32 = 800;

/// Moves the camera until the map's anchor sits at its expected position.
///
/// Pans around until the anchor is visible, drags it into place, and
/// verifies the result. Both the pans and the drags are capped.
pub fn reset_camera(screen: &mut Screen, map: &str, anchor: Option<&Anchor>, limits: &LoopLimits) -> Result<()> {
    let anchor = anchor.ok_or_else(|| SessionError::NoAnchor(map.to_string()))?;
    let pattern = patterns::map_anchor(map);

    screen.refresh()?;
    let mut found = find_anchor(screen, &pattern);

    for drag in 1..=limits.anchor_drags {
        let mut pans = 0;
        let current = loop {
            if let Some(m) = found {
                break m;
            }
            if pans >= limits.anchor_pans {
                warn!(map, pans, "Anchor not found while panning");
                return Err(SessionError::exhausted("anchor_search", limits.anchor_pans));
            }
            let (from, to, _) = SEARCH_ORDER[pans as usize % SEARCH_ORDER.len()].swipe();
            screen.swipe(from, to, SEARCH_SWIPE_MS)?;
            screen.wait_refresh(Duration::from_millis(100))?;
            found = find_anchor(screen, &pattern);
            pans += 1;
        };

        let at = current.region.origin();
        let to = SCREEN_CENTER.offset(anchor.expected.x - at.x, anchor.expected.y - at.y);
        debug!(map, drag, %at, expected = %anchor.expected, "Dragging anchor into place");
        screen.swipe(SCREEN_CENTER, to, DRAG_MS)?;
        screen.wait_refresh(Duration::from_millis(500))?;

        found = find_anchor(screen, &pattern);
        match found {
            Some(m) if m.region.origin().within(anchor.expected, anchor.tolerance) => {
                info!(map, drags = drag, "Camera reset by anchor");
                return Ok(());
            }
            Some(m) => debug!(map, at = %m.region.origin(), "Anchor still off target"),
            None => warn!(map, "Anchor lost after drag, searching again"),
        }
    }
    Err(SessionError::exhausted("anchor_drags", limits.anchor_drags))
}

fn find_anchor(screen: &Screen, pattern: &str) -> Option<Match> {
    screen.find_scaled(pattern, ANCHOR_SIMILARITY, None)
}
