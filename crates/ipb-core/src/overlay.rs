//! Full-viewport overlay detection
//!
//! A newsletter or app-install popup is usually a fixed, viewport-sized
//! dimming layer with the actual dialog stacked above it. The layer is found
//! by geometry; the dialog, close button and friends are found by having a
//! higher z-index than the layer.

use log::{debug, info};

use crate::dom::{z_index_of, Document};
use crate::query::{find_by_style, StyleMatch};
use crate::suppress::Suppressor;
use crate::types::{Rect, Viewport};
use crate::{Millis, LOG_PREFIX};

/// Overlays stacked at or below this z-index do not trigger the foreground pass.
pub const OVERLAY_Z_INDEX_THRESHOLD: i64 = 100;

/// Allowed deviation from the viewport size, in CSS pixels.
pub const VIEWPORT_TOLERANCE: f64 = 100.0;

/// Whether `rect` is a full-viewport overlay: top edge at 0, width within the
/// tolerance of the window width, height no less than the window height minus
/// the tolerance.
pub fn covers_viewport(rect: &Rect, viewport: &Viewport) -> bool {
    rect.top == 0.0
        && rect.width > viewport.width - VIEWPORT_TOLERANCE
        && rect.width < viewport.width + VIEWPORT_TOLERANCE
        && rect.height >= viewport.height - VIEWPORT_TOLERANCE
}

/// Find and hide full-viewport overlays and everything stacked above them.
///
/// `candidates` is the batch gathered from mutations; when `None`, every fixed
/// element in the document is examined. Returns the number of elements hidden.
pub fn find_and_suppress_overlays<D: Document>(
    doc: &mut D,
    suppressor: &mut Suppressor<D::Node>,
    candidates: Option<Vec<D::Node>>,
    now: Millis,
) -> usize {
    let candidates = candidates.unwrap_or_else(|| find_by_style(&*doc, &StyleMatch::FIXED, None));
    let viewport = doc.viewport();

    let mut top_z_index: Option<i64> = None;
    let mut overlays: Vec<D::Node> = Vec::new();

    for candidate in candidates {
        if overlays.contains(&candidate) {
            continue;
        }

        let rect = match doc.bounding_rect(&candidate) {
            Ok(rect) => rect,
            Err(err) => {
                debug!("{LOG_PREFIX} skipping {candidate:?}: {err}");
                continue;
            }
        };

        if !covers_viewport(&rect, &viewport) {
            continue;
        }

        match z_index_of(&*doc, &candidate) {
            Ok(z_index) => {
                if let Some(value) = z_index.value() {
                    top_z_index = Some(top_z_index.map_or(value, |top| top.max(value)));
                }
            }
            Err(err) => {
                debug!("{LOG_PREFIX} skipping {candidate:?}: {err}");
                continue;
            }
        }

        overlays.push(candidate);
    }

    let mut removed = 0;

    if !overlays.is_empty() {
        info!("{LOG_PREFIX} FOUND Element (OVERLAY): {overlays:?}");
        for overlay in &overlays {
            suppressor.hide(doc, overlay, now);
        }
        removed = overlays.len();
    }

    if let Some(top) = top_z_index.filter(|top| *top > OVERLAY_Z_INDEX_THRESHOLD) {
        let foreground = find_by_style(&*doc, &StyleMatch::ZIndexAbove(top), None);
        info!("{LOG_PREFIX} FOUND Element (> OVERLAY): {foreground:?}");
        for element in &foreground {
            suppressor.hide(doc, element, now);
        }
        removed += foreground.len();
    }

    removed
}
