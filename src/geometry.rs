//! Pure crop geometry.
//!
//! Turns a face's bounding polygon and roll angle into a [`CropSpec`]: the
//! point to center on, the rotation that presents the face upright, and the
//! canvas size. No I/O, no images — everything here is testable with plain
//! numbers.

use crate::error::{BotError, Result};
use crate::recognition::Point;

/// Canvas size relative to the raw bounding box.
pub const CANVAS_SCALE: f64 = 1.2;

/// Derived crop parameters for one face. Ephemeral: produced here, consumed
/// by the renderer, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSpec {
    /// Face center in source-image pixel coordinates.
    pub center_x: f64,
    pub center_y: f64,
    /// Rotation to apply to the source, degrees. Already negated: the roll
    /// is reported as the head's tilt, and the crop must undo it.
    pub rotate_degrees: f64,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
}

/// Compute the crop spec for a bounding polygon and roll angle.
///
/// The canvas is rectangular, `CANVAS_SCALE` times the bounding box in each
/// dimension, centered on the box midpoint. A degenerate box (zero or
/// negative extent in either dimension) is [`BotError::InvalidGeometry`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn crop_spec(polygon: &[Point], roll_angle: f64) -> Result<CropSpec> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in polygon {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let width = max_x - min_x;
    let height = max_y - min_y;
    if !(width > 0.0 && height > 0.0) {
        return Err(BotError::InvalidGeometry { width, height });
    }

    Ok(CropSpec {
        center_x: (min_x + max_x) / 2.0,
        center_y: (min_y + max_y) / 2.0,
        rotate_degrees: -roll_angle,
        width: (width * CANVAS_SCALE).round().max(1.0) as u32,
        height: (height * CANVAS_SCALE).round().max(1.0) as u32,
    })
}
