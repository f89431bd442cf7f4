//! Coordinate transforms between pyramid levels.
//!
//! Pyramid levels are not assumed to be exact power-of-two downsamples, so
//! every transform scales by the ratio of the actual level dimensions.

use thiserror::Error;

/// Largest region that is extracted in one request.
pub const MAX_VIEWPORT: (u64, u64) = (1920, 1080);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("Selection needs at least 3 points, got {0}")]
    TooFewPoints(usize),
}

/// Width and height of a single pyramid level in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDimensions {
    pub width: u64,
    pub height: u64,
}

impl LevelDimensions {
    pub fn new(width: u64, height: u64) -> Self {
        Self { width, height }
    }
}

/// Rectangle selected on the currently viewed level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub x: f64,
    pub y: f64,
    pub width: u64,
    pub height: u64,
}

impl SelectionRect {
    /// Derives a rectangle from externally supplied points.
    ///
    /// Point 0 is the origin, the width is measured against point 1 and the
    /// height against point 2. Additional points are ignored.
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self, SelectionError> {
        if points.len() < 3 {
            return Err(SelectionError::TooFewPoints(points.len()));
        }
        let (x, y) = points[0];
        let width = (x - points[1].0).abs() as u64;
        let height = (y - points[2].1).abs() as u64;
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Full viewport anchored at the configured origin.
    pub fn default_viewport(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            width: MAX_VIEWPORT.0,
            height: MAX_VIEWPORT.1,
        }
    }

    /// Scales the extent by the integer level-0 ratio and bounds it by the
    /// maximum viewport.
    pub fn scale_extent_to_level0(self, level: LevelDimensions, level0: LevelDimensions) -> Self {
        let ratio_x = (level0.width / level.width.max(1)).max(1);
        let ratio_y = (level0.height / level.height.max(1)).max(1);
        Self {
            width: self.width.saturating_mul(ratio_x).min(MAX_VIEWPORT.0),
            height: self.height.saturating_mul(ratio_y).min(MAX_VIEWPORT.1),
            ..self
        }
    }
}

/// Rescales an origin chosen on `prev` to the level with dimensions `new`.
pub fn rescale_origin(
    origin: (f64, f64),
    prev: LevelDimensions,
    new: LevelDimensions,
) -> (f64, f64) {
    if prev == new {
        return origin;
    }
    (
        origin.0 * (new.width as f64 / prev.width as f64),
        origin.1 * (new.height as f64 / prev.height as f64),
    )
}

/// Same as [`rescale_origin`] but skips the transform when the level index
/// did not change.
pub fn rescale_between_levels(
    origin: (f64, f64),
    prev_level: usize,
    new_level: usize,
    prev: LevelDimensions,
    new: LevelDimensions,
) -> (f64, f64) {
    if prev_level == new_level {
        origin
    } else {
        rescale_origin(origin, prev, new)
    }
}

/// Keeps `origin + extent` inside `dims` by moving the origin backwards.
///
/// The extent is never shrunk. The origin ends up in `[0, dim - extent]`,
/// or at 0 when the extent is larger than the level.
pub fn clamp_origin(origin: (f64, f64), extent: (u64, u64), dims: LevelDimensions) -> (f64, f64) {
    let clamp_axis = |value: f64, extent: u64, dim: u64| {
        let max = dim.saturating_sub(extent) as f64;
        value.min(max).max(0.0)
    };
    (
        clamp_axis(origin.0, extent.0, dims.width),
        clamp_axis(origin.1, extent.1, dims.height),
    )
}

/// Maps a coordinate on `level` back to level 0.
pub fn to_level0(
    coord: (f64, f64),
    level: LevelDimensions,
    level0: LevelDimensions,
) -> (f64, f64) {
    (
        coord.0 * (level0.width as f64 / level.width as f64),
        coord.1 * (level0.height as f64 / level.height as f64),
    )
}
