//! Multi-resolution image sources.
//!
//! A [`PyramidSource`] is the handle the region extractor works against. It
//! is opened through a [`PyramidOpener`] at the start of an extraction and
//! dropped at the end of it.

use std::path::Path;
use std::sync::Arc;

use image::{RgbaImage, imageops::FilterType};

use crate::mapper::LevelDimensions;

/// Default downsample factor between generated levels.
pub const DEFAULT_LEVEL_FACTOR: u32 = 4;

/// Default number of generated levels (including level 0).
pub const DEFAULT_MAX_LEVELS: usize = 4;

/// Smallest side a generated level may have.
const MIN_LEVEL_SIDE: u32 = 16;

/// Packs RGBA channels into an ARGB sample.
#[inline]
pub(crate) fn pack_argb([r, g, b, a]: [u8; 4]) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Read access to a pyramidal image.
pub trait PyramidSource: Send {
    /// Number of levels. Level 0 is the full resolution image.
    fn level_count(&self) -> usize;

    /// Dimensions of `level`, or `None` if the level does not exist.
    fn level_dimensions(&self, level: usize) -> Option<LevelDimensions>;

    /// Reads a `width x height` region of `level` anchored at the level-0
    /// coordinate `(x0, y0)`.
    ///
    /// Samples are packed ARGB (alpha in bits 24..32). Pixels outside the
    /// level are fully transparent.
    fn read_region(
        &self,
        x0: i64,
        y0: i64,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, String>;
}

/// Opens pyramid sources from paths.
pub trait PyramidOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PyramidSource>, String>;
}

impl<F> PyramidOpener for F
where
    F: Fn(&Path) -> Result<Box<dyn PyramidSource>, String>,
{
    fn open(&self, path: &Path) -> Result<Box<dyn PyramidSource>, String> {
        self(path)
    }
}

/// Pyramid held in memory as one RGBA image per level.
#[derive(Debug, Clone)]
pub struct MemoryPyramid {
    levels: Arc<Vec<RgbaImage>>,
}

impl MemoryPyramid {
    /// Creates a pyramid from explicit levels, ordered from full resolution
    /// down.
    pub fn new(levels: Vec<RgbaImage>) -> Self {
        Self {
            levels: Arc::new(levels),
        }
    }

    /// Generates levels from a base image by repeated downsampling.
    pub fn from_base(base: RgbaImage, factor: u32, max_levels: usize) -> Self {
        let factor = factor.max(2);
        let mut levels = vec![base];
        while levels.len() < max_levels.max(1) {
            let Some(last) = levels.last() else { break };
            let (width, height) = (last.width() / factor, last.height() / factor);
            if width < MIN_LEVEL_SIDE || height < MIN_LEVEL_SIDE {
                break;
            }
            let next = image::imageops::resize(last, width, height, FilterType::Triangle);
            levels.push(next);
        }
        Self::new(levels)
    }
}

impl PyramidSource for MemoryPyramid {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<LevelDimensions> {
        self.levels
            .get(level)
            .map(|img| LevelDimensions::new(img.width() as u64, img.height() as u64))
    }

    fn read_region(
        &self,
        x0: i64,
        y0: i64,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, String> {
        let img = self
            .levels
            .get(level)
            .ok_or_else(|| format!("level {level} does not exist"))?;
        let base = &self.levels[0];

        // Level-0 anchor to level pixel space
        let x = (x0 as f64 * img.width() as f64 / base.width() as f64).floor() as i64;
        let y = (y0 as f64 * img.height() as f64 / base.height() as f64).floor() as i64;

        let mut out = vec![0u32; (width * height) as usize];
        for (row, chunk) in out.chunks_mut(width.max(1) as usize).enumerate() {
            let sy = y + row as i64;
            if sy < 0 || sy >= img.height() as i64 {
                continue;
            }
            for (col, sample) in chunk.iter_mut().enumerate() {
                let sx = x + col as i64;
                if sx < 0 || sx >= img.width() as i64 {
                    continue;
                }
                *sample = pack_argb(img.get_pixel(sx as u32, sy as u32).0);
            }
        }
        Ok(out)
    }
}

/// Opens plain raster images and synthesizes a pyramid from them.
///
/// Used for images that carry a single resolution only; see
/// [`crate::tiff_pyramid::SlideFileOpener`] for multi-level slides.
#[derive(Debug, Clone, Copy)]
pub struct ImageFileOpener {
    pub factor: u32,
    pub max_levels: usize,
}

impl Default for ImageFileOpener {
    fn default() -> Self {
        Self {
            factor: DEFAULT_LEVEL_FACTOR,
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

impl PyramidOpener for ImageFileOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PyramidSource>, String> {
        let base = image::open(path).map_err(|e| e.to_string())?.to_rgba8();
        if base.width() == 0 || base.height() == 0 {
            return Err("image has no pixels".to_string());
        }
        Ok(Box::new(MemoryPyramid::from_base(
            base,
            self.factor,
            self.max_levels,
        )))
    }
}
