//! Region extraction from pyramidal slides.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use web_time::Instant;

use crate::encoder::{ByteSink, EncodeError, FileSink, ImageEncoder};
use crate::mapper::{self, LevelDimensions, SelectionError, SelectionRect};
use crate::pixel::PixelBuffer;
use crate::pyramid::{PyramidOpener, PyramidSource};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Could not open pyramidal image '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Level {level} is out of range, '{path}' has {count} level(s)")]
    LevelOutOfRange {
        path: PathBuf,
        level: usize,
        count: usize,
    },

    #[error("Invalid selection on '{path}': {source}")]
    Selection {
        path: PathBuf,
        source: SelectionError,
    },

    #[error("Failed to read region from '{path}': {message}")]
    Region { path: PathBuf, message: String },

    #[error("Failed to encode region: {0}")]
    Encode(#[from] EncodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Addressable bounds of the opened slide.
///
/// Returned with every extraction so callers can keep their level and
/// coordinate limits in sync with the asset that was actually opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelBounds {
    pub max_level: usize,
    pub level_width: u64,
    pub level_height: u64,
}

/// Region read from one pyramid level.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub pixels: PixelBuffer,
    pub bounds: LevelBounds,
}

/// What the caller currently looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Origin on `previous_level`, or on `level` when no level change
    /// happened.
    pub origin: (f64, f64),
    pub previous_level: usize,
    pub level: usize,
}

/// Region resolved against the slide's levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionPlan {
    pub level: usize,
    /// Origin on `level` after rescale and clamping.
    pub origin: (f64, f64),
    /// Origin in level-0 pixels, as passed to the decoder.
    pub origin_level0: (i64, i64),
    pub width: u64,
    pub height: u64,
    pub bounds: LevelBounds,
}

pub struct RegionExtractor<O> {
    opener: O,
}

impl<O: PyramidOpener> RegionExtractor<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PyramidSource>, ExtractError> {
        self.opener.open(path).map_err(|reason| ExtractError::Open {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn dimensions(
        source: &dyn PyramidSource,
        path: &Path,
        level: usize,
    ) -> Result<LevelDimensions, ExtractError> {
        source
            .level_dimensions(level)
            .ok_or_else(|| ExtractError::LevelOutOfRange {
                path: path.to_path_buf(),
                level,
                count: source.level_count(),
            })
    }

    fn bounds(
        source: &dyn PyramidSource,
        path: &Path,
        level: usize,
    ) -> Result<LevelBounds, ExtractError> {
        let dims = Self::dimensions(source, path, level)?;
        Ok(LevelBounds {
            max_level: source.level_count().saturating_sub(1),
            level_width: dims.width,
            level_height: dims.height,
        })
    }

    /// Reads a `width x height` region of `level` anchored at a level-0
    /// coordinate.
    ///
    /// The slide is opened for this call only and closed on every path.
    pub fn extract(
        &self,
        path: &Path,
        level: usize,
        origin_level0: (i64, i64),
        width: u64,
        height: u64,
    ) -> Result<Extraction, ExtractError> {
        let source = self.open(path)?;
        Self::read(source.as_ref(), path, level, origin_level0, width, height)
    }

    /// Resolves a selection (or the default viewport) into a decodable
    /// region.
    pub fn plan_region(
        &self,
        path: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
    ) -> Result<RegionPlan, ExtractError> {
        let source = self.open(path)?;
        Self::plan(source.as_ref(), path, view, selection)
    }

    fn read(
        source: &dyn PyramidSource,
        path: &Path,
        level: usize,
        origin_level0: (i64, i64),
        width: u64,
        height: u64,
    ) -> Result<Extraction, ExtractError> {
        let bounds = Self::bounds(source, path, level)?;

        let start = Instant::now();
        let data = source
            .read_region(origin_level0.0, origin_level0.1, level, width, height)
            .map_err(|message| ExtractError::Region {
                path: path.to_path_buf(),
                message,
            })?;
        if data.len() as u64 != width * height {
            return Err(ExtractError::Region {
                path: path.to_path_buf(),
                message: format!(
                    "decoder returned {} samples, expected {}",
                    data.len(),
                    width * height
                ),
            });
        }
        debug!(
            "Read {}x{} region at level {} from {} in {:?}",
            width,
            height,
            level,
            path.display(),
            start.elapsed()
        );

        Ok(Extraction {
            pixels: PixelBuffer {
                width: width as u32,
                height: height as u32,
                data,
            },
            bounds,
        })
    }

    fn plan(
        source: &dyn PyramidSource,
        path: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
    ) -> Result<RegionPlan, ExtractError> {
        let bounds = Self::bounds(source, path, view.level)?;
        let level0 = Self::dimensions(source, path, 0)?;
        let dims = LevelDimensions::new(bounds.level_width, bounds.level_height);

        let rect = match selection {
            Some(points) => SelectionRect::from_points(points)
                .map_err(|source| ExtractError::Selection {
                    path: path.to_path_buf(),
                    source,
                })?
                .scale_extent_to_level0(dims, level0),
            None => SelectionRect::default_viewport(view.origin.0, view.origin.1),
        };

        let mut origin = (rect.x, rect.y);
        if view.previous_level != view.level {
            let prev = Self::dimensions(source, path, view.previous_level)?;
            origin = mapper::rescale_between_levels(
                origin,
                view.previous_level,
                view.level,
                prev,
                dims,
            );
            info!(
                "Zoomed from level {} to {}, origin ({:.1}, {:.1}) -> ({:.1}, {:.1})",
                view.previous_level, view.level, rect.x, rect.y, origin.0, origin.1
            );
        }

        let origin = mapper::clamp_origin(origin, (rect.width, rect.height), dims);
        let level0_origin = mapper::to_level0(origin, dims, level0);
        debug!(
            "Region in level 0: ({:.1}, {:.1}) {}x{}",
            level0_origin.0, level0_origin.1, rect.width, rect.height
        );

        Ok(RegionPlan {
            level: view.level,
            origin,
            origin_level0: (level0_origin.0.floor() as i64, level0_origin.1.floor() as i64),
            width: rect.width.min(dims.width),
            height: rect.height.min(dims.height),
            bounds,
        })
    }

    /// Plans, reads and JPEG-encodes a region into `sink`.
    pub fn extract_encoded<S: ByteSink + ?Sized>(
        &self,
        path: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
        encoder: &ImageEncoder,
        sink: &mut S,
    ) -> Result<RegionPlan, ExtractError> {
        let source = self.open(path)?;
        let plan = Self::plan(source.as_ref(), path, view, selection)?;
        let extraction = Self::read(
            source.as_ref(),
            path,
            plan.level,
            plan.origin_level0,
            plan.width,
            plan.height,
        )?;
        drop(source);
        let rgb = extraction.pixels.to_rgb();
        encoder.encode_buffer(&rgb, sink)?;
        Ok(plan)
    }

    /// [`Self::extract_encoded`] into a JPEG file at `output`.
    pub fn extract_to_file(
        &self,
        path: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
        encoder: &ImageEncoder,
        output: &Path,
    ) -> Result<RegionPlan, ExtractError> {
        let mut sink = FileSink::create(output)?;
        let plan = self.extract_encoded(path, view, selection, encoder, &mut sink)?;
        info!(
            "Wrote {}x{} region of level {} to {}",
            plan.width,
            plan.height,
            plan.level,
            output.display()
        );
        Ok(plan)
    }
}
