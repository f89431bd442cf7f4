//! Pyramid levels stored as TIFF image directories.
//!
//! Whole-slide TIFFs (Aperio SVS, generic pyramidal TIFF) keep every
//! resolution level in its own directory next to label, macro and thumbnail
//! images. Levels are picked the following way:
//! 1. Tiled directories are preferred; untiled files use every directory
//! 2. The largest directory is level 0
//! 3. Smaller directories with the aspect ratio of level 0 follow in
//!    decreasing size, everything else is ignored

use std::cmp::Reverse;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use tiff::ColorType;
use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tracing::debug;

use crate::mapper::LevelDimensions;
use crate::pyramid::{ImageFileOpener, PyramidOpener, PyramidSource, pack_argb};

/// Upper bound on scanned directories.
const MAX_DIRECTORIES: usize = 100;

/// Relative aspect ratio difference still accepted for a level.
const ASPECT_TOLERANCE: f64 = 0.05;

#[derive(Debug, Error)]
pub enum TiffPyramidError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("No pyramid levels found")]
    NoLevels,

    #[error("Unsupported color type {0}")]
    UnsupportedColor(String),

    #[error("Unsupported sample format")]
    UnsupportedSamples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Directory {
    index: usize,
    width: u32,
    height: u32,
    tiled: bool,
    /// Nominal tile size, or (width, rows per strip).
    chunk: (u32, u32),
}

impl Directory {
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// Keeps the directories that form the resolution pyramid, level 0 first.
fn select_levels(directories: &[Directory]) -> Vec<Directory> {
    let mut candidates: Vec<Directory> = directories.iter().copied().filter(|d| d.tiled).collect();
    if candidates.is_empty() {
        candidates = directories.to_vec();
    }
    candidates.retain(|d| d.width > 0 && d.height > 0);
    candidates.sort_by_key(|d| Reverse(d.area()));

    let Some(base) = candidates.first().copied() else {
        return Vec::new();
    };
    let mut levels = vec![base];
    for directory in candidates.into_iter().skip(1) {
        let last = levels[levels.len() - 1];
        let same_shape = (directory.aspect() / base.aspect() - 1.0).abs() <= ASPECT_TOLERANCE;
        if same_shape && directory.width < last.width && directory.height < last.height {
            levels.push(directory);
        }
    }
    levels
}

fn samples_per_pixel(color: ColorType) -> Result<usize, TiffPyramidError> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::GrayA(_) => Ok(2),
        ColorType::RGB(_) | ColorType::YCbCr(_) => Ok(3),
        ColorType::RGBA(_) => Ok(4),
        other => Err(TiffPyramidError::UnsupportedColor(format!("{other:?}"))),
    }
}

fn to_u8(chunk: DecodingResult) -> Result<Vec<u8>, TiffPyramidError> {
    match chunk {
        DecodingResult::U8(samples) => Ok(samples),
        DecodingResult::U16(samples) => Ok(samples.into_iter().map(|s| (s >> 8) as u8).collect()),
        _ => Err(TiffPyramidError::UnsupportedSamples),
    }
}

fn pixel_argb(px: &[u8]) -> u32 {
    match px {
        &[v] => pack_argb([v, v, v, 255]),
        &[v, a] => pack_argb([v, v, v, a]),
        &[r, g, b] => pack_argb([r, g, b, 255]),
        &[r, g, b, a, ..] => pack_argb([r, g, b, a]),
        &[] => 0,
    }
}

/// Pyramid read directly from the directories of a TIFF file.
pub struct TiffPyramid {
    decoder: Mutex<Decoder<BufReader<File>>>,
    levels: Vec<Directory>,
}

impl TiffPyramid {
    pub fn open(path: &Path) -> Result<Self, TiffPyramidError> {
        let file = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());

        let mut directories = Vec::new();
        loop {
            let (width, height) = decoder.dimensions()?;
            directories.push(Directory {
                index: directories.len(),
                width,
                height,
                tiled: matches!(decoder.get_chunk_type(), ChunkType::Tile),
                chunk: decoder.chunk_dimensions(),
            });
            if !decoder.more_images() || directories.len() >= MAX_DIRECTORIES {
                break;
            }
            decoder.next_image()?;
        }

        let levels = select_levels(&directories);
        if levels.is_empty() {
            return Err(TiffPyramidError::NoLevels);
        }
        debug!(
            "{}: {} directories, levels {:?}",
            path.display(),
            directories.len(),
            levels
                .iter()
                .map(|l| (l.width, l.height))
                .collect::<Vec<_>>()
        );
        Ok(Self {
            decoder: Mutex::new(decoder),
            levels,
        })
    }

    fn read_level(
        &self,
        level: &Directory,
        (x, y): (i64, i64),
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, TiffPyramidError> {
        let mut out = vec![0u32; (width * height) as usize];
        let x_start = x.max(0);
        let y_start = y.max(0);
        let x_end = (x + width as i64).min(level.width as i64);
        let y_end = (y + height as i64).min(level.height as i64);
        if x_start >= x_end || y_start >= y_end {
            return Ok(out);
        }

        let (chunk_width, chunk_height) = (level.chunk.0.max(1) as i64, level.chunk.1.max(1) as i64);
        let across = (level.width as u64).div_ceil(chunk_width as u64) as i64;

        let mut decoder = self
            .decoder
            .lock()
            .map_err(|_| io::Error::other("decoder lock poisoned"))?;
        decoder.seek_to_image(level.index)?;
        let spp = samples_per_pixel(decoder.colortype()?)?;

        for ty in y_start / chunk_height..=(y_end - 1) / chunk_height {
            for tx in x_start / chunk_width..=(x_end - 1) / chunk_width {
                let samples = to_u8(decoder.read_chunk((ty * across + tx) as u32)?)?;
                let data_width = chunk_width.min(level.width as i64 - tx * chunk_width);
                let data_height = chunk_height.min(level.height as i64 - ty * chunk_height);
                // Edge chunks come back either cropped or padded to the full chunk
                let pixels = (samples.len() / spp) as i64;
                let stride = if pixels == data_width * data_height {
                    data_width
                } else if pixels == chunk_width * chunk_height {
                    chunk_width
                } else {
                    return Err(TiffPyramidError::UnsupportedSamples);
                };

                let rows = (ty * chunk_height).max(y_start)..(ty * chunk_height + data_height).min(y_end);
                let cols = (tx * chunk_width).max(x_start)..(tx * chunk_width + data_width).min(x_end);
                for sy in rows {
                    let row = (sy - ty * chunk_height) * stride;
                    for sx in cols.clone() {
                        let offset = ((row + sx - tx * chunk_width) as usize) * spp;
                        let out_index = ((sy - y) as u64 * width + (sx - x) as u64) as usize;
                        out[out_index] = pixel_argb(&samples[offset..offset + spp]);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl PyramidSource for TiffPyramid {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<LevelDimensions> {
        self.levels
            .get(level)
            .map(|l| LevelDimensions::new(l.width as u64, l.height as u64))
    }

    fn read_region(
        &self,
        x0: i64,
        y0: i64,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, String> {
        let directory = self
            .levels
            .get(level)
            .ok_or_else(|| format!("level {level} does not exist"))?;
        let base = &self.levels[0];
        let x = (x0 as f64 * directory.width as f64 / base.width as f64).floor() as i64;
        let y = (y0 as f64 * directory.height as f64 / base.height as f64).floor() as i64;
        self.read_level(directory, (x, y), width, height)
            .map_err(|e| e.to_string())
    }
}

/// True if the file starts with a TIFF or BigTIFF header.
pub fn is_tiff(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    File::open(path)?.read_exact(&mut magic)?;
    Ok(matches!(
        magic,
        [b'I', b'I', 42, 0] | [b'M', b'M', 0, 42] | [b'I', b'I', 43, 0] | [b'M', b'M', 0, 43]
    ))
}

/// Opens TIFF based slides through their own levels and anything else
/// through [`ImageFileOpener`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SlideFileOpener {
    pub fallback: ImageFileOpener,
}

impl PyramidOpener for SlideFileOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PyramidSource>, String> {
        if is_tiff(path).map_err(|e| e.to_string())? {
            let pyramid = TiffPyramid::open(path).map_err(|e| e.to_string())?;
            return Ok(Box::new(pyramid));
        }
        self.fallback.open(path)
    }
}
