//! Test utilities for integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use histo_volume::mapper::LevelDimensions;
use histo_volume::pyramid::PyramidSource;

/// One recorded `read_region` call: (x0, y0, level, width, height).
pub type ReadCall = (i64, i64, usize, u64, u64);

/// Pyramid that only knows its level sizes and computes pixels on demand.
///
/// Pixel (x, y) of every level is opaque with red = x mod 256 and
/// green = y mod 256 in level coordinates.
#[derive(Clone)]
pub struct SyntheticSlide {
    levels: Vec<LevelDimensions>,
    reads: Arc<Mutex<Vec<ReadCall>>>,
}

impl SyntheticSlide {
    /// Levels halve in size starting from `width x height`.
    pub fn new(width: u64, height: u64, count: usize) -> Self {
        let levels = (0..count)
            .map(|i| LevelDimensions::new(width >> i, height >> i))
            .collect();
        Self {
            levels,
            reads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reads(&self) -> Vec<ReadCall> {
        self.reads.lock().unwrap().clone()
    }

    /// Opener closure serving this slide under `name`.
    pub fn opener(
        &self,
        name: &'static str,
    ) -> impl Fn(&Path) -> Result<Box<dyn PyramidSource>, String> + use<> {
        let slide = self.clone();
        move |path: &Path| {
            if path == Path::new(name) {
                Ok(Box::new(slide.clone()) as Box<dyn PyramidSource>)
            } else {
                Err(format!("unknown slide {}", path.display()))
            }
        }
    }
}

impl PyramidSource for SyntheticSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<LevelDimensions> {
        self.levels.get(level).copied()
    }

    fn read_region(
        &self,
        x0: i64,
        y0: i64,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, String> {
        self.reads
            .lock()
            .unwrap()
            .push((x0, y0, level, width, height));
        let shift = level as u32;
        let (x, y) = (x0 >> shift, y0 >> shift);
        let mut out = Vec::with_capacity((width * height) as usize);
        for row in 0..height as i64 {
            for col in 0..width as i64 {
                let r = ((x + col) & 0xff) as u32;
                let g = ((y + row) & 0xff) as u32;
                out.push(0xff00_0000 | (r << 16) | (g << 8) | 0x40);
            }
        }
        Ok(out)
    }
}

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("histo-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() > 4 && data.starts_with(&[0xFF, 0xD8]) && data.ends_with(&[0xFF, 0xD9])
}
