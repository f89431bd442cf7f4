//! Plain-text slice manifest.
//!
//! One slice path per line. Multi-slice readers consume this file, so the
//! layout is fixed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Number of times the extracted image is listed.
pub const DEFAULT_SLICE_REPEAT: usize = 50;

pub fn write_manifest(path: &Path, image_path: &Path, repeat: usize) -> io::Result<()> {
    let mut out = io::BufWriter::new(fs::File::create(path)?);
    let line = image_path.to_string_lossy();
    for _ in 0..repeat {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

pub fn read_manifest(path: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
