use rayon::prelude::*;

/// Packed ARGB samples of an extracted region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u32>,
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_rgb(&self) -> RgbBuffer {
        to_rgb(&self.data, self.width, self.height)
    }
}

/// Interleaved 8-bit RGB, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[inline]
fn unpack_rgb(argb: u32) -> [u8; 3] {
    [
        ((argb >> 16) & 0xff) as u8,
        ((argb >> 8) & 0xff) as u8,
        (argb & 0xff) as u8,
    ]
}

/// Drops the alpha channel of packed ARGB samples.
///
/// Only the first `width * height` samples are converted.
pub fn to_rgb(argb: &[u32], width: u32, height: u32) -> RgbBuffer {
    let count = (width as usize * height as usize).min(argb.len());
    let data: Vec<u8> = argb[..count]
        .par_iter()
        .flat_map_iter(|&sample| unpack_rgb(sample))
        .collect();
    RgbBuffer {
        width,
        height,
        data,
    }
}
