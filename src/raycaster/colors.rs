use std::str::FromStr;

use thiserror::Error;

/// Capacity of the color array uniform.
pub const MAX_COLORS: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColorArrayError {
    #[error("Color array holds at most {max} colors, got {len}", max = MAX_COLORS)]
    CapacityExceeded { len: usize },

    #[error("Invalid color '{0}', expected #RRGGBB or #RRGGBBAA")]
    InvalidColor(String),
}

/// Per-sample colors the raycaster classifies values with.
///
/// A normalized sample value `v` is mapped to position `v * (len - 1)` and
/// interpolated between the two neighbouring entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorArray {
    colors: Vec<[f32; 4]>,
}

impl ColorArray {
    pub fn new(colors: Vec<[f32; 4]>) -> Result<Self, ColorArrayError> {
        if colors.len() > MAX_COLORS {
            return Err(ColorArrayError::CapacityExceeded { len: colors.len() });
        }
        Ok(Self { colors })
    }

    /// Linear ramp from transparent black to opaque white.
    pub fn grayscale(len: usize) -> Self {
        let len = len.clamp(2, MAX_COLORS);
        let colors = (0..len)
            .map(|i| {
                let v = i as f32 / (len - 1) as f32;
                [v, v, v, v]
            })
            .collect();
        Self { colors }
    }

    pub fn from_hex<S: AsRef<str>>(values: &[S]) -> Result<Self, ColorArrayError> {
        let colors = values
            .iter()
            .map(|v| v.as_ref().parse::<HexColor>().map(|c| c.0))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(colors)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn as_slice(&self) -> &[[f32; 4]] {
        &self.colors
    }

    /// Copies the colors into a fixed-capacity uniform array.
    pub fn to_uniform(&self) -> [[f32; 4]; MAX_COLORS] {
        let mut out = [[0.0; 4]; MAX_COLORS];
        out[..self.colors.len()].copy_from_slice(&self.colors);
        out
    }
}

/// RGBA color parsed from `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexColor(pub [f32; 4]);

impl FromStr for HexColor {
    type Err = ColorArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ColorArrayError::InvalidColor(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let mut rgba = [1.0f32; 4];
        for (i, channel) in rgba.iter_mut().enumerate().take(hex.len() / 2) {
            let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
            *channel = byte as f32 / 255.0;
        }
        Ok(Self(rgba))
    }
}
