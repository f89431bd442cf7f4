//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `HISTO_` prefix:
//!
//! - `HISTO_SLIDE` - Pyramidal slide to read
//! - `HISTO_LEVEL` - Pyramid level (default: 0)
//! - `HISTO_JPEG_QUALITY` - JPEG quality of the extracted region (default: 90)
//! - `HISTO_SLICE_REPEAT` - Slices in the assembled stack (default: 50)
//! - `HISTO_OUTPUT` - Output file
//! - `HISTO_MANIFEST` - Manifest written by `extract` (default: output.txt)
//! - `HISTO_SPACING` - Voxel spacing of the rendered volume (default: 0.01)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::encoder::{DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY};
use crate::enums::{Compositing, ShadingMode};
use crate::extractor::ViewState;
use crate::manifest::DEFAULT_SLICE_REPEAT;
use crate::raycaster::MAX_COLORS;
use crate::volume::DEFAULT_VOXEL_SPACING;

/// Default path of the extracted JPEG.
pub const DEFAULT_IMAGE_OUTPUT: &str = "output.jpg";

/// Default path of the slice manifest.
pub const DEFAULT_MANIFEST_OUTPUT: &str = "output.txt";

/// Default path of the rendered image.
pub const DEFAULT_RENDER_OUTPUT: &str = "render.png";

/// Default edge length of the rendered image.
pub const DEFAULT_RENDER_SIZE: u32 = 512;

/// Largest output edge every device is guaranteed to support.
pub fn max_render_size() -> u32 {
    wgpu::Limits::default().max_texture_dimension_2d
}

/// Histo Volume - region extraction and volume rendering for whole-slide
/// images.
#[derive(Parser, Debug, Clone)]
#[command(name = "histo-volume")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract a region to JPEG and write the slice manifest.
    Extract(ExtractConfig),

    /// Extract a region, stack it into a volume and raycast it to PNG.
    Render(RenderConfig),
}

/// Which region of which slide to read.
#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    /// Pyramidal slide to read.
    #[arg(env = "HISTO_SLIDE")]
    pub slide: PathBuf,

    /// Pyramid level, 0 is full resolution.
    #[arg(short, long, default_value_t = 0, env = "HISTO_LEVEL")]
    pub level: usize,

    /// Level the origin was chosen on; the origin is rescaled when it
    /// differs from `level`.
    #[arg(long)]
    pub previous_level: Option<usize>,

    /// Viewport origin x.
    #[arg(short, long, default_value_t = 0.0)]
    pub x: f64,

    /// Viewport origin y.
    #[arg(short, long, default_value_t = 0.0)]
    pub y: f64,

    /// Selection corner as `x,y`; pass at least three (origin, width end,
    /// height end).
    #[arg(long = "selection", value_parser = parse_point)]
    pub selection: Vec<(f64, f64)>,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "HISTO_JPEG_QUALITY")]
    pub quality: u8,

    /// Number of slices the region is stacked into.
    #[arg(long, default_value_t = DEFAULT_SLICE_REPEAT, env = "HISTO_SLICE_REPEAT")]
    pub repeat: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RegionArgs {
    pub fn view(&self) -> ViewState {
        ViewState {
            origin: (self.x, self.y),
            previous_level: self.previous_level.unwrap_or(self.level),
            level: self.level,
        }
    }

    pub fn selection(&self) -> Option<&[(f64, f64)]> {
        if self.selection.is_empty() {
            None
        } else {
            Some(&self.selection)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.selection.is_empty() && self.selection.len() < 3 {
            return Err(format!(
                "A selection needs at least 3 points, got {}",
                self.selection.len()
            ));
        }
        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        if self.repeat == 0 {
            return Err("repeat must be greater than 0".to_string());
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err("origin must be finite".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractConfig {
    #[command(flatten)]
    pub region: RegionArgs,

    /// JPEG output path.
    #[arg(short, long, default_value = DEFAULT_IMAGE_OUTPUT, env = "HISTO_OUTPUT")]
    pub output: PathBuf,

    /// Manifest output path.
    #[arg(long, default_value = DEFAULT_MANIFEST_OUTPUT, env = "HISTO_MANIFEST")]
    pub manifest: PathBuf,
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.region.validate()?;
        if self.output == self.manifest {
            return Err("output and manifest must be different files".to_string());
        }
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingArg {
    None,
    Ambient,
    Diffuse,
    Specular,
    BlinnPhong,
    Phong,
}

impl From<ShadingArg> for ShadingMode {
    fn from(arg: ShadingArg) -> Self {
        match arg {
            ShadingArg::None => ShadingMode::None,
            ShadingArg::Ambient => ShadingMode::Ambient,
            ShadingArg::Diffuse => ShadingMode::Diffuse,
            ShadingArg::Specular => ShadingMode::Specular,
            ShadingArg::BlinnPhong => ShadingMode::BlinnPhong,
            ShadingArg::Phong => ShadingMode::Phong,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositingArg {
    Dvr,
    FirstHitPoints,
    FirstHitNormals,
    Mip,
    Iso,
}

impl From<CompositingArg> for Compositing {
    fn from(arg: CompositingArg) -> Self {
        match arg {
            CompositingArg::Dvr => Compositing::Dvr,
            CompositingArg::FirstHitPoints => Compositing::FirstHitPoints,
            CompositingArg::FirstHitNormals => Compositing::FirstHitNormals,
            CompositingArg::Mip => Compositing::MaximumIntensity,
            CompositingArg::Iso => Compositing::Iso,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub region: RegionArgs,

    /// PNG output path.
    #[arg(short, long, default_value = DEFAULT_RENDER_OUTPUT, env = "HISTO_OUTPUT")]
    pub output: PathBuf,

    /// World-space size of one voxel.
    #[arg(long, default_value_t = DEFAULT_VOXEL_SPACING, env = "HISTO_SPACING")]
    pub spacing: f32,

    /// Drop slices without a reader instead of keeping them as empty slices.
    #[arg(long, default_value_t = false)]
    pub skip_unsupported: bool,

    /// Volume component to render.
    #[arg(long, default_value_t = 0)]
    pub channel: usize,

    #[arg(long, value_enum, default_value_t = ShadingArg::Phong)]
    pub shading: ShadingArg,

    #[arg(long, value_enum, default_value_t = CompositingArg::Dvr)]
    pub compositing: CompositingArg,

    /// Classification colors (`#RRGGBB` or `#RRGGBBAA`, comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub colors: Vec<String>,

    /// Output width in pixels.
    #[arg(long, default_value_t = DEFAULT_RENDER_SIZE)]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long, default_value_t = DEFAULT_RENDER_SIZE)]
    pub height: u32,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.region.validate()?;
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err("spacing must be a positive number".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        let limit = max_render_size();
        if self.width > limit || self.height > limit {
            return Err(format!("width and height must be at most {limit}"));
        }
        if self.colors.len() > MAX_COLORS {
            return Err(format!("at most {MAX_COLORS} colors are supported"));
        }
        Ok(())
    }
}

fn parse_point(value: &str) -> Result<(f64, f64), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{value}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate '{v}': {e}"))
    };
    Ok((parse(x)?, parse(y)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(args: &[&str]) -> ExtractConfig {
        let argv = ["histo-volume", "extract"].into_iter().chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Extract(config) => config,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = extract(&["slide.svs"]);
        assert_eq!(config.region.level, 0);
        assert_eq!(config.region.quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(config.region.repeat, DEFAULT_SLICE_REPEAT);
        assert_eq!(config.output, PathBuf::from(DEFAULT_IMAGE_OUTPUT));
        assert_eq!(config.manifest, PathBuf::from(DEFAULT_MANIFEST_OUTPUT));
        assert!(config.region.selection().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_selection_points() {
        let config = extract(&[
            "slide.svs",
            "--selection",
            "0,0",
            "--selection",
            "500,0",
            "--selection",
            "0,300",
        ]);
        assert_eq!(
            config.region.selection(),
            Some(&[(0.0, 0.0), (500.0, 0.0), (0.0, 300.0)][..])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_too_few_selection_points() {
        let config = extract(&["slide.svs", "--selection", "0,0", "--selection", "5,0"]);
        let err = config.validate().unwrap_err();
        assert!(err.contains("3 points"));
    }

    #[test]
    fn test_previous_level_defaults_to_level() {
        let config = extract(&["slide.svs", "--level", "2", "-x", "100", "-y", "50"]);
        let view = config.region.view();
        assert_eq!(view.previous_level, 2);
        assert_eq!(view.origin, (100.0, 50.0));

        let config = extract(&["slide.svs", "--level", "2", "--previous-level", "1"]);
        assert_eq!(config.region.view().previous_level, 1);
    }

    #[test]
    fn test_invalid_quality() {
        let mut config = extract(&["slide.svs"]);
        config.region.quality = 0;
        assert!(config.validate().is_err());
        config.region.quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_render_options() {
        let cli = Cli::try_parse_from([
            "histo-volume",
            "render",
            "slide.svs",
            "--shading",
            "none",
            "--compositing",
            "mip",
            "--colors",
            "#000000,#ffffff",
            "--width",
            "64",
        ])
        .unwrap();
        let Command::Render(config) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(ShadingMode::from(config.shading), ShadingMode::None);
        assert_eq!(Compositing::from(config.compositing), Compositing::MaximumIntensity);
        assert_eq!(config.colors.len(), 2);
        assert_eq!((config.width, config.height), (64, DEFAULT_RENDER_SIZE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_render_rejects_bad_spacing() {
        let cli = Cli::try_parse_from(["histo-volume", "render", "slide.svs", "--spacing", "0"])
            .unwrap();
        let Command::Render(config) = cli.command else {
            panic!("expected render");
        };
        assert!(config.validate().unwrap_err().contains("spacing"));
    }

    #[test]
    fn test_render_rejects_oversized_output() {
        let too_wide = (max_render_size() + 1).to_string();
        let cli = Cli::try_parse_from(["histo-volume", "render", "slide.svs", "--width", &too_wide])
            .unwrap();
        let Command::Render(config) = cli.command else {
            panic!("expected render");
        };
        assert!(config.validate().unwrap_err().contains("at most"));
    }

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("1.5, -2"), Ok((1.5, -2.0)));
        assert!(parse_point("12").is_err());
        assert!(parse_point("a,b").is_err());
    }
}
