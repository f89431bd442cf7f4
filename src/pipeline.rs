//! Slide region to volume.
//!
//! The extracted region is JPEG-encoded once and handed to the assembler
//! in memory; the same bytes back every slice of the stack. [`SlidePipeline::export`]
//! writes the file based hand-off (image plus manifest) instead.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::encoder::ImageEncoder;
use crate::extractor::{ExtractError, RegionExtractor, RegionPlan, ViewState};
use crate::gpu_stager::GpuError;
use crate::manifest::{self, DEFAULT_SLICE_REPEAT};
use crate::pyramid::PyramidOpener;
use crate::raycaster::RenderError;
use crate::slice_reader::{MemorySliceReader, ReaderRegistry};
use crate::volume::{DEFAULT_VOXEL_SPACING, Volume};
use crate::volume_assembler::{AssembleError, VolumeAssembler};

/// Virtual path of the in-memory region slice.
pub const REGION_SLICE_PATH: &str = "region.jpg";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not write image '{path}': {message}")]
    Image { path: PathBuf, message: String },
}

/// JPEG bytes of an extracted region with the plan that produced them.
#[derive(Debug, Clone)]
pub struct EncodedRegion {
    pub plan: RegionPlan,
    pub jpeg: Arc<Vec<u8>>,
}

pub struct SlidePipeline<O> {
    extractor: RegionExtractor<O>,
    encoder: ImageEncoder,
    repeat: usize,
    spacing: f32,
    skip_unsupported: bool,
}

impl<O: PyramidOpener> SlidePipeline<O> {
    pub fn new(opener: O) -> Self {
        Self {
            extractor: RegionExtractor::new(opener),
            encoder: ImageEncoder::default(),
            repeat: DEFAULT_SLICE_REPEAT,
            spacing: DEFAULT_VOXEL_SPACING,
            skip_unsupported: false,
        }
    }

    pub fn with_encoder(mut self, encoder: ImageEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Number of slices the region is stacked into.
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing;
        self
    }

    /// Drop slices without a reader instead of keeping empty placeholders.
    pub fn with_skip_unsupported(mut self, skip: bool) -> Self {
        self.skip_unsupported = skip;
        self
    }

    pub fn extractor(&self) -> &RegionExtractor<O> {
        &self.extractor
    }

    pub fn extract_region(
        &self,
        slide: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
    ) -> Result<EncodedRegion, PipelineError> {
        let mut jpeg = Vec::new();
        let plan = self
            .extractor
            .extract_encoded(slide, view, selection, &self.encoder, &mut jpeg)?;
        Ok(EncodedRegion {
            plan,
            jpeg: Arc::new(jpeg),
        })
    }

    /// Stacks the region `repeat` times into a volume.
    pub fn assemble(&self, region: &EncodedRegion) -> Result<Volume, PipelineError> {
        let mut reader = MemorySliceReader::new();
        reader.insert(REGION_SLICE_PATH, region.jpeg.clone());
        let registry = ReaderRegistry::new().with_reader("jpg", Arc::new(reader));
        let paths = vec![PathBuf::from(REGION_SLICE_PATH); self.repeat];
        let volume = VolumeAssembler::new(registry)
            .with_spacing(self.spacing)
            .assemble(&paths[..], self.skip_unsupported)?;
        Ok(volume)
    }

    pub fn build_volume(
        &self,
        slide: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
    ) -> Result<(RegionPlan, Volume), PipelineError> {
        let region = self.extract_region(slide, view, selection)?;
        let volume = self.assemble(&region)?;
        info!(
            "Built volume {} ({:?}) from a {}x{} region of {}",
            volume.id(),
            volume.dim(),
            region.plan.width,
            region.plan.height,
            slide.display()
        );
        Ok((region.plan, volume))
    }

    /// Writes the region as JPEG to `image` and a manifest listing it
    /// `repeat` times to `manifest_path`.
    pub fn export(
        &self,
        slide: &Path,
        view: ViewState,
        selection: Option<&[(f64, f64)]>,
        image: &Path,
        manifest_path: &Path,
    ) -> Result<RegionPlan, PipelineError> {
        let plan = self
            .extractor
            .extract_to_file(slide, view, selection, &self.encoder, image)?;
        manifest::write_manifest(manifest_path, image, self.repeat)?;
        Ok(plan)
    }

    /// Reads back an exported manifest into a volume.
    pub fn assemble_manifest(&self, manifest_path: &Path) -> Result<Volume, PipelineError> {
        let volume = VolumeAssembler::new(ReaderRegistry::with_defaults())
            .with_spacing(self.spacing)
            .assemble_from_manifest(manifest_path, self.skip_unsupported)?;
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::NumericType;
    use crate::pyramid::{MemoryPyramid, PyramidSource};
    use image::{Rgba, RgbaImage};

    fn opener(path: &Path) -> Result<Box<dyn PyramidSource>, String> {
        if path.to_str() != Some("slide.svs") {
            return Err("no such slide".to_string());
        }
        let base = RgbaImage::from_fn(256, 192, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]));
        Ok(Box::new(MemoryPyramid::from_base(base, 4, 3)))
    }

    fn view(level: usize) -> ViewState {
        ViewState {
            origin: (0.0, 0.0),
            previous_level: level,
            level,
        }
    }

    #[test]
    fn test_region_becomes_stack() {
        let pipeline = SlidePipeline::new(opener).with_repeat(5);
        let selection = [(0.0, 0.0), (64.0, 0.0), (0.0, 32.0)];
        let (plan, volume) = pipeline
            .build_volume(Path::new("slide.svs"), view(0), Some(&selection))
            .unwrap();
        assert_eq!((plan.width, plan.height), (64, 32));
        assert_eq!(volume.dim(), (5, 32, 64));
        assert_eq!(volume.components(), 3);
        assert_eq!(volume.format().numeric, NumericType::UnsignedInteger);
        assert_eq!(volume.format().precision, 8);
        assert!(!volume.is_slice_zero(4));
    }

    #[test]
    fn test_spacing_applies() {
        let pipeline = SlidePipeline::new(opener).with_repeat(2).with_spacing(0.5);
        let selection = [(0.0, 0.0), (10.0, 0.0), (0.0, 4.0)];
        let (_, volume) = pipeline
            .build_volume(Path::new("slide.svs"), view(0), Some(&selection))
            .unwrap();
        assert_eq!(volume.basis[0][0], 5.0);
        assert_eq!(volume.basis[1][1], 2.0);
        assert_eq!(volume.basis[2][2], 1.0);
        assert_eq!(volume.offset, [-2.5, -1.0, -0.5]);
    }

    #[test]
    fn test_open_failure_surfaces() {
        let pipeline = SlidePipeline::new(opener);
        let err = pipeline
            .build_volume(Path::new("missing.svs"), view(0), None)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extract(ExtractError::Open { .. })
        ));
    }

    #[test]
    fn test_export_writes_image_and_manifest() {
        let dir = std::env::temp_dir().join(format!("histo-pipeline-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let image = dir.join("output.jpg");
        let manifest_path = dir.join("output.txt");

        let pipeline = SlidePipeline::new(opener).with_repeat(3);
        let selection = [(0.0, 0.0), (20.0, 0.0), (0.0, 10.0)];
        pipeline
            .export(Path::new("slide.svs"), view(0), Some(&selection), &image, &manifest_path)
            .unwrap();

        let listed = manifest::read_manifest(&manifest_path).unwrap();
        assert_eq!(listed, vec![image.clone(); 3]);

        let volume = pipeline.assemble_manifest(&manifest_path).unwrap();
        assert_eq!(volume.dim(), (3, 10, 20));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unsupported_slices_kept_by_default() {
        let dir = std::env::temp_dir().join(format!("histo-pipeline-skip-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let image = dir.join("slice.png");
        RgbaImage::from_pixel(6, 4, Rgba([1, 2, 3, 255]))
            .save(&image)
            .unwrap();
        let manifest_path = dir.join("slices.txt");
        std::fs::write(
            &manifest_path,
            format!("{}\n{}\n", image.display(), dir.join("notes.xyz").display()),
        )
        .unwrap();

        let kept = SlidePipeline::new(opener)
            .assemble_manifest(&manifest_path)
            .unwrap();
        assert_eq!(kept.dim(), (2, 4, 6));
        assert!(kept.is_slice_zero(1));

        let skipped = SlidePipeline::new(opener)
            .with_skip_unsupported(true)
            .assemble_manifest(&manifest_path)
            .unwrap();
        assert_eq!(skipped.dim(), (1, 4, 6));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
