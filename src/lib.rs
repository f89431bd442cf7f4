//! # Histo-volume library
//!
//! This crate turns a region of a pyramidal whole-slide image into a volume
//! and renders it with a GPU raycaster.
//!
//! A region is chosen either from a default viewport at a given level or
//! from three selection points, mapped onto the requested pyramid level and
//! read through a [`PyramidSource`]; TIFF based slides such as Aperio SVS
//! are read level by level from their image directories. The region is JPEG-encoded and stacked
//! into a volume of identical slices. Slice stacks can also be read from
//! disk, one file per slice, in which case unreadable slices are left zero.
//! If the environment supports it slices are decoded in parallel using
//! rayon.
//!
//! Volumes are staged to the GPU off the render thread and composited by a
//! raycaster supporting:
//!  - Direct volume rendering
//!  - First-hit points and normals
//!  - Maximum intensity projection
//!  - Iso-surface rendering
//!
//! # Examples
//!
//! ## Stacking a slide region into a volume
//!
//! ```no_run
//! # use histo_volume::{SlideFileOpener, SlidePipeline, ViewState};
//! # use std::path::Path;
//! let pipeline = SlidePipeline::new(SlideFileOpener::default()).with_repeat(10);
//! let view = ViewState { origin: (0.0, 0.0), previous_level: 1, level: 1 };
//! let (plan, volume) = pipeline
//!     .build_volume(Path::new("slide.tif"), view, None)
//!     .expect("should have extracted the region");
//! println!("{}x{} region -> {:?}", plan.width, plan.height, volume.dim());
//! ```
//!
//! ## Rendering it
//!
//! ```no_run
//! # use histo_volume::{EntryExitImages, RaycastCompositor, RaycastInputs, Volume, WGPU};
//! # use std::sync::Arc;
//! # async fn render(volume: Volume) {
//! let wgpu = WGPU::request().await.expect("should have found a GPU");
//! let mut compositor = RaycastCompositor::new(wgpu);
//! let inputs = RaycastInputs::new(EntryExitImages::orthographic(512, 512));
//! compositor.process(Arc::new(volume), &inputs).await.expect("should have rendered");
//! let image = compositor.read_output().await.expect("should have read the frame");
//! image.save("render.png").expect("should have saved the frame");
//! # }
//! ```

pub mod config;
pub mod encoder;
pub mod enums;
pub mod extractor;
pub mod gpu_stager;
pub mod manifest;
pub mod mapper;
pub mod pipeline;
pub mod pixel;
pub mod pyramid;
pub mod raycaster;
pub mod slice_reader;
pub mod tiff_pyramid;
pub mod volume;
pub mod volume_assembler;

pub use encoder::{ByteSink, FileSink, ImageEncoder};
pub use extractor::{RegionExtractor, RegionPlan, ViewState};
pub use gpu_stager::{GpuStager, WGPU};
pub use pipeline::{PipelineError, SlidePipeline};
pub use pyramid::{ImageFileOpener, MemoryPyramid, PyramidOpener, PyramidSource};
pub use raycaster::{
    ColorArray, CompositorSettings, EntryExitImages, RaycastCompositor, RaycastInputs,
};
pub use tiff_pyramid::{SlideFileOpener, TiffPyramid};
pub use volume::Volume;
pub use volume_assembler::VolumeAssembler;
