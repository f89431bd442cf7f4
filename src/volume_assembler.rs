use crate::slice_reader::{Layer, LayerData, ReaderRegistry, SliceReadError, SliceReader};
use crate::volume::{DEFAULT_VOXEL_SPACING, Sample, Volume};

use ndarray::{Array4, ArrayViewMut3, Axis};
use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, warn};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("No supported images found in '{0}'")]
    NoSupportedSlices(String),

    #[error("Could not extract valid image dimensions from '{0}'")]
    EmptyDimensions(PathBuf),

    #[error("Unsupported integer bit depth ({0})")]
    UnsupportedBitDepth(u32),

    #[error("Could not read reference slice '{path}': {error}")]
    Reference {
        path: PathBuf,
        error: SliceReadError,
    },

    #[error("Reference slice '{path}' has {actual} samples, expected {expected}")]
    IncompleteReference {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of the slice stack with the reader resolved for it.
#[derive(Clone)]
pub struct SliceEntry {
    pub path: PathBuf,
    pub reader: Option<Arc<dyn SliceReader>>,
}

impl std::fmt::Debug for SliceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceEntry")
            .field("path", &self.path)
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

/// Stacks same-sized 2D layers into a volume.
///
/// The first decodable slice is the reference: it fixes the dimensions,
/// the primitive type and the component count of the whole volume. Slices
/// that cannot be read or do not match the reference are left zero.
pub struct VolumeAssembler {
    registry: ReaderRegistry,
    spacing: f32,
}

impl VolumeAssembler {
    pub fn new(registry: ReaderRegistry) -> Self {
        Self {
            registry,
            spacing: DEFAULT_VOXEL_SPACING,
        }
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Resolve a reader per path, dropping reader-less entries when
    /// `skip_unsupported` is set.
    pub fn resolve(&self, paths: &[impl AsRef<Path>], skip_unsupported: bool) -> Vec<SliceEntry> {
        paths
            .iter()
            .map(|path| SliceEntry {
                path: path.as_ref().to_path_buf(),
                reader: self.registry.reader_for(path.as_ref()),
            })
            .filter(|entry| !skip_unsupported || entry.reader.is_some())
            .collect()
    }

    /// Build a volume from slice files
    ///
    /// # Errors
    ///
    /// Fails if no slice has a reader, the reference slice cannot be read,
    /// has no pixels, or uses integers wider than 32 bits. Problems with any
    /// other slice only produce a warning.
    pub fn assemble(
        &self,
        paths: &[impl AsRef<Path>],
        skip_unsupported: bool,
    ) -> Result<Volume, AssembleError> {
        let entries = self.resolve(paths, skip_unsupported);
        self.assemble_entries(&entries, Self::describe(paths))
    }

    /// Build a volume from the slices listed in a manifest file
    pub fn assemble_from_manifest(
        &self,
        manifest: &Path,
        skip_unsupported: bool,
    ) -> Result<Volume, AssembleError> {
        let paths = crate::manifest::read_manifest(manifest)?;
        let entries = self.resolve(&paths[..], skip_unsupported);
        self.assemble_entries(&entries, manifest.display().to_string())
    }

    pub fn assemble_entries(
        &self,
        entries: &[SliceEntry],
        origin: String,
    ) -> Result<Volume, AssembleError> {
        let start = Instant::now();
        let (reference_index, reference_reader) = entries
            .iter()
            .enumerate()
            .find_map(|(i, entry)| entry.reader.as_ref().map(|reader| (i, reader)))
            .ok_or(AssembleError::NoSupportedSlices(origin))?;
        let reference_path = &entries[reference_index].path;

        let reference =
            reference_reader
                .read(reference_path)
                .map_err(|error| AssembleError::Reference {
                    path: reference_path.clone(),
                    error,
                })?;
        if reference.width as usize * reference.height as usize == 0 || reference.components == 0
        {
            return Err(AssembleError::EmptyDimensions(reference_path.clone()));
        }
        if !reference.is_complete() {
            return Err(AssembleError::IncompleteReference {
                path: reference_path.clone(),
                expected: reference.expected_samples(),
                actual: reference.data.len(),
            });
        }
        let format = reference.format();
        if !format.is_supported() {
            return Err(AssembleError::UnsupportedBitDepth(format.precision));
        }

        let stack = Stack {
            entries,
            reference: &reference,
            reference_index,
        };
        let data = match &reference.data {
            LayerData::U8(_) => u8::into_volume_data(stack.build()),
            LayerData::U16(_) => u16::into_volume_data(stack.build()),
            LayerData::U32(_) => u32::into_volume_data(stack.build()),
            LayerData::F32(_) => f32::into_volume_data(stack.build()),
            LayerData::U64(_) => return Err(AssembleError::UnsupportedBitDepth(64)),
        };

        let volume = Volume::new(data, self.spacing);
        debug!(
            "Assembled {}x{}x{} volume ({} components) in {:?}",
            reference.width,
            reference.height,
            entries.len(),
            reference.components,
            start.elapsed()
        );
        Ok(volume)
    }

    fn describe(paths: &[impl AsRef<Path>]) -> String {
        match paths.first() {
            Some(first) => first
                .as_ref()
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            None => "<empty slice list>".to_string(),
        }
    }
}

struct Stack<'a> {
    entries: &'a [SliceEntry],
    reference: &'a Layer,
    reference_index: usize,
}

impl Stack<'_> {
    fn build<T: Sample>(&self) -> Array4<T> {
        let (width, height) = (self.reference.width as usize, self.reference.height as usize);
        let mut array =
            Array4::<T>::default((self.entries.len(), height, width, self.reference.components));

        array
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(self.entries.par_iter())
            .enumerate()
            .for_each(|(index, (slice, entry))| {
                if index == self.reference_index {
                    Self::copy_into(slice, self.reference);
                } else if let Some(layer) = self.read(entry) {
                    Self::copy_into(slice, &layer);
                }
            });
        array
    }

    fn read(&self, entry: &SliceEntry) -> Option<Layer> {
        let file = entry.path.display();
        let Some(reader) = &entry.reader else {
            warn!("No reader for image: {}, inserting empty slice", file);
            return None;
        };
        let layer = match reader.read(&entry.path) {
            Ok(layer) => layer,
            Err(e) => {
                warn!("Could not load image: {}, {}", file, e);
                return None;
            }
        };
        let format = layer.format();
        if !format.is_supported() {
            warn!(
                "Unsupported integer bit depth: {}, for image: {}",
                format.precision, file
            );
            return None;
        }
        if layer.dimensions() != self.reference.dimensions() {
            warn!(
                "Unexpected dimensions: {:?}, expected: {:?}, for image: {}",
                layer.dimensions(),
                self.reference.dimensions(),
                file
            );
            return None;
        }
        if !layer.is_complete() {
            warn!(
                "Incomplete image data: {} samples, expected: {}, for image: {}",
                layer.data.len(),
                layer.expected_samples(),
                file
            );
            return None;
        }
        Some(layer)
    }

    // Components beyond the layer's own stay zero.
    fn copy_into<T: Sample>(mut slice: ArrayViewMut3<'_, T>, layer: &Layer) {
        let (_, width, _) = slice.dim();
        for ((y, x, c), value) in slice.indexed_iter_mut() {
            if c < layer.components {
                let index = (y * width + x) * layer.components + c;
                *value = T::from_normalized(layer.data.normalized(index));
            }
        }
    }
}
