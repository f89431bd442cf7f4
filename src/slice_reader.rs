//! Decoders for the 2D layers a volume is stacked from.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;

use crate::enums::NumericType;
use crate::volume::DataFormat;

#[derive(Debug, Error)]
pub enum SliceReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not decode '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("No data for '{0}'")]
    NotFound(PathBuf),
}

/// Samples of a decoded layer, row-major with interleaved components.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    /// Only produced by external decoders; never stored in a volume.
    U64(Vec<u64>),
}

impl LayerData {
    pub fn len(&self) -> usize {
        match self {
            LayerData::U8(v) => v.len(),
            LayerData::U16(v) => v.len(),
            LayerData::U32(v) => v.len(),
            LayerData::F32(v) => v.len(),
            LayerData::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn numeric(&self) -> (NumericType, u32) {
        match self {
            LayerData::U8(_) => (NumericType::UnsignedInteger, 8),
            LayerData::U16(_) => (NumericType::UnsignedInteger, 16),
            LayerData::U32(_) => (NumericType::UnsignedInteger, 32),
            LayerData::F32(_) => (NumericType::Float, 32),
            LayerData::U64(_) => (NumericType::UnsignedInteger, 64),
        }
    }

    /// Normalized value of sample `index`; integers map to `[0, 1]`.
    #[inline]
    pub fn normalized(&self, index: usize) -> f64 {
        match self {
            LayerData::U8(v) => v[index] as f64 / u8::MAX as f64,
            LayerData::U16(v) => v[index] as f64 / u16::MAX as f64,
            LayerData::U32(v) => v[index] as f64 / u32::MAX as f64,
            LayerData::F32(v) => v[index] as f64,
            LayerData::U64(v) => v[index] as f64 / u64::MAX as f64,
        }
    }
}

/// A decoded 2D image.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub width: u32,
    pub height: u32,
    pub components: usize,
    pub data: LayerData,
}

impl Layer {
    pub fn format(&self) -> DataFormat {
        let (numeric, precision) = self.data.numeric();
        DataFormat {
            numeric,
            precision,
            components: self.components,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of samples the dimensions and component count call for.
    pub fn expected_samples(&self) -> usize {
        self.width as usize * self.height as usize * self.components
    }

    pub fn is_complete(&self) -> bool {
        self.data.len() == self.expected_samples()
    }

    pub fn from_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (components, data) = match image {
            DynamicImage::ImageLuma8(img) => (1, LayerData::U8(img.into_raw())),
            DynamicImage::ImageLumaA8(img) => (2, LayerData::U8(img.into_raw())),
            DynamicImage::ImageRgb8(img) => (3, LayerData::U8(img.into_raw())),
            DynamicImage::ImageRgba8(img) => (4, LayerData::U8(img.into_raw())),
            DynamicImage::ImageLuma16(img) => (1, LayerData::U16(img.into_raw())),
            DynamicImage::ImageLumaA16(img) => (2, LayerData::U16(img.into_raw())),
            DynamicImage::ImageRgb16(img) => (3, LayerData::U16(img.into_raw())),
            DynamicImage::ImageRgba16(img) => (4, LayerData::U16(img.into_raw())),
            DynamicImage::ImageRgb32F(img) => (3, LayerData::F32(img.into_raw())),
            DynamicImage::ImageRgba32F(img) => (4, LayerData::F32(img.into_raw())),
            other => (4, LayerData::U8(other.to_rgba8().into_raw())),
        };
        Self {
            width,
            height,
            components,
            data,
        }
    }
}

/// Decodes one slice of a stack.
pub trait SliceReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Layer, SliceReadError>;
}

/// Reads any raster format supported by the `image` crate from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSliceReader;

impl SliceReader for ImageSliceReader {
    fn read(&self, path: &Path) -> Result<Layer, SliceReadError> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| SliceReadError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Layer::from_image(image))
    }
}

/// Serves encoded images held in memory, keyed by a virtual path.
///
/// Lets a freshly extracted region be stacked without a round trip
/// through the filesystem.
#[derive(Default, Clone)]
pub struct MemorySliceReader {
    entries: HashMap<PathBuf, Arc<Vec<u8>>>,
}

impl MemorySliceReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, encoded: Arc<Vec<u8>>) {
        self.entries.insert(path.into(), encoded);
    }
}

impl fmt::Debug for MemorySliceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySliceReader")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SliceReader for MemorySliceReader {
    fn read(&self, path: &Path) -> Result<Layer, SliceReadError> {
        let encoded = self
            .entries
            .get(path)
            .ok_or_else(|| SliceReadError::NotFound(path.to_path_buf()))?;
        let image = image::load_from_memory(encoded).map_err(|e| SliceReadError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Layer::from_image(image))
    }
}

/// Picks a reader per slice by file extension.
#[derive(Default, Clone)]
pub struct ReaderRegistry {
    readers: HashMap<String, Arc<dyn SliceReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `image` crate reader for common raster formats.
    pub fn with_defaults() -> Self {
        let reader: Arc<dyn SliceReader> = Arc::new(ImageSliceReader);
        let mut registry = Self::new();
        for ext in ["jpg", "jpeg", "png", "tif", "tiff", "bmp", "pnm", "tga"] {
            registry.register(ext, reader.clone());
        }
        registry
    }

    pub fn register(&mut self, extension: &str, reader: Arc<dyn SliceReader>) {
        self.readers.insert(extension.to_ascii_lowercase(), reader);
    }

    pub fn with_reader(mut self, extension: &str, reader: Arc<dyn SliceReader>) -> Self {
        self.register(extension, reader);
        self
    }

    pub fn reader_for(&self, path: &Path) -> Option<Arc<dyn SliceReader>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.readers.get(&ext).cloned()
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<_> = self.readers.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

impl fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("extensions", &self.supported_extensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    use std::io::Cursor;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_layer_from_rgb() {
        let layer = Layer::from_image(DynamicImage::ImageRgb8(RgbImage::new(3, 2)));
        assert_eq!(layer.dimensions(), (3, 2));
        assert_eq!(layer.components, 3);
        assert_eq!(layer.data.len(), 18);
        assert_eq!(
            layer.format(),
            DataFormat {
                numeric: NumericType::UnsignedInteger,
                precision: 8,
                components: 3
            }
        );
    }

    #[test]
    fn test_memory_reader_decodes() {
        let gray = GrayImage::from_pixel(4, 4, Luma([200]));
        let mut reader = MemorySliceReader::new();
        reader.insert("a.png", Arc::new(png_bytes(DynamicImage::ImageLuma8(gray))));

        let layer = reader.read(Path::new("a.png")).unwrap();
        assert_eq!(layer.components, 1);
        assert_eq!(layer.data, LayerData::U8(vec![200; 16]));
        assert!(matches!(
            reader.read(Path::new("b.png")),
            Err(SliceReadError::NotFound(_))
        ));
    }

    #[test]
    fn test_registry_dispatch_by_extension() {
        let registry = ReaderRegistry::with_defaults();
        assert!(registry.reader_for(Path::new("slice_01.JPG")).is_some());
        assert!(registry.reader_for(Path::new("slice_01.dcm")).is_none());
        assert!(registry.reader_for(Path::new("no_extension")).is_none());
        assert!(registry.supported_extensions().contains(&"png"));
    }

    #[test]
    fn test_normalized_sample() {
        let data = LayerData::U16(vec![0, u16::MAX]);
        assert_eq!(data.normalized(0), 0.0);
        assert_eq!(data.normalized(1), 1.0);
    }
}
