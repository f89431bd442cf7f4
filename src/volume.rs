use std::borrow::Cow;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use half::f16;
use ndarray::{Array4, ArrayView3, Axis};
use rayon::prelude::*;

use crate::enums::NumericType;
use crate::gpu_stager::GpuVolume;

/// Physical size of one voxel edge.
pub const DEFAULT_VOXEL_SPACING: f32 = 0.01;

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Numeric layout of a decoded slice or a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormat {
    pub numeric: NumericType,
    /// Bits per component.
    pub precision: u32,
    pub components: usize,
}

impl DataFormat {
    /// Integer formats wider than 32 bits cannot be stored in a volume.
    pub fn is_supported(&self) -> bool {
        self.numeric == NumericType::Float || self.precision <= 32
    }
}

/// Primitive component types a volume can hold.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    const NUMERIC: NumericType;
    const PRECISION: u32;

    fn lowest() -> f64;
    fn max() -> f64;

    /// Integers map `[0, MAX]` to `[0, 1]`, floats pass through.
    fn to_normalized(self) -> f64;
    fn from_normalized(value: f64) -> Self;

    fn into_volume_data(array: Array4<Self>) -> VolumeData;
}

macro_rules! impl_unsigned_sample {
    ($ty:ty, $variant:ident) => {
        impl Sample for $ty {
            const NUMERIC: NumericType = NumericType::UnsignedInteger;
            const PRECISION: u32 = <$ty>::BITS;

            fn lowest() -> f64 {
                <$ty>::MIN as f64
            }

            fn max() -> f64 {
                <$ty>::MAX as f64
            }

            #[inline]
            fn to_normalized(self) -> f64 {
                self as f64 / <$ty>::MAX as f64
            }

            #[inline]
            fn from_normalized(value: f64) -> Self {
                (value.clamp(0.0, 1.0) * <$ty>::MAX as f64).round() as $ty
            }

            fn into_volume_data(array: Array4<Self>) -> VolumeData {
                VolumeData::$variant(array)
            }
        }
    };
}

impl_unsigned_sample!(u8, U8);
impl_unsigned_sample!(u16, U16);
impl_unsigned_sample!(u32, U32);

impl Sample for f32 {
    const NUMERIC: NumericType = NumericType::Float;
    const PRECISION: u32 = 32;

    fn lowest() -> f64 {
        f32::MIN as f64
    }

    fn max() -> f64 {
        f32::MAX as f64
    }

    #[inline]
    fn to_normalized(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_normalized(value: f64) -> Self {
        value as f32
    }

    fn into_volume_data(array: Array4<Self>) -> VolumeData {
        VolumeData::F32(array)
    }
}

/// Voxel storage, shaped `(slice, y, x, component)`.
#[derive(Debug, Clone)]
pub enum VolumeData {
    U8(Array4<u8>),
    U16(Array4<u16>),
    U32(Array4<u32>),
    F32(Array4<f32>),
}

macro_rules! dispatch {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            VolumeData::U8($array) => $body,
            VolumeData::U16($array) => $body,
            VolumeData::U32($array) => $body,
            VolumeData::F32($array) => $body,
        }
    };
}

impl VolumeData {
    pub fn format(&self) -> DataFormat {
        fn of<T: Sample>(array: &Array4<T>) -> DataFormat {
            DataFormat {
                numeric: T::NUMERIC,
                precision: T::PRECISION,
                components: array.dim().3,
            }
        }
        dispatch!(self, array => of(array))
    }

    pub fn range(&self) -> (f64, f64) {
        fn of<T: Sample>(_: &Array4<T>) -> (f64, f64) {
            (T::lowest(), T::max())
        }
        dispatch!(self, array => of(array))
    }

    fn dim(&self) -> (usize, usize, usize, usize) {
        dispatch!(self, array => array.dim())
    }

    fn normalized_slice(&self, index: usize) -> Vec<f64> {
        fn of<T: Sample>(slice: ArrayView3<'_, T>) -> Vec<f64> {
            slice.iter().map(|v| v.to_normalized()).collect()
        }
        dispatch!(self, array => of(array.index_axis(Axis(0), index)))
    }

    fn to_rgba_f16(&self) -> Vec<f16> {
        fn of<T: Sample>(array: &Array4<T>) -> Vec<f16> {
            let components = array.dim().3;
            let flat: Cow<'_, [T]> = match array.as_slice() {
                Some(flat) => Cow::Borrowed(flat),
                None => Cow::Owned(array.iter().copied().collect()),
            };
            flat.par_chunks(components.max(1))
                .flat_map_iter(|voxel| {
                    let mut texel = [f16::ZERO; 4];
                    for (dst, src) in texel.iter_mut().zip(voxel) {
                        *dst = f16::from_f64(src.to_normalized());
                    }
                    texel
                })
                .collect()
        }
        dispatch!(self, array => of(array))
    }
}

pub struct Volume {
    id: u64,
    data: VolumeData,
    /// Range of the stored values.
    pub data_range: (f64, f64),
    /// Range the values represent.
    pub value_range: (f64, f64),
    /// Columns are the world-space edges of the volume.
    pub basis: [[f32; 3]; 3],
    pub offset: [f32; 3],
    gpu: OnceLock<GpuVolume>,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("id", &self.id)
            .field("dim", &self.dim())
            .field("format", &self.format())
            .field("data_range", &self.data_range)
            .field("basis", &self.basis)
            .field("offset", &self.offset)
            .field("gpu_resident", &self.gpu.get().is_some())
            .finish()
    }
}

impl Volume {
    /// Wraps voxel data, sizes it by `spacing` per voxel and centers it at
    /// the origin. Ranges are the natural range of the primitive type.
    pub fn new(data: VolumeData, spacing: f32) -> Self {
        let range = data.range();
        let (depth, height, width, _) = data.dim();
        let size = [
            spacing * width as f32,
            spacing * height as f32,
            spacing * depth as f32,
        ];
        Self {
            id: NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed),
            data,
            data_range: range,
            value_range: range,
            basis: [
                [size[0], 0.0, 0.0],
                [0.0, size[1], 0.0],
                [0.0, 0.0, size[2]],
            ],
            offset: [-0.5 * size[0], -0.5 * size[1], -0.5 * size[2]],
            gpu: OnceLock::new(),
        }
    }

    /// Identifier unique to this volume instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        let (depth, height, width, _) = self.data.dim();
        (depth, height, width)
    }

    pub fn components(&self) -> usize {
        self.data.dim().3
    }

    pub fn format(&self) -> DataFormat {
        self.data.format()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &VolumeData {
        &self.data
    }

    /// Normalized values of one slice, row-major with interleaved
    /// components.
    pub fn normalized_slice(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.dim().0).then(|| self.data.normalized_slice(index))
    }

    pub fn is_slice_zero(&self, index: usize) -> bool {
        self.normalized_slice(index)
            .is_some_and(|values| values.iter().all(|v| *v == 0.0))
    }

    /// Texels for a four-channel half-float 3D texture. Missing components
    /// are zero.
    pub fn to_rgba_f16(&self) -> Vec<f16> {
        self.data.to_rgba_f16()
    }

    /// The GPU-resident representation, if it has been staged.
    pub fn gpu_representation(&self) -> Option<&GpuVolume> {
        self.gpu.get()
    }

    /// Returns false if a representation was already attached.
    pub(crate) fn attach_gpu_representation(&self, gpu: GpuVolume) -> bool {
        self.gpu.set(gpu).is_ok()
    }
}
