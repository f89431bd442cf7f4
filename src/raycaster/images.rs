//! Per-pixel ray inputs: entry and exit points, background, entry normals.
//!
//! Colors of the point images hold texture-space positions in the unit cube.
//! The data lives on the CPU and is uploaded for every raycast.

use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::gpu_stager::WGPU;

/// Color, depth and optional picking layers of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageLayers {
    pub width: u32,
    pub height: u32,
    pub color: Vec<[f32; 4]>,
    pub depth: Vec<f32>,
    pub picking: Option<Vec<[u8; 4]>>,
}

impl ImageLayers {
    pub fn len(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_consistent(&self) -> bool {
        !self.is_empty()
            && self.color.len() == self.len()
            && self.depth.len() == self.len()
            && self.picking.as_ref().is_none_or(|p| p.len() == self.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryExitImages {
    pub entry: ImageLayers,
    pub exit: ImageLayers,
}

impl EntryExitImages {
    /// Front view of the unit cube: every ray enters at `(u, v, 0)` and
    /// leaves at `(u, v, 1)`.
    pub fn orthographic(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        let mut entry = Vec::with_capacity(len);
        let mut exit = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                // image rows grow downwards, texture v grows upwards
                let v = 1.0 - (y as f32 + 0.5) / height as f32;
                entry.push([u, v, 0.0, 1.0]);
                exit.push([u, v, 1.0, 1.0]);
            }
        }
        Self {
            entry: ImageLayers {
                width,
                height,
                color: entry,
                depth: vec![0.0; len],
                picking: Some(vec![[0; 4]; len]),
            },
            exit: ImageLayers {
                width,
                height,
                color: exit,
                depth: vec![1.0; len],
                picking: None,
            },
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.entry.width, self.entry.height)
    }

    pub fn is_consistent(&self) -> bool {
        self.entry.width == self.exit.width
            && self.entry.height == self.exit.height
            && self.entry.is_consistent()
            && self.exit.is_consistent()
    }
}

/// Background composited behind the volume.
#[derive(Debug, Clone)]
pub struct Background {
    pub color: RgbaImage,
    /// Normalized depth per pixel; rays stop where they pass it.
    pub depth: Vec<f32>,
}

impl Background {
    fn matches(&self, (width, height): (u32, u32)) -> bool {
        self.color.dimensions() == (width, height)
            && self.depth.len() == width as usize * height as usize
    }

    /// Background at the far plane.
    pub fn from_image(color: RgbaImage) -> Self {
        let len = (color.width() * color.height()) as usize;
        Self {
            color,
            depth: vec![1.0; len],
        }
    }
}

/// Everything a raycast needs besides the volume.
#[derive(Debug, Clone)]
pub struct RaycastInputs {
    pub entry_exit: EntryExitImages,
    pub background: Option<Background>,
    /// Surface normals at the entry points, xyz in `[-1, 1]`.
    pub entry_normals: Option<Vec<[f32; 4]>>,
}

impl RaycastInputs {
    pub fn new(entry_exit: EntryExitImages) -> Self {
        Self {
            entry_exit,
            background: None,
            entry_normals: None,
        }
    }

    /// Every connected layer covers exactly the output size.
    pub fn is_consistent(&self) -> bool {
        let size = self.entry_exit.size();
        self.entry_exit.is_consistent()
            && self.background.as_ref().is_none_or(|b| b.matches(size))
            && self
                .entry_normals
                .as_ref()
                .is_none_or(|n| n.len() == self.entry_exit.entry.len())
    }
}

pub(crate) struct Plane {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Plane {
    pub fn upload(
        wgpu: &WGPU,
        label: &str,
        format: wgpu::TextureFormat,
        (width, height): (u32, u32),
        data: &[u8],
    ) -> Self {
        let texture = wgpu.device.create_texture_with_data(
            &wgpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }

    /// 1x1 stand-in for an unconnected input.
    pub fn blank(wgpu: &WGPU, label: &str, format: wgpu::TextureFormat) -> Self {
        let bytes = format.block_copy_size(None).unwrap_or(4) as usize;
        Self::upload(wgpu, label, format, (1, 1), &vec![0u8; bytes])
    }
}

/// GPU copies of the raycast inputs, in binding order.
pub(crate) struct InputPlanes {
    pub entry_color: Plane,
    pub entry_depth: Plane,
    pub entry_picking: Plane,
    pub exit_color: Plane,
    pub exit_depth: Plane,
    pub background_color: Plane,
    pub background_depth: Plane,
    pub entry_normals: Plane,
}

impl InputPlanes {
    pub fn upload(wgpu: &WGPU, inputs: &RaycastInputs) -> Self {
        use wgpu::TextureFormat::{R32Float, Rgba8Unorm, Rgba32Float};

        let images = &inputs.entry_exit;
        let size = images.size();
        let entry_picking = match &images.entry.picking {
            Some(picking) => Plane::upload(
                wgpu,
                "Entry Picking",
                Rgba8Unorm,
                size,
                bytemuck::cast_slice(picking),
            ),
            None => Plane::blank(wgpu, "Entry Picking", Rgba8Unorm),
        };
        let (background_color, background_depth) = match &inputs.background {
            Some(background) => {
                let bg_size = background.color.dimensions();
                (
                    Plane::upload(
                        wgpu,
                        "Background Color",
                        Rgba8Unorm,
                        bg_size,
                        background.color.as_raw(),
                    ),
                    Plane::upload(
                        wgpu,
                        "Background Depth",
                        R32Float,
                        bg_size,
                        bytemuck::cast_slice(&background.depth),
                    ),
                )
            }
            None => (
                Plane::blank(wgpu, "Background Color", Rgba8Unorm),
                Plane::blank(wgpu, "Background Depth", R32Float),
            ),
        };
        let entry_normals = match &inputs.entry_normals {
            Some(normals) => Plane::upload(
                wgpu,
                "Entry Normals",
                Rgba32Float,
                size,
                bytemuck::cast_slice(normals),
            ),
            None => Plane::blank(wgpu, "Entry Normals", Rgba32Float),
        };

        Self {
            entry_color: Plane::upload(
                wgpu,
                "Entry Color",
                Rgba32Float,
                size,
                bytemuck::cast_slice(&images.entry.color),
            ),
            entry_depth: Plane::upload(
                wgpu,
                "Entry Depth",
                R32Float,
                size,
                bytemuck::cast_slice(&images.entry.depth),
            ),
            entry_picking,
            exit_color: Plane::upload(
                wgpu,
                "Exit Color",
                Rgba32Float,
                size,
                bytemuck::cast_slice(&images.exit.color),
            ),
            exit_depth: Plane::upload(
                wgpu,
                "Exit Depth",
                R32Float,
                size,
                bytemuck::cast_slice(&images.exit.depth),
            ),
            background_color,
            background_depth,
            entry_normals,
        }
    }

    pub fn views(&self) -> [&wgpu::TextureView; 8] {
        [
            &self.entry_color.view,
            &self.entry_depth.view,
            &self.entry_picking.view,
            &self.exit_color.view,
            &self.exit_depth.view,
            &self.background_color.view,
            &self.background_depth.view,
            &self.entry_normals.view,
        ]
    }
}
