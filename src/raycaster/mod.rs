//! GPU volume raycaster.
//!
//! [`RaycastCompositor`] marches rays between per-pixel entry and exit points
//! through a staged [`Volume`], classifies samples with a [`ColorArray`],
//! shades them and composites the result over an optional background.
//!
//! The compositor moves through `Idle -> ResourceBuilding -> Ready ->
//! Rendering -> Ready`. Any change that alters the shader defines sends it
//! back to `ResourceBuilding`; the next [`RaycastCompositor::process`]
//! rebuilds the pipeline before rendering.

pub mod channel;
pub mod colors;
pub mod images;
pub mod settings;
pub mod uniforms;

use std::borrow::Cow;
use std::cell::Cell;
use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info};
use web_time::Instant;
use wgpu::PollType;
use wgpu::util::DeviceExt;

use crate::enums::{GradientComputation, ShadingMode};
use crate::gpu_stager::{GpuError, GpuStager, WGPU};
use crate::volume::Volume;

pub use channel::{ChannelOption, ChannelSelection};
pub use colors::{ColorArray, ColorArrayError, HexColor, MAX_COLORS};
pub use images::{Background, EntryExitImages, ImageLayers, RaycastInputs};
pub use settings::{
    CameraSettings, CompositorSettings, LightingSettings, PositionIndicator, RaycastingSettings,
    ShaderDefines,
};
pub use uniforms::{RaycastUniforms, world_to_texture};

use images::InputPlanes;

const SHADER_SOURCE: &str = include_str!("../shaders/raycasting.wgsl");

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
const PICKING_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Bindings 2..=9, see [`InputPlanes::views`].
const INPUT_PLANES: u32 = 8;
const UNIFORM_BINDING: u32 = 2 + INPUT_PLANES;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Volume {0} has no GPU representation")]
    MissingGpuRepresentation(u64),

    #[error("Raycasting resources are not ready (state {0:?})")]
    ResourcesNotReady(CompositorState),

    #[error("Raycasting shader failed to build: {0}")]
    Shader(String),

    #[error(transparent)]
    ColorArray(#[from] ColorArrayError),

    #[error("Raycast inputs are empty, differ in size or have missing layers")]
    InconsistentInputs,

    #[error("Output of {width}x{height} exceeds the 2D texture limit of {limit}")]
    OutputTooLarge { width: u32, height: u32, limit: u32 },

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("Reading back the output failed: {0}")]
    Readback(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    #[default]
    Idle,
    ResourceBuilding,
    Ready,
    Rendering,
}

/// Holds the compositor in `Rendering` for the duration of a draw.
struct RenderScope<'a> {
    state: &'a Cell<CompositorState>,
}

impl<'a> RenderScope<'a> {
    fn enter(state: &'a Cell<CompositorState>) -> Result<Self, RenderError> {
        match state.get() {
            CompositorState::Ready => {
                state.set(CompositorState::Rendering);
                Ok(Self { state })
            }
            other => Err(RenderError::ResourcesNotReady(other)),
        }
    }
}

impl Drop for RenderScope<'_> {
    fn drop(&mut self) {
        self.state.set(CompositorState::Ready);
    }
}

struct Resources {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    defines: ShaderDefines,
}

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Target {
    fn new(wgpu: &WGPU, label: &str, format: wgpu::TextureFormat, (width, height): (u32, u32)) -> Self {
        let texture = wgpu.device.create_texture(&wgpu::TextureDescriptor {
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
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    fn attachment(&self) -> Option<wgpu::RenderPassColorAttachment<'_>> {
        Some(wgpu::RenderPassColorAttachment {
            view: &self.view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })
    }
}

/// Color, depth and picking render targets.
struct OutputTargets {
    size: (u32, u32),
    color: Target,
    depth: Target,
    picking: Target,
}

impl OutputTargets {
    fn new(wgpu: &WGPU, size: (u32, u32)) -> Self {
        Self {
            size,
            color: Target::new(wgpu, "Raycast Color", COLOR_FORMAT, size),
            depth: Target::new(wgpu, "Raycast Depth", DEPTH_FORMAT, size),
            picking: Target::new(wgpu, "Raycast Picking", PICKING_FORMAT, size),
        }
    }
}

pub struct RaycastCompositor {
    wgpu: WGPU,
    stager: GpuStager,
    settings: CompositorSettings,
    channel: ChannelSelection,
    colors: ColorArray,
    background_connected: bool,
    state: Cell<CompositorState>,
    resources: Option<Resources>,
    sampler: wgpu::Sampler,
    output: Option<OutputTargets>,
    current_volume: Option<u64>,
}

impl RaycastCompositor {
    pub fn new(wgpu: WGPU) -> Self {
        let sampler = wgpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            stager: GpuStager::new(wgpu.clone()),
            wgpu,
            settings: CompositorSettings::default(),
            channel: ChannelSelection::default(),
            colors: ColorArray::grayscale(MAX_COLORS),
            background_connected: false,
            state: Cell::new(CompositorState::Idle),
            resources: None,
            sampler,
            output: None,
            current_volume: None,
        }
    }

    pub fn state(&self) -> CompositorState {
        self.state.get()
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    /// Applies `update` and invalidates resources if the shader defines
    /// changed as a result.
    pub fn update_settings(&mut self, update: impl FnOnce(&mut CompositorSettings)) {
        let before = ShaderDefines::new(&self.settings, self.background_connected);
        update(&mut self.settings);
        if ShaderDefines::new(&self.settings, self.background_connected) != before {
            self.invalidate_resources();
        }
    }

    pub fn channel(&self) -> &ChannelSelection {
        &self.channel
    }

    pub fn select_channel(&mut self, index: usize) -> bool {
        self.channel.select(index)
    }

    pub fn colors(&self) -> &ColorArray {
        &self.colors
    }

    pub fn set_colors(&mut self, colors: ColorArray) {
        self.colors = colors;
    }

    pub fn set_colors_hex<S: AsRef<str>>(&mut self, values: &[S]) -> Result<(), RenderError> {
        self.colors = ColorArray::from_hex(values)?;
        Ok(())
    }

    pub fn background_connected(&self) -> bool {
        self.background_connected
    }

    pub fn set_background_connected(&mut self, connected: bool) {
        if self.background_connected != connected {
            self.background_connected = connected;
            self.invalidate_resources();
        }
    }

    pub fn set_gradient_computation(&mut self, mode: GradientComputation) {
        self.update_settings(|s| s.raycasting.gradient = mode);
        self.channel.apply_gradient_mode(mode);
    }

    pub fn set_shading_mode(&mut self, mode: ShadingMode) {
        self.update_settings(|s| s.lighting.shading_mode = mode);
    }

    pub fn toggle_shading(&mut self) {
        self.settings.lighting.toggle_shading();
        self.invalidate_resources();
    }

    pub fn invalidate_resources(&mut self) {
        self.state.set(CompositorState::ResourceBuilding);
    }

    /// Rebuilds the render pipeline from the current defines.
    pub async fn initialize_resources(&mut self) -> Result<(), RenderError> {
        self.state.set(CompositorState::ResourceBuilding);
        let start = Instant::now();
        let defines = ShaderDefines::new(&self.settings, self.background_connected);
        let device = &self.wgpu.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Raycasting Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(defines.apply(SHADER_SOURCE))),
        });

        let input = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let mut entries = vec![
            // volume
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D3,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend((2..UNIFORM_BINDING).map(input));
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Raycasting Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Raycasting Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let target = |format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Raycasting Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[
                    target(COLOR_FORMAT),
                    target(DEPTH_FORMAT),
                    target(PICKING_FORMAT),
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = device.pop_error_scope().await {
            self.resources = None;
            return Err(RenderError::Shader(error.to_string()));
        }

        debug!("Shader defines:\n{}", defines.prelude());
        info!("Built raycasting pipeline in {:?}", start.elapsed());
        self.resources = Some(Resources {
            pipeline,
            bind_group_layout,
            defines,
        });
        self.state.set(CompositorState::Ready);
        Ok(())
    }

    /// Rebuilds the channel options for a new volume.
    pub fn on_volume_changed(&mut self, volume: &Volume) {
        if self.channel.sync_components(volume.components()) {
            debug!(
                "Volume {} has {} channels, selected channel {}",
                volume.id(),
                self.channel.len(),
                self.channel.selected() + 1
            );
        }
        self.channel
            .apply_gradient_mode(self.settings.raycasting.gradient);
    }

    /// Stages `volume` if it differs from the last one and renders a frame.
    ///
    /// Returns false without rendering when staging was superseded by a
    /// newer volume.
    pub async fn process(
        &mut self,
        volume: Arc<Volume>,
        inputs: &RaycastInputs,
    ) -> Result<bool, RenderError> {
        self.set_background_connected(inputs.background.is_some());
        if self.state.get() != CompositorState::Ready {
            self.initialize_resources().await?;
        }

        let volume = if self.current_volume == Some(volume.id()) {
            volume
        } else {
            self.on_volume_changed(&volume);
            match self.stager.stage(volume).await? {
                Some(staged) => {
                    self.current_volume = Some(staged.id());
                    staged
                }
                None => return Ok(false),
            }
        };

        self.raycast(&volume, inputs)?;
        Ok(true)
    }

    /// Renders one frame of an already staged volume.
    pub fn raycast(&mut self, volume: &Volume, inputs: &RaycastInputs) -> Result<(), RenderError> {
        let gpu = volume
            .gpu_representation()
            .ok_or(RenderError::MissingGpuRepresentation(volume.id()))?;
        if !inputs.is_consistent() {
            return Err(RenderError::InconsistentInputs);
        }
        let (width, height) = inputs.entry_exit.size();
        let limit = self.wgpu.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RenderError::OutputTooLarge {
                width,
                height,
                limit,
            });
        }
        let _scope = RenderScope::enter(&self.state)?;
        let resources = self
            .resources
            .as_ref()
            .ok_or(RenderError::ResourcesNotReady(CompositorState::Idle))?;
        let start = Instant::now();

        let size = inputs.entry_exit.size();
        if self.output.as_ref().is_none_or(|o| o.size != size) {
            self.output = Some(OutputTargets::new(&self.wgpu, size));
        }
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| RenderError::Readback("no output targets".to_string()))?;

        let uniforms = RaycastUniforms::new(
            &self.settings,
            volume,
            &self.channel,
            &self.colors,
            size,
            inputs.entry_normals.is_some(),
        );
        let uniform_buffer = self
            .wgpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Raycasting Uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let planes = InputPlanes::upload(&self.wgpu, inputs);

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&gpu.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        entries.extend(planes.views().into_iter().zip(2..).map(|(view, binding)| {
            wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            }
        }));
        entries.push(wgpu::BindGroupEntry {
            binding: UNIFORM_BINDING,
            resource: uniform_buffer.as_entire_binding(),
        });
        let bind_group = self.wgpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Raycasting Bind Group"),
            layout: &resources.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .wgpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Raycasting Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Raycasting Pass"),
                color_attachments: &[
                    output.color.attachment(),
                    output.depth.attachment(),
                    output.picking.attachment(),
                ],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&resources.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.wgpu.queue.submit(Some(encoder.finish()));
        debug!(
            "Raycast volume {} at {}x{} ({} defines) in {:?}",
            volume.id(),
            size.0,
            size.1,
            resources.defines.prelude().lines().count(),
            start.elapsed()
        );
        Ok(())
    }

    /// Copies the last rendered color target to the CPU.
    pub async fn read_output(&self) -> Result<RgbaImage, RenderError> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| RenderError::Readback("nothing has been rendered".to_string()))?;
        let (width, height) = output.size;
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging_buffer = self.wgpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Raycast Readback Buffer"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .wgpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Raycast Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &output.color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.wgpu.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.wgpu
            .device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RenderError::Readback(e.to_string()))?;
        receiver
            .await
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        staging_buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("readback size mismatch".to_string()))
    }
}
