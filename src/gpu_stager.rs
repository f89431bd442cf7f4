//! Off-thread upload of volumes to the GPU.
//!
//! Uploading happens on the blocking pool and ends with a full device poll,
//! so a volume handed back by [`GpuStager::stage`] is resident and can be
//! sampled right away.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};
use web_time::Instant;
use wgpu::PollType;

use crate::volume::Volume;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter: {0}")]
    Adapter(String),

    #[error("Could not create GPU device: {0}")]
    Device(String),

    #[error("Volume of {width}x{height}x{depth} exceeds the 3D texture limit of {limit}")]
    TooLarge {
        width: u32,
        height: u32,
        depth: u32,
        limit: u32,
    },

    #[error("Waiting for the GPU failed: {0}")]
    Poll(String),

    #[error("Staging task ended without a result")]
    Cancelled,
}

#[derive(Clone)]
pub struct WGPU {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WGPU {
    /// Opens a headless device on the default adapter.
    pub async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| GpuError::Adapter(e.to_string()))?;
        debug!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("histo-volume device"),
                ..Default::default()
            })
            .await
            .map_err(|e| GpuError::Device(e.to_string()))?;
        Ok(Self { device, queue })
    }

    /// Blocks until all submitted work has finished.
    pub fn wait_idle(&self) -> Result<(), GpuError> {
        self.device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| GpuError::Poll(e.to_string()))
    }
}

/// Volume data resident in GPU memory.
#[derive(Debug)]
pub struct GpuVolume {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    /// (width, height, depth)
    pub dimensions: (u32, u32, u32),
}

impl GpuVolume {
    /// Uploads `volume` as a four-channel half-float 3D texture.
    pub fn upload(wgpu: &WGPU, volume: &Volume) -> Result<Self, GpuError> {
        let (depth, height, width) = volume.dim();
        let (depth, height, width) = (depth as u32, height as u32, width as u32);
        let limit = wgpu.device.limits().max_texture_dimension_3d;
        if width > limit || height > limit || depth > limit {
            return Err(GpuError::TooLarge {
                width,
                height,
                depth,
                limit,
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        let texture = wgpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let texels = volume.to_rgba_f16();
        wgpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * std::mem::size_of::<half::f16>() as u32 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            dimensions: (width, height, depth),
        })
    }
}

/// Tracks which staging request is the most recent one.
#[derive(Debug, Default, Clone)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    /// Starts a new request and supersedes all earlier ones.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.0.load(Ordering::SeqCst) == ticket
    }
}

pub struct GpuStager {
    wgpu: WGPU,
    generation: Generation,
}

impl GpuStager {
    pub fn new(wgpu: WGPU) -> Self {
        Self {
            wgpu,
            generation: Generation::default(),
        }
    }

    /// Makes `volume` GPU-resident.
    ///
    /// Returns `Ok(None)` when a newer volume was submitted while this one
    /// was uploading; the caller must not render the superseded volume.
    pub async fn stage(&self, volume: Arc<Volume>) -> Result<Option<Arc<Volume>>, GpuError> {
        let ticket = self.generation.next();
        if volume.gpu_representation().is_some() {
            return Ok(Some(volume));
        }

        let (sender, receiver) = futures::channel::oneshot::channel();
        let wgpu = self.wgpu.clone();
        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let result = GpuVolume::upload(&wgpu, &volume).and_then(|gpu| {
                wgpu.queue.submit(std::iter::empty());
                wgpu.wait_idle()?;
                if !volume.attach_gpu_representation(gpu) {
                    warn!("Volume {} was already resident, dropping upload", volume.id());
                }
                debug!("Staged volume {} in {:?}", volume.id(), start.elapsed());
                Ok(volume)
            });
            let _ = sender.send(result);
        });

        let staged = receiver.await.map_err(|_| GpuError::Cancelled)??;
        if !self.generation.is_current(ticket) {
            debug!("Discarding superseded volume {}", staged.id());
            return Ok(None);
        }
        Ok(Some(staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_supersedes() {
        let generation = Generation::default();
        let first = generation.next();
        assert!(generation.is_current(first));
        let second = generation.next();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }

    #[test]
    fn test_generation_shared_between_clones() {
        let generation = Generation::default();
        let ticket = generation.next();
        generation.clone().next();
        assert!(!generation.is_current(ticket));
    }
}
