//! Raycaster integration tests.
//!
//! Tests verify:
//! - Channel options follow the component count of assembled volumes
//! - Uniforms carry the selected channel and classification colors
//! - Volume texels are padded to four half-float channels
//! - Staging discards superseded volumes (needs a GPU adapter)
//! - Raycasting rejects unstaged volumes and mismatched inputs (needs a GPU adapter)
//!
//! Tests that need a GPU return early when no adapter is available.

use std::sync::Arc;

use image::RgbaImage;
use ndarray::Array4;

use histo_volume::enums::{GradientComputation, ShadingMode};
use histo_volume::gpu_stager::{GpuStager, WGPU};
use histo_volume::raycaster::{
    Background, ChannelSelection, ColorArray, ColorArrayError, CompositorSettings,
    EntryExitImages, MAX_COLORS, RaycastCompositor, RaycastInputs, RaycastUniforms, RenderError,
    ShaderDefines, world_to_texture,
};
use histo_volume::volume::{Volume, VolumeData};

async fn gpu() -> Option<WGPU> {
    WGPU::request().await.ok()
}

fn volume(components: usize) -> Volume {
    let mut data = Array4::<u8>::zeros((3, 4, 5, components));
    data[[1, 2, 3, 0]] = 255;
    Volume::new(VolumeData::U8(data), 0.01)
}

#[test]
fn test_channels_follow_volume() {
    let mut channel = ChannelSelection::default();

    assert!(channel.sync_components(volume(4).components()));
    assert_eq!(channel.len(), 4);
    assert_eq!(channel.selected(), 0);

    channel.apply_gradient_mode(GradientComputation::PrecomputedXyz);
    assert_eq!(channel.selected(), 3);

    assert!(channel.sync_components(volume(1).components()));
    assert_eq!(channel.selected(), 0);
}

#[test]
fn test_uniforms_for_selected_channel() {
    let volume = volume(4);
    let mut channel = ChannelSelection::default();
    channel.sync_components(volume.components());
    channel.select(2);
    let colors = ColorArray::from_hex(&["#00000000", "#ff8000ff"]).unwrap();

    let uniforms = RaycastUniforms::new(
        &CompositorSettings::default(),
        &volume,
        &channel,
        &colors,
        (16, 8),
        false,
    );

    assert_eq!(uniforms.channel, 2);
    assert_eq!(uniforms.color_len, 2);
    assert_eq!(uniforms.colors[1], [1.0, 128.0 / 255.0, 0.0, 1.0]);
    assert_eq!(uniforms.volume_dimensions[..3], [5.0, 4.0, 3.0]);
    assert_eq!(uniforms.use_normals, 0);
}

#[test]
fn test_camera_in_texture_space() {
    let volume = volume(1);
    let mut settings = CompositorSettings::default();
    settings.camera.position = [0.0, 0.0, 0.0];

    let center = world_to_texture(&volume, settings.camera.position);
    for c in center {
        assert!((c - 0.5).abs() < 1e-5);
    }
}

#[test]
fn test_color_capacity() {
    let too_many = vec!["#ffffff"; MAX_COLORS + 1];
    assert!(matches!(
        ColorArray::from_hex(&too_many[..]),
        Err(ColorArrayError::CapacityExceeded { .. })
    ));
}

#[test]
fn test_shading_toggle_changes_defines() {
    let mut settings = CompositorSettings::default();
    let shaded = ShaderDefines::new(&settings, false);

    settings.lighting.toggle_shading();
    assert_eq!(settings.lighting.shading_mode, ShadingMode::None);
    assert_ne!(ShaderDefines::new(&settings, false), shaded);

    settings.lighting.toggle_shading();
    assert_eq!(ShaderDefines::new(&settings, false), shaded);
}

#[test]
fn test_texels_padded_to_rgba() {
    let volume = volume(2);
    let texels = volume.to_rgba_f16();

    assert_eq!(texels.len(), 3 * 4 * 5 * 4);
    let (z, y, x) = (1, 2, 3);
    let voxel = ((z * 4 + y) * 5 + x) * 4;
    assert_eq!(texels[voxel].to_f32(), 1.0);
    assert_eq!(texels[voxel + 1].to_f32(), 0.0);
    assert_eq!(texels[voxel + 2].to_f32(), 0.0);
    assert_eq!(texels[voxel + 3].to_f32(), 0.0);
}

#[test]
fn test_orthographic_entry_exit() {
    let images = EntryExitImages::orthographic(16, 8);
    assert!(images.is_consistent());
    assert_eq!(images.size(), (16, 8));
    assert!(images.entry.color.iter().all(|p| p[2] == 0.0));
    assert!(images.exit.color.iter().all(|p| p[2] == 1.0));
}

#[tokio::test]
async fn test_superseded_stage_is_discarded() {
    let Some(wgpu) = gpu().await else {
        return;
    };
    let stager = GpuStager::new(wgpu);
    let first = Arc::new(volume(1));
    let second = Arc::new(volume(1));

    let mut pending = Box::pin(stager.stage(first.clone()));
    assert!(futures::poll!(&mut pending).is_pending());

    let staged = stager.stage(second.clone()).await.unwrap();
    assert_eq!(staged.map(|v| v.id()), Some(second.id()));
    assert!(pending.await.unwrap().is_none());
}

#[tokio::test]
async fn test_unstaged_volume_is_rejected() {
    let Some(wgpu) = gpu().await else {
        return;
    };
    let mut compositor = RaycastCompositor::new(wgpu);
    let volume = volume(1);
    let inputs = RaycastInputs::new(EntryExitImages::orthographic(8, 8));

    let err = compositor.raycast(&volume, &inputs).unwrap_err();
    assert!(matches!(err, RenderError::MissingGpuRepresentation(id) if id == volume.id()));
}

#[tokio::test]
async fn test_mismatched_background_is_rejected() {
    let Some(wgpu) = gpu().await else {
        return;
    };
    let staged = GpuStager::new(wgpu.clone())
        .stage(Arc::new(volume(1)))
        .await
        .unwrap()
        .unwrap();
    let mut compositor = RaycastCompositor::new(wgpu);
    let mut inputs = RaycastInputs::new(EntryExitImages::orthographic(16, 16));
    inputs.background = Some(Background::from_image(RgbaImage::new(16, 1)));

    let err = compositor.raycast(&staged, &inputs).unwrap_err();
    assert!(matches!(err, RenderError::InconsistentInputs));
}
