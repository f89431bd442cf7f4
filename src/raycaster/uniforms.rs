use crate::raycaster::channel::ChannelSelection;
use crate::raycaster::colors::{ColorArray, MAX_COLORS};
use crate::raycaster::settings::CompositorSettings;
use crate::volume::Volume;

/// Uniform block of the raycasting shader. Field order and padding mirror
/// `Uniforms` in `raycasting.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RaycastUniforms {
    pub camera_position: [f32; 4],
    pub light_position: [f32; 4],
    pub light_ambient: [f32; 4],
    pub light_diffuse: [f32; 4],
    pub light_specular: [f32; 4],
    pub indicator_position: [f32; 4],
    pub indicator_color: [f32; 4],
    pub view_color: [f32; 4],
    pub volume_dimensions: [f32; 4],
    pub output_size: [f32; 2],
    pub near_far: [f32; 2],
    pub sampling_rate: f32,
    pub iso_value: f32,
    pub light_exponent: f32,
    pub indicator_thickness: f32,
    pub channel: u32,
    pub use_normals: u32,
    pub color_len: u32,
    pub _padding: u32,
    pub colors: [[f32; 4]; MAX_COLORS],
}

/// Maps a world-space point into the unit cube spanned by the volume.
pub fn world_to_texture(volume: &Volume, point: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (axis, value) in out.iter_mut().enumerate() {
        let size = volume.basis[axis][axis];
        *value = if size == 0.0 {
            0.0
        } else {
            (point[axis] - volume.offset[axis]) / size
        };
    }
    out
}

fn extend(v: [f32; 3], w: f32) -> [f32; 4] {
    [v[0], v[1], v[2], w]
}

impl RaycastUniforms {
    pub fn new(
        settings: &CompositorSettings,
        volume: &Volume,
        channel: &ChannelSelection,
        colors: &ColorArray,
        output_size: (u32, u32),
        use_normals: bool,
    ) -> Self {
        let (depth, height, width) = volume.dim();
        let lighting = &settings.lighting;
        let indicator = &settings.position_indicator;
        let mut uniforms: Self = bytemuck::Zeroable::zeroed();

        uniforms.camera_position = extend(world_to_texture(volume, settings.camera.position), 1.0);
        uniforms.light_position = extend(world_to_texture(volume, lighting.position), 1.0);
        uniforms.light_ambient = extend(lighting.ambient, 1.0);
        uniforms.light_diffuse = extend(lighting.diffuse, 1.0);
        uniforms.light_specular = extend(lighting.specular, 1.0);
        uniforms.indicator_position = extend(indicator.position, 1.0);
        uniforms.indicator_color = indicator.color;
        uniforms.view_color = settings.view_color;
        uniforms.volume_dimensions = [width as f32, height as f32, depth as f32, 0.0];
        uniforms.output_size = [output_size.0 as f32, output_size.1 as f32];
        uniforms.near_far = [settings.camera.near, settings.camera.far];
        uniforms.sampling_rate = settings.raycasting.sampling_rate.max(f32::EPSILON);
        uniforms.iso_value = settings.raycasting.iso_value;
        uniforms.light_exponent = lighting.exponent;
        uniforms.indicator_thickness = indicator.thickness;
        uniforms.channel = channel.selected() as u32;
        uniforms.use_normals = use_normals as u32;
        uniforms.color_len = colors.len() as u32;
        uniforms.colors = colors.to_uniform();
        uniforms
    }
}
