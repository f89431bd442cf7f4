//! Raycasting, camera, lighting and position indicator parameters, plus the
//! shader defines derived from them.

use std::fmt::Write;

use crate::enums::{Classification, Compositing, GradientComputation, Projection, ShadingMode};
use crate::raycaster::colors::MAX_COLORS;

#[derive(Debug, Clone, PartialEq)]
pub struct RaycastingSettings {
    pub classification: Classification,
    pub compositing: Compositing,
    pub gradient: GradientComputation,
    /// Samples per voxel along a ray.
    pub sampling_rate: f32,
    pub iso_value: f32,
}

impl Default for RaycastingSettings {
    fn default() -> Self {
        Self {
            classification: Classification::default(),
            compositing: Compositing::default(),
            gradient: GradientComputation::default(),
            sampling_rate: 2.0,
            iso_value: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub projection: Projection,
    /// World-space eye position.
    pub position: [f32; 3],
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            position: [0.0, 0.0, 2.0],
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightingSettings {
    pub shading_mode: ShadingMode,
    /// World-space light position.
    pub position: [f32; 3],
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub exponent: f32,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            shading_mode: ShadingMode::Phong,
            position: [0.0, 5.0, 5.0],
            ambient: [0.15, 0.15, 0.15],
            diffuse: [0.6, 0.6, 0.6],
            specular: [0.4, 0.4, 0.4],
            exponent: 60.0,
        }
    }
}

impl LightingSettings {
    /// Flips between unshaded and Phong shading.
    pub fn toggle_shading(&mut self) {
        self.shading_mode = if self.shading_mode == ShadingMode::None {
            ShadingMode::Phong
        } else {
            ShadingMode::None
        };
    }
}

/// Highlights the planes through a point inside the volume.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionIndicator {
    pub enabled: bool,
    /// Texture-space position.
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub thickness: f32,
}

impl Default for PositionIndicator {
    fn default() -> Self {
        Self {
            enabled: false,
            position: [0.5, 0.5, 0.5],
            color: [1.0, 0.5, 0.0, 0.75],
            thickness: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositorSettings {
    pub raycasting: RaycastingSettings,
    pub camera: CameraSettings,
    pub lighting: LightingSettings,
    pub position_indicator: PositionIndicator,
    /// Shown where rays miss the volume and no background is connected.
    pub view_color: [f32; 4],
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            raycasting: RaycastingSettings::default(),
            camera: CameraSettings::default(),
            lighting: LightingSettings::default(),
            position_indicator: PositionIndicator::default(),
            view_color: [0.16, 0.06, 0.24, 1.0],
        }
    }
}

/// Compile-time constants prepended to the raycasting shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDefines {
    entries: Vec<(&'static str, &'static str, String)>,
}

impl ShaderDefines {
    pub fn new(settings: &CompositorSettings, has_background: bool) -> Self {
        let mut defines = Self {
            entries: Vec::new(),
        };
        let raycasting = &settings.raycasting;
        let classification = match raycasting.classification {
            Classification::None => 0u32,
            Classification::TransferFunction => 1,
            Classification::Voxel => 2,
        };
        defines.uint("CLASSIFICATION", classification);
        defines.uint("COMPOSITING", raycasting.compositing.shader_index());
        defines.uint("GRADIENT_MODE", raycasting.gradient.shader_index());
        defines.uint("SHADING_MODE", settings.lighting.shading_mode.shader_index());
        defines.bool(
            "ORTHOGRAPHIC",
            settings.camera.projection == Projection::Orthographic,
        );
        defines.bool("POSITION_INDICATOR", settings.position_indicator.enabled);
        defines.bool("HAS_BACKGROUND", has_background);
        defines.uint("MAX_COLORS", MAX_COLORS as u32);
        defines
    }

    fn uint(&mut self, name: &'static str, value: u32) {
        self.entries.push((name, "u32", format!("{value}u")));
    }

    fn bool(&mut self, name: &'static str, value: bool) {
        self.entries.push((name, "bool", value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, _, v)| v.as_str())
    }

    /// WGSL `const` declarations, one per define.
    pub fn prelude(&self) -> String {
        let mut out = String::new();
        for (name, ty, value) in &self.entries {
            let _ = writeln!(out, "const {name}: {ty} = {value};");
        }
        out
    }

    pub fn apply(&self, source: &str) -> String {
        format!("{}\n{}", self.prelude(), source)
    }
}
