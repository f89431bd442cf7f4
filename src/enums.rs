/// Primitive sample type of a volume or a decoded slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericType {
    UnsignedInteger,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    #[default]
    None,
    Ambient,
    Diffuse,
    Specular,
    BlinnPhong,
    Phong,
}

impl ShadingMode {
    pub(crate) fn shader_index(self) -> u32 {
        match self {
            ShadingMode::None => 0,
            ShadingMode::Ambient => 1,
            ShadingMode::Diffuse => 2,
            ShadingMode::Specular => 3,
            ShadingMode::BlinnPhong => 4,
            ShadingMode::Phong => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientComputation {
    None,
    Forward,
    Backward,
    #[default]
    Central,
    CentralHigherOrder,
    // Gradients stored in the xyz components, scalar in w
    PrecomputedXyz,
    // Scalar in x, gradients stored in the yzw components
    PrecomputedYzw,
}

impl GradientComputation {
    pub(crate) fn shader_index(self) -> u32 {
        match self {
            GradientComputation::None => 0,
            GradientComputation::Forward => 1,
            GradientComputation::Backward => 2,
            GradientComputation::Central => 3,
            GradientComputation::CentralHigherOrder => 4,
            GradientComputation::PrecomputedXyz => 5,
            GradientComputation::PrecomputedYzw => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    None,
    #[default]
    TransferFunction,
    Voxel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compositing {
    #[default]
    Dvr,
    FirstHitPoints,
    FirstHitNormals,
    MaximumIntensity,
    Iso,
}

impl Compositing {
    pub(crate) fn shader_index(self) -> u32 {
        match self {
            Compositing::Dvr => 0,
            Compositing::FirstHitPoints => 1,
            Compositing::FirstHitNormals => 2,
            Compositing::MaximumIntensity => 3,
            Compositing::Iso => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Perspective,
    Orthographic,
}
