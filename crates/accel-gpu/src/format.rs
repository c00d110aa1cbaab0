//! Pixel format to texture format mapping.

use accel_core::{DataType, ImageTypeSpec};

/// Texture format storing `spec` without conversion.
///
/// # Panics
///
/// On 3-channel specs, which have no texture format.
pub fn texture_format(spec: &ImageTypeSpec) -> wgpu::TextureFormat {
    try_texture_format(spec)
        .unwrap_or_else(|| panic!("{}-channel images cannot be stored on the GPU", spec.channels))
}

/// Texture format storing `spec`, `None` for channel counts without one.
pub fn try_texture_format(spec: &ImageTypeSpec) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    let formats = match spec.data_type {
        DataType::Ufixed8 => [F::R8Unorm, F::Rg8Unorm, F::Rgba8Unorm],
        DataType::Uint8 => [F::R8Uint, F::Rg8Uint, F::Rgba8Uint],
        DataType::Sint8 => [F::R8Sint, F::Rg8Sint, F::Rgba8Sint],
        DataType::Uint16 => [F::R16Uint, F::Rg16Uint, F::Rgba16Uint],
        DataType::Sint16 => [F::R16Sint, F::Rg16Sint, F::Rgba16Sint],
        DataType::Uint32 => [F::R32Uint, F::Rg32Uint, F::Rgba32Uint],
        DataType::Sint32 => [F::R32Sint, F::Rg32Sint, F::Rgba32Sint],
        DataType::Float32 => [F::R32Float, F::Rg32Float, F::Rgba32Float],
    };
    match spec.channels {
        1 => Some(formats[0]),
        2 => Some(formats[1]),
        4 => Some(formats[2]),
        _ => None,
    }
}

/// Usages of every engine-allocated texture: sampled, rendered to, and
/// copied both ways.
pub(crate) const TARGET_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Bytes per texel of `format`.
pub(crate) fn texel_size(format: wgpu::TextureFormat) -> u32 {
    format.block_copy_size(None).unwrap_or(0)
}

/// Whether draws into `format` may blend.
pub(crate) fn is_blendable(format: wgpu::TextureFormat) -> bool {
    matches!(
        format.sample_type(None, None),
        Some(wgpu::TextureSampleType::Float { filterable: true })
    )
}
