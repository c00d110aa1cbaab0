//! 2-D textures.

use std::rc::Rc;

use accel_core::{ImageTypeSpec, StorageType};
use tracing::warn;

use crate::binder::{Destroyable, Target};
use crate::context::{BindType, GpuContext};
use crate::format::texture_format;

/// A 2-D texture sampled with nearest-neighbor filtering.
///
/// Engine-allocated textures bind at [`BindType::Texture2D`]; imported ones
/// bind at [`BindType::External`] and are never destroyed by the engine,
/// only released.
pub struct Texture {
    ctx: Rc<GpuContext>,
    name: u32,
    width: u32,
    height: u32,
    spec: ImageTypeSpec,
    bind_type: BindType,
}

impl Texture {
    /// Allocates a zero-filled texture.
    ///
    /// # Panics
    ///
    /// On empty dimensions, a 3-channel `spec`, or a format the device
    /// cannot render to.
    pub fn new(ctx: &Rc<GpuContext>, width: u32, height: u32, spec: ImageTypeSpec) -> Self {
        assert!(width > 0 && height > 0, "texture dimensions must be non-zero, got {width}x{height}");
        let spec = spec.with_storage(StorageType::GpuTexture);
        let format = texture_format(&spec);
        assert!(
            ctx.supports_render_target(&spec),
            "{spec} ({format:?}) is not renderable on {}",
            ctx.adapter_info().name
        );
        let name = ctx.create_texture(width, height, &spec);
        Self { ctx: ctx.clone(), name, width, height, spec, bind_type: BindType::Texture2D }
    }

    /// Wraps a texture created elsewhere on the same device.
    ///
    /// # Panics
    ///
    /// If the texture format does not store `spec`.
    pub fn import(ctx: &Rc<GpuContext>, texture: wgpu::Texture, spec: ImageTypeSpec) -> Self {
        let spec = spec.with_storage(StorageType::GpuExternal);
        assert_eq!(
            texture.format(),
            texture_format(&spec),
            "imported texture format does not match {spec}"
        );
        let (width, height) = (texture.width(), texture.height());
        let name = ctx.import_texture(texture);
        Self { ctx: ctx.clone(), name, width, height, spec, bind_type: BindType::External }
    }

    /// Hardware name, 0 once destroyed.
    pub fn name(&self) -> u32 {
        self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn spec(&self) -> ImageTypeSpec {
        self.spec
    }

    pub fn bind_type(&self) -> BindType {
        self.bind_type
    }
}

impl Target for Texture {
    fn bind(&self) {
        self.ctx.bind_texture(self.bind_type, self.name);
    }

    fn unbind(&self) {
        self.ctx.bind_texture(self.bind_type, 0);
    }
}

impl Destroyable for Texture {
    fn destroy(&mut self) {
        if self.name != 0 {
            self.ctx.delete_texture(self.name);
            self.name = 0;
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if self.name != 0 {
            warn!(name = self.name, width = self.width, height = self.height, "leaking texture");
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("spec", &self.spec)
            .finish()
    }
}
