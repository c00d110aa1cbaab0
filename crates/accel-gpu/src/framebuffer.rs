//! Render targets.

use std::rc::Rc;

use accel_core::ImageTypeSpec;
use tracing::warn;

use crate::binder::{Binder, Destroyable, Target};
use crate::context::GpuContext;
use crate::texture::Texture;

/// A render target owning its color texture.
pub struct FrameBuffer {
    ctx: Rc<GpuContext>,
    name: u32,
    texture: Texture,
}

impl FrameBuffer {
    /// Allocates a texture for `spec` and attaches it.
    pub fn new(ctx: &Rc<GpuContext>, width: u32, height: u32, spec: ImageTypeSpec) -> Self {
        Self::with_texture(ctx, Texture::new(ctx, width, height, spec))
    }

    /// Takes ownership of `texture` as the color attachment.
    pub fn with_texture(ctx: &Rc<GpuContext>, texture: Texture) -> Self {
        let name = ctx.create_framebuffer(texture.name());
        ctx.check_error("create framebuffer");
        Self { ctx: ctx.clone(), name, texture }
    }

    /// Hardware name, 0 once destroyed.
    pub fn name(&self) -> u32 {
        self.name
    }

    /// Color attachment.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Sets the viewport to the full extent.
    pub fn set_viewport(&self) {
        self.ctx.viewport(0, 0, self.width(), self.height());
    }

    /// Copies the color attachment into `out`, tightly packed in the
    /// texture's own format. Blocks until the data is on the host.
    ///
    /// `out` must hold exactly `width * height * bytes_per_pixel` bytes.
    pub fn read_pixels(&self, out: &mut [u8]) {
        let _bound = Binder::new(self);
        self.ctx.read_pixels(out);
        self.ctx.check_error("read pixels");
    }

    /// Replaces the color attachment contents with `data`.
    pub fn write_pixels(&self, data: &[u8]) {
        let _bound = Binder::new(&self.texture);
        self.ctx.tex_image(data);
        self.ctx.check_error("write pixels");
    }
}

impl Target for FrameBuffer {
    fn bind(&self) {
        self.ctx.bind_framebuffer(self.name);
    }

    fn unbind(&self) {
        self.ctx.bind_framebuffer(0);
    }
}

impl Destroyable for FrameBuffer {
    fn destroy(&mut self) {
        if self.name != 0 {
            self.ctx.delete_framebuffer(self.name);
            self.name = 0;
        }
        self.texture.destroy();
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if self.name != 0 {
            warn!(name = self.name, "leaking framebuffer");
        }
    }
}
