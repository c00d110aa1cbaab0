//! GPU-resident images.

use std::rc::Rc;
use std::sync::Arc;

use accel_core::{AsAny, DataType, Factory, Future, Image, ImageTypeSpec, Processor, StorageType};
use tracing::trace;

use crate::binder::Destroyable;
use crate::context::GpuContext;
use crate::framebuffer::FrameBuffer;
use crate::read_adapter::{ReadAdapter, read_target};
use crate::texture::Texture;

/// Image stored in a texture attached to its own framebuffer.
///
/// Raw reads follow the context's transfer policy. Layouts the device
/// cannot copy directly are read through a [`ReadAdapter`] built on the
/// first read and kept for later ones.
pub struct GpuImage {
    factory: GpuImageFactory,
    framebuffer: FrameBuffer,
    spec: ImageTypeSpec,
    adapter: Option<Box<ReadAdapter>>,
}

impl GpuImage {
    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn texture(&self) -> &Texture {
        self.framebuffer.texture()
    }

    /// Whether reads go through a repacking adapter.
    pub fn has_read_adapter(&self) -> bool {
        self.adapter.is_some()
    }
}

impl AsAny for GpuImage {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl Image for GpuImage {
    fn width(&self) -> u32 {
        self.framebuffer.width()
    }

    fn height(&self) -> u32 {
        self.framebuffer.height()
    }

    fn spec(&self) -> ImageTypeSpec {
        self.spec
    }

    fn read_raw(&mut self) -> Future<Vec<u8>> {
        let policy = self.factory.context().config().transfer;
        let Some(target) = read_target(&self.spec, policy) else {
            let mut out = vec![0; self.size()];
            self.framebuffer.read_pixels(&mut out);
            return Future::instantly_resolved(out);
        };
        let mut adapter = match self.adapter.take() {
            Some(adapter) => adapter,
            None => Box::new(ReadAdapter::new(
                &self.factory,
                self.width(),
                self.height(),
                self.spec,
                target,
            )),
        };
        let pulled = adapter.read(self);
        self.adapter = Some(adapter);
        pulled
    }

    fn write_raw(&mut self, data: &[u8]) -> Future<()> {
        assert_eq!(data.len(), self.size(), "raw write size mismatch");
        self.framebuffer.write_pixels(data);
        Future::instantly_resolved(())
    }

    fn release(&mut self) {
        self.destroy();
    }
}

impl Destroyable for GpuImage {
    fn destroy(&mut self) {
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.destroy();
        }
        self.framebuffer.destroy();
    }
}

impl std::fmt::Debug for GpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("spec", &self.spec)
            .field("framebuffer", &self.framebuffer.name())
            .finish()
    }
}

/// Creates [`GpuImage`]s on one context.
///
/// Host-side work triggered by reads (row compaction) runs on `processor`.
#[derive(Clone)]
pub struct GpuImageFactory {
    ctx: Rc<GpuContext>,
    processor: Arc<dyn Processor>,
}

impl GpuImageFactory {
    pub fn new(ctx: Rc<GpuContext>, processor: Arc<dyn Processor>) -> Self {
        Self { ctx, processor }
    }

    pub fn context(&self) -> &Rc<GpuContext> {
        &self.ctx
    }

    pub fn processor(&self) -> &Arc<dyn Processor> {
        &self.processor
    }

    /// Allocates a zero-filled GPU image.
    ///
    /// # Panics
    ///
    /// On 3-channel formats, which have no texture format, and on empty
    /// dimensions.
    pub fn create_gpu(&self, width: u32, height: u32, channels: u32, data_type: DataType) -> GpuImage {
        trace!(width, height, channels, data_type = data_type.name(), "gpu image");
        let spec = ImageTypeSpec::new(channels, data_type, StorageType::GpuTexture);
        GpuImage {
            factory: self.clone(),
            framebuffer: FrameBuffer::new(&self.ctx, width, height, spec),
            spec,
            adapter: None,
        }
    }

    /// Wraps a texture created elsewhere on the same device. It must allow
    /// render-attachment use to be written and copy-source use to be read.
    pub fn import(&self, texture: wgpu::Texture, channels: u32, data_type: DataType) -> GpuImage {
        let spec = ImageTypeSpec::new(channels, data_type, StorageType::GpuExternal);
        let texture = Texture::import(&self.ctx, texture, spec);
        GpuImage {
            factory: self.clone(),
            framebuffer: FrameBuffer::with_texture(&self.ctx, texture),
            spec,
            adapter: None,
        }
    }
}

impl Factory for GpuImageFactory {
    fn create(&self, width: u32, height: u32, channels: u32, data_type: DataType) -> Box<dyn Image> {
        Box::new(self.create_gpu(width, height, channels, data_type))
    }
}

impl std::fmt::Debug for GpuImageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuImageFactory")
            .field("processor", &self.processor.name())
            .finish()
    }
}
