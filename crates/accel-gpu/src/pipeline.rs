//! Operation pipelines: a synthesized program plus its texture bindings.

use std::cell::Cell;
use std::rc::Rc;

use accel_core::{ImageTypeSpec, StorageType};
use tracing::{debug, trace};

use crate::binder::{Destroyable, Target};
use crate::context::{BindType, GpuContext, UniformLocation};
use crate::framebuffer::FrameBuffer;
use crate::glsl;
use crate::runner::FragmentShaderRunner;

/// Binds one texture to one texture unit and points a sampler uniform at it.
///
/// Unbinding clears the unit and makes unit 0 active again, leaving the
/// default state for whatever runs next.
pub struct TextureUniformBinder {
    ctx: Rc<GpuContext>,
    slot: u32,
    bind_type: BindType,
    location: Option<UniformLocation>,
    texture: Cell<u32>,
}

impl TextureUniformBinder {
    fn new(ctx: &Rc<GpuContext>, slot: u32, bind_type: BindType, location: Option<UniformLocation>) -> Self {
        Self { ctx: ctx.clone(), slot, bind_type, location, texture: Cell::new(0) }
    }

    /// Texture bound on the next `bind`.
    pub fn set_texture(&self, name: u32) {
        self.texture.set(name);
    }

    pub fn texture(&self) -> u32 {
        self.texture.get()
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl Target for TextureUniformBinder {
    fn bind(&self) {
        trace!(slot = self.slot, texture = self.texture.get(), "bind texture uniform");
        self.ctx.active_texture(self.slot);
        self.ctx.bind_texture(self.bind_type, self.texture.get());
        // Inputs the body never reads have no location.
        if let Some(location) = self.location {
            self.ctx.uniform_1i(location, self.slot as i32);
        }
    }

    fn unbind(&self) {
        self.ctx.active_texture(self.slot);
        self.ctx.bind_texture(self.bind_type, 0);
        self.ctx.active_texture(0);
    }
}

/// A reusable operation: program, quad and one texture binding per input.
///
/// Built once per (body, inputs, output) shape. Which textures are read is
/// decided per call through [`Pipeline::bind_texture`].
pub struct Pipeline {
    ctx: Rc<GpuContext>,
    runner: FragmentShaderRunner,
    out_size: Option<UniformLocation>,
    textures: Vec<TextureUniformBinder>,
    output: ImageTypeSpec,
}

impl Pipeline {
    /// Synthesizes and compiles the fragment shader.
    pub fn new(ctx: &Rc<GpuContext>, body: &str, inputs: &[ImageTypeSpec], output: ImageTypeSpec) -> Self {
        let source = glsl::fragment_source(body, inputs, &output);
        debug!(inputs = inputs.len(), %output, "build pipeline");
        let runner = FragmentShaderRunner::new(ctx, &source);
        let program = runner.program();
        let out_size = program.uniform_location(glsl::OUT_SIZE);
        let textures = inputs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let name = glsl::texture_name(i, inputs.len());
                let location = program.uniform_location(&glsl::image_binding_name(&name));
                let bind_type = match spec.storage {
                    StorageType::GpuExternal => BindType::External,
                    _ => BindType::Texture2D,
                };
                TextureUniformBinder::new(ctx, i as u32, bind_type, location)
            })
            .collect();
        Self { ctx: ctx.clone(), runner, out_size, textures, output }
    }

    /// Number of input textures.
    pub fn input_count(&self) -> usize {
        self.textures.len()
    }

    /// Output format the shader writes.
    pub fn output(&self) -> ImageTypeSpec {
        self.output
    }

    /// Selects texture `name` for input `index` and returns the binder that
    /// attaches it.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn bind_texture(&self, index: usize, name: u32) -> &TextureUniformBinder {
        let binder = &self.textures[index];
        binder.set_texture(name);
        binder
    }

    /// Draws into `target`. The pipeline and its input binders must be
    /// bound.
    pub fn call(&self, target: &FrameBuffer) {
        if let Some(location) = self.out_size {
            self.ctx.uniform_2f(location, target.width() as f32, target.height() as f32);
            self.ctx.check_error("set output size");
        }
        self.runner.call(target);
    }
}

impl Target for Pipeline {
    fn bind(&self) {
        self.runner.bind();
    }

    fn unbind(&self) {
        self.runner.unbind();
    }
}

impl Destroyable for Pipeline {
    fn destroy(&mut self) {
        self.runner.destroy();
    }
}
