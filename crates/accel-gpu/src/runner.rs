//! Full-screen quad draws.

use std::rc::Rc;

use tracing::warn;

use crate::binder::{Binder, Capability, Destroyable, FlagGuard, Target};
use crate::context::GpuContext;
use crate::framebuffer::FrameBuffer;
use crate::program::Program;

/// Fixed vertex stage. `a_vertexData.xy` is the clip position, `.zw` the
/// texture coordinate.
pub const VERTEX_SHADER: &str = "#version 450
layout(location = 0) in vec4 a_vertexData;
layout(location = 0) out vec2 v_texCoord;
void main() {
    v_texCoord = a_vertexData.zw;
    gl_Position = vec4(a_vertexData.xy, 0.0, 1.0);
}
";

/// Vertex attribute carrying position and texture coordinate.
pub const VERTEX_ATTRIB: &str = "a_vertexData";

/// One quad corner, read as `a_vertexData`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
}

const fn vertex(x: f32, y: f32, u: f32, v: f32) -> Vertex {
    Vertex { position: [x, y], tex_coord: [u, v] }
}

/// UV (0, 0) is the first texel row in memory, which the clip-space top
/// edge renders into.
const QUAD: [Vertex; 4] = [
    vertex(-1.0, -1.0, 0.0, 1.0),
    vertex(-1.0, 1.0, 0.0, 0.0),
    vertex(1.0, 1.0, 1.0, 0.0),
    vertex(1.0, -1.0, 1.0, 1.0),
];

const INDICES: [u32; 6] = [2, 1, 0, 0, 3, 2];

/// A program drawn over a full-screen quad, touching every target pixel
/// exactly once per call.
pub struct FragmentShaderRunner {
    ctx: Rc<GpuContext>,
    program: Program,
    vertices: u32,
    indices: u32,
    attrib: u32,
}

impl FragmentShaderRunner {
    /// Compiles `fragment_source` against [`VERTEX_SHADER`].
    pub fn new(ctx: &Rc<GpuContext>, fragment_source: &str) -> Self {
        let program = Program::new(ctx, VERTEX_SHADER, fragment_source);
        let attrib = program.attrib_location(VERTEX_ATTRIB).unwrap_or_else(|| {
            crate::fatal("link", &format!("vertex attribute {VERTEX_ATTRIB} not found"))
        });
        let vertices = ctx.create_buffer(bytemuck::cast_slice(&QUAD), wgpu::BufferUsages::VERTEX);
        let indices = ctx.create_buffer(bytemuck::cast_slice(&INDICES), wgpu::BufferUsages::INDEX);
        Self { ctx: ctx.clone(), program, vertices, indices, attrib }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Draws into `target`. The runner must be bound.
    pub fn call(&self, target: &FrameBuffer) {
        let _depth = FlagGuard::new(&self.ctx, Capability::DepthTest, false);
        let _blend = FlagGuard::new(&self.ctx, Capability::Blend, false);
        let _target = Binder::new(target);
        target.set_viewport();

        self.ctx.bind_array_buffer(self.vertices);
        self.ctx.enable_vertex_attrib(self.attrib);
        self.ctx.bind_element_buffer(self.indices);
        self.ctx.draw_elements(INDICES.len() as u32);
        self.ctx.bind_element_buffer(0);
        self.ctx.disable_vertex_attrib(self.attrib);
        self.ctx.bind_array_buffer(0);
        self.ctx.check_error("draw");
    }
}

impl Target for FragmentShaderRunner {
    fn bind(&self) {
        self.program.bind();
    }

    fn unbind(&self) {
        self.program.unbind();
    }
}

impl Destroyable for FragmentShaderRunner {
    fn destroy(&mut self) {
        self.program.destroy();
        for buffer in [&mut self.vertices, &mut self.indices] {
            if *buffer != 0 {
                self.ctx.delete_buffer(*buffer);
                *buffer = 0;
            }
        }
    }
}

impl Drop for FragmentShaderRunner {
    fn drop(&mut self) {
        if self.vertices != 0 || self.indices != 0 {
            warn!(vertices = self.vertices, indices = self.indices, "leaking quad buffers");
        }
    }
}
