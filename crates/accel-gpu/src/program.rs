//! Shader programs.
//!
//! Both stages are GLSL 450, parsed and validated by naga and handed to wgpu
//! as naga IR. "Linking" checks that every fragment input is produced by the
//! vertex stage and reflects the program interface: the bind group layout,
//! uniform locations and vertex attribute locations. Compile or link failure
//! is fatal.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use naga::{AddressSpace, Binding, ImageClass, ImageDimension, Module, ScalarKind, ShaderStage, TypeInner};
use tracing::{debug, warn};

use crate::binder::{Destroyable, Target};
use crate::context::{GpuContext, UniformLocation};

/// Render pipeline cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub format: wgpu::TextureFormat,
    pub blend: bool,
    pub attrib: u32,
}

/// Linked program as stored in the context's object table.
pub(crate) struct ProgramObject {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    layout: wgpu::PipelineLayout,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) layout_entries: Vec<wgpu::BindGroupLayoutEntry>,
    pub(crate) uniforms: HashMap<String, UniformLocation>,
    pub(crate) attribs: HashMap<String, u32>,
    /// Uniform block contents by binding.
    pub(crate) blocks: HashMap<u32, Vec<u8>>,
    /// Texture unit read by each texture binding.
    pub(crate) texture_units: HashMap<u32, u32>,
    pub(crate) pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl ProgramObject {
    /// Builds the render pipeline for `key` unless it is cached.
    pub(crate) fn prepare_pipeline(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        debug!(format = ?key.format, blend = key.blend, attrib = key.attrib, "build render pipeline");
        let attributes = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 0,
            shader_location: key.attrib,
        }];
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("accel_render_pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.vertex,
                entry_point: Some(&self.vertex_entry),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 16,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment,
                entry_point: Some(&self.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: key.blend.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
    }
}

/// Parses and validates one GLSL stage. Returns the diagnostics on failure.
pub(crate) fn parse(stage: ShaderStage, source: &str) -> Result<Module, String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(stage), source)
        .map_err(|e| e.emit_to_string(source))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| e.emit_to_string(source))?;
    Ok(module)
}

/// Reflected program interface.
#[derive(Debug, Default)]
pub(crate) struct Interface {
    pub entries: Vec<wgpu::BindGroupLayoutEntry>,
    pub uniforms: HashMap<String, UniformLocation>,
    pub attribs: HashMap<String, u32>,
    pub blocks: HashMap<u32, Vec<u8>>,
    pub vertex_entry: String,
    pub fragment_entry: String,
}

/// Links two parsed stages. Returns a description of the first mismatch.
pub(crate) fn link(vertex: &Module, fragment: &Module) -> Result<Interface, String> {
    let vs = entry_point(vertex, ShaderStage::Vertex)?;
    let fs = entry_point(fragment, ShaderStage::Fragment)?;

    let mut produced = BTreeSet::new();
    if let Some(result) = &vs.function.result {
        collect_locations(vertex, result.ty, result.binding.as_ref(), &mut |loc, _| {
            produced.insert(loc);
        });
    }
    let mut consumed = BTreeSet::new();
    for arg in &fs.function.arguments {
        collect_locations(fragment, arg.ty, arg.binding.as_ref(), &mut |loc, _| {
            consumed.insert(loc);
        });
    }
    if let Some(missing) = consumed.difference(&produced).next() {
        return Err(format!("fragment input at location {missing} is not written by the vertex stage"));
    }

    let mut interface = Interface {
        vertex_entry: vs.name.clone(),
        fragment_entry: fs.name.clone(),
        ..Default::default()
    };

    let mut inputs = Vec::new();
    for arg in &vs.function.arguments {
        collect_locations(vertex, arg.ty, arg.binding.as_ref(), &mut |loc, name| {
            inputs.push((name.or(arg.name.as_deref()).map(str::to_owned), loc));
        });
    }
    // Unnamed inputs are only resolvable when there is no ambiguity.
    let single = inputs.len() == 1;
    for (name, loc) in inputs {
        match name {
            Some(name) => {
                interface.attribs.insert(name, loc);
            }
            None if single => {
                interface.attribs.insert(String::new(), loc);
            }
            None => {}
        }
    }

    for module in [vertex, fragment] {
        reflect_resources(module, &mut interface)?;
    }
    interface.entries.sort_by_key(|e| e.binding);
    interface.entries.dedup_by_key(|e| e.binding);
    Ok(interface)
}

fn entry_point(module: &Module, stage: ShaderStage) -> Result<&naga::EntryPoint, String> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage)
        .ok_or_else(|| format!("no {stage:?} entry point"))
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    f: &mut impl FnMut(u32, Option<&str>),
) {
    match binding {
        Some(Binding::Location { location, .. }) => f(*location, None),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(Binding::Location { location, .. }) = &member.binding {
                        f(*location, member.name.as_deref());
                    }
                }
            }
        }
    }
}

fn reflect_resources(module: &Module, interface: &mut Interface) -> Result<(), String> {
    for (_, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else {
            continue;
        };
        if rb.group != 0 {
            return Err(format!("binding group {} is not supported", rb.group));
        }
        let binding = rb.binding;
        let ty = match &module.types[var.ty].inner {
            TypeInner::Image {
                dim: ImageDimension::D2,
                arrayed: false,
                class: ImageClass::Sampled { kind, multi: false },
            } => {
                let sample_type = match kind {
                    ScalarKind::Float => wgpu::TextureSampleType::Float { filterable: false },
                    ScalarKind::Uint => wgpu::TextureSampleType::Uint,
                    ScalarKind::Sint => wgpu::TextureSampleType::Sint,
                    other => return Err(format!("unsupported texture kind {other:?}")),
                };
                if let Some(name) = &var.name {
                    interface.uniforms.insert(name.clone(), UniformLocation::Texture { binding });
                }
                wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                }
            }
            TypeInner::Sampler { comparison: false } => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
            }
            TypeInner::Struct { members, span } if var.space == AddressSpace::Uniform => {
                for member in members {
                    if let Some(name) = &member.name {
                        let size = module.types[member.ty].inner.size(module.to_ctx());
                        interface.uniforms.insert(
                            name.clone(),
                            UniformLocation::Block { binding, offset: member.offset, size },
                        );
                    }
                }
                let size = (*span as usize).max(16).next_multiple_of(16);
                interface.blocks.entry(binding).or_insert_with(|| vec![0; size]);
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                }
            }
            other => return Err(format!("unsupported resource at binding {binding}: {other:?}")),
        };
        interface.entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty,
            count: None,
        });
    }
    Ok(())
}

/// A linked vertex/fragment program.
pub struct Program {
    ctx: Rc<GpuContext>,
    name: u32,
}

impl Program {
    /// Compiles and links both stages.
    ///
    /// Aborts after logging the diagnostics and the failing source if
    /// either stage does not compile or the stages do not link.
    pub fn new(ctx: &Rc<GpuContext>, vertex_source: &str, fragment_source: &str) -> Self {
        let vertex = compile(ShaderStage::Vertex, vertex_source);
        let fragment = compile(ShaderStage::Fragment, fragment_source);
        let interface = link(&vertex, &fragment).unwrap_or_else(|e| {
            crate::fatal(
                "link",
                &format!("could not link program: {e}\n{vertex_source}\n{fragment_source}"),
            )
        });

        let device = ctx.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("accel_bind_group_layout"),
            entries: &interface.entries,
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("accel_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("accel_vertex"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(vertex)),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("accel_fragment"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(fragment)),
        });

        debug!(
            bindings = interface.entries.len(),
            uniforms = interface.uniforms.len(),
            "linked program"
        );
        let name = ctx.create_program(ProgramObject {
            vertex,
            fragment,
            vertex_entry: interface.vertex_entry,
            fragment_entry: interface.fragment_entry,
            layout,
            bind_group_layout,
            layout_entries: interface.entries,
            uniforms: interface.uniforms,
            attribs: interface.attribs,
            blocks: interface.blocks,
            texture_units: HashMap::new(),
            pipelines: HashMap::new(),
        });
        ctx.check_error("create program");
        Self { ctx: ctx.clone(), name }
    }

    /// Hardware name, 0 once destroyed.
    pub fn name(&self) -> u32 {
        self.name
    }

    /// Location of uniform `name`, if the program declares it.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.ctx
            .with_program(self.name, |p| p.uniforms.get(name).copied())
            .flatten()
    }

    /// Location of vertex attribute `name`, if the program declares it.
    pub fn attrib_location(&self, name: &str) -> Option<u32> {
        self.ctx
            .with_program(self.name, |p| {
                p.attribs.get(name).or_else(|| p.attribs.get("")).copied()
            })
            .flatten()
    }
}

fn compile(stage: ShaderStage, source: &str) -> naga::Module {
    parse(stage, source).unwrap_or_else(|diagnostics| {
        crate::fatal(
            "compile",
            &format!("could not compile {stage:?} shader:\n{diagnostics}\n{source}"),
        )
    })
}

impl Target for Program {
    fn bind(&self) {
        self.ctx.use_program(self.name);
    }

    fn unbind(&self) {
        self.ctx.use_program(0);
    }
}

impl Destroyable for Program {
    fn destroy(&mut self) {
        if self.name != 0 {
            self.ctx.delete_program(self.name);
            self.name = 0;
        }
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if self.name != 0 {
            warn!(name = self.name, "leaking program");
        }
    }
}
