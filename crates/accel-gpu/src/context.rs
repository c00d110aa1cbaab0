//! GPU context: device, object table and bind state.
//!
//! wgpu has no notion of "currently bound" objects, so the context keeps one.
//! Wrappers mutate the bind state through `bind`/`unbind`; draws and pixel
//! transfers read it. Every hardware object is owned by the context's object
//! table and addressed by a non-zero `u32` name. Misuse of the state machine
//! records an error flag instead of failing on the spot; [`GpuContext::check_error`]
//! turns any recorded flag, or any device error, into a fatal abort.
//!
//! The context is single-threaded (`!Sync`) and shared through `Rc`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use accel_core::ImageTypeSpec;
use thiserror::Error;
use tracing::{debug, error, trace};
use wgpu::util::DeviceExt;
use wgpu::{DeviceDescriptor, Features, Instance};

use crate::binder::Capability;
use crate::config::GpuConfig;
use crate::format::{TARGET_USAGES, is_blendable, texel_size, texture_format, try_texture_format};
use crate::program::{PipelineKey, ProgramObject};
use crate::{GpuError, GpuResult};

/// Texture units available to pipelines.
pub const MAX_TEXTURE_UNITS: u32 = 16;

/// Bind point of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    /// Texture allocated by the engine.
    Texture2D,
    /// Texture imported from outside the engine.
    External,
}

/// Recorded state-machine error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlError {
    #[error("invalid value")]
    InvalidValue,
    #[error("invalid operation")]
    InvalidOperation,
}

impl GlError {
    /// Numeric code, as graphics drivers report it.
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidValue => 0x0501,
            Self::InvalidOperation => 0x0502,
        }
    }
}

/// Where a named uniform lives in a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformLocation {
    /// Member of a uniform block.
    Block { binding: u32, offset: u32, size: u32 },
    /// Sampled texture. Its value is the texture unit it reads from.
    Texture { binding: u32 },
}

pub(crate) struct TextureObject {
    texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    bind_type: BindType,
}

impl TextureObject {
    fn row_bytes(&self) -> u32 {
        self.width * texel_size(self.format)
    }

    fn byte_size(&self) -> usize {
        self.row_bytes() as usize * self.height as usize
    }

    fn copy_info(&self) -> wgpu::TexelCopyTextureInfo<'_> {
        wgpu::TexelCopyTextureInfo {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        }
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 }
    }
}

#[derive(Default)]
struct Objects {
    next_name: u32,
    textures: HashMap<u32, TextureObject>,
    framebuffers: HashMap<u32, u32>,
    programs: HashMap<u32, ProgramObject>,
    buffers: HashMap<u32, wgpu::Buffer>,
}

impl Objects {
    fn allocate_name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Unit {
    texture_2d: u32,
    external: u32,
}

impl Unit {
    fn slot(&mut self, bind_type: BindType) -> &mut u32 {
        match bind_type {
            BindType::Texture2D => &mut self.texture_2d,
            BindType::External => &mut self.external,
        }
    }

    fn get(&self, bind_type: BindType) -> u32 {
        match bind_type {
            BindType::Texture2D => self.texture_2d,
            BindType::External => self.external,
        }
    }
}

#[derive(Debug)]
struct BindState {
    active_unit: u32,
    units: [Unit; MAX_TEXTURE_UNITS as usize],
    framebuffer: u32,
    program: u32,
    array_buffer: u32,
    element_buffer: u32,
    vertex_attrib: Option<u32>,
    viewport: [u32; 4],
    depth_test: bool,
    blend: bool,
}

impl Default for BindState {
    fn default() -> Self {
        Self {
            active_unit: 0,
            units: [Unit::default(); MAX_TEXTURE_UNITS as usize],
            framebuffer: 0,
            program: 0,
            array_buffer: 0,
            element_buffer: 0,
            vertex_attrib: None,
            viewport: [0; 4],
            depth_test: false,
            blend: false,
        }
    }
}

/// GPU context holding device, queue and the emulated bind state.
pub struct GpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    config: GpuConfig,
    sampler: wgpu::Sampler,
    objects: RefCell<Objects>,
    state: RefCell<BindState>,
    errors: RefCell<Vec<GlError>>,
    device_errors: Arc<Mutex<Vec<String>>>,
    draws: Cell<u64>,
}

impl GpuContext {
    /// Acquires an adapter and device as `config` asks.
    pub fn new(config: GpuConfig) -> GpuResult<Self> {
        pollster::block_on(Self::new_async(config))
    }

    async fn new_async(config: GpuConfig) -> GpuResult<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some(&config.label),
                    required_features: Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        let device_errors = Arc::new(Mutex::new(Vec::new()));
        let sink = device_errors.clone();
        device.on_uncaptured_error(Box::new(move |e: wgpu::Error| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(e.to_string());
        }));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nearest"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        debug!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            transfer = ?config.transfer,
            "gpu context ready"
        );

        Ok(Self {
            adapter,
            device,
            queue,
            adapter_info,
            config,
            sampler,
            objects: RefCell::new(Objects::default()),
            state: RefCell::new(BindState::default()),
            errors: RefCell::new(Vec::new()),
            device_errors,
            draws: Cell::new(0),
        })
    }

    /// Get adapter info (GPU name, vendor, etc.)
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Configuration the context was created with.
    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    /// Device the context draws with. Textures passed to
    /// [`crate::GpuImageFactory::import`] must come from it.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Usages the device accepts on textures of `format`.
    ///
    /// Downlevel devices and devices with adapter-specific format features
    /// validate against the adapter's table, the rest against the formats'
    /// guaranteed features.
    pub fn allowed_usages(&self, format: wgpu::TextureFormat) -> wgpu::TextureUsages {
        let features = self.device.features();
        let adapter_specific = features.contains(Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
            || !self.adapter.get_downlevel_capabilities().is_webgpu_compliant();
        if adapter_specific {
            self.adapter.get_texture_format_features(format).allowed_usages
        } else {
            format.guaranteed_format_features(features).allowed_usages
        }
    }

    /// Whether images of `spec` can be allocated as render targets.
    pub fn supports_render_target(&self, spec: &ImageTypeSpec) -> bool {
        try_texture_format(spec).is_some_and(|format| self.allowed_usages(format).contains(TARGET_USAGES))
    }

    /// Draw calls issued so far.
    pub fn draw_count(&self) -> u64 {
        self.draws.get()
    }

    fn record(&self, err: GlError) {
        trace!(code = err.code(), "{err}");
        self.errors.borrow_mut().push(err);
    }

    /// Pops the oldest recorded error flag.
    pub fn get_error(&self) -> Option<GlError> {
        let mut errors = self.errors.borrow_mut();
        (!errors.is_empty()).then(|| errors.remove(0))
    }

    /// Aborts if any error was recorded or reported by the device since the
    /// last check. Every error is logged with `tag` first.
    pub fn check_error(&self, tag: &str) {
        let recorded: Vec<GlError> = self.errors.borrow_mut().drain(..).collect();
        let reported = std::mem::take(
            &mut *self.device_errors.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if recorded.is_empty() && reported.is_empty() {
            return;
        }
        for err in &recorded {
            error!(tag, code = format_args!("{:#06x}", err.code()), "gl error: {err}");
        }
        for err in &reported {
            error!(tag, "device error: {err}");
        }
        std::process::abort();
    }

    // ---------------------------------------------------------------------
    // Object table
    // ---------------------------------------------------------------------

    /// Allocates a zero-filled texture for `spec`.
    pub(crate) fn create_texture(&self, width: u32, height: u32, spec: &ImageTypeSpec) -> u32 {
        let format = texture_format(spec);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("accel_texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: TARGET_USAGES,
            view_formats: &[],
        });
        self.insert_texture(texture, BindType::Texture2D)
    }

    /// Registers a texture created outside the engine.
    pub(crate) fn import_texture(&self, texture: wgpu::Texture) -> u32 {
        self.insert_texture(texture, BindType::External)
    }

    fn insert_texture(&self, texture: wgpu::Texture, bind_type: BindType) -> u32 {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let object = TextureObject {
            format: texture.format(),
            width: texture.width(),
            height: texture.height(),
            texture,
            view,
            bind_type,
        };
        let mut objects = self.objects.borrow_mut();
        let name = objects.allocate_name();
        trace!(name, width = object.width, height = object.height, format = ?object.format, ?bind_type, "create texture");
        objects.textures.insert(name, object);
        name
    }

    pub(crate) fn delete_texture(&self, name: u32) {
        let Some(object) = self.objects.borrow_mut().textures.remove(&name) else {
            return;
        };
        trace!(name, "delete texture");
        for unit in self.state.borrow_mut().units.iter_mut() {
            let slot = unit.slot(object.bind_type);
            if *slot == name {
                *slot = 0;
            }
        }
        if object.bind_type == BindType::Texture2D {
            object.texture.destroy();
        }
    }

    /// Creates a framebuffer rendering into texture `color`.
    pub(crate) fn create_framebuffer(&self, color: u32) -> u32 {
        if !self.objects.borrow().textures.contains_key(&color) {
            self.record(GlError::InvalidValue);
            return 0;
        }
        let mut objects = self.objects.borrow_mut();
        let name = objects.allocate_name();
        trace!(name, color, "create framebuffer");
        objects.framebuffers.insert(name, color);
        name
    }

    pub(crate) fn delete_framebuffer(&self, name: u32) {
        if self.objects.borrow_mut().framebuffers.remove(&name).is_some() {
            trace!(name, "delete framebuffer");
            let mut state = self.state.borrow_mut();
            if state.framebuffer == name {
                state.framebuffer = 0;
            }
        }
    }

    pub(crate) fn create_program(&self, program: ProgramObject) -> u32 {
        let mut objects = self.objects.borrow_mut();
        let name = objects.allocate_name();
        trace!(name, "create program");
        objects.programs.insert(name, program);
        name
    }

    pub(crate) fn delete_program(&self, name: u32) {
        if self.objects.borrow_mut().programs.remove(&name).is_some() {
            trace!(name, "delete program");
            let mut state = self.state.borrow_mut();
            if state.program == name {
                state.program = 0;
            }
        }
    }

    pub(crate) fn with_program<R>(&self, name: u32, f: impl FnOnce(&ProgramObject) -> R) -> Option<R> {
        self.objects.borrow().programs.get(&name).map(f)
    }

    /// Creates a buffer initialized with `contents`.
    pub(crate) fn create_buffer(&self, contents: &[u8], usage: wgpu::BufferUsages) -> u32 {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("accel_buffer"),
            contents,
            usage,
        });
        let mut objects = self.objects.borrow_mut();
        let name = objects.allocate_name();
        trace!(name, size = contents.len(), "create buffer");
        objects.buffers.insert(name, buffer);
        name
    }

    pub(crate) fn delete_buffer(&self, name: u32) {
        if let Some(buffer) = self.objects.borrow_mut().buffers.remove(&name) {
            trace!(name, "delete buffer");
            buffer.destroy();
            let mut state = self.state.borrow_mut();
            if state.array_buffer == name {
                state.array_buffer = 0;
            }
            if state.element_buffer == name {
                state.element_buffer = 0;
            }
        }
    }

    /// Number of live hardware objects.
    pub fn live_objects(&self) -> usize {
        let objects = self.objects.borrow();
        objects.textures.len() + objects.framebuffers.len() + objects.programs.len() + objects.buffers.len()
    }

    // ---------------------------------------------------------------------
    // Bind state
    // ---------------------------------------------------------------------

    /// Selects the texture unit later texture binds apply to.
    pub fn active_texture(&self, unit: u32) {
        if unit >= MAX_TEXTURE_UNITS {
            self.record(GlError::InvalidValue);
            return;
        }
        self.state.borrow_mut().active_unit = unit;
    }

    /// Currently selected texture unit.
    pub fn active_texture_unit(&self) -> u32 {
        self.state.borrow().active_unit
    }

    /// Binds texture `name` (0 to clear) at the active unit.
    pub fn bind_texture(&self, bind_type: BindType, name: u32) {
        if name != 0 {
            let found = self.objects.borrow().textures.get(&name).map(|o| o.bind_type);
            match found {
                None => {
                    self.record(GlError::InvalidValue);
                    return;
                }
                Some(kind) if kind != bind_type => {
                    self.record(GlError::InvalidOperation);
                    return;
                }
                Some(_) => {}
            }
        }
        let mut state = self.state.borrow_mut();
        let unit = state.active_unit as usize;
        *state.units[unit].slot(bind_type) = name;
    }

    /// Texture bound at `unit` for `bind_type`, 0 if none.
    pub fn bound_texture(&self, unit: u32, bind_type: BindType) -> u32 {
        self.state
            .borrow()
            .units
            .get(unit as usize)
            .map_or(0, |u| u.get(bind_type))
    }

    /// Makes framebuffer `name` (0 to clear) the render target.
    pub fn bind_framebuffer(&self, name: u32) {
        if name != 0 && !self.objects.borrow().framebuffers.contains_key(&name) {
            self.record(GlError::InvalidValue);
            return;
        }
        self.state.borrow_mut().framebuffer = name;
    }

    /// Current render target, 0 if none.
    pub fn bound_framebuffer(&self) -> u32 {
        self.state.borrow().framebuffer
    }

    /// Makes program `name` (0 to clear) current.
    pub fn use_program(&self, name: u32) {
        if name != 0 && !self.objects.borrow().programs.contains_key(&name) {
            self.record(GlError::InvalidValue);
            return;
        }
        self.state.borrow_mut().program = name;
    }

    /// Current program, 0 if none.
    pub fn current_program(&self) -> u32 {
        self.state.borrow().program
    }

    pub(crate) fn bind_array_buffer(&self, name: u32) {
        if self.buffer_known(name) {
            self.state.borrow_mut().array_buffer = name;
        }
    }

    pub(crate) fn bind_element_buffer(&self, name: u32) {
        if self.buffer_known(name) {
            self.state.borrow_mut().element_buffer = name;
        }
    }

    fn buffer_known(&self, name: u32) -> bool {
        if name != 0 && !self.objects.borrow().buffers.contains_key(&name) {
            self.record(GlError::InvalidValue);
            return false;
        }
        true
    }

    pub(crate) fn enable_vertex_attrib(&self, location: u32) {
        self.state.borrow_mut().vertex_attrib = Some(location);
    }

    pub(crate) fn disable_vertex_attrib(&self, location: u32) {
        let mut state = self.state.borrow_mut();
        if state.vertex_attrib == Some(location) {
            state.vertex_attrib = None;
        }
    }

    /// Sets the raster viewport.
    pub fn viewport(&self, x: u32, y: u32, width: u32, height: u32) {
        self.state.borrow_mut().viewport = [x, y, width, height];
    }

    /// Current raster viewport as `[x, y, width, height]`.
    pub fn current_viewport(&self) -> [u32; 4] {
        self.state.borrow().viewport
    }

    /// Sets a capability flag.
    pub fn set_capability(&self, capability: Capability, enabled: bool) {
        let mut state = self.state.borrow_mut();
        match capability {
            Capability::DepthTest => state.depth_test = enabled,
            Capability::Blend => state.blend = enabled,
        }
    }

    /// Reads a capability flag.
    pub fn is_enabled(&self, capability: Capability) -> bool {
        let state = self.state.borrow();
        match capability {
            Capability::DepthTest => state.depth_test,
            Capability::Blend => state.blend,
        }
    }

    // ---------------------------------------------------------------------
    // Uniforms
    // ---------------------------------------------------------------------

    /// Sets an integer uniform of the current program. For texture
    /// locations the value is the unit the texture is read from.
    pub fn uniform_1i(&self, location: UniformLocation, value: i32) {
        match location {
            UniformLocation::Texture { binding } => {
                let Ok(unit) = u32::try_from(value) else {
                    self.record(GlError::InvalidValue);
                    return;
                };
                if unit >= MAX_TEXTURE_UNITS {
                    self.record(GlError::InvalidValue);
                    return;
                }
                self.with_current_program(|program| {
                    program.texture_units.insert(binding, unit);
                    Ok(())
                });
            }
            UniformLocation::Block { .. } => {
                self.write_uniform(location, bytemuck::bytes_of(&value));
            }
        }
    }

    /// Sets a `vec2` uniform of the current program.
    pub fn uniform_2f(&self, location: UniformLocation, x: f32, y: f32) {
        match location {
            UniformLocation::Texture { .. } => self.record(GlError::InvalidOperation),
            UniformLocation::Block { .. } => {
                self.write_uniform(location, bytemuck::cast_slice(&[x, y]));
            }
        }
    }

    fn write_uniform(&self, location: UniformLocation, bytes: &[u8]) {
        let UniformLocation::Block { binding, offset, size } = location else {
            return;
        };
        self.with_current_program(|program| {
            if size as usize != bytes.len() {
                return Err(GlError::InvalidOperation);
            }
            let storage = program.blocks.get_mut(&binding).ok_or(GlError::InvalidOperation)?;
            let start = offset as usize;
            storage[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        });
    }

    fn with_current_program(&self, f: impl FnOnce(&mut ProgramObject) -> Result<(), GlError>) {
        let program = self.state.borrow().program;
        let result = match self.objects.borrow_mut().programs.get_mut(&program) {
            Some(object) => f(object),
            None => Err(GlError::InvalidOperation),
        };
        if let Err(err) = result {
            self.record(err);
        }
    }

    // ---------------------------------------------------------------------
    // Draws and pixel transfers
    // ---------------------------------------------------------------------

    /// Draws `count` indices of the bound element buffer into the bound
    /// framebuffer with the current program.
    pub(crate) fn draw_elements(&self, count: u32) {
        if let Err(err) = self.try_draw(count) {
            self.record(err);
        }
    }

    fn try_draw(&self, count: u32) -> Result<(), GlError> {
        use GlError::InvalidOperation;

        let state = self.state.borrow();
        let attrib = state.vertex_attrib.ok_or(InvalidOperation)?;
        let mut objects = self.objects.borrow_mut();
        let color = *objects.framebuffers.get(&state.framebuffer).ok_or(InvalidOperation)?;
        let format = objects.textures.get(&color).ok_or(InvalidOperation)?.format;
        let key = PipelineKey {
            format,
            blend: state.blend && is_blendable(format),
            attrib,
        };
        objects
            .programs
            .get_mut(&state.program)
            .ok_or(InvalidOperation)?
            .prepare_pipeline(&self.device, key);

        let objects = &*objects;
        let program = &objects.programs[&state.program];
        let vertices = objects.buffers.get(&state.array_buffer).ok_or(InvalidOperation)?;
        let indices = objects.buffers.get(&state.element_buffer).ok_or(InvalidOperation)?;
        let target = &objects.textures[&color];

        let uniform_buffers: HashMap<u32, wgpu::Buffer> = program
            .blocks
            .iter()
            .map(|(&binding, storage)| {
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("accel_uniforms"),
                    contents: storage,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                (binding, buffer)
            })
            .collect();

        let mut entries = Vec::with_capacity(program.layout_entries.len());
        for layout in &program.layout_entries {
            let resource = match layout.ty {
                wgpu::BindingType::Texture { .. } => {
                    let unit = program.texture_units.get(&layout.binding).copied().unwrap_or(0);
                    let unit = state.units[unit as usize];
                    let name = [unit.texture_2d, unit.external]
                        .into_iter()
                        .find(|&n| n != 0)
                        .ok_or(InvalidOperation)?;
                    // Sampling the render target is a feedback loop.
                    if name == color {
                        return Err(InvalidOperation);
                    }
                    let view = &objects.textures.get(&name).ok_or(InvalidOperation)?.view;
                    wgpu::BindingResource::TextureView(view)
                }
                wgpu::BindingType::Sampler(_) => wgpu::BindingResource::Sampler(&self.sampler),
                _ => uniform_buffers
                    .get(&layout.binding)
                    .ok_or(InvalidOperation)?
                    .as_entire_binding(),
            };
            entries.push(wgpu::BindGroupEntry { binding: layout.binding, resource });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("accel_bind_group"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let [x, y, w, h] = state.viewport;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("draw_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("draw_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipelines[&key]);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
            pass.draw_indexed(0..count, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.draws.set(self.draws.get() + 1);
        trace!(program = state.program, framebuffer = state.framebuffer, count, "draw");
        Ok(())
    }

    /// Copies the whole color attachment of the bound framebuffer into
    /// `out`, tightly packed. Blocks until the copy lands.
    pub(crate) fn read_pixels(&self, out: &mut [u8]) {
        if let Err(err) = self.try_read_pixels(out) {
            self.record(err);
        }
    }

    fn try_read_pixels(&self, out: &mut [u8]) -> Result<(), GlError> {
        let framebuffer = self.state.borrow().framebuffer;
        let objects = self.objects.borrow();
        let color = objects.framebuffers.get(&framebuffer).ok_or(GlError::InvalidOperation)?;
        let source = &objects.textures[color];
        if out.len() != source.byte_size() {
            return Err(GlError::InvalidValue);
        }

        let row_bytes = source.row_bytes();
        let padded_row = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size: padded_row as u64 * source.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_texture_to_buffer(
            source.copy_info(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(source.height),
                },
            },
            source.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => crate::fatal("read_pixels", &format!("map failed: {e}")),
            Err(_) => crate::fatal("read_pixels", "map channel closed"),
        }

        {
            let mapped = slice.get_mapped_range();
            let row_bytes = row_bytes as usize;
            for (dst, src) in out
                .chunks_exact_mut(row_bytes)
                .zip(mapped.chunks(padded_row as usize))
            {
                dst.copy_from_slice(&src[..row_bytes]);
            }
        }
        staging.unmap();
        trace!(framebuffer, size = out.len(), "read pixels");
        Ok(())
    }

    /// Replaces the contents of the texture bound at the active unit.
    pub(crate) fn tex_image(&self, data: &[u8]) {
        if let Err(err) = self.try_tex_image(data) {
            self.record(err);
        }
    }

    fn try_tex_image(&self, data: &[u8]) -> Result<(), GlError> {
        let name = {
            let state = self.state.borrow();
            let unit = state.units[state.active_unit as usize];
            [unit.texture_2d, unit.external]
                .into_iter()
                .find(|&n| n != 0)
                .ok_or(GlError::InvalidOperation)?
        };
        let objects = self.objects.borrow();
        let target = objects.textures.get(&name).ok_or(GlError::InvalidOperation)?;
        if data.len() != target.byte_size() {
            return Err(GlError::InvalidValue);
        }
        self.queue.write_texture(
            target.copy_info(),
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(target.row_bytes()),
                rows_per_image: Some(target.height),
            },
            target.extent(),
        );
        trace!(name, size = data.len(), "upload texture");
        Ok(())
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("device", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("live_objects", &self.live_objects())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GlError::InvalidValue.code(), 0x0501);
        assert_eq!(GlError::InvalidOperation.code(), 0x0502);
        assert_eq!(GlError::InvalidOperation.to_string(), "invalid operation");
    }

    #[test]
    fn test_unit_slots() {
        let mut unit = Unit::default();
        *unit.slot(BindType::External) = 7;
        assert_eq!(unit.get(BindType::External), 7);
        assert_eq!(unit.get(BindType::Texture2D), 0);
    }
}
