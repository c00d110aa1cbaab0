//! GPU backend tests.
//!
//! Every test needs an adapter and returns early when none is available.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use accel_core::{
    DataType, Factory as _, Image, ImageTypeSpec, Processor, ProcessorConfig, StorageType,
    SyncProcessor, ThreadPoolProcessor,
};
use accel_gpu::operations::Factory;
use accel_gpu::{
    BindType, Capability, Destroyable, FrameBuffer, GlError, GpuConfig, GpuContext, GpuImage,
    GpuImageFactory, PipelineDesc, Texture, TransferPolicy, UniformLocation,
};
use approx::assert_relative_eq;

fn context(transfer: TransferPolicy) -> Option<Rc<GpuContext>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    match GpuContext::new(GpuConfig::default().with_transfer(transfer)) {
        Ok(ctx) => Some(Rc::new(ctx)),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

fn factory(ctx: &Rc<GpuContext>) -> GpuImageFactory {
    GpuImageFactory::new(ctx.clone(), Arc::new(SyncProcessor))
}

fn gpu(channels: u32, data_type: DataType) -> ImageTypeSpec {
    ImageTypeSpec::new(channels, data_type, StorageType::GpuTexture)
}

#[test]
fn test_framebuffer_solid_color_roundtrip() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let mut fb = FrameBuffer::new(&ctx, 8, 8, gpu(4, DataType::Ufixed8));
    let solid: Vec<u8> = [12u8, 200, 77, 255].repeat(64);
    fb.write_pixels(&solid);

    let mut out = vec![0u8; solid.len()];
    fb.read_pixels(&mut out);
    for px in out.chunks_exact(4) {
        assert_eq!(px, [12, 200, 77, 255]);
    }

    fb.destroy();
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_native_raw_roundtrip_all_layouts() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let factory = factory(&ctx);
    for data_type in [DataType::Uint8, DataType::Sint16, DataType::Uint32, DataType::Float32] {
        for channels in [1, 2, 4] {
            if !ctx.supports_render_target(&gpu(channels, data_type)) {
                eprintln!("skipping {channels} x {}: not renderable", data_type.name());
                continue;
            }
            let mut img = factory.create_gpu(5, 3, channels, data_type);
            let data: Vec<u8> = (0..img.size()).map(|i| (i * 7 % 251) as u8).collect();
            img.write_raw(&data);
            let read = img.read_raw();
            assert!(read.is_resolved());
            assert_eq!(read.wait(), data, "{channels} x {}", data_type.name());
            assert!(!img.has_read_adapter());
            img.destroy();
        }
    }
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_rgba8_policy_repacks_two_channels() {
    let Some(ctx) = context(TransferPolicy::Rgba8) else { return };
    let factory = factory(&ctx);
    let mut img = factory.create_gpu(4, 4, 2, DataType::Uint8);
    let data: Vec<u8> = (0..32).collect();
    img.write_raw(&data);

    assert_eq!(img.read_raw().wait(), data);
    assert!(img.has_read_adapter());
    // The adapter is reused.
    assert_eq!(img.read_raw().wait(), data);

    img.destroy();
    img.destroy();
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_rgba8_policy_compacts_padded_rows() {
    let Some(ctx) = context(TransferPolicy::Rgba8) else { return };
    let pool = ThreadPoolProcessor::new(ProcessorConfig { threads: 2, ..Default::default() }).unwrap();
    let processor: Arc<dyn Processor> = Arc::new(pool);
    let factory = GpuImageFactory::new(ctx.clone(), processor);

    // 3 pixels of 2 channels pack into 2 pixels of 4: 6 logical bytes per
    // row against 8 in the buffer.
    let mut img = factory.create_gpu(3, 4, 2, DataType::Uint8);
    let data: Vec<u8> = (100..124).collect();
    img.write_raw(&data);
    assert_eq!(img.read_raw().wait(), data);

    img.destroy();
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_rgba8_policy_single_channel_fixed_point() {
    let Some(ctx) = context(TransferPolicy::Rgba8) else { return };
    let factory = factory(&ctx);
    let mut img = factory.create_gpu(7, 2, 1, DataType::Ufixed8);
    let data: Vec<u8> = (0..14).map(|i| i * 18).collect();
    img.write_raw(&data);
    assert_eq!(img.read_raw().wait(), data);
    img.destroy();
}

#[test]
fn test_constant_operation_without_inputs() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let images = factory(&ctx);
    let mut output = images.create_gpu(5, 3, 1, DataType::Uint8);

    let ops = Factory::new(ctx.clone());
    let mut function = ops.wrap(PipelineDesc::new(
        "void main() { outValue = 42u; }\n",
        vec![],
        output.spec(),
    ));
    assert!(!function.is_realized());
    function.call(&[], &output);
    assert!(function.is_realized());

    assert_eq!(output.read_raw().wait(), vec![42u8; 15]);

    function.destroy();
    function.destroy();
    output.destroy();
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_two_input_operation() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let spec = gpu(4, DataType::Float32);
    if !ctx.supports_render_target(&spec) {
        eprintln!("skipping two-input operation: {spec} is not renderable");
        return;
    }
    let images = factory(&ctx);

    let mut a = images.create_gpu(4, 2, 4, DataType::Float32);
    let mut b = images.create_gpu(4, 2, 4, DataType::Float32);
    let mut out = images.create_gpu(4, 2, 4, DataType::Float32);
    let va: Vec<f32> = (0..32).map(|i| i as f32 * 0.5).collect();
    let vb: Vec<f32> = (0..32).map(|i| 100.0 - i as f32).collect();
    a.write_raw(bytemuck::cast_slice(&va));
    b.write_raw(bytemuck::cast_slice(&vb));

    let body = "void main() {
    ivec2 c = ivec2(v_texCoord * u_outSize);
    outValue = texelFetch(u_texture1, c, 0) + 2.0 * texelFetch(u_texture2, c, 0);
}
";
    let mut function = Factory::new(ctx.clone()).wrap(PipelineDesc::new(body, vec![spec, spec], spec));
    ctx.set_capability(Capability::Blend, true);
    function.call(&[&a, &b], &out);

    let result: Vec<f32> = out
        .read_raw()
        .wait()
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    for i in 0..32 {
        assert_relative_eq!(result[i], va[i] + 2.0 * vb[i], epsilon = 1e-4);
    }

    // Bind state is back to defaults, and the foreign flag is restored.
    assert_eq!(ctx.active_texture_unit(), 0);
    assert_eq!(ctx.bound_texture(0, BindType::Texture2D), 0);
    assert_eq!(ctx.bound_texture(1, BindType::Texture2D), 0);
    assert_eq!(ctx.bound_framebuffer(), 0);
    assert_eq!(ctx.current_program(), 0);
    assert!(ctx.is_enabled(Capability::Blend));
    assert!(!ctx.is_enabled(Capability::DepthTest));

    for image in [&mut a, &mut b, &mut out] {
        image.destroy();
    }
    function.destroy();
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_function_reused_across_outputs() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let images = factory(&ctx);
    let body = "void main() { outValue = ivec2(v_texCoord * u_outSize); }\n";
    let mut function = Factory::new(ctx.clone()).wrap_builder(move |ctx| {
        PipelineDesc::new(body, vec![], ImageTypeSpec::new(2, DataType::Sint32, StorageType::GpuTexture))
            .realize(ctx)
    });

    for (w, h) in [(3, 2), (6, 5)] {
        let mut out = images.create_gpu(w, h, 2, DataType::Sint32);
        function.call(&[], &out);
        let coords: Vec<i32> = out
            .read_raw()
            .wait()
            .chunks_exact(4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let at = ((y * w as i32 + x) * 2) as usize;
                assert_eq!(&coords[at..at + 2], &[x, y], "pixel ({x}, {y}) of {w}x{h}");
            }
        }
        out.destroy();
    }
    assert_eq!(ctx.draw_count(), 2);
    function.destroy();
}

#[test]
fn test_imported_texture_as_input() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let images = factory(&ctx);
    let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("imported"),
        size: wgpu::Extent3d { width: 4, height: 4, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let mut external = images.import(texture, 4, DataType::Ufixed8);
    assert_eq!(external.spec().storage, StorageType::GpuExternal);
    let data: Vec<u8> = (0..64).map(|i| i * 3).collect();
    external.write_raw(&data);

    let mut copy = images.create_gpu(4, 4, 4, DataType::Ufixed8);
    let body = "void main() { outValue = texelFetch(u_texture, ivec2(v_texCoord * u_outSize), 0); }\n";
    let mut function =
        Factory::new(ctx.clone()).wrap(PipelineDesc::new(body, vec![external.spec()], copy.spec()));
    function.call(&[&external], &copy);
    assert_eq!(copy.read_raw().wait(), data);

    function.destroy();
    copy.destroy();
    external.destroy();
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_factory_trait_object() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let images = factory(&ctx);
    let mut img = images.create(2, 2, 4, DataType::Uint16);
    assert_eq!(img.size(), 32);
    img.write_raw(&[9; 32]);
    assert_eq!(img.read_raw().wait(), vec![9; 32]);
    assert!(img.as_any().downcast_ref::<GpuImage>().is_some());
    img.release();
    assert_eq!(ctx.live_objects(), 0);
    img.release();
}

#[test]
fn test_state_misuse_records_errors() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    ctx.use_program(9999);
    assert_eq!(ctx.get_error(), Some(GlError::InvalidValue));
    ctx.uniform_2f(UniformLocation::Block { binding: 0, offset: 0, size: 8 }, 1.0, 2.0);
    assert_eq!(ctx.get_error(), Some(GlError::InvalidOperation));
    ctx.active_texture(64);
    assert_eq!(ctx.get_error(), Some(GlError::InvalidValue));
    assert_eq!(ctx.get_error(), None);
    ctx.check_error("clean");
}

/// Log sink shared between a subscriber and the test reading it.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_dropped_texture_warns_and_leaks() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let texture = Texture::new(&ctx, 4, 4, gpu(4, DataType::Ufixed8));
        assert_ne!(texture.name(), 0);
        drop(texture);
    });

    assert!(captured.text().contains("leaking texture"), "log was: {}", captured.text());
    // The warning is advisory: the object stays allocated.
    assert_eq!(ctx.live_objects(), 1);
}

#[test]
fn test_destroyed_texture_drops_silently() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut texture = Texture::new(&ctx, 4, 4, gpu(1, DataType::Uint8));
        texture.destroy();
    });

    assert!(!captured.text().contains("leaking"));
    assert_eq!(ctx.live_objects(), 0);
}

#[test]
fn test_unrenderable_format_rejected_before_allocation() {
    let Some(ctx) = context(TransferPolicy::Native) else { return };
    let data_types = [
        DataType::Ufixed8,
        DataType::Uint8,
        DataType::Sint8,
        DataType::Uint16,
        DataType::Sint16,
        DataType::Uint32,
        DataType::Sint32,
        DataType::Float32,
    ];
    let unsupported = data_types
        .into_iter()
        .flat_map(|data_type| [1, 2, 4].map(|channels| gpu(channels, data_type)))
        .find(|spec| !ctx.supports_render_target(spec));
    let Some(spec) = unsupported else {
        eprintln!("every format is renderable on {}", ctx.adapter_info().name);
        return;
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| Texture::new(&ctx, 2, 2, spec)));
    let message = match result {
        Ok(_) => panic!("{spec} was allocated"),
        Err(payload) => payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default(),
    };
    assert!(message.contains("is not renderable"), "panic was: {message}");
    assert_eq!(ctx.live_objects(), 0);
    ctx.check_error("rejected format");
}
