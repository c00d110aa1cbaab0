//! Deferred operations.
//!
//! Declaring an operation needs no live GPU state: a [`PipelineDesc`] (or a
//! builder closure) is wrapped into a [`Function`], which compiles its
//! pipeline on first call and reuses it afterwards.

use std::rc::Rc;

use accel_core::ImageTypeSpec;
use tracing::debug;

use crate::binder::{Binder, Destroyable};
use crate::context::GpuContext;
use crate::image::GpuImage;
use crate::pipeline::Pipeline;

/// Pure description of an operation shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDesc {
    /// Fragment shader body, appended verbatim after the preamble.
    pub body: String,
    /// Input formats, in binding order.
    pub inputs: Vec<ImageTypeSpec>,
    /// Output format.
    pub output: ImageTypeSpec,
}

impl PipelineDesc {
    pub fn new(body: impl Into<String>, inputs: Vec<ImageTypeSpec>, output: ImageTypeSpec) -> Self {
        Self { body: body.into(), inputs, output }
    }

    /// Builds the live pipeline on `ctx`.
    pub fn realize(&self, ctx: &Rc<GpuContext>) -> Pipeline {
        Pipeline::new(ctx, &self.body, &self.inputs, self.output)
    }
}

type Builder = Box<dyn FnOnce(&Rc<GpuContext>) -> Pipeline>;

/// Turns operation descriptions into callable [`Function`]s.
#[derive(Debug, Clone)]
pub struct Factory {
    ctx: Rc<GpuContext>,
}

impl Factory {
    pub fn new(ctx: Rc<GpuContext>) -> Self {
        Self { ctx }
    }

    /// Wraps a description.
    pub fn wrap(&self, desc: PipelineDesc) -> Function {
        self.wrap_builder(move |ctx| desc.realize(ctx))
    }

    /// Wraps an arbitrary pipeline builder. It runs at most once, on the
    /// first call.
    pub fn wrap_builder<F>(&self, builder: F) -> Function
    where
        F: FnOnce(&Rc<GpuContext>) -> Pipeline + 'static,
    {
        Function {
            ctx: self.ctx.clone(),
            builder: Some(Box::new(builder)),
            pipeline: None,
        }
    }
}

/// A callable operation with a lazily built pipeline.
pub struct Function {
    ctx: Rc<GpuContext>,
    builder: Option<Builder>,
    pipeline: Option<Pipeline>,
}

impl Function {
    /// Whether the pipeline has been built.
    pub fn is_realized(&self) -> bool {
        self.pipeline.is_some()
    }

    fn pipeline(&mut self) -> &Pipeline {
        let ctx = &self.ctx;
        let builder = &mut self.builder;
        self.pipeline.get_or_insert_with(|| {
            let build = builder
                .take()
                .unwrap_or_else(|| panic!("operation called after destroy"));
            debug!("realize operation");
            build(ctx)
        })
    }

    /// Draws the operation reading `inputs` into `output`.
    ///
    /// # Panics
    ///
    /// If the number of inputs differs from the pipeline's, or the function
    /// was destroyed.
    pub fn call(&mut self, inputs: &[&GpuImage], output: &GpuImage) {
        let pipeline = self.pipeline();
        assert_eq!(
            inputs.len(),
            pipeline.input_count(),
            "operation expects {} inputs",
            pipeline.input_count()
        );
        let _pipeline = Binder::new(pipeline);
        let _inputs: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(i, image)| Binder::new(pipeline.bind_texture(i, image.texture().name())))
            .collect();
        pipeline.call(output.framebuffer());
    }
}

impl Destroyable for Function {
    fn destroy(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.destroy();
        }
        self.builder = None;
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("realized", &self.is_realized())
            .finish()
    }
}
