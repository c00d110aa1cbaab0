//! GPU backend for the accel image engine.
//!
//! Images live in textures attached to framebuffers. Operations are fragment
//! shaders drawn over a full-screen quad, synthesized from a body plus the
//! input and output pixel formats. Reads whose layout the device cannot
//! transfer directly go through a repacking pass and an optional host-side
//! row compaction.
//!
//! # Architecture
//!
//! ```text
//! GpuImageFactory ──> GpuImage ──> FrameBuffer ──> Texture
//!                        │
//!                        └── ReadAdapter ──> Function ──> Pipeline
//!                                                           └── FragmentShaderRunner ──> Program
//!
//! all wrappers ──> GpuContext (object table + bind state + error flags)
//! ```
//!
//! # Resource discipline
//!
//! Every wrapper holds one hardware name issued by the [`GpuContext`].
//! [`Target`] objects are bound for a scope with a [`Binder`]; [`Destroyable`]
//! objects must be destroyed explicitly. Dropping a wrapper whose name is
//! still live logs a leak warning.
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use accel_core::{DataType, Image, SyncProcessor};
//! use accel_gpu::{Destroyable, GpuConfig, GpuContext, GpuImageFactory};
//!
//! let ctx = Rc::new(GpuContext::new(GpuConfig::from_env())?);
//! let factory = GpuImageFactory::new(ctx, Arc::new(SyncProcessor));
//! let mut img = factory.create_gpu(4, 4, 2, DataType::Uint8);
//! img.write_raw(&[7; 32]);
//! assert_eq!(img.read_raw().wait(), vec![7; 32]);
//! img.destroy();
//! # Ok::<(), accel_gpu::GpuError>(())
//! ```

pub mod binder;
pub mod config;
pub mod context;
pub mod format;
pub mod framebuffer;
pub mod glsl;
pub mod image;
pub mod operations;
pub mod pipeline;
pub mod program;
pub mod read_adapter;
pub mod runner;
pub mod texture;

pub use binder::{Binder, Capability, Destroyable, FlagGuard, Target};
pub use config::{GpuConfig, TransferPolicy};
pub use context::{BindType, GlError, GpuContext, UniformLocation};
pub use framebuffer::FrameBuffer;
pub use image::{GpuImage, GpuImageFactory};
pub use operations::{Function, PipelineDesc};
pub use pipeline::{Pipeline, TextureUniformBinder};
pub use program::Program;
pub use read_adapter::{ReadAdapter, RowCompaction};
pub use runner::FragmentShaderRunner;
pub use texture::Texture;

use thiserror::Error;

/// GPU setup errors.
///
/// Only acquisition of the device can fail recoverably. Driver failures
/// after that point are logged and abort the process.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error(transparent)]
    Core(#[from] accel_core::Error),
}

pub type GpuResult<T> = Result<T, GpuError>;

/// Logs and terminates. Used for driver and compiler failures, where the
/// context state can no longer be trusted.
#[cold]
pub(crate) fn fatal(tag: &str, detail: &str) -> ! {
    tracing::error!(tag, "{detail}");
    std::process::abort()
}
