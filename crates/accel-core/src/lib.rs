//! # accel-core
//!
//! Core types for the accel image engine.
//!
//! The same logical image can live in host memory or on the GPU. This crate
//! holds everything that does not need a graphics context:
//!
//! - [`ImageTypeSpec`] - channel count, element type and storage kind
//! - [`Image`] / [`Factory`] - the backend-independent image capability
//! - [`CpuImage`] - the host-memory reference backend
//! - [`Border`] - out-of-bounds sampling policy
//! - [`Future`] / [`Promise`] - eventual results of possibly-async work
//! - [`Processor`] - executes units of work and resolves their futures
//!
//! ## Crate Structure
//!
//! ```text
//! accel-core (this crate)
//!    ^
//!    |
//!    +-- accel-gpu (wgpu textures, shader pipelines, read-back adapters)
//! ```
//!
//! ## Error model
//!
//! Setup failures (size mismatches, thread pool creation) are reported as
//! [`Error`]. Contract violations such as an out-of-range channel index
//! panic: they are caller bugs, not runtime conditions.

#![warn(missing_docs)]

pub mod border;
pub mod cpu;
pub mod error;
pub mod future;
pub mod image;
pub mod processor;
pub mod spec;

pub use border::{Border, apply_border_1d};
pub use cpu::{CpuImage, CpuImageFactory};
pub use error::{Error, Result};
pub use future::{Future, Promise};
pub use image::{AsAny, Factory, Image};
pub use processor::{Job, Processor, ProcessorConfig, SyncProcessor, ThreadPoolProcessor};
pub use spec::{DataType, ImageTypeSpec, StorageType};
