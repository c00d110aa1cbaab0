//! Backend-independent image capability.
//!
//! Every backend implements [`Image`] and provides a [`Factory`]. Callers
//! depend only on these traits; backend-specific access goes through
//! [`AsAny`] downcasts.
//!
//! Byte size is `width * height * channels * bytes_per_channel` and never
//! changes after construction.

use crate::border::{Border, apply_border_1d};
use crate::future::Future;
use crate::spec::{DataType, ImageTypeSpec};

/// Helper trait for downcasting.
pub trait AsAny: 'static {
    /// Upcast to `&dyn Any`.
    fn as_any(&self) -> &dyn std::any::Any;
    /// Upcast to `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// A 2-D array of pixels in some storage.
pub trait Image: AsAny {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Pixel format.
    fn spec(&self) -> ImageTypeSpec;

    /// Copies the whole backing store, row-major and channel-interleaved
    /// without row padding.
    fn read_raw(&mut self) -> Future<Vec<u8>>;

    /// Replaces the whole backing store.
    ///
    /// # Panics
    ///
    /// If `data.len() != self.size()`.
    fn write_raw(&mut self, data: &[u8]) -> Future<()>;

    /// Frees storage that is not released on drop. Call before giving up
    /// ownership; idempotent. Host images need nothing.
    fn release(&mut self) {}

    /// Channel count.
    fn channels(&self) -> u32 {
        self.spec().channels
    }

    /// Element type.
    fn data_type(&self) -> DataType {
        self.spec().data_type
    }

    /// Bytes per pixel.
    fn bytes_per_pixel(&self) -> usize {
        self.spec().bytes_per_pixel()
    }

    /// Total size in bytes.
    fn size(&self) -> usize {
        self.width() as usize * self.height() as usize * self.bytes_per_pixel()
    }

    /// Rewrites `(x, y)` according to `border` and reports whether a valid
    /// sample exists. Both axes must resolve; x is resolved first and y is
    /// left untouched when x has no sample.
    fn apply_border(&self, x: &mut i32, y: &mut i32, border: Border) -> bool {
        apply_border_1d(x, self.width() as i32, border)
            && apply_border_1d(y, self.height() as i32, border)
    }
}

/// Creates images of one backend. Ownership passes to the caller.
pub trait Factory {
    /// Allocates a zero-initialized image.
    fn create(&self, width: u32, height: u32, channels: u32, data_type: DataType) -> Box<dyn Image>;
}

impl std::fmt::Debug for dyn Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("spec", &self.spec())
            .finish()
    }
}
