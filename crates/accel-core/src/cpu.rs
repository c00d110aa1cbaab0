//! Host-memory reference backend.
//!
//! Pixel `(x, y)` channel `c` lives at byte offset
//! `(y * width + x) * channels * bpc + c * bpc`: row-major,
//! channel-interleaved, no row padding. Raw reads and writes are plain
//! memory copies and resolve instantly.

use tracing::trace;

use crate::future::Future;
use crate::image::{AsAny, Factory, Image};
use crate::spec::{DataType, ImageTypeSpec, StorageType};
use crate::{Error, Result};

/// Image stored in host memory.
#[derive(Clone)]
pub struct CpuImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    spec: ImageTypeSpec,
}

impl CpuImage {
    /// Creates a zero-filled image.
    pub fn new(width: u32, height: u32, channels: u32, data_type: DataType) -> Self {
        let spec = ImageTypeSpec::new(channels, data_type, StorageType::Cpu);
        let size = width as usize * height as usize * spec.bytes_per_pixel();
        Self { data: vec![0; size], width, height, spec }
    }

    /// Wraps existing bytes.
    pub fn from_bytes(
        width: u32,
        height: u32,
        channels: u32,
        data_type: DataType,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions(width, height));
        }
        let spec = ImageTypeSpec::new(channels, data_type, StorageType::Cpu);
        let expected = width as usize * height as usize * spec.bytes_per_pixel();
        if data.len() != expected {
            return Err(Error::BufferSizeMismatch { expected, actual: data.len() });
        }
        Ok(Self { data, width, height, spec })
    }

    /// Backing bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable backing bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for image {}x{}",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * self.spec.bytes_per_pixel()
    }

    #[inline]
    fn channel_offset(&self, x: u32, y: u32, channel: u32) -> usize {
        assert!(
            channel < self.spec.channels,
            "channel {channel} out of range for {} channels",
            self.spec.channels
        );
        self.index(x, y) + channel as usize * self.spec.bytes_per_channel()
    }

    /// Reads all channels of one pixel into `out`.
    pub fn get(&self, x: u32, y: u32, out: &mut [u8]) {
        let bpc = self.spec.bytes_per_channel();
        for c in 0..self.spec.channels {
            let at = c as usize * bpc;
            self.get_channel(x, y, c, &mut out[at..at + bpc]);
        }
    }

    /// Writes all channels of one pixel from `src`.
    pub fn set(&mut self, x: u32, y: u32, src: &[u8]) {
        let bpc = self.spec.bytes_per_channel();
        for c in 0..self.spec.channels {
            let at = c as usize * bpc;
            self.set_channel(x, y, c, &src[at..at + bpc]);
        }
    }

    /// Reads one channel of one pixel into `out`.
    ///
    /// # Panics
    ///
    /// If `channel` is out of range.
    pub fn get_channel(&self, x: u32, y: u32, channel: u32, out: &mut [u8]) {
        let bpc = self.spec.bytes_per_channel();
        let offset = self.channel_offset(x, y, channel);
        out[..bpc].copy_from_slice(&self.data[offset..offset + bpc]);
    }

    /// Writes one channel of one pixel from `src`.
    ///
    /// # Panics
    ///
    /// If `channel` is out of range.
    pub fn set_channel(&mut self, x: u32, y: u32, channel: u32, src: &[u8]) {
        let bpc = self.spec.bytes_per_channel();
        let offset = self.channel_offset(x, y, channel);
        self.data[offset..offset + bpc].copy_from_slice(&src[..bpc]);
    }
}

impl AsAny for CpuImage {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl Image for CpuImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn spec(&self) -> ImageTypeSpec {
        self.spec
    }

    fn read_raw(&mut self) -> Future<Vec<u8>> {
        Future::instantly_resolved(self.data.clone())
    }

    fn write_raw(&mut self, data: &[u8]) -> Future<()> {
        assert_eq!(data.len(), self.data.len(), "raw write size mismatch");
        self.data.copy_from_slice(data);
        Future::instantly_resolved(())
    }
}

impl std::fmt::Debug for CpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("spec", &self.spec)
            .finish()
    }
}

/// Factory for [`CpuImage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuImageFactory;

impl Factory for CpuImageFactory {
    fn create(&self, width: u32, height: u32, channels: u32, data_type: DataType) -> Box<dyn Image> {
        trace!(width, height, channels, data_type = data_type.name(), "cpu image");
        Box::new(CpuImage::new(width, height, channels, data_type))
    }
}
