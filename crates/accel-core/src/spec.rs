//! Pixel format descriptors.
//!
//! An [`ImageTypeSpec`] is the (channels, element type, storage) triple that
//! fixes how an image's bytes are laid out. It is immutable once an image is
//! built and determines element size, per-pixel stride and which GPU formats
//! apply.
//!
//! # Usage
//!
//! ```rust
//! use accel_core::{DataType, ImageTypeSpec, StorageType};
//!
//! let spec = ImageTypeSpec::new(2, DataType::Uint8, StorageType::Cpu);
//! assert_eq!(spec.bytes_per_pixel(), 2);
//!
//! let gpu = spec.with_storage(StorageType::GpuTexture);
//! assert!(gpu.storage.is_gpu());
//! ```

/// Element data type of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 8-bit unsigned integer, read as an integer in shaders.
    Uint8,
    /// 8-bit signed integer.
    Sint8,
    /// 8-bit unsigned fixed point, read as a normalized float in shaders.
    Ufixed8,
    /// 16-bit unsigned integer.
    Uint16,
    /// 16-bit signed integer.
    Sint16,
    /// 32-bit unsigned integer.
    Uint32,
    /// 32-bit signed integer.
    Sint32,
    /// 32-bit IEEE 754 float.
    Float32,
}

impl DataType {
    /// Bytes occupied by one channel.
    #[inline]
    pub const fn bytes_per_channel(&self) -> usize {
        match self {
            Self::Uint8 | Self::Sint8 | Self::Ufixed8 => 1,
            Self::Uint16 | Self::Sint16 => 2,
            Self::Uint32 | Self::Sint32 | Self::Float32 => 4,
        }
    }

    /// Whether shaders see this type as floating point
    /// (normalized fixed point included).
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Ufixed8 | Self::Float32)
    }

    /// Whether shaders see this type as a signed integer.
    #[inline]
    pub const fn is_signed_integer(&self) -> bool {
        matches!(self, Self::Sint8 | Self::Sint16 | Self::Sint32)
    }

    /// Whether shaders see this type as an unsigned integer.
    #[inline]
    pub const fn is_unsigned_integer(&self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint16 | Self::Uint32)
    }

    /// Short lowercase name, used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Sint8 => "sint8",
            Self::Ufixed8 => "ufixed8",
            Self::Uint16 => "uint16",
            Self::Sint16 => "sint16",
            Self::Uint32 => "uint32",
            Self::Sint32 => "sint32",
            Self::Float32 => "float32",
        }
    }
}

/// Where an image's pixels live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageType {
    /// Host memory.
    #[default]
    Cpu,
    /// A texture owned by the engine.
    GpuTexture,
    /// A texture imported from outside the engine. Shaders reading it need
    /// the external-image capability declaration.
    GpuExternal,
}

impl StorageType {
    /// Whether the pixels are GPU-resident.
    #[inline]
    pub const fn is_gpu(&self) -> bool {
        matches!(self, Self::GpuTexture | Self::GpuExternal)
    }
}

/// Pixel format descriptor: channel count, element type and storage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageTypeSpec {
    /// Channels per pixel, 1 to 4.
    pub channels: u32,
    /// Element type of each channel.
    pub data_type: DataType,
    /// Storage kind.
    pub storage: StorageType,
}

impl ImageTypeSpec {
    /// Creates a spec.
    ///
    /// # Panics
    ///
    /// If `channels` is not in `1..=4`.
    pub fn new(channels: u32, data_type: DataType, storage: StorageType) -> Self {
        assert!(
            (1..=4).contains(&channels),
            "channel count must be 1..=4, got {channels}"
        );
        Self { channels, data_type, storage }
    }

    /// Bytes per channel.
    #[inline]
    pub const fn bytes_per_channel(&self) -> usize {
        self.data_type.bytes_per_channel()
    }

    /// Bytes per pixel (all channels).
    #[inline]
    pub const fn bytes_per_pixel(&self) -> usize {
        self.channels as usize * self.data_type.bytes_per_channel()
    }

    /// Same format in a different storage.
    pub fn with_storage(self, storage: StorageType) -> Self {
        Self { storage, ..self }
    }

    /// Same element type and storage with a different channel count.
    pub fn with_channels(self, channels: u32) -> Self {
        Self::new(channels, self.data_type, self.storage)
    }

    /// Whether a channel-expanding repack from this spec into
    /// `target_channels` is well defined: the target must be wider and a
    /// whole multiple of the source.
    pub fn can_repack_to(&self, target_channels: u32) -> bool {
        target_channels > self.channels && target_channels % self.channels == 0
    }
}

impl std::fmt::Display for ImageTypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} ({:?})", self.channels, self.data_type.name(), self.storage)
    }
}
