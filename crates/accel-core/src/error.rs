//! Error types for accel-core.
//!
//! Only recoverable setup failures live here. Contract violations (bad
//! channel index, undefined border mode, unsupported repack ratio) panic
//! instead, see the crate docs.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while constructing images or processors.
#[derive(Debug, Error)]
pub enum Error {
    /// A raw buffer does not match `width * height * bytes_per_pixel`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Width or height is zero.
    #[error("invalid dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),

    /// The worker thread pool could not be started.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BufferSizeMismatch { expected: 16, actual: 12 };
        assert_eq!(err.to_string(), "buffer size mismatch: expected 16 bytes, got 12");
        assert_eq!(Error::InvalidDimensions(0, 4).to_string(), "invalid dimensions: 0x4");
    }
}
