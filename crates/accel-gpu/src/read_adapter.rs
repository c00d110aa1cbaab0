//! Read-back through a channel-repacking pass.
//!
//! When the device cannot copy an image's layout to host memory directly,
//! the image is first redrawn into a wider-channel buffer image that it can
//! copy. `N/M` consecutive source pixels of `M` channels are packed into one
//! `N`-channel buffer pixel, so the buffer is `ceil(width * M / N)` pixels
//! wide. If that leaves each buffer row longer than the logical row, the
//! pulled bytes are compacted row by row on the host.
//!
//! The last buffer pixel of a row may fetch source texels past the image
//! width. Those reads follow the device's robust-access behavior and their
//! bytes only ever land in the padding that compaction drops.

use std::sync::Arc;

use accel_core::{Future, Image, ImageTypeSpec, Processor, StorageType};
use tracing::{debug, warn};

use crate::binder::Destroyable;
use crate::config::TransferPolicy;
use crate::glsl::{swizzle, vec_type};
use crate::image::{GpuImage, GpuImageFactory};
use crate::operations::{Factory, Function, PipelineDesc};

/// Layout a read of `spec` must be repacked into under `policy`, or `None`
/// when it can be copied directly.
///
/// # Panics
///
/// Under [`TransferPolicy::Rgba8`], on element types wider than 8 bits and
/// on channel counts that do not divide 4.
pub fn read_target(spec: &ImageTypeSpec, policy: TransferPolicy) -> Option<ImageTypeSpec> {
    match policy {
        TransferPolicy::Native => None,
        TransferPolicy::Rgba8 => {
            assert_eq!(
                spec.bytes_per_channel(),
                1,
                "only 8-bit images can be read under the rgba8 transfer policy, got {spec}"
            );
            if spec.channels == 4 {
                return None;
            }
            assert!(
                spec.can_repack_to(4),
                "cannot repack {} channels into 4",
                spec.channels
            );
            Some(ImageTypeSpec::new(4, spec.data_type, StorageType::GpuTexture))
        }
    }
}

/// Width in pixels of an image of `width` `source_channels`-channel pixels
/// packed into `target_channels`-channel pixels.
pub fn repacked_width(width: u32, source_channels: u32, target_channels: u32) -> u32 {
    (width * source_channels).div_ceil(target_channels)
}

/// Shader body packing `source` pixels into `target` pixels.
///
/// # Panics
///
/// Unless `target` has more channels than `source` and a whole multiple of
/// them.
pub fn repack_body(source: &ImageTypeSpec, target: &ImageTypeSpec) -> String {
    assert!(
        source.can_repack_to(target.channels),
        "cannot repack {} channels into {}",
        source.channels,
        target.channels
    );
    let ratio = target.channels / source.channels;
    let col = vec_type(source);
    let sw = swizzle(source.channels);

    let mut body = String::from("void main() {\n");
    body.push_str("    ivec2 outCoord = ivec2(v_texCoord * u_outSize);\n");
    body.push_str(&format!("    int x0 = outCoord.x * {ratio};\n"));
    for i in 0..ratio {
        body.push_str(&format!(
            "    {col} col{i} = texelFetch(u_texture, ivec2(x0 + {i}, outCoord.y), 0).{sw};\n"
        ));
    }
    let cols: Vec<String> = (0..ratio).map(|i| format!("col{i}")).collect();
    body.push_str(&format!("    outValue = {}({});\n", vec_type(target), cols.join(", ")));
    body.push_str("}\n");
    body
}

/// Host-side removal of per-row padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCompaction {
    orig_row_width: usize,
    buf_row_width: usize,
    rows: usize,
}

impl RowCompaction {
    /// # Panics
    ///
    /// Unless `orig_row_width < buf_row_width`.
    pub fn new(orig_row_width: usize, buf_row_width: usize, rows: usize) -> Self {
        assert!(
            orig_row_width < buf_row_width,
            "logical row ({orig_row_width} bytes) must be shorter than the buffer row ({buf_row_width} bytes)"
        );
        Self { orig_row_width, buf_row_width, rows }
    }

    /// Copies the logical prefix of each of the first `rows` rows.
    pub fn apply(&self, src: &[u8]) -> Vec<u8> {
        assert!(
            src.len() >= self.buf_row_width * self.rows,
            "buffer too small for {} rows of {} bytes",
            self.rows,
            self.buf_row_width
        );
        let mut out = Vec::with_capacity(self.orig_row_width * self.rows);
        for row in src.chunks_exact(self.buf_row_width).take(self.rows) {
            out.extend_from_slice(&row[..self.orig_row_width]);
        }
        out
    }
}

/// Reads images of one shape through a repacking pass.
pub struct ReadAdapter {
    buffer: GpuImage,
    function: Function,
    compaction: Option<RowCompaction>,
    processor: Arc<dyn Processor>,
}

impl ReadAdapter {
    /// Allocates the buffer image and declares the repack operation for
    /// `width`x`height` images of `source`, read as `target`.
    pub fn new(
        factory: &GpuImageFactory,
        width: u32,
        height: u32,
        source: ImageTypeSpec,
        target: ImageTypeSpec,
    ) -> Self {
        assert_eq!(source.data_type, target.data_type, "repacking cannot convert element types");
        let body = repack_body(&source, &target);
        let buf_width = repacked_width(width, source.channels, target.channels);
        let buffer = factory.create_gpu(buf_width, height, target.channels, target.data_type);

        let orig_row = width as usize * source.bytes_per_pixel();
        let buf_row = buf_width as usize * target.bytes_per_pixel();
        let compaction = (orig_row != buf_row).then(|| RowCompaction::new(orig_row, buf_row, height as usize));
        if compaction.is_some() {
            warn!(width, height, %source, %target, "image read dimensions not optimal, need CPU repacking");
        } else {
            debug!(width, height, %source, %target, "image read repacked on the GPU");
        }

        let function = Factory::new(factory.context().clone()).wrap(PipelineDesc::new(
            body,
            vec![source],
            buffer.spec(),
        ));
        Self {
            buffer,
            function,
            compaction,
            processor: factory.processor().clone(),
        }
    }

    /// Host compaction step, if rows come out padded.
    pub fn compaction(&self) -> Option<RowCompaction> {
        self.compaction
    }

    /// Repacks `image` into the buffer and pulls it. With compaction the
    /// returned future resolves once the processor has run it; without, it
    /// is the pull's own future.
    pub fn read(&mut self, image: &GpuImage) -> Future<Vec<u8>> {
        self.function.call(&[image], &self.buffer);
        let pulled = self.buffer.read_raw();
        match self.compaction {
            None => pulled,
            Some(compaction) => self.processor.enqueue(move || compaction.apply(&pulled.wait())),
        }
    }
}

impl Destroyable for ReadAdapter {
    fn destroy(&mut self) {
        self.function.destroy();
        self.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_core::DataType;

    fn gpu(channels: u32, data_type: DataType) -> ImageTypeSpec {
        ImageTypeSpec::new(channels, data_type, StorageType::GpuTexture)
    }

    #[test]
    fn test_repacked_width() {
        assert_eq!(repacked_width(4, 2, 4), 2);
        assert_eq!(repacked_width(3, 2, 4), 2);
        assert_eq!(repacked_width(5, 1, 4), 2);
        assert_eq!(repacked_width(8, 1, 4), 2);
        assert_eq!(repacked_width(7, 1, 2), 4);
    }

    #[test]
    fn test_repack_body_two_to_four() {
        let body = repack_body(&gpu(2, DataType::Uint8), &gpu(4, DataType::Uint8));
        let lines: Vec<&str> = body.lines().map(str::trim).collect();
        assert_eq!(
            lines,
            [
                "void main() {",
                "ivec2 outCoord = ivec2(v_texCoord * u_outSize);",
                "int x0 = outCoord.x * 2;",
                "uvec2 col0 = texelFetch(u_texture, ivec2(x0 + 0, outCoord.y), 0).rg;",
                "uvec2 col1 = texelFetch(u_texture, ivec2(x0 + 1, outCoord.y), 0).rg;",
                "outValue = uvec4(col0, col1);",
                "}",
            ]
        );
    }

    #[test]
    fn test_repack_body_one_to_four() {
        let body = repack_body(&gpu(1, DataType::Ufixed8), &gpu(4, DataType::Ufixed8));
        assert!(body.contains("float col3 = texelFetch(u_texture, ivec2(x0 + 3, outCoord.y), 0).r;"));
        assert!(body.contains("outValue = vec4(col0, col1, col2, col3);"));
    }

    #[test]
    fn test_repack_source_compiles() {
        for (m, data_type) in [(1, DataType::Uint8), (2, DataType::Sint8), (2, DataType::Ufixed8)] {
            let source = gpu(m, data_type);
            let target = gpu(4, data_type);
            let src = crate::glsl::fragment_source(&repack_body(&source, &target), &[source], &target);
            crate::program::parse(naga::ShaderStage::Fragment, &src).unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "cannot repack 3 channels into 4")]
    fn test_repack_rejects_non_multiple() {
        repack_body(&gpu(3, DataType::Uint8), &gpu(4, DataType::Uint8));
    }

    #[test]
    fn test_row_compaction() {
        // 3 rows, logical 6 bytes, buffer 8 bytes.
        let src: Vec<u8> = (0..24).collect();
        let out = RowCompaction::new(6, 8, 3).apply(&src);
        assert_eq!(out, [0, 1, 2, 3, 4, 5, 8, 9, 10, 11, 12, 13, 16, 17, 18, 19, 20, 21]);
    }

    #[test]
    fn test_row_compaction_never_reads_padding() {
        let (orig, buf, rows) = (5, 12, 4);
        let mut src = vec![0xFFu8; buf * rows];
        for r in 0..rows {
            for c in 0..orig {
                src[r * buf + c] = (r * orig + c) as u8;
            }
        }
        let out = RowCompaction::new(orig, buf, rows).apply(&src);
        assert_eq!(out.len(), orig * rows);
        assert!(out.iter().all(|&b| b != 0xFF));
        assert_eq!(out, (0..(orig * rows) as u8).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "must be shorter")]
    fn test_row_compaction_requires_padding() {
        RowCompaction::new(8, 8, 1);
    }

    #[test]
    fn test_read_target() {
        assert_eq!(read_target(&gpu(2, DataType::Uint16), TransferPolicy::Native), None);
        assert_eq!(read_target(&gpu(4, DataType::Uint8), TransferPolicy::Rgba8), None);
        assert_eq!(
            read_target(&gpu(2, DataType::Uint8), TransferPolicy::Rgba8),
            Some(gpu(4, DataType::Uint8))
        );
        assert_eq!(
            read_target(&gpu(1, DataType::Ufixed8), TransferPolicy::Rgba8),
            Some(gpu(4, DataType::Ufixed8))
        );
    }

    #[test]
    #[should_panic(expected = "8-bit")]
    fn test_read_target_rejects_wide_types() {
        read_target(&gpu(2, DataType::Float32), TransferPolicy::Rgba8);
    }
}
