//! Fragment shader synthesis.
//!
//! An operation is a GLSL body plus pixel formats. The preamble declares one
//! sampler per input, the output-size uniform and an output variable as wide
//! as the output format; the body follows verbatim and can use `v_texCoord`,
//! `u_outSize`, `outValue` and the input names from [`texture_name`].
//!
//! Inputs are declared as separate texture and sampler bindings and exposed
//! under their plain name through a `#define`, so bodies written against
//! combined samplers (`texelFetch(u_texture, ...)`) work unchanged.

use std::fmt::Write;

use accel_core::{DataType, ImageTypeSpec, StorageType};

/// Output-size uniform name.
pub const OUT_SIZE: &str = "u_outSize";

/// Output variable name.
pub const OUT_VALUE: &str = "outValue";

/// Capability line emitted when an input is an imported texture.
pub const EXTERNAL_EXTENSION: &str = "#extension GL_OES_EGL_image_external_essl3 : require";

/// Name under which input `index` of `count` is visible to the body:
/// `u_texture` for a single input, `u_texture1..` otherwise.
pub fn texture_name(index: usize, count: usize) -> String {
    if count < 2 {
        "u_texture".to_string()
    } else {
        format!("u_texture{}", index + 1)
    }
}

/// Name of the texture binding behind input `name`.
pub fn image_binding_name(name: &str) -> String {
    format!("{name}_image")
}

fn type_prefix(data_type: DataType) -> &'static str {
    if data_type.is_unsigned_integer() {
        "u"
    } else if data_type.is_signed_integer() {
        "i"
    } else {
        ""
    }
}

/// GLSL type of one pixel of `spec`: `float`/`vecN`, `uint`/`uvecN` or
/// `int`/`ivecN`.
pub fn vec_type(spec: &ImageTypeSpec) -> String {
    let prefix = type_prefix(spec.data_type);
    if spec.channels == 1 {
        match prefix {
            "u" => "uint".to_string(),
            "i" => "int".to_string(),
            _ => "float".to_string(),
        }
    } else {
        format!("{prefix}vec{}", spec.channels)
    }
}

/// Combined sampler type reading `spec`.
pub fn sampler_type(spec: &ImageTypeSpec) -> String {
    format!("{}sampler2D", type_prefix(spec.data_type))
}

fn texture_type(spec: &ImageTypeSpec) -> String {
    format!("{}texture2D", type_prefix(spec.data_type))
}

/// Swizzle selecting the first `channels` components.
pub fn swizzle(channels: u32) -> &'static str {
    &"rgba"[..channels as usize]
}

/// Full fragment shader source for `body` reading `inputs` and writing
/// `output`.
pub fn fragment_source(body: &str, inputs: &[ImageTypeSpec], output: &ImageTypeSpec) -> String {
    let mut src = String::from("#version 450\n");
    if inputs.iter().any(|s| s.storage == StorageType::GpuExternal) {
        src.push_str(EXTERNAL_EXTENSION);
        src.push('\n');
    }
    let _ = writeln!(src, "layout(location = 0) out {} {OUT_VALUE};", vec_type(output));
    for (i, spec) in inputs.iter().enumerate() {
        let name = texture_name(i, inputs.len());
        let image = image_binding_name(&name);
        let _ = writeln!(
            src,
            "layout(set = 0, binding = {}) uniform {} {image};",
            2 * i,
            texture_type(spec)
        );
        let _ = writeln!(src, "layout(set = 0, binding = {}) uniform sampler {name}_sampler;", 2 * i + 1);
        let _ = writeln!(src, "#define {name} {}({image}, {name}_sampler)", sampler_type(spec));
    }
    let _ = writeln!(
        src,
        "layout(set = 0, binding = {}) uniform OutSize {{ vec2 {OUT_SIZE}; }};",
        2 * inputs.len()
    );
    src.push_str("layout(location = 0) in vec2 v_texCoord;\n");
    src.push_str(body);
    src
}
