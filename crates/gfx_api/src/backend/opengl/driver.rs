//! GL entry points used by the OpenGL backend
//!
//! The host's context-creation hook supplies a [`GlDriver`] bound to a
//! current context. Handles are raw GL object names; every method maps to
//! one GL call (or a small fixed sequence, such as compile plus status query).

use crate::pipeline::UniformValue;

/// GL enum values used by the backend
#[allow(missing_docs)]
pub mod gl {
    pub const NO_ERROR: u32 = 0;
    pub const NONE: i32 = 0;

    pub const VERSION: u32 = 0x1F02;
    pub const RENDERER: u32 = 0x1F01;
    pub const VENDOR: u32 = 0x1F00;
    pub const SHADING_LANGUAGE_VERSION: u32 = 0x8B8C;

    pub const MAX_TEXTURE_SIZE: u32 = 0x0D33;
    pub const MAX_ARRAY_TEXTURE_LAYERS: u32 = 0x88FF;
    pub const MAX_SAMPLES: u32 = 0x8D57;

    pub const TEXTURE_2D: u32 = 0x0DE1;
    pub const TEXTURE_2D_ARRAY: u32 = 0x8C1A;
    pub const TEXTURE0: u32 = 0x84C0;
    pub const TEXTURE_MIN_FILTER: u32 = 0x2801;
    pub const TEXTURE_MAG_FILTER: u32 = 0x2800;
    pub const TEXTURE_MAX_LEVEL: u32 = 0x813D;
    pub const LINEAR: i32 = 0x2601;
    pub const LINEAR_MIPMAP_LINEAR: i32 = 0x2703;
    pub const UNPACK_ALIGNMENT: u32 = 0x0CF5;

    pub const INTERNALFORMAT_SUPPORTED: u32 = 0x826F;
    pub const FRAGMENT_TEXTURE: u32 = 0x829F;
    pub const SHADER_IMAGE_LOAD: u32 = 0x82A4;
    pub const DEPTH_RENDERABLE: u32 = 0x8287;
    pub const FULL_SUPPORT: i32 = 0x82B7;
    pub const CAVEAT_SUPPORT: i32 = 0x82B8;
    pub const TRUE: i32 = 1;

    pub const VERTEX_SHADER: u32 = 0x8B31;
    pub const FRAGMENT_SHADER: u32 = 0x8B30;
    pub const HIGH_FLOAT: u32 = 0x8DF2;
    pub const HIGH_INT: u32 = 0x8DF5;

    pub const ARRAY_BUFFER: u32 = 0x8892;
    pub const ELEMENT_ARRAY_BUFFER: u32 = 0x8893;
    pub const STATIC_DRAW: u32 = 0x88E4;
    pub const DYNAMIC_DRAW: u32 = 0x88E8;
    pub const STREAM_DRAW: u32 = 0x88E0;

    pub const BLEND: u32 = 0x0BE2;
    pub const DEPTH_TEST: u32 = 0x0B71;
    pub const STENCIL_TEST: u32 = 0x0B90;
    pub const CULL_FACE: u32 = 0x0B44;
    pub const ZERO: u32 = 0;
    pub const ONE: u32 = 1;
    pub const SRC_ALPHA: u32 = 0x0302;
    pub const ONE_MINUS_SRC_ALPHA: u32 = 0x0303;
    pub const DST_COLOR: u32 = 0x0306;
    pub const LEQUAL: u32 = 0x0203;
    pub const EQUAL: u32 = 0x0202;
    pub const ALWAYS: u32 = 0x0207;
    pub const KEEP: u32 = 0x1E00;
    pub const REPLACE: u32 = 0x1E01;
    pub const FRONT: u32 = 0x0404;
    pub const BACK: u32 = 0x0405;

    pub const POINTS: u32 = 0x0000;
    pub const LINES: u32 = 0x0001;
    pub const LINE_STRIP: u32 = 0x0003;
    pub const TRIANGLES: u32 = 0x0004;
    pub const TRIANGLE_STRIP: u32 = 0x0005;

    pub const FLOAT: u32 = 0x1406;
    pub const UNSIGNED_BYTE: u32 = 0x1401;
    pub const UNSIGNED_SHORT: u32 = 0x1403;
    pub const UNSIGNED_INT: u32 = 0x1405;
}

/// Precision of one shader numeric type (`glGetShaderPrecisionFormat`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderPrecision {
    /// log2 of the smallest representable magnitude
    pub range_min: i32,
    /// log2 of the largest representable magnitude
    pub range_max: i32,
    /// Bits of precision (0 for integers)
    pub precision: i32,
}

impl ShaderPrecision {
    /// Whether the type is supported at all
    pub fn is_supported(&self) -> bool {
        self.range_min != 0 || self.range_max != 0 || self.precision != 0
    }
}

/// GL function table bound to a current context
pub trait GlDriver {
    /// `glGetString`
    fn get_string(&self, name: u32) -> Option<String>;
    /// Extension names (`glGetStringi(GL_EXTENSIONS, i)`)
    fn extensions(&self) -> Vec<String>;
    /// `glGetIntegerv` for a single value
    fn get_integer(&self, pname: u32) -> i32;
    /// `glGetInternalformativ` for a single value
    fn get_internalformat(&self, target: u32, internal_format: u32, pname: u32) -> i32;
    /// `glGetShaderPrecisionFormat`; `None` when the query is unavailable
    fn shader_precision_format(&self, shader_type: u32, precision_type: u32) -> Option<ShaderPrecision>;
    /// `GL_SHADER_COMPILER`
    fn has_shader_compiler(&self) -> bool;
    /// Platform swap interval call; false when refused
    fn set_swap_interval(&mut self, interval: i32) -> bool;
    /// `glGetError`
    fn get_error(&mut self) -> u32;

    /// `glCreateShader`
    fn create_shader(&mut self, kind: u32) -> u32;
    /// `glShaderSource` + `glCompileShader`; the info log on failure
    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<(), String>;
    /// `glDeleteShader`
    fn delete_shader(&mut self, shader: u32);
    /// `glCreateProgram`
    fn create_program(&mut self) -> u32;
    /// `glAttachShader`
    fn attach_shader(&mut self, program: u32, shader: u32);
    /// `glBindAttribLocation`
    fn bind_attrib_location(&mut self, program: u32, index: u32, name: &str);
    /// `glLinkProgram`; the info log on failure
    fn link_program(&mut self, program: u32) -> Result<(), String>;
    /// `glDeleteProgram`
    fn delete_program(&mut self, program: u32);
    /// `glGetUniformLocation`
    fn get_uniform_location(&self, program: u32, name: &str) -> i32;
    /// `glGetAttribLocation`
    fn get_attrib_location(&self, program: u32, name: &str) -> i32;
    /// `glUseProgram`
    fn use_program(&mut self, program: u32);
    /// `glUniform*` on the current program
    fn uniform(&mut self, location: i32, value: &UniformValue);

    /// `glGenTextures` for one name
    fn gen_texture(&mut self) -> u32;
    /// `glActiveTexture`
    fn active_texture(&mut self, unit: u32);
    /// `glBindTexture`
    fn bind_texture(&mut self, target: u32, texture: u32);
    /// `glTexParameteri`
    fn tex_parameter(&mut self, target: u32, pname: u32, value: i32);
    /// `glPixelStorei`
    fn pixel_store(&mut self, pname: u32, value: i32);
    /// `glTexImage2D`
    fn tex_image_2d(
        &mut self,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    );
    /// `glCompressedTexImage2D`
    fn compressed_tex_image_2d(&mut self, level: u32, internal_format: u32, width: u32, height: u32, data: &[u8]);
    /// `glTexImage3D` on `GL_TEXTURE_2D_ARRAY`
    fn tex_image_3d(
        &mut self,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    );
    /// `glCompressedTexImage3D` on `GL_TEXTURE_2D_ARRAY`
    fn compressed_tex_image_3d(
        &mut self,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    );
    /// `glTexSubImage2D` for a full level
    fn tex_sub_image_2d(&mut self, level: u32, width: u32, height: u32, format: u32, ty: u32, data: &[u8]);
    /// `glCompressedTexSubImage2D` for a full level
    fn compressed_tex_sub_image_2d(&mut self, level: u32, width: u32, height: u32, internal_format: u32, data: &[u8]);
    /// `glTexSubImage3D` for one full layer of a level
    fn tex_sub_image_3d(
        &mut self,
        level: u32,
        layer: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        data: &[u8],
    );
    /// `glCompressedTexSubImage3D` for one full layer of a level
    fn compressed_tex_sub_image_3d(
        &mut self,
        level: u32,
        layer: u32,
        width: u32,
        height: u32,
        internal_format: u32,
        data: &[u8],
    );
    /// `glDeleteTextures` for one name
    fn delete_texture(&mut self, texture: u32);

    /// `glGenBuffers` for one name
    fn gen_buffer(&mut self) -> u32;
    /// `glBindBuffer`
    fn bind_buffer(&mut self, target: u32, buffer: u32);
    /// `glBufferData`
    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32);
    /// `glBufferSubData`
    fn buffer_sub_data(&mut self, target: u32, offset: usize, data: &[u8]);
    /// `glDeleteBuffers` for one name
    fn delete_buffer(&mut self, buffer: u32);

    /// `glEnable`
    fn enable(&mut self, cap: u32);
    /// `glDisable`
    fn disable(&mut self, cap: u32);
    /// `glBlendFunc`
    fn blend_func(&mut self, src: u32, dst: u32);
    /// `glDepthFunc`
    fn depth_func(&mut self, func: u32);
    /// `glDepthMask`
    fn depth_mask(&mut self, write: bool);
    /// `glCullFace`
    fn cull_face(&mut self, mode: u32);
    /// `glStencilFunc`
    fn stencil_func(&mut self, func: u32, reference: i32, mask: u32);
    /// `glStencilOp`
    fn stencil_op(&mut self, stencil_fail: u32, depth_fail: u32, pass: u32);
    /// `glEnableVertexAttribArray`
    fn enable_vertex_attrib_array(&mut self, index: u32);
    /// `glVertexAttribPointer` with a byte offset into the bound buffer
    fn vertex_attrib_pointer(&mut self, index: u32, size: i32, ty: u32, normalized: bool, stride: u32, offset: usize);
    /// `glDrawArrays`
    fn draw_arrays(&mut self, mode: u32, first: u32, count: u32);
    /// `glDrawElements` with a byte offset into the bound index buffer
    fn draw_elements(&mut self, mode: u32, count: u32, ty: u32, offset: usize);
}
