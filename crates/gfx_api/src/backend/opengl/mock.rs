//! Scripted [`GlDriver`] for unit tests

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::driver::{gl, GlDriver, ShaderPrecision};
use crate::format::PixelFormat;
use crate::pipeline::glsl;
use crate::pipeline::UniformValue;

#[derive(Debug, Default)]
struct MockProgram {
    shaders: Vec<u32>,
    attributes: Vec<(u32, String)>,
    uniforms: Vec<String>,
}

#[derive(Debug)]
struct MockState {
    version: String,
    extensions: Vec<String>,
    shader_compiler: bool,
    high_precision: bool,
    unsupported: HashSet<u32>,
    refused_intervals: HashSet<i32>,
    integers: HashMap<u32, i32>,
    next_name: u32,
    shaders: HashMap<u32, String>,
    programs: HashMap<u32, MockProgram>,
    current_program: u32,
    swap_intervals: Vec<i32>,
    buffer_usages: Vec<u32>,
    uniform_writes: Vec<(u32, i32, UniformValue)>,
    calls: Vec<&'static str>,
}

/// Cloneable handle; clones share state so tests can inspect after boxing
#[derive(Debug, Clone)]
pub(crate) struct MockGl {
    state: Rc<RefCell<MockState>>,
}

impl MockGl {
    pub(crate) fn new(version: &str) -> Self {
        let integers = HashMap::from([
            (gl::MAX_TEXTURE_SIZE, 16384),
            (gl::MAX_ARRAY_TEXTURE_LAYERS, 2048),
            (gl::MAX_SAMPLES, 8),
        ]);
        Self {
            state: Rc::new(RefCell::new(MockState {
                version: version.to_string(),
                extensions: Vec::new(),
                shader_compiler: true,
                high_precision: true,
                unsupported: HashSet::new(),
                refused_intervals: HashSet::new(),
                integers,
                next_name: 1,
                shaders: HashMap::new(),
                programs: HashMap::new(),
                current_program: 0,
                swap_intervals: Vec::new(),
                buffer_usages: Vec::new(),
                uniform_writes: Vec::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub(crate) fn with_extension(self, name: &str) -> Self {
        self.state.borrow_mut().extensions.push(name.to_string());
        self
    }

    pub(crate) fn with_shader_compiler(self, present: bool) -> Self {
        self.state.borrow_mut().shader_compiler = present;
        self
    }

    pub(crate) fn with_high_precision(self, high: bool) -> Self {
        self.state.borrow_mut().high_precision = high;
        self
    }

    pub(crate) fn with_unsupported(self, format: PixelFormat) -> Self {
        self.state.borrow_mut().unsupported.insert(format.gl_internal_format());
        self
    }

    pub(crate) fn with_integer(self, pname: u32, value: i32) -> Self {
        self.state.borrow_mut().integers.insert(pname, value);
        self
    }

    pub(crate) fn refusing_swap_interval(self, interval: i32) -> Self {
        self.state.borrow_mut().refused_intervals.insert(interval);
        self
    }

    pub(crate) fn swap_intervals(&self) -> Vec<i32> {
        self.state.borrow().swap_intervals.clone()
    }

    pub(crate) fn buffer_usages(&self) -> Vec<u32> {
        self.state.borrow().buffer_usages.clone()
    }

    pub(crate) fn count_calls(&self, name: &str) -> usize {
        self.state.borrow().calls.iter().filter(|&&c| c == name).count()
    }

    pub(crate) fn shader_source_containing(&self, needle: &str) -> Option<String> {
        self.state
            .borrow()
            .shaders
            .values()
            .find(|source| source.contains(needle))
            .cloned()
    }

    pub(crate) fn uniform_location_of(&self, program: u32, name: &str) -> Option<i32> {
        self.state
            .borrow()
            .programs
            .get(&program)?
            .uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| i as i32)
    }

    pub(crate) fn uniform_writes(&self) -> Vec<(u32, i32, UniformValue)> {
        self.state.borrow().uniform_writes.clone()
    }

    fn name(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        let name = state.next_name;
        state.next_name += 1;
        name
    }

    fn record(&self, call: &'static str) {
        self.state.borrow_mut().calls.push(call);
    }
}

fn is_depth_internal(internal_format: u32) -> bool {
    internal_format == PixelFormat::D24S8.gl_internal_format() || internal_format == PixelFormat::D32F.gl_internal_format()
}

impl GlDriver for MockGl {
    fn get_string(&self, name: u32) -> Option<String> {
        match name {
            gl::VERSION => Some(self.state.borrow().version.clone()),
            gl::VENDOR => Some("Mock".to_string()),
            gl::RENDERER => Some("Mock renderer".to_string()),
            _ => None,
        }
    }

    fn extensions(&self) -> Vec<String> {
        self.state.borrow().extensions.clone()
    }

    fn get_integer(&self, pname: u32) -> i32 {
        self.state.borrow().integers.get(&pname).copied().unwrap_or(0)
    }

    fn get_internalformat(&self, _target: u32, internal_format: u32, pname: u32) -> i32 {
        if self.state.borrow().unsupported.contains(&internal_format) {
            return gl::NONE;
        }
        match pname {
            gl::INTERNALFORMAT_SUPPORTED => gl::TRUE,
            gl::FRAGMENT_TEXTURE | gl::SHADER_IMAGE_LOAD => gl::FULL_SUPPORT,
            gl::DEPTH_RENDERABLE if is_depth_internal(internal_format) => gl::TRUE,
            _ => gl::NONE,
        }
    }

    fn shader_precision_format(&self, _shader_type: u32, precision_type: u32) -> Option<ShaderPrecision> {
        if !self.state.borrow().high_precision {
            return Some(ShaderPrecision::default());
        }
        Some(match precision_type {
            gl::HIGH_FLOAT => ShaderPrecision {
                range_min: 127,
                range_max: 127,
                precision: 23,
            },
            _ => ShaderPrecision {
                range_min: 31,
                range_max: 30,
                precision: 0,
            },
        })
    }

    fn has_shader_compiler(&self) -> bool {
        self.state.borrow().shader_compiler
    }

    fn set_swap_interval(&mut self, interval: i32) -> bool {
        let mut state = self.state.borrow_mut();
        state.swap_intervals.push(interval);
        !state.refused_intervals.contains(&interval)
    }

    fn get_error(&mut self) -> u32 {
        gl::NO_ERROR
    }

    fn create_shader(&mut self, _kind: u32) -> u32 {
        let name = self.name();
        self.state.borrow_mut().shaders.insert(name, String::new());
        name
    }

    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<(), String> {
        if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
            return Err(line.trim().to_string());
        }
        self.state.borrow_mut().shaders.insert(shader, source.to_string());
        Ok(())
    }

    fn delete_shader(&mut self, _shader: u32) {
        self.record("delete_shader");
    }

    fn create_program(&mut self) -> u32 {
        let name = self.name();
        self.state.borrow_mut().programs.insert(name, MockProgram::default());
        name
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.shaders.push(shader);
        }
    }

    fn bind_attrib_location(&mut self, program: u32, index: u32, name: &str) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attributes.push((index, name.to_string()));
        }
    }

    fn link_program(&mut self, program: u32) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let sources: Vec<String> = state
            .programs
            .get(&program)
            .ok_or_else(|| format!("unknown program {program}"))?
            .shaders
            .iter()
            .filter_map(|s| state.shaders.get(s).cloned())
            .collect();
        let mut uniforms: Vec<String> = Vec::new();
        for source in &sources {
            for decl in glsl::scan_uniforms(source) {
                if !uniforms.contains(&decl.name) {
                    uniforms.push(decl.name);
                }
            }
        }
        if let Some(p) = state.programs.get_mut(&program) {
            p.uniforms = uniforms;
        }
        Ok(())
    }

    fn delete_program(&mut self, _program: u32) {
        self.record("delete_program");
    }

    fn get_uniform_location(&self, program: u32, name: &str) -> i32 {
        self.uniform_location_of(program, name).unwrap_or(-1)
    }

    fn get_attrib_location(&self, program: u32, name: &str) -> i32 {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.attributes.iter().find(|(_, n)| n == name))
            .map_or(-1, |&(location, _)| location as i32)
    }

    fn use_program(&mut self, program: u32) {
        self.state.borrow_mut().current_program = program;
    }

    fn uniform(&mut self, location: i32, value: &UniformValue) {
        let mut state = self.state.borrow_mut();
        let program = state.current_program;
        state.uniform_writes.push((program, location, *value));
    }

    fn gen_texture(&mut self) -> u32 {
        self.name()
    }

    fn active_texture(&mut self, _unit: u32) {}

    fn bind_texture(&mut self, _target: u32, _texture: u32) {}

    fn tex_parameter(&mut self, _target: u32, _pname: u32, _value: i32) {}

    fn pixel_store(&mut self, _pname: u32, _value: i32) {}

    fn tex_image_2d(
        &mut self,
        _level: u32,
        _internal_format: u32,
        _width: u32,
        _height: u32,
        _format: u32,
        _ty: u32,
        _data: Option<&[u8]>,
    ) {
        self.record("tex_image_2d");
    }

    fn compressed_tex_image_2d(&mut self, _level: u32, _internal_format: u32, _width: u32, _height: u32, _data: &[u8]) {
        self.record("compressed_tex_image_2d");
    }

    fn tex_image_3d(
        &mut self,
        _level: u32,
        _internal_format: u32,
        _width: u32,
        _height: u32,
        _depth: u32,
        _format: u32,
        _ty: u32,
        _data: Option<&[u8]>,
    ) {
        self.record("tex_image_3d");
    }

    fn compressed_tex_image_3d(
        &mut self,
        _level: u32,
        _internal_format: u32,
        _width: u32,
        _height: u32,
        _depth: u32,
        _data: &[u8],
    ) {
        self.record("compressed_tex_image_3d");
    }

    fn tex_sub_image_2d(&mut self, _level: u32, _width: u32, _height: u32, _format: u32, _ty: u32, _data: &[u8]) {
        self.record("tex_sub_image_2d");
    }

    fn compressed_tex_sub_image_2d(
        &mut self,
        _level: u32,
        _width: u32,
        _height: u32,
        _internal_format: u32,
        _data: &[u8],
    ) {
        self.record("compressed_tex_sub_image_2d");
    }

    fn tex_sub_image_3d(
        &mut self,
        _level: u32,
        _layer: u32,
        _width: u32,
        _height: u32,
        _format: u32,
        _ty: u32,
        _data: &[u8],
    ) {
        self.record("tex_sub_image_3d");
    }

    fn compressed_tex_sub_image_3d(
        &mut self,
        _level: u32,
        _layer: u32,
        _width: u32,
        _height: u32,
        _internal_format: u32,
        _data: &[u8],
    ) {
        self.record("compressed_tex_sub_image_3d");
    }

    fn delete_texture(&mut self, _texture: u32) {
        self.record("delete_texture");
    }

    fn gen_buffer(&mut self) -> u32 {
        self.name()
    }

    fn bind_buffer(&mut self, _target: u32, _buffer: u32) {}

    fn buffer_data(&mut self, _target: u32, _data: &[u8], usage: u32) {
        self.record("buffer_data");
        self.state.borrow_mut().buffer_usages.push(usage);
    }

    fn buffer_sub_data(&mut self, _target: u32, _offset: usize, _data: &[u8]) {
        self.record("buffer_sub_data");
    }

    fn delete_buffer(&mut self, _buffer: u32) {
        self.record("delete_buffer");
    }

    fn enable(&mut self, _cap: u32) {}

    fn disable(&mut self, _cap: u32) {}

    fn blend_func(&mut self, _src: u32, _dst: u32) {}

    fn depth_func(&mut self, _func: u32) {}

    fn depth_mask(&mut self, _write: bool) {}

    fn cull_face(&mut self, _mode: u32) {}

    fn stencil_func(&mut self, _func: u32, _reference: i32, _mask: u32) {}

    fn stencil_op(&mut self, _stencil_fail: u32, _depth_fail: u32, _pass: u32) {}

    fn enable_vertex_attrib_array(&mut self, _index: u32) {}

    fn vertex_attrib_pointer(
        &mut self,
        _index: u32,
        _size: i32,
        _ty: u32,
        _normalized: bool,
        _stride: u32,
        _offset: usize,
    ) {
        self.record("vertex_attrib_pointer");
    }

    fn draw_arrays(&mut self, _mode: u32, _first: u32, _count: u32) {
        self.record("draw_arrays");
    }

    fn draw_elements(&mut self, _mode: u32, _count: u32, _ty: u32, _offset: usize) {
        self.record("draw_elements");
    }
}
