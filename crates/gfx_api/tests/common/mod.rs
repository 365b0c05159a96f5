//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::io::Cursor;

use gfx_api::backend::null::NullTexture;
use gfx_api::backend::{NullBackend, TextureId};
use gfx_api::prelude::*;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};

/// Encode a solid RGBA image as PNG
pub fn png_rgba(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    encode(DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color))))
}

/// Encode a solid grayscale image as PNG
pub fn png_gray(width: u32, height: u32, value: u8) -> Vec<u8> {
    encode(DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value]))))
}

fn encode(image: DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("PNG encoding");
    bytes
}

/// Context over `assets` with the null backend reporting `capabilities`
pub fn null_context(assets: MemorySource, capabilities: NullCapabilities) -> Context {
    let mut context = Context::new(Box::new(assets));
    let factory = HeadlessFactory::new("integration").with_null_capabilities(capabilities);
    context
        .initialize(&factory, &GraphicsSettings::new(BackendType::Null))
        .expect("null backend initializes");
    context
}

/// The null backend behind a context
pub fn null_backend(context: &Context) -> &NullBackend {
    context
        .backend()
        .expect("initialized")
        .as_any()
        .downcast_ref::<NullBackend>()
        .expect("null backend")
}

/// A live texture held by the null backend
pub fn null_texture(context: &Context, id: TextureId) -> NullTexture {
    null_backend(context).texture(id).expect("live texture").clone()
}
