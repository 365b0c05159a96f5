//! # gfx_api
//!
//! Backend-agnostic graphics layer for a real-time 3D game.
//!
//! ## Features
//!
//! - **Backends**: OpenGL 3.0+/OpenGL ES 3.0+, Vulkan and a no-op null backend
//!   behind one object-safe [`backend::Backend`] trait
//! - **Format negotiation**: per-target capability matrices and best
//!   compressed format selection per texture role
//! - **Texture pipeline**: PNG/KTX2 loading, channel reduction, mip chains,
//!   real-time block compression and texture arrays with placeholder layers
//! - **Shader pipelines**: eight fixed shader modes with typed uniform blocks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gfx_api::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut context = Context::new(Box::new(DirectorySource::new(&["resources"])));
//!     context.initialize(&HeadlessFactory::new("demo"), &GraphicsSettings::new(BackendType::Null))?;
//!
//!     let texture = context.load_texture("texpages/grass.png", &TextureLoadOptions::new(TextureType::GameTexture))?;
//!     println!("{}x{} {:?}", texture.width(), texture.height(), texture.format());
//!
//!     context.destroy_texture(texture);
//!     context.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

pub mod assets;
pub mod backend;
pub mod buffer;
pub mod compression;
pub mod config;
pub mod error;
pub mod format;
pub mod foundation;
pub mod pipeline;
pub mod texture;

mod context;

pub use context::{Context, DEFAULT_OVERRIDE_FILE};
pub use error::{RenderError, RenderResult};

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        assets::{AssetSource, DirectorySource, ImageData, MemorySource},
        backend::{Backend, BackendFactory, BackendType, HeadlessFactory, NullCapabilities},
        buffer::{Buffer, BufferStorageHint, BufferUsage},
        compression::{CompressionLevel, OverrideTable},
        config::{Config, ContextSettings, GraphicsSettings, SwapIntervalMode},
        format::{FormatTarget, PixelFormat, PixelFormatUsage},
        pipeline::{Pipeline, PipelineStateInfo, ShaderMode, UniformBlock, UniformBlockKind},
        texture::{Texture, TextureArray, TextureLoadOptions, TextureType},
        Context, RenderError, RenderResult,
    };
}
