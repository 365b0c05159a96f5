//! Graphics capability probe
//!
//! Initializes a backend headlessly, prints its capability matrix and the
//! best compressed format per texture role, and optionally loads a texture
//! through the full pipeline.
//!
//! ```text
//! gfx_probe [--settings settings.toml|settings.ron] [--texture texpages/page.png]
//! ```

use std::path::PathBuf;

use clap::Parser;
use gfx_api::backend::{BackendType, HeadlessFactory};
use gfx_api::config::{Config, ConfigError, ContextSettings, GraphicsSettings};
use gfx_api::foundation::logging;
use gfx_api::format::{FormatTarget, PixelFormat, PixelFormatUsage};
use gfx_api::texture::{TextureLoadOptions, TextureType};
use gfx_api::{Context, RenderError};
use thiserror::Error;

/// Probe the graphics backend headlessly
#[derive(Parser, Debug)]
#[command(name = "gfx_probe", version, about)]
struct Cli {
    /// Context settings file (TOML or RON); defaults to the null backend
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Logical texture path to load through the full pipeline
    #[arg(short, long, value_name = "NAME")]
    texture: Option<String>,
}

#[derive(Error, Debug)]
enum ProbeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

fn usage_label(usage: PixelFormatUsage) -> String {
    if usage.is_empty() {
        return "-".to_string();
    }
    let mut parts = Vec::new();
    if usage.contains(PixelFormatUsage::SAMPLED_IMAGE) {
        parts.push("sampled");
    }
    if usage.contains(PixelFormatUsage::STORAGE_IMAGE) {
        parts.push("storage");
    }
    if usage.contains(PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT) {
        parts.push("depth");
    }
    parts.join("+")
}

fn print_matrix(context: &Context) {
    println!("{:<12} {:<24} {:<24}", "format", "2D", "2D array");
    for format in PixelFormat::ALL {
        println!(
            "{:<12} {:<24} {:<24}",
            format!("{format:?}"),
            usage_label(context.format_usage(FormatTarget::Texture2D, format)),
            usage_label(context.format_usage(FormatTarget::Texture2DArray, format)),
        );
    }
}

fn print_best_formats(context: &Context) {
    println!();
    println!("{:<16} {:<12} {:<12}", "texture type", "2D", "2D array");
    for texture_type in TextureType::ALL {
        let label = |target| {
            context
                .best_compressed_format(target, texture_type)
                .map_or_else(|| "uncompressed".to_string(), |f| format!("{f:?}"))
        };
        println!(
            "{:<16} {:<12} {:<12}",
            format!("{texture_type:?}"),
            label(FormatTarget::Texture2D),
            label(FormatTarget::Texture2DArray),
        );
    }
}

fn run(cli: &Cli) -> Result<(), ProbeError> {
    let settings = match &cli.settings {
        Some(path) => {
            log::info!("Loading settings from {}", path.display());
            let settings = ContextSettings::load_from_file(&path.to_string_lossy())?;
            settings.validate()?;
            settings
        }
        None => ContextSettings {
            graphics: GraphicsSettings::new(BackendType::Null),
            ..ContextSettings::new("gfx_probe")
        },
    };
    if settings.graphics.backend == BackendType::OpenGl {
        log::warn!("The probe runs headless and cannot create an OpenGL context");
    }

    let factory = HeadlessFactory::new(settings.application_name.clone());
    let mut context = Context::from_settings(&settings);
    context.initialize(&factory, &settings.graphics)?;

    println!("Backend: {}", settings.graphics.backend);
    println!("Shadow map: {}", context.shadow_map_resolution());
    println!("Compression overrides: {}", context.overrides().len());
    println!();
    print_matrix(&context);
    print_best_formats(&context);

    if let Some(texture_path) = &cli.texture {
        let options = TextureLoadOptions::new(TextureType::GameTexture);
        let texture = context.load_texture(texture_path, &options)?;
        println!();
        println!(
            "Loaded {}: {}x{}, {} mip(s), {:?}",
            texture.name(),
            texture.width(),
            texture.height(),
            texture.mip_count(),
            texture.format()
        );
        context.destroy_texture(texture);
    }

    context.shutdown();
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init_with_level("info");

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_settings_and_texture() {
        let cli = Cli::try_parse_from(["gfx_probe", "--settings", "probe.toml", "-t", "texpages/page-1.png"]).unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("probe.toml")));
        assert_eq!(cli.texture.as_deref(), Some("texpages/page-1.png"));

        let cli = Cli::try_parse_from(["gfx_probe"]).unwrap();
        assert!(cli.settings.is_none() && cli.texture.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_arguments() {
        assert!(Cli::try_parse_from(["gfx_probe", "stray.toml"]).is_err());
        assert!(Cli::try_parse_from(["gfx_probe", "--frobnicate"]).is_err());
    }

    #[test]
    fn test_default_run_uses_null_backend() {
        let cli = Cli::try_parse_from(["gfx_probe"]).unwrap();
        run(&cli).unwrap();
    }
}
