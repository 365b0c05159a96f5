//! Error types shared by every layer of the graphics API

use thiserror::Error;

use crate::assets::AssetError;
use crate::backend::BackendType;
use crate::config::ConfigError;
use crate::format::PixelFormat;

/// Errors produced by the graphics layer
///
/// Variants are grouped by how callers are expected to react: initialization
/// failures are fatal for the context, resource failures are recoverable for
/// the single resource that produced them, and [`RenderError::LogicError`]
/// flags a misconfigured build rather than bad input.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Backend initialization failed during setup
    ///
    /// Occurs when the driver cannot be loaded, the device cannot be created,
    /// or the context-creation hook refused to hand out a context.
    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    /// A different backend is already active
    #[error("Backend {active:?} is already active; refusing to switch to {requested:?}")]
    BackendMismatch {
        /// Backend currently owned by the context
        active: BackendType,
        /// Backend the caller asked for
        requested: BackendType,
    },

    /// The driver reports an API version below the supported minimum
    #[error("Unsupported API version {found} (minimum {required})")]
    UnsupportedVersion {
        /// Version string reported by the driver
        found: String,
        /// Minimum version this layer requires
        required: String,
    },

    /// An OpenGL ES context without a shader compiler
    #[error("OpenGL ES context has no shader compiler")]
    NoShaderCompiler,

    /// An operation required an initialized context
    #[error("Graphics context is not initialized")]
    NotInitialized,

    /// GPU resource creation or upload failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A pixel format was requested that the backend cannot use for that purpose
    #[error("Unsupported pixel format {format:?}: {reason}")]
    UnsupportedFormat {
        /// Requested format
        format: PixelFormat,
        /// Why it was refused
        reason: String,
    },

    /// Shader stage compilation failed; carries the driver's info log
    #[error("Failed to compile {stage} shader '{path}': {log}")]
    ShaderCompile {
        /// Stage name ("vertex" or "fragment")
        stage: &'static str,
        /// Logical source path
        path: String,
        /// Driver diagnostic text
        log: String,
    },

    /// Program link failed; carries the driver's info log
    #[error("Failed to link program '{name}': {log}")]
    ProgramLink {
        /// Friendly shader-mode name
        name: String,
        /// Driver diagnostic text
        log: String,
    },

    /// A uniform block did not match the pipeline's shader mode
    #[error("Uniform block {found} cannot be applied to a {expected} pipeline")]
    UniformBlockMismatch {
        /// Block kind expected by the pipeline
        expected: String,
        /// Block kind that was supplied
        found: String,
    },

    /// Asset lookup or decode failure
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Configuration file failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Software block compression failed
    #[error("Compression to {format:?} failed: {reason}")]
    Compression {
        /// Target block format
        format: PixelFormat,
        /// Failure description
        reason: String,
    },

    /// A buffer was uploaded more than once within a single frame (debug builds)
    #[error("Buffer {buffer} was already updated in frame {frame}")]
    BufferUpdatedTwice {
        /// Backend id of the buffer
        buffer: u64,
        /// Frame stamp at which both updates happened
        frame: u64,
    },

    /// Invalid use of an API object (out-of-range update, wrong layer, ...)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Precondition that only fails in a misconfigured build
    #[error("Logic error: {0}")]
    LogicError(String),

    /// The active backend does not implement the operation
    #[error("Unsupported by this backend: {0}")]
    Unsupported(String),

    /// Backend-specific failure wrapped in a generic form
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for graphics operations
pub type RenderResult<T> = Result<T, RenderError>;
