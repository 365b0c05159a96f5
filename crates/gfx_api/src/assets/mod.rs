//! Virtual asset filesystem
//!
//! Every file the graphics layer reads (textures, shader sources, the
//! compression override table) is addressed by a `/`-separated logical path
//! and resolved through an [`AssetSource`]. Two sources are provided:
//! [`DirectorySource`] searches an ordered list of directories on disk and
//! [`MemorySource`] serves files registered in memory.

pub mod image_loader;
#[cfg(feature = "ktx2")]
pub mod ktx2;

pub use image_loader::ImageData;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found in any search root
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data in {path}: {reason}")]
    InvalidData {
        /// Logical path of the offending asset
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Unsupported asset format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image decoding error
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AssetError {
    /// Whether the error only means the file does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound(_))
    }
}

/// Read-only view of the data files available to the graphics layer
pub trait AssetSource {
    /// Read the full contents of a logical path
    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError>;

    /// Whether a logical path resolves to a file
    fn exists(&self, path: &str) -> bool;

    /// Resolved real directory that serves `path`, if the file exists
    ///
    /// Two calls returning the same value refer to the same physical file.
    fn real_dir(&self, path: &str) -> Option<String>;

    /// Read a logical path as UTF-8 text
    fn read_to_string(&self, path: &str) -> Result<String, AssetError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| AssetError::InvalidData {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Normalize a logical path: strip leading `/`, collapse `\` to `/`
fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Directory-backed asset source with prioritized search roots
#[derive(Debug, Clone, Default)]
pub struct DirectorySource {
    roots: Vec<PathBuf>,
}

impl DirectorySource {
    /// Create a source searching `roots` in order
    pub fn new<P: AsRef<Path>>(roots: &[P]) -> Self {
        Self {
            roots: roots.iter().map(|r| r.as_ref().to_path_buf()).collect(),
        }
    }

    /// Add a lower-priority search root
    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.roots.push(root.as_ref().to_path_buf());
        self
    }

    /// Search roots in priority order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn locate(&self, path: &str) -> Option<(&Path, PathBuf)> {
        let logical = normalize(path);
        self.roots.iter().find_map(|root| {
            let full = root.join(&logical);
            full.is_file().then(|| (root.as_path(), full))
        })
    }
}

impl AssetSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let (_, full) = self
            .locate(path)
            .ok_or_else(|| AssetError::NotFound(path.to_string()))?;
        log::trace!("Reading asset {} from {:?}", path, full);
        Ok(std::fs::read(full)?)
    }

    fn exists(&self, path: &str) -> bool {
        self.locate(path).is_some()
    }

    fn real_dir(&self, path: &str) -> Option<String> {
        let (root, _) = self.locate(path)?;
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Some(root.to_string_lossy().into_owned())
    }
}

/// In-memory asset source mounted under a name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    mount: String,
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// Create an empty source; `mount` is reported as the real directory
    pub fn new(mount: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            files: HashMap::new(),
        }
    }

    /// Register a file, replacing any previous contents
    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.insert(normalize(path), data.into());
    }

    /// Builder form of [`MemorySource::insert`]
    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    /// Remove a file
    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(&normalize(path))
    }

    /// Change the reported real directory
    pub fn set_mount(&mut self, mount: impl Into<String>) {
        self.mount = mount.into();
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn real_dir(&self, path: &str) -> Option<String> {
        self.exists(path).then(|| self.mount.clone())
    }
}

/// Extension of a logical path, lowercased, without the dot
pub fn extension(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Replace the extension of a logical path
pub fn with_extension(path: &str, ext: &str) -> String {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(dot) => format!("{}.{}", &path[..file_start + dot], ext),
        None => format!("{path}.{ext}"),
    }
}
