//! Per-file compression override table
//!
//! The override file lists data-relative texture paths that must not be
//! compressed as aggressively as the backend would otherwise allow:
//!
//! ```text
//! # comment
//! texpages/page-9-player-buildings.png=1
//! images/intfac/logo.png=0
//! ```
//!
//! Level `0` keeps the texture in its source (uncompressed) form, level `1`
//! permits only the high-quality compressed tier.

use std::collections::HashMap;

use crate::assets::AssetSource;
use crate::format::PixelFormat;

/// Maximum compression allowed for a listed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompressionLevel {
    /// Upload in the source's uncompressed form
    SameAsSource = 0,
    /// Only high-quality compressed formats (BC4/BC5/BC7/EAC)
    HighQualityOnly = 1,
}

impl CompressionLevel {
    /// Parse the numeric level used in the override file
    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(CompressionLevel::SameAsSource),
            "1" => Some(CompressionLevel::HighQualityOnly),
            _ => None,
        }
    }

    /// Combine two lookups, keeping the tighter cap (no override is loosest)
    pub fn most_restrictive(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(level), None) | (None, Some(level)) => Some(level),
            (None, None) => None,
        }
    }
}

/// Choose the compressed upload format allowed by an override
///
/// `candidates` are the supported formats in preference order. `None` means
/// upload uncompressed.
pub fn select_compressed_format(candidates: &[PixelFormat], level: Option<CompressionLevel>) -> Option<PixelFormat> {
    match level {
        None => candidates.first().copied(),
        Some(CompressionLevel::SameAsSource) => None,
        Some(CompressionLevel::HighQualityOnly) => candidates.iter().copied().find(|f| f.is_high_quality()),
    }
}

/// Parsed override file, cached by the real location it was read from
#[derive(Debug, Default)]
pub struct OverrideTable {
    entries: HashMap<String, CompressionLevel>,
    loaded_from: Option<(String, String)>,
    parse_count: usize,
}

impl OverrideTable {
    /// Empty table: nothing is overridden
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table directly from file contents
    pub fn from_text(text: &str) -> Self {
        let mut table = Self::new();
        table.entries = Self::parse(text);
        table
    }

    /// Parse override directives; malformed lines are logged and skipped
    pub fn parse(text: &str) -> HashMap<String, CompressionLevel> {
        let mut entries = HashMap::new();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                log::warn!("Compression override line {}: missing '=' in \"{}\"", line_no + 1, line);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                log::warn!("Compression override line {}: empty key or value in \"{}\"", line_no + 1, line);
                continue;
            }

            let Some(level) = CompressionLevel::from_value(value) else {
                log::warn!("Compression override line {}: invalid level \"{}\"", line_no + 1, value);
                continue;
            };

            // First directive for a path wins
            entries.entry(key.to_string()).or_insert(level);
        }
        entries
    }

    /// Load the override file at `path` through `assets`
    ///
    /// Re-parsing is skipped when the file resolves to the same real
    /// directory as the previous load. Returns whether the file was parsed.
    pub fn load(&mut self, assets: &dyn AssetSource, path: &str) -> bool {
        let Some(real_dir) = assets.real_dir(path) else {
            log::debug!("No compression override file at {}", path);
            self.clear();
            return false;
        };

        let key = (real_dir, path.to_string());
        if self.loaded_from.as_ref() == Some(&key) {
            log::trace!("Compression overrides already loaded from {}", key.0);
            return false;
        }

        match assets.read_to_string(path) {
            Ok(text) => {
                self.entries = Self::parse(&text);
                self.parse_count += 1;
                log::info!(
                    "Loaded {} compression override(s) from {}/{}",
                    self.entries.len(),
                    key.0,
                    key.1
                );
                self.loaded_from = Some(key);
                true
            }
            Err(e) => {
                log::warn!("Failed to read compression overrides {}: {}", path, e);
                self.clear();
                false
            }
        }
    }

    /// Exact, case-sensitive lookup
    pub fn lookup(&self, name: &str) -> Option<CompressionLevel> {
        self.entries.get(name).copied()
    }

    /// Most restrictive override across several files
    pub fn lookup_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Option<CompressionLevel> {
        names
            .into_iter()
            .fold(None, |acc, name| CompressionLevel::most_restrictive(acc, self.lookup(name)))
    }

    /// Drop all entries and the load cache
    pub fn clear(&mut self) {
        self.entries.clear();
        self.loaded_from = None;
    }

    /// Number of listed files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file is listed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times a file has actually been parsed
    pub fn parse_count(&self) -> usize {
        self.parse_count
    }
}
