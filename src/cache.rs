//! Render cache for incremental builds.
//!
//! Markdown rendering is cheap per note but a large notebook re-renders
//! hundreds of bodies on every build. This module lets the process stage
//! reuse the previous output when neither the note body nor the renderer
//! configuration changed since the last build.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by slug or file path. Moving a note
//! to another folder or changing its slug does not invalidate its entry;
//! only an edit to the body or a renderer change does.
//!
//! - **`source_hash`**: SHA-256 of the markdown body (front matter excluded,
//!   so editing a title or date never forces a re-render).
//! - **`params_hash`**: SHA-256 of
//!   [`params_fingerprint`](crate::markdown::params_fingerprint). Any change
//!   to the rewrite rules changes it.
//!
//! ## Storage
//!
//! The cache is a JSON file at `<processed_dir>/.render-cache.json`, next to
//! the processed manifest.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `process`, `build` or `serve`. This starts from an
//! empty cache, so every note is rendered again and the file is rewritten.

use crate::markdown::RenderedMarkdown;
use crate::types::TocEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache file within the processed directory.
const CACHE_FILENAME: &str = ".render-cache.json";

/// Version of the cache format. Bump this to invalidate all existing caches
/// when the format or key computation changes.
const CACHE_VERSION: u32 = 1;

/// Stored output of one render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedRender {
    pub html: String,
    pub table_of_contents: String,
    #[serde(default)]
    pub toc: Vec<TocEntry>,
    pub time_to_read: u32,
}

impl From<RenderedMarkdown> for CachedRender {
    fn from(r: RenderedMarkdown) -> Self {
        Self {
            html: r.html,
            table_of_contents: r.table_of_contents,
            toc: r.toc,
            time_to_read: r.time_to_read,
        }
    }
}

impl From<CachedRender> for RenderedMarkdown {
    fn from(c: CachedRender) -> Self {
        Self {
            html: c.html,
            table_of_contents: c.table_of_contents,
            toc: c.toc,
            time_to_read: c.time_to_read,
        }
    }
}

/// On-disk render cache, keyed by `"{source_hash}:{params_hash}"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderCache {
    pub version: u32,
    pub entries: HashMap<String, CachedRender>,
}

impl RenderCache {
    /// Create an empty cache (used for `--no-cache` or first build).
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: HashMap::new(),
        }
    }

    /// Load from the processed directory. Returns an empty cache if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(processed_dir: &Path) -> Self {
        let content = match std::fs::read_to_string(cache_path(processed_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let cache: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        if cache.version != CACHE_VERSION {
            return Self::empty();
        }
        cache
    }

    /// Save to the processed directory.
    pub fn save(&self, processed_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(cache_path(processed_dir), json)
    }

    pub fn get(&self, source_hash: &str, params_hash: &str) -> Option<&CachedRender> {
        self.entries.get(&content_key(source_hash, params_hash))
    }

    pub fn insert(&mut self, source_hash: &str, params_hash: &str, render: CachedRender) {
        self.entries
            .insert(content_key(source_hash, params_hash), render);
    }

    /// Drop every entry not in `live`. Keeps the file from growing with
    /// bodies that no longer exist.
    pub fn retain_keys(&mut self, live: &[(String, String)]) {
        let keep: std::collections::HashSet<String> =
            live.iter().map(|(s, p)| content_key(s, p)).collect();
        self.entries.retain(|key, _| keep.contains(key));
    }
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{source_hash}:{params_hash}")
}

/// SHA-256 of a note body, returned as a hex string.
pub fn hash_source(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}

/// SHA-256 of the renderer parameters.
pub fn hash_params(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"markdown\0");
    hasher.update(fingerprint.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.misses)
        }
    }
}

/// Resolve the cache file path for a processed directory.
pub fn cache_path(processed_dir: &Path) -> PathBuf {
    processed_dir.join(CACHE_FILENAME)
}
