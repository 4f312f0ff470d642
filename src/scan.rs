//! Filesystem scanning and manifest generation.
//!
//! Stage 1 of the Stacks build pipeline. Walks the content root to discover
//! notes and the folders that hold them, producing a manifest that subsequent
//! stages consume.
//!
//! ## Directory Structure
//!
//! ```text
//! content/                         # Content root
//! ├── config.toml                  # Site configuration (optional)
//! ├── assets/                      # Copied verbatim to the output root
//! │   ├── icon.png                 # Nav brand icon (optional)
//! │   └── icon_brand.png           # Home page banner (optional)
//! ├── rust/
//! │   ├── index.md                 # Note with slug "rust"
//! │   ├── ownership.svg            # Attachment, copied next to the page
//! │   ├── 0_basics/
//! │   │   └── index.md             # Nested note, listed in the "rust" menu
//! │   └── 1_ownership/
//! │       └── index.md
//! └── go/
//!     └── index.md
//! ```
//!
//! ## Front Matter
//!
//! Every note may start with a YAML block:
//!
//! ```text
//! ---
//! slug: rust
//! stack: Rust
//! title: Rust Notes
//! date: 2024-03-09T10:15:00.000Z
//! draft: false
//! ---
//! ```
//!
//! Missing fields fall back to the file layout: `slug` is the folder path
//! (plus the file stem unless it is `index`), `title` is the first `# `
//! heading, `stack` is the top-level folder name as a label. `draft` has no
//! fallback; a note without it never shows up in the books index.
//!
//! ## Validation
//!
//! - Front matter must be valid YAML
//! - Slugs are unique across the whole content tree
//! - Slug segments are never empty, `.` or `..`, and hold no `\`

use crate::config::{self, SiteConfig};
use crate::naming::title_case;
use crate::types::{ContentEntry, DirectoryEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid front matter in {path}: {message}")]
    InvalidFrontMatter { path: PathBuf, message: String },
    #[error("Duplicate slug '{slug}' in {first} and {second}")]
    DuplicateSlug {
        slug: String,
        first: String,
        second: String,
    },
    #[error("Invalid slug '{slug}' in {path}: segments must not be empty, '.' or '..', or contain '\\'")]
    InvalidSlug { path: PathBuf, slug: String },
}

/// Manifest output from the scan stage.
#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ContentEntry>,
    pub directories: Vec<DirectoryEntry>,
    /// Non-markdown files inside note folders, relative to the content root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub config: SiteConfig,
}

/// Root-level names that never hold notes.
const SKIPPED_ROOT_NAMES: &[&str] = &["assets", "config.toml", "dist", "processed", "manifest.json"];

/// Raw front matter as written by the author. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrontMatter {
    slug: Option<String>,
    stack: Option<String>,
    title: Option<String>,
    date: Option<serde_yaml::Value>,
    draft: Option<bool>,
}

pub fn scan(root: &Path) -> Result<Manifest, ScanError> {
    let mut entries = Vec::new();
    let mut directories = Vec::new();
    let mut attachments = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    for item in walker {
        let item = item?;
        if item.depth() == 0 {
            continue;
        }
        let rel = relative_path(root, item.path());

        if item.file_type().is_dir() {
            directories.push(DirectoryEntry {
                name: item.file_name().to_string_lossy().to_string(),
                relative_directory: parent_of(&rel),
                id: rel,
            });
        } else if is_markdown(item.path()) {
            entries.push(parse_entry(item.path(), &rel)?);
        } else if item.depth() > 1 {
            attachments.push(rel);
        }
    }

    check_unique_slugs(&entries)?;

    // Load site config (uses defaults if config.toml doesn't exist)
    let config = config::load_config(root)?;

    Ok(Manifest {
        entries,
        directories,
        attachments,
        config,
    })
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.depth() == 1 && SKIPPED_ROOT_NAMES.contains(&name.as_ref()))
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Forward-slash path of `path` below `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_of(rel: &str) -> String {
    rel.rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default()
}

fn parse_entry(path: &Path, rel: &str) -> Result<ContentEntry, ScanError> {
    let content = fs::read_to_string(path)?;
    let (yaml, body) = split_front_matter(&content);

    let front: FrontMatter = match yaml.map(str::trim) {
        Some(yaml) if !yaml.is_empty() => {
            serde_yaml::from_str(yaml).map_err(|e| ScanError::InvalidFrontMatter {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        }
        _ => FrontMatter::default(),
    };

    let relative_directory = parent_of(rel);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let slug = front
        .slug
        .map(|s| s.trim_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_slug(&relative_directory, &stem));
    if !is_valid_slug(&slug) {
        return Err(ScanError::InvalidSlug {
            path: path.to_path_buf(),
            slug,
        });
    }

    let title = front
        .title
        .or_else(|| first_heading(body))
        .unwrap_or_else(|| title_case(slug.rsplit('/').next().unwrap_or(&slug)));

    let stack = front.stack.unwrap_or_else(|| {
        match relative_directory.split('/').next() {
            Some(top) if !top.is_empty() => title_case(top),
            _ => title.clone(),
        }
    });

    Ok(ContentEntry {
        slug,
        stack,
        title,
        date: front.date.as_ref().map(scalar_to_string).unwrap_or_default(),
        draft: front.draft,
        relative_directory,
        source_path: rel.to_string(),
        body: body.to_string(),
    })
}

/// Split `---` delimited front matter from the body.
///
/// Returns `(None, content)` when the file does not open with a delimiter
/// line or the block is never closed.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

fn default_slug(relative_directory: &str, stem: &str) -> String {
    match (relative_directory.is_empty(), stem == "index") {
        (false, true) => relative_directory.to_string(),
        (false, false) => format!("{relative_directory}/{stem}"),
        (true, _) => stem.to_string(),
    }
}

/// A slug becomes `books/<slug>/` under the output directory, so every
/// segment must be a plain name.
fn is_valid_slug(slug: &str) -> bool {
    !slug.contains('\\')
        && slug
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."))
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches("# ").trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Dates may be written as strings or bare scalars.
fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn check_unique_slugs(entries: &[ContentEntry]) -> Result<(), ScanError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for entry in entries {
        if let Some(first) = seen.insert(&entry.slug, &entry.source_path) {
            return Err(ScanError::DuplicateSlug {
                slug: entry.slug.clone(),
                first: first.to_string(),
                second: entry.source_path.clone(),
            });
        }
    }
    Ok(())
}
