//! Shared test utilities for the stacks test suite.
//!
//! Provides fixture setup and lookup helpers that work with the scan and
//! process manifests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let manifest = scan(tmp.path()).unwrap();
//!
//! let rust = find_entry(&manifest, "rust");
//! assert_eq!(rust.stack, "Rust");
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::process::ProcessedManifest;
use crate::scan::Manifest;
use crate::types::{ContentEntry, DirectoryEntry, RenderedEntry};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/content/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// Manifest lookups: panic with a clear message on miss
// =========================================================================

/// Find a scanned note by slug. Panics if not found.
pub fn find_entry<'a>(manifest: &'a Manifest, slug: &str) -> &'a ContentEntry {
    manifest
        .entries
        .iter()
        .find(|e| e.slug == slug)
        .unwrap_or_else(|| {
            let slugs = entry_slugs(manifest);
            panic!("entry '{slug}' not found. Available: {slugs:?}")
        })
}

/// Find a scanned folder by id. Panics if not found.
pub fn find_directory<'a>(manifest: &'a Manifest, id: &str) -> &'a DirectoryEntry {
    manifest
        .directories
        .iter()
        .find(|d| d.id == id)
        .unwrap_or_else(|| {
            let ids: Vec<&str> = manifest.directories.iter().map(|d| d.id.as_str()).collect();
            panic!("directory '{id}' not found. Available: {ids:?}")
        })
}

/// Find a rendered note by slug. Panics if not found.
pub fn find_rendered<'a>(manifest: &'a ProcessedManifest, slug: &str) -> &'a RenderedEntry {
    manifest
        .entries
        .iter()
        .find(|e| e.slug == slug)
        .unwrap_or_else(|| {
            let slugs: Vec<&str> = manifest.entries.iter().map(|e| e.slug.as_str()).collect();
            panic!("rendered entry '{slug}' not found. Available: {slugs:?}")
        })
}

// =========================================================================
// Bulk extractors
// =========================================================================

/// All note slugs in scan order.
pub fn entry_slugs(manifest: &Manifest) -> Vec<&str> {
    manifest.entries.iter().map(|e| e.slug.as_str()).collect()
}

/// Build a rendered note without going through the pipeline.
pub fn rendered_entry(slug: &str, draft: Option<bool>) -> RenderedEntry {
    let relative_directory = slug.to_string();
    RenderedEntry {
        slug: slug.to_string(),
        stack: "Rust".to_string(),
        title: format!("{slug} title"),
        date: "2024-03-09T10:15:00.000Z".to_string(),
        draft,
        source_path: format!("{relative_directory}/index.md"),
        relative_directory,
        html: "<p>Body</p>".to_string(),
        table_of_contents: String::new(),
        toc: vec![],
        time_to_read: 1,
    }
}
