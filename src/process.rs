//! Markdown processing.
//!
//! Stage 2 of the Stacks build pipeline. Takes the manifest from the scan
//! stage and renders every note body to HTML, alongside its table of contents
//! and reading time.
//!
//! ## Output Structure
//!
//! ```text
//! processed/
//! ├── manifest.json              # Rendered entries + directories + config
//! └── .render-cache.json         # Content-addressed render cache
//! ```
//!
//! ## Parallel Processing
//!
//! Notes are rendered in parallel using [rayon](https://docs.rs/rayon). The
//! pool size follows `processing.max_processes`; results keep the scan order.
//! Progress is reported per note through an optional [`ProcessEvent`]
//! channel so the CLI can print while workers are still running.

use crate::cache::{self, CacheStats, CachedRender, RenderCache};
use crate::config::SiteConfig;
use crate::markdown::{self, RenderedMarkdown};
use crate::scan::Manifest;
use crate::types::{ContentEntry, DirectoryEntry, RenderedEntry};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output manifest (after processing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedManifest {
    pub entries: Vec<RenderedEntry>,
    pub directories: Vec<DirectoryEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub config: SiteConfig,
}

/// Progress report for one rendered note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Started {
        total: usize,
    },
    EntryRendered {
        /// 1-based position in scan order.
        index: usize,
        title: String,
        slug: String,
        source_path: String,
        time_to_read: u32,
        headings: usize,
        cached: bool,
    },
}

/// Everything the process stage hands back to the caller.
#[derive(Debug)]
pub struct ProcessResult {
    pub manifest: ProcessedManifest,
    pub cache_stats: CacheStats,
}

/// Render the scan manifest at `manifest_path` into `output_dir`.
///
/// The caller writes the returned manifest; only the render cache is saved
/// here.
pub fn process(
    manifest_path: &Path,
    output_dir: &Path,
    use_cache: bool,
    progress: Option<Sender<ProcessEvent>>,
) -> Result<ProcessResult, ProcessError> {
    let manifest_content = std::fs::read_to_string(manifest_path)?;
    let input: Manifest = serde_json::from_str(&manifest_content)?;
    process_manifest(input, output_dir, use_cache, progress)
}

/// Render an in-memory scan manifest. Used directly by `serve`.
pub fn process_manifest(
    input: Manifest,
    output_dir: &Path,
    use_cache: bool,
    progress: Option<Sender<ProcessEvent>>,
) -> Result<ProcessResult, ProcessError> {
    std::fs::create_dir_all(output_dir)?;

    let mut render_cache = if use_cache {
        RenderCache::load(output_dir)
    } else {
        RenderCache::empty()
    };
    let params_hash = cache::hash_params(&markdown::params_fingerprint());

    if let Some(tx) = &progress {
        let _ = tx.send(ProcessEvent::Started {
            total: input.entries.len(),
        });
    }

    let rendered: Vec<(RenderedEntry, String, Option<CachedRender>)> = input
        .entries
        .par_iter()
        .enumerate()
        .map(|(i, entry)| {
            let source_hash = cache::hash_source(&entry.body);
            let (output, fresh) = match render_cache.get(&source_hash, &params_hash) {
                Some(hit) => (RenderedMarkdown::from(hit.clone()), None),
                None => {
                    let out = markdown::render(&entry.body);
                    (out.clone(), Some(CachedRender::from(out)))
                }
            };

            if let Some(tx) = &progress {
                let _ = tx.send(ProcessEvent::EntryRendered {
                    index: i + 1,
                    title: entry.title.clone(),
                    slug: entry.slug.clone(),
                    source_path: entry.source_path.clone(),
                    time_to_read: output.time_to_read,
                    headings: output.toc.len(),
                    cached: fresh.is_none(),
                });
            }

            (rendered_entry(entry, output), source_hash, fresh)
        })
        .collect();

    let mut stats = CacheStats::default();
    let mut live_keys = Vec::with_capacity(rendered.len());
    let mut entries = Vec::with_capacity(rendered.len());
    for (entry, source_hash, fresh) in rendered {
        match fresh {
            Some(render) => {
                stats.miss();
                render_cache.insert(&source_hash, &params_hash, render);
            }
            None => stats.hit(),
        }
        live_keys.push((source_hash, params_hash.clone()));
        entries.push(entry);
    }

    render_cache.retain_keys(&live_keys);
    render_cache.save(output_dir)?;

    Ok(ProcessResult {
        manifest: ProcessedManifest {
            entries,
            directories: input.directories,
            attachments: input.attachments,
            config: input.config,
        },
        cache_stats: stats,
    })
}

fn rendered_entry(entry: &ContentEntry, output: RenderedMarkdown) -> RenderedEntry {
    RenderedEntry {
        slug: entry.slug.clone(),
        stack: entry.stack.clone(),
        title: entry.title.clone(),
        date: entry.date.clone(),
        draft: entry.draft,
        relative_directory: entry.relative_directory.clone(),
        source_path: entry.source_path.clone(),
        html: output.html,
        table_of_contents: output.table_of_contents,
        toc: output.toc,
        time_to_read: output.time_to_read,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan;
    use crate::test_helpers::*;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn write_scan_manifest(content_root: &Path, temp: &Path) -> std::path::PathBuf {
        let manifest = scan::scan(content_root).unwrap();
        let path = temp.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
        path
    }

    #[test]
    fn process_renders_every_entry_in_scan_order() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let manifest_path = write_scan_manifest(content.path(), temp.path());
        let scanned = scan::scan(content.path()).unwrap();

        let result = process(&manifest_path, &temp.path().join("processed"), true, None).unwrap();

        let scanned_slugs: Vec<&str> = scanned.entries.iter().map(|e| e.slug.as_str()).collect();
        let rendered_slugs: Vec<&str> = result
            .manifest
            .entries
            .iter()
            .map(|e| e.slug.as_str())
            .collect();
        assert_eq!(rendered_slugs, scanned_slugs);
        assert_eq!(result.manifest.directories, scanned.directories);
    }

    #[test]
    fn rendered_entry_keeps_front_matter_fields() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let manifest_path = write_scan_manifest(content.path(), temp.path());

        let result = process(&manifest_path, &temp.path().join("processed"), true, None).unwrap();
        let rust = find_rendered(&result.manifest, "rust");

        assert_eq!(rust.stack, "Rust");
        assert_eq!(rust.draft, Some(false));
        assert!(rust.html.contains("<h2 id="));
        assert!(rust.table_of_contents.starts_with("<ul>"));
        assert!(!rust.toc.is_empty());
        assert!(rust.time_to_read >= 1);
    }

    #[test]
    fn second_run_hits_cache() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let manifest_path = write_scan_manifest(content.path(), temp.path());
        let out = temp.path().join("processed");

        let first = process(&manifest_path, &out, true, None).unwrap();
        assert_eq!(first.cache_stats.hits, 0);
        assert!(cache::cache_path(&out).exists());

        let second = process(&manifest_path, &out, true, None).unwrap();
        assert_eq!(second.cache_stats.misses, 0);
        assert_eq!(
            second.cache_stats.hits as usize,
            second.manifest.entries.len()
        );
        assert_eq!(
            find_rendered(&second.manifest, "rust").html,
            find_rendered(&first.manifest, "rust").html
        );
    }

    #[test]
    fn no_cache_renders_everything() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let manifest_path = write_scan_manifest(content.path(), temp.path());
        let out = temp.path().join("processed");

        process(&manifest_path, &out, true, None).unwrap();
        let again = process(&manifest_path, &out, false, None).unwrap();
        assert_eq!(again.cache_stats.hits, 0);
        assert_eq!(
            again.cache_stats.misses as usize,
            again.manifest.entries.len()
        );
    }

    #[test]
    fn edited_body_is_rendered_again() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("processed");

        let manifest_path = write_scan_manifest(content.path(), temp.path());
        process(&manifest_path, &out, true, None).unwrap();

        let note = content.path().join("go/index.md");
        let mut text = fs::read_to_string(&note).unwrap();
        text.push_str("\n\n## Added later\n");
        fs::write(&note, text).unwrap();

        let manifest_path = write_scan_manifest(content.path(), temp.path());
        let result = process(&manifest_path, &out, true, None).unwrap();
        assert_eq!(result.cache_stats.misses, 1);
        assert!(
            find_rendered(&result.manifest, "go")
                .html
                .contains("added-later")
        );
    }

    #[test]
    fn events_reported_per_entry() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let manifest_path = write_scan_manifest(content.path(), temp.path());

        let (tx, rx) = mpsc::channel();
        let result = process(&manifest_path, &temp.path().join("processed"), true, Some(tx)).unwrap();
        let events: Vec<ProcessEvent> = rx.into_iter().collect();

        assert_eq!(
            events[0],
            ProcessEvent::Started {
                total: result.manifest.entries.len()
            }
        );
        let rendered = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::EntryRendered { .. }))
            .count();
        assert_eq!(rendered, result.manifest.entries.len());
    }

    #[test]
    fn missing_manifest_is_io_error() {
        let temp = TempDir::new().unwrap();
        let result = process(
            &temp.path().join("nope.json"),
            &temp.path().join("processed"),
            true,
            None,
        );
        assert!(matches!(result, Err(ProcessError::Io(_))));
    }

    #[test]
    fn processed_manifest_roundtrips_through_json() {
        let content = setup_fixtures();
        let temp = TempDir::new().unwrap();
        let manifest_path = write_scan_manifest(content.path(), temp.path());
        let result = process(&manifest_path, &temp.path().join("processed"), true, None).unwrap();

        let json = serde_json::to_string(&result.manifest).unwrap();
        let parsed: ProcessedManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.entries.len(), result.manifest.entries.len());
        assert_eq!(parsed.config.site.title, result.manifest.config.site.title);
    }
}
