//! CLI output formatting for all pipeline stages.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Every note is shown by
//! its positional index and title first, with the source file and the facts
//! worth checking (slug, draft state, reading time) as indented context lines.
//! The output reads as an inventory of the notebook while still letting users
//! trace each line back to a file.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Notes
//! 001 Go Notes [Go]
//!     Source: go/index.md
//! 002 Concurrency [Go]
//!     Source: go/0_concurrency/index.md
//!     Nested: not listed on the shelf
//! 003 Scratch Pad [Scratch]
//!     Source: scratch/index.md
//!     Draft
//!
//! Menus
//!     go: 0_concurrency
//!     rust: 0_basics, 1_ownership
//!
//! Attachments
//!     rust/ownership.svg
//!
//! Config
//!     config.toml
//!     Login gate: dev-abc.us.auth0.com
//! ```
//!
//! ## Process
//!
//! ```text
//! Rendering 7 notes
//!     001 Go Notes
//!         Source: go/index.md
//!         1 min read, 1 heading: rendered
//! ```
//!
//! ## Generate
//!
//! ```text
//! / → index.html
//! /books/rust/ → books/rust/index.html
//!
//! Generated 7 pages, 1 attachment, 2 assets
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::generate::GenerateReport;
use crate::menu;
use crate::process::ProcessEvent;
use crate::scan::Manifest;
use crate::serve::ServeEvent;
use std::path::Path;

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// `1 heading`, `2 headings`.
fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Format a note header: positional index, title and stack.
///
/// ```text
/// 001 Rust Notes [Rust]
/// ```
fn entity_header(index: usize, title: &str, stack: &str) -> String {
    format!("{} {} [{}]", format_index(index), title, stack)
}

// ============================================================================
// Stage 1: Scan output
// ============================================================================

/// Format scan stage output showing the discovered notebook.
pub fn format_scan_output(manifest: &Manifest, source_root: &Path) -> Vec<String> {
    let mut lines = vec!["Notes".to_string()];

    if manifest.entries.is_empty() {
        lines.push("    (none)".to_string());
    }
    for (i, entry) in manifest.entries.iter().enumerate() {
        lines.push(entity_header(i + 1, &entry.title, &entry.stack));
        lines.push(format!("    Source: {}", entry.source_path));
        let default_slug = entry.relative_directory == entry.slug;
        if !default_slug {
            lines.push(format!("    Slug: {}", entry.slug));
        }
        match entry.draft {
            Some(true) => lines.push("    Draft".to_string()),
            None => lines.push("    No draft flag: not listed on the shelf".to_string()),
            Some(false) if !entry.is_top_level() => {
                lines.push("    Nested: not listed on the shelf".to_string())
            }
            Some(false) => {}
        }
    }

    let sections = menu::to_section_menu(&menu::order_directories(manifest.directories.clone()));
    let sections: Vec<_> = sections
        .into_iter()
        .filter(|s| !s.section.is_empty())
        .collect();
    if !sections.is_empty() {
        lines.push(String::new());
        lines.push("Menus".to_string());
        for section in sections {
            let names: Vec<&str> = section.menu.iter().map(|m| m.name.as_str()).collect();
            lines.push(format!("    {}: {}", section.section, names.join(", ")));
        }
    }

    if !manifest.attachments.is_empty() {
        lines.push(String::new());
        lines.push("Attachments".to_string());
        for attachment in &manifest.attachments {
            lines.push(format!("    {attachment}"));
        }
    }

    lines.push(String::new());
    lines.push("Config".to_string());
    if source_root.join("config.toml").exists() {
        lines.push("    config.toml".to_string());
    } else {
        lines.push("    (stock defaults)".to_string());
    }
    if source_root.join("assets").is_dir() {
        lines.push("    assets/".to_string());
    }
    match &manifest.config.auth {
        Some(auth) => lines.push(format!("    Login gate: {}", auth.domain)),
        None => lines.push("    Login gate: off".to_string()),
    }

    lines
}

/// Print scan output to stdout.
pub fn print_scan_output(manifest: &Manifest, source_root: &Path) {
    for line in format_scan_output(manifest, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 2: Process output
// ============================================================================

/// Format a single process progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started { total } => vec![format!("Rendering {}", plural(*total, "note"))],
        ProcessEvent::EntryRendered {
            index,
            title,
            source_path,
            time_to_read,
            headings,
            cached,
            ..
        } => vec![
            format!("    {} {}", format_index(*index), title),
            format!("        Source: {}", source_path),
            format!(
                "        {} min read, {}: {}",
                time_to_read,
                plural(*headings, "heading"),
                if *cached { "cached" } else { "rendered" }
            ),
        ],
    }
}

// ============================================================================
// Stage 3: Generate output
// ============================================================================

/// Format generate stage output: every written page, then a summary.
pub fn format_generate_output(report: &GenerateReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .pages
        .iter()
        .map(|(path, file)| format!("{} \u{2192} {}", path, file))
        .collect();

    if report.gated > 0 {
        lines.push(String::new());
        lines.push(format!(
            "Gated: {} served only by `stacks serve`",
            plural(report.gated, "note")
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "Generated {}, {}, {}",
        plural(report.pages.len(), "page"),
        plural(report.attachments, "attachment"),
        plural(report.assets, "asset")
    ));
    lines
}

/// Print generate output to stdout.
pub fn print_generate_output(report: &GenerateReport) {
    for line in format_generate_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Serve output
// ============================================================================

pub fn format_serve_event(event: &ServeEvent) -> Vec<String> {
    match event {
        ServeEvent::Listening {
            addr,
            requested_port,
            gated,
        } => {
            let mut lines = vec![format!("Serving http://{}", addr)];
            if let Some(port) = requested_port {
                lines.push(format!("    port {} in use, using {} instead", port, addr.port()));
            }
            lines.push(format!(
                "    Login gate: {}",
                if *gated { "on" } else { "off" }
            ));
            lines.push("    Press Ctrl+C to stop".to_string());
            lines
        }
        ServeEvent::Request {
            method,
            path,
            status,
        } => vec![format!("{} {} {}", status, method, path)],
        ServeEvent::RequestFailed { path, message } => {
            vec![format!("request error: {}: {}", path, message)]
        }
        ServeEvent::ShuttingDown => vec!["Shutting down...".to_string()],
    }
}

pub fn print_serve_event(event: &ServeEvent) {
    for line in format_serve_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, SiteConfig};
    use crate::scan;
    use crate::test_helpers::*;
    use crate::types::{ContentEntry, DirectoryEntry};
    use std::net::SocketAddr;
    use tempfile::TempDir;

    fn entry(slug: &str, dir: &str, draft: Option<bool>) -> ContentEntry {
        ContentEntry {
            slug: slug.to_string(),
            stack: "Rust".to_string(),
            title: format!("{slug} title"),
            date: String::new(),
            draft,
            relative_directory: dir.to_string(),
            source_path: format!("{dir}/index.md"),
            body: String::new(),
        }
    }

    fn manifest(entries: Vec<ContentEntry>) -> Manifest {
        Manifest {
            entries,
            directories: vec![],
            attachments: vec![],
            config: SiteConfig::default(),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn format_index_padding() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "note"), "1 note");
        assert_eq!(plural(0, "note"), "0 notes");
        assert_eq!(plural(3, "page"), "3 pages");
    }

    // =========================================================================
    // Scan
    // =========================================================================

    #[test]
    fn scan_output_lists_notes_with_state() {
        let m = manifest(vec![
            entry("rust", "rust", Some(false)),
            entry("scratch", "scratch", Some(true)),
            entry("ideas", "ideas", None),
            entry("rust/0_basics", "rust/0_basics", Some(false)),
        ]);
        let tmp = TempDir::new().unwrap();
        let lines = format_scan_output(&m, tmp.path());

        assert_eq!(lines[0], "Notes");
        assert_eq!(lines[1], "001 rust title [Rust]");
        assert_eq!(lines[2], "    Source: rust/index.md");
        assert_eq!(lines[3], "002 scratch title [Rust]");
        assert_eq!(lines[5], "    Draft");
        assert!(lines.contains(&"    No draft flag: not listed on the shelf".to_string()));
        assert!(lines.contains(&"    Nested: not listed on the shelf".to_string()));
        assert!(lines.contains(&"    (stock defaults)".to_string()));
        assert!(lines.contains(&"    Login gate: off".to_string()));
    }

    #[test]
    fn scan_output_shows_custom_slug() {
        let m = manifest(vec![entry("rust-intro", "rust", Some(false))]);
        let tmp = TempDir::new().unwrap();
        let lines = format_scan_output(&m, tmp.path());
        assert!(lines.contains(&"    Slug: rust-intro".to_string()));
    }

    #[test]
    fn scan_output_menus_skip_root() {
        let mut m = manifest(vec![]);
        m.directories = vec![
            DirectoryEntry {
                id: "rust".into(),
                name: "rust".into(),
                relative_directory: String::new(),
            },
            DirectoryEntry {
                id: "rust/1_ownership".into(),
                name: "1_ownership".into(),
                relative_directory: "rust".into(),
            },
            DirectoryEntry {
                id: "rust/0_basics".into(),
                name: "0_basics".into(),
                relative_directory: "rust".into(),
            },
        ];
        let tmp = TempDir::new().unwrap();
        let lines = format_scan_output(&m, tmp.path());
        assert!(lines.contains(&"Menus".to_string()));
        assert!(lines.contains(&"    rust: 0_basics, 1_ownership".to_string()));
        assert!(lines.contains(&"    (none)".to_string()));
    }

    #[test]
    fn scan_output_for_fixtures() {
        let tmp = setup_fixtures();
        let m = scan::scan(tmp.path()).unwrap();
        let lines = format_scan_output(&m, tmp.path());

        assert!(lines.contains(&"Attachments".to_string()));
        assert!(lines.contains(&"    rust/ownership.svg".to_string()));
        assert!(lines.contains(&"    config.toml".to_string()));
        assert!(lines.iter().any(|l| l.ends_with("Rust Notes [Rust]")));
    }

    #[test]
    fn scan_output_shows_gate_domain() {
        let mut m = manifest(vec![]);
        m.config.auth = Some(AuthConfig {
            domain: "dev-abc.us.auth0.com".into(),
            client_id: "id".into(),
            allowed_family_name: "Rustagi".into(),
        });
        let tmp = TempDir::new().unwrap();
        let lines = format_scan_output(&m, tmp.path());
        assert!(lines.contains(&"    Login gate: dev-abc.us.auth0.com".to_string()));
    }

    // =========================================================================
    // Process
    // =========================================================================

    #[test]
    fn process_started_line() {
        let lines = format_process_event(&ProcessEvent::Started { total: 7 });
        assert_eq!(lines, vec!["Rendering 7 notes"]);
    }

    #[test]
    fn process_entry_lines() {
        let event = ProcessEvent::EntryRendered {
            index: 1,
            title: "Rust Notes".into(),
            slug: "rust".into(),
            source_path: "rust/index.md".into(),
            time_to_read: 4,
            headings: 1,
            cached: true,
        };
        assert_eq!(
            format_process_event(&event),
            vec![
                "    001 Rust Notes",
                "        Source: rust/index.md",
                "        4 min read, 1 heading: cached",
            ]
        );
    }

    // =========================================================================
    // Generate
    // =========================================================================

    #[test]
    fn generate_output_lists_pages_and_summary() {
        let report = GenerateReport {
            pages: vec![
                ("/".into(), "index.html".into()),
                ("/books/rust/".into(), "books/rust/index.html".into()),
            ],
            gated: 0,
            attachments: 1,
            assets: 2,
        };
        let lines = format_generate_output(&report);
        assert_eq!(lines[0], "/ → index.html");
        assert_eq!(lines[1], "/books/rust/ → books/rust/index.html");
        assert_eq!(
            lines.last().unwrap(),
            "Generated 2 pages, 1 attachment, 2 assets"
        );
        assert!(!lines.iter().any(|l| l.starts_with("Gated")));
    }

    #[test]
    fn generate_output_mentions_gated_notes() {
        let report = GenerateReport {
            gated: 3,
            ..GenerateReport::default()
        };
        let lines = format_generate_output(&report);
        assert!(lines.contains(&"Gated: 3 notes served only by `stacks serve`".to_string()));
    }

    // =========================================================================
    // Serve
    // =========================================================================

    #[test]
    fn serve_listening_lines() {
        let addr: SocketAddr = "127.0.0.1:8001".parse().unwrap();
        let lines = format_serve_event(&ServeEvent::Listening {
            addr,
            requested_port: Some(8000),
            gated: true,
        });
        assert_eq!(lines[0], "Serving http://127.0.0.1:8001");
        assert_eq!(lines[1], "    port 8000 in use, using 8001 instead");
        assert_eq!(lines[2], "    Login gate: on");
    }

    #[test]
    fn serve_request_line() {
        let lines = format_serve_event(&ServeEvent::Request {
            method: "GET".into(),
            path: "/books/".into(),
            status: 200,
        });
        assert_eq!(lines, vec!["200 GET /books/"]);
    }
}
