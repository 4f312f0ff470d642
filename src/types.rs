//! Shared types used across all pipeline stages.
//!
//! These types are serialized to JSON between stages (scan → process → generate)
//! and must be identical across all three modules.

use serde::{Deserialize, Serialize};

/// One markdown note as discovered by the scan stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    /// URL path segment under `/books/`. Unique across the site.
    pub slug: String,
    /// Category label shown on the book cover and as the page section.
    pub stack: String,
    pub title: String,
    /// Publication date as written in front matter. Only the first ten
    /// characters are ever displayed.
    #[serde(default)]
    pub date: String,
    /// `Some(false)` is the only published state. A note without a `draft`
    /// key stays out of the catalog.
    #[serde(default)]
    pub draft: Option<bool>,
    /// Directory of the markdown file relative to the content root
    /// (`""` for files at the root).
    pub relative_directory: String,
    /// Markdown file path relative to the content root.
    pub source_path: String,
    /// Markdown body with the front matter removed.
    pub body: String,
}

impl ContentEntry {
    pub fn is_published(&self) -> bool {
        self.draft == Some(false)
    }

    /// Top-level notes live directly in a content folder, not nested deeper.
    pub fn is_top_level(&self) -> bool {
        !self.relative_directory.contains('/')
    }
}

/// A content-bearing folder, used only to build navigation menus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Path relative to the content root; unique.
    pub id: String,
    /// Raw folder name, e.g. `2_ai_basics`.
    pub name: String,
    /// Parent folder relative to the content root (`""` for top-level folders).
    pub relative_directory: String,
}

/// A heading captured for the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Heading level, 1-6.
    pub level: u8,
    pub title: String,
    /// Anchor id assigned to the heading in the rendered markup.
    pub id: String,
}

/// A note after markdown rendering (output of the process stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedEntry {
    pub slug: String,
    pub stack: String,
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub draft: Option<bool>,
    pub relative_directory: String,
    pub source_path: String,
    /// Rendered note body.
    pub html: String,
    /// Nested `<ul>` linking to each heading.
    pub table_of_contents: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toc: Vec<TocEntry>,
    /// Estimated reading time in whole minutes (at least 1).
    pub time_to_read: u32,
}

impl RenderedEntry {
    pub fn is_published(&self) -> bool {
        self.draft == Some(false)
    }

    pub fn is_top_level(&self) -> bool {
        !self.relative_directory.contains('/')
    }

    /// The date as shown in the footer: its first ten characters.
    pub fn published_on(&self) -> &str {
        match self.date.char_indices().nth(10) {
            Some((idx, _)) => &self.date[..idx],
            None => &self.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(date: &str, draft: Option<bool>, dir: &str) -> RenderedEntry {
        RenderedEntry {
            slug: "rust".to_string(),
            stack: "Rust".to_string(),
            title: "Rust".to_string(),
            date: date.to_string(),
            draft,
            relative_directory: dir.to_string(),
            source_path: "rust/index.md".to_string(),
            html: String::new(),
            table_of_contents: String::new(),
            toc: vec![],
            time_to_read: 1,
        }
    }

    #[test]
    fn published_on_truncates_timestamps() {
        let e = rendered("2024-03-09T10:15:00.000Z", Some(false), "rust");
        assert_eq!(e.published_on(), "2024-03-09");
    }

    #[test]
    fn published_on_keeps_short_dates() {
        assert_eq!(rendered("2024-03", None, "").published_on(), "2024-03");
        assert_eq!(rendered("", None, "").published_on(), "");
    }

    #[test]
    fn only_explicit_false_is_published() {
        assert!(rendered("", Some(false), "").is_published());
        assert!(!rendered("", Some(true), "").is_published());
        assert!(!rendered("", None, "").is_published());
    }

    #[test]
    fn nested_directories_are_not_top_level() {
        assert!(rendered("", None, "rust").is_top_level());
        assert!(rendered("", None, "").is_top_level());
        assert!(!rendered("", None, "rust/0_basics").is_top_level());
    }
}
