//! Section menus for the note reading layout.
//!
//! A note page lists the folders directly below it. The folders arrive as a
//! flat list of [`DirectoryEntry`] values and are grouped by their parent
//! folder into [`MenuSection`]s:
//!
//! ```text
//! rust/0_basics      ─┐
//! rust/1_ownership   ─┼─▶  section "rust": [0_basics, 1_ownership, 2_traits]
//! rust/2_traits      ─┘
//! ```
//!
//! Ordering is kept exactly as the site has always shown it: folders sorted by
//! name, then a numeric pass that only reorders when every name is a number,
//! then grouping by first appearance. Sections themselves are never reordered.

use crate::types::DirectoryEntry;
use serde::Serialize;
use std::collections::HashMap;

/// One link in a section menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
}

/// Menu entries sharing the same parent folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuSection {
    pub section: String,
    pub menu: Vec<MenuItem>,
}

/// Group directory entries into sections keyed by `relative_directory`.
///
/// Sections appear in the order their key is first seen; entries keep input
/// order within a section.
pub fn to_section_menu(entries: &[DirectoryEntry]) -> Vec<MenuSection> {
    let mut sections: Vec<MenuSection> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        let pos = *index
            .entry(entry.relative_directory.as_str())
            .or_insert_with(|| {
                sections.push(MenuSection {
                    section: entry.relative_directory.clone(),
                    menu: Vec::new(),
                });
                sections.len() - 1
            });
        sections[pos].menu.push(MenuItem {
            id: entry.id.clone(),
            name: entry.name.clone(),
        });
    }

    sections
}

/// Order folder entries the way the reading layout lists them.
///
/// Names are sorted ascending first. A second pass compares names as numbers;
/// it only has an effect when every name is numeric, otherwise the comparison
/// is undefined for some pair and the name order stands.
pub fn order_directories(mut entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let numbers: Option<Vec<f64>> = entries.iter().map(|e| numeric_name(&e.name)).collect();
    if let Some(numbers) = numbers {
        let mut keyed: Vec<(f64, DirectoryEntry)> = numbers.into_iter().zip(entries).collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        return keyed.into_iter().map(|(_, e)| e).collect();
    }
    entries
}

/// Sections keep the grouper's order.
///
/// Sections carry no comparable key, so the historical comparator never
/// ordered anything. Kept as a named step so the render path reads the same
/// as the data it mirrors.
pub fn order_sections(sections: Vec<MenuSection>) -> Vec<MenuSection> {
    sections
}

fn numeric_name(name: &str) -> Option<f64> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
