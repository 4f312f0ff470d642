//! Books index: which notes are listed and how their covers look.
//!
//! A note is a book when it is published (`draft: false`) and lives directly
//! in a top-level folder. Books are listed by slug. Each card gets one of five
//! cover colours, picked at random on every render; a configured
//! `catalog.cover_seed` makes the picks repeatable.

use crate::config::CatalogConfig;
use crate::types::RenderedEntry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Cover classes, one per colour.
pub const COVER_PALETTE: [&str; 5] = [
    "book-cover yellow",
    "book-cover purple",
    "book-cover blue",
    "book-cover",
    "book-cover green",
];

/// Shown in place of the shelf when no book is published.
pub const EMPTY_CATALOG: &str = "No Books Written";

/// Uniform picker over [`COVER_PALETTE`].
pub struct CoverPicker {
    rng: StdRng,
}

impl CoverPicker {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        match config.cover_seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn pick(&mut self) -> &'static str {
        COVER_PALETTE[self.rng.gen_range(0..COVER_PALETTE.len())]
    }
}

/// One card on the shelf.
#[derive(Debug, Clone)]
pub struct BookCard<'a> {
    pub entry: &'a RenderedEntry,
    pub cover: &'static str,
}

/// Published top-level notes, by slug ascending.
pub fn books(entries: &[RenderedEntry]) -> Vec<&RenderedEntry> {
    let mut books: Vec<&RenderedEntry> = entries
        .iter()
        .filter(|e| e.is_published())
        .filter(|e| e.is_top_level())
        .collect();
    books.sort_by(|a, b| a.slug.cmp(&b.slug));
    books
}

/// Books paired with a cover, one pick per card in shelf order.
pub fn book_cards<'a>(entries: &'a [RenderedEntry], picker: &mut CoverPicker) -> Vec<BookCard<'a>> {
    books(entries)
        .into_iter()
        .map(|entry| BookCard {
            entry,
            cover: picker.pick(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::rendered_entry;

    fn nested(slug: &str, dir: &str) -> RenderedEntry {
        let mut e = rendered_entry(slug, Some(false));
        e.relative_directory = dir.to_string();
        e
    }

    fn slugs(books: &[&RenderedEntry]) -> Vec<String> {
        books.iter().map(|b| b.slug.clone()).collect()
    }

    #[test]
    fn only_published_entries_listed() {
        let entries = vec![
            rendered_entry("rust", Some(false)),
            rendered_entry("draft", Some(true)),
            rendered_entry("unset", None),
        ];
        assert_eq!(slugs(&books(&entries)), vec!["rust"]);
    }

    #[test]
    fn nested_entries_excluded() {
        let entries = vec![
            rendered_entry("rust", Some(false)),
            nested("rust/0_basics", "rust/0_basics"),
            nested("go-intro", "go/intro"),
        ];
        assert_eq!(slugs(&books(&entries)), vec!["rust"]);
    }

    #[test]
    fn root_level_entries_are_top_level() {
        let entries = vec![nested("about", "")];
        assert_eq!(slugs(&books(&entries)), vec!["about"]);
    }

    #[test]
    fn sorted_by_slug() {
        let entries = vec![
            rendered_entry("rust", Some(false)),
            rendered_entry("go", Some(false)),
            rendered_entry("c", Some(false)),
        ];
        assert_eq!(slugs(&books(&entries)), vec!["c", "go", "rust"]);
    }

    #[test]
    fn empty_when_nothing_published() {
        let entries = vec![rendered_entry("draft", Some(true))];
        assert!(books(&entries).is_empty());
        assert!(book_cards(&entries, &mut CoverPicker::seeded(1)).is_empty());
    }

    #[test]
    fn picks_come_from_palette() {
        let mut picker = CoverPicker::from_entropy();
        for _ in 0..50 {
            assert!(COVER_PALETTE.contains(&picker.pick()));
        }
    }

    #[test]
    fn seeded_picker_repeats() {
        let mut a = CoverPicker::seeded(7);
        let mut b = CoverPicker::seeded(7);
        let first: Vec<&str> = (0..20).map(|_| a.pick()).collect();
        let second: Vec<&str> = (0..20).map(|_| b.pick()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn seeded_picker_uses_whole_palette() {
        let mut picker = CoverPicker::seeded(42);
        let mut seen: Vec<&str> = (0..500).map(|_| picker.pick()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), COVER_PALETTE.len());
    }

    #[test]
    fn one_cover_per_card() {
        let entries = vec![
            rendered_entry("go", Some(false)),
            rendered_entry("rust", Some(false)),
        ];
        let cards = book_cards(&entries, &mut CoverPicker::seeded(3));
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].entry.slug, "go");
        assert!(cards.iter().all(|c| COVER_PALETTE.contains(&c.cover)));
    }

    #[test]
    fn picker_from_config_honours_seed() {
        let config = CatalogConfig {
            cover_seed: Some(9),
        };
        let mut a = CoverPicker::from_config(&config);
        let mut b = CoverPicker::seeded(9);
        assert_eq!(a.pick(), b.pick());
    }
}
