//! Menu labels from underscore-delimited folder names.
//!
//! Note folders are named `N_words_like_this`: an optional numeric prefix
//! controls the order on disk, underscores separate words. Navigation shows
//! them as title-cased labels with the ordering digits removed:
//!
//! - `0_c` → "C#" (legacy alias, the folder predates `#` in names)
//! - `2_ai_basics` → "AI Basics"
//! - `data_structures` → "Data Structures"
//! - `1_llm_and_nlp` → "LLM And NLP"

/// Words that are always shown fully upper-cased.
const ACRONYMS: &[&str] = &["ai", "llm", "nlp"];

/// Folder name that is displayed as `c#`.
const CSHARP_ALIAS: &str = "0_c";

/// Convert a folder/file slug into a display label.
///
/// Every digit is stripped, not only the ordering prefix, so `web3_apis`
/// becomes "Web Apis". Never fails; empty input gives an empty label.
pub fn title_case(slug: &str) -> String {
    let slug = if slug == CSHARP_ALIAS { "c#" } else { slug };

    slug.split('_')
        .map(capitalize_word)
        .map(|word| word.chars().filter(|c| !c.is_ascii_digit()).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn capitalize_word(word: &str) -> String {
    if ACRONYMS.iter().any(|a| a.eq_ignore_ascii_case(word)) {
        return word.to_uppercase();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
