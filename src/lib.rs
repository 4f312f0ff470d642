//! # Stacks
//!
//! A notebook site for learning notes. Folders of markdown become "books":
//! each top-level folder is a subject, its subfolders make up the side menu,
//! and every published note gets its own page in a notebook layout.
//!
//! # Architecture: Three-Stage Pipeline
//!
//! Stacks processes content through three independent stages, each producing
//! output the next stage consumes:
//!
//! ```text
//! 1. Scan      content/  →  manifest.json    (filesystem + front matter → entries)
//! 2. Process   manifest  →  processed/       (markdown → html, toc, reading time)
//! 3. Generate  manifest  →  dist/            (route table → html site)
//! ```
//!
//! `stacks serve` runs scan and process in memory and answers requests from
//! the same route table, with the login gate in front of note pages.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Stage 1: walks the content directory, reads front matter, produces the scan manifest |
//! | [`process`] | Stage 2: renders every note body in parallel, with a content-addressed cache |
//! | [`generate`] | Stage 3: route table and page rendering with Maud; writes the static site |
//! | [`serve`] | Local server: routes, sessions and the hosted-login round trip |
//! | [`auth`] | Login gate decision, nav affordance, PKCE login against the identity provider |
//! | [`catalog`] | Which notes are books, and their cover colours |
//! | [`menu`] | Groups folders into per-parent menu sections |
//! | [`markdown`] | Markdown to HTML: heading ids, permalinks, code titles, video embeds, toc |
//! | [`cache`] | Render cache keyed by body and renderer hashes |
//! | [`config`] | `config.toml` loading, env overrides, validation and colour CSS |
//! | [`types`] | Entries and folders shared between stages |
//! | [`naming`] | Folder-name to display-title conversion |
//! | [`output`] | CLI output formatting for every stage |
//!
//! # Design Decisions
//!
//! ## Front Matter Is Optional
//!
//! A note needs no front matter at all. The slug follows the file layout, the
//! title falls back to the first `#` heading and then the folder name, and the
//! stack comes from the top-level folder. Only `draft: false` is ever required,
//! and only to put a note on the shelf.
//!
//! ## Maud Over Template Engines
//!
//! HTML is generated with [Maud](https://maud.lambda.xyz/), so malformed
//! markup is a build error and all interpolation is escaped. Rendered note
//! bodies are the only pre-escaped input.
//!
//! ## Gated Notes Are Never Written
//!
//! With `[auth]` configured, note pages exist only behind `stacks serve`.
//! `generate` still writes the public pages but leaves every note page and
//! attachment out of `dist/`, so nothing gated can leak through static hosting.

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod generate;
pub mod markdown;
pub mod menu;
pub mod naming;
pub mod output;
pub mod process;
pub mod scan;
pub mod serve;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
