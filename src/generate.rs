//! HTML site generation.
//!
//! Stage 3 of the Stacks build pipeline. Takes the processed manifest, builds
//! the [`RouteTable`] and writes one HTML file per route.
//!
//! ## Routes
//!
//! | Path              | Page                                          |
//! |-------------------|-----------------------------------------------|
//! | `/`               | Home: welcome, link to the books, banner      |
//! | `/about/`         | About: five full-screen slides                |
//! | `/books/`         | Books: one cover per published top-level note |
//! | `/books/<slug>/`  | Book: one note in the notebook layout         |
//!
//! Every note gets a route, drafts included; drafts are only left off the
//! books index. When `[auth]` is configured the note routes are gated and
//! only `stacks serve` answers them, so they are not written here.
//!
//! ## Output Structure
//!
//! ```text
//! dist/
//! ├── index.html
//! ├── about/index.html
//! ├── books/
//! │   ├── index.html
//! │   └── rust/
//! │       ├── index.html
//! │       └── ownership.svg      # Attachment copied next to its note
//! ├── assets/                    # Copied from content/assets/
//! ├── sitemap.xml
//! └── manifest.webmanifest
//! ```
//!
//! ## HTML Generation
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating.
//! Rendered note bodies and tables of contents are trusted markup from the
//! process stage; everything else is escaped.

use crate::auth::SessionView;
use crate::catalog::{self, BookCard, CoverPicker};
use crate::config::{self, SiteConfig};
use crate::menu::{self, MenuSection};
use crate::naming::title_case;
use crate::process::ProcessedManifest;
use crate::types::RenderedEntry;
use chrono::Datelike;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Route {0} points at a note that is not in the manifest")]
    MissingEntry(String),
}

const CSS_STATIC: &str = include_str!("../static/style.css");

/// Nav brand icon, relative to the content root.
pub const ICON_PATH: &str = "assets/icon.png";
/// Home page banner, relative to the content root.
pub const BRAND_PATH: &str = "assets/icon_brand.png";

// ============================================================================
// Route table
// ============================================================================

/// What a route renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Home,
    About,
    Books,
    /// Index into the processed manifest's entries.
    Book(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Absolute URL path with a trailing slash.
    pub path: String,
    pub page: Page,
    /// Needs a signed-in, allowed user.
    pub gated: bool,
}

/// Every page of the site, built once from the processed manifest.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    by_path: HashMap<String, usize>,
}

impl RouteTable {
    pub fn build(manifest: &ProcessedManifest) -> Self {
        let gated = manifest.config.auth.is_some();
        let mut routes = vec![
            Route {
                path: "/".to_string(),
                page: Page::Home,
                gated: false,
            },
            Route {
                path: "/about/".to_string(),
                page: Page::About,
                gated: false,
            },
            Route {
                path: "/books/".to_string(),
                page: Page::Books,
                gated: false,
            },
        ];
        routes.extend(manifest.entries.iter().enumerate().map(|(i, entry)| Route {
            path: book_path(&entry.slug),
            page: Page::Book(i),
            gated,
        }));

        let by_path = routes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.path.clone(), i))
            .collect();
        Self { routes, by_path }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Look up a request path. A missing trailing slash and a trailing
    /// `index.html` both resolve to the same route.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let path = path.strip_suffix("index.html").unwrap_or(path);
        let normalized = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.by_path.get(&normalized).map(|&i| &self.routes[i])
    }
}

/// URL path of a note.
pub fn book_path(slug: &str) -> String {
    format!("/books/{slug}/")
}

/// Output file for a route path: `/books/rust/` → `books/rust/index.html`.
pub fn route_file(path: &str) -> PathBuf {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("index.html")
    } else {
        Path::new(trimmed).join("index.html")
    }
}

// ============================================================================
// Site renderer
// ============================================================================

/// Optional images found under `assets/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteAssets {
    pub icon: bool,
    pub brand: bool,
}

impl SiteAssets {
    pub fn detect(source_root: &Path) -> Self {
        Self {
            icon: source_root.join(ICON_PATH).is_file(),
            brand: source_root.join(BRAND_PATH).is_file(),
        }
    }
}

/// Renders pages for one processed manifest. Shared by `generate` and
/// `serve`.
pub struct Site<'a> {
    manifest: &'a ProcessedManifest,
    css: String,
    assets: SiteAssets,
    year: i32,
}

impl<'a> Site<'a> {
    pub fn new(manifest: &'a ProcessedManifest, assets: SiteAssets) -> Self {
        Self::with_year(manifest, assets, chrono::Local::now().year())
    }

    /// Fixed copyright year, for repeatable output.
    pub fn with_year(manifest: &'a ProcessedManifest, assets: SiteAssets, year: i32) -> Self {
        let color_css = config::generate_color_css(&manifest.config.colors);
        Self {
            manifest,
            css: format!("{}\n\n{}", color_css, CSS_STATIC),
            assets,
            year,
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.manifest.config
    }

    /// Render a route. `session` drives the nav login control; `None` hides it.
    pub fn render(&self, route: &Route, session: Option<&SessionView>) -> Result<Markup, GenerateError> {
        let nav = |section: Option<&str>| {
            site_nav(
                section,
                self.assets,
                session.map(crate::auth::affordance),
            )
        };
        let site = &self.manifest.config.site;

        let markup = match route.page {
            Page::Home => base_document(
                &site.title,
                &self.css,
                self.assets,
                render_home(&self.manifest.config, self.assets, nav(None)),
            ),
            Page::About => base_document(
                &format!("{}|About", site.title),
                &self.css,
                self.assets,
                render_about(nav(None)),
            ),
            Page::Books => {
                let mut picker = CoverPicker::from_config(&self.manifest.config.catalog);
                let cards = catalog::book_cards(&self.manifest.entries, &mut picker);
                base_document(
                    &format!("{}|Books", site.title),
                    &self.css,
                    self.assets,
                    render_books(&cards, nav(None)),
                )
            }
            Page::Book(i) => {
                let entry = self
                    .manifest
                    .entries
                    .get(i)
                    .ok_or_else(|| GenerateError::MissingEntry(route.path.clone()))?;
                let sections = book_menu(self.manifest, &entry.slug);
                base_document(
                    &format!("{}|{}", site.title, entry.title),
                    &self.css,
                    self.assets,
                    render_book(entry, &sections, &site.author, self.year, nav(Some(&entry.stack))),
                )
            }
        };
        Ok(markup)
    }

    /// Shown while the session state is not known.
    pub fn placeholder(&self) -> Markup {
        base_document(
            &self.manifest.config.site.title,
            &self.css,
            self.assets,
            html! {
                main.placeholder {
                    div.loader { "🌀" }
                }
            },
        )
    }

    /// Plain error page, used for failed logins and missing pages.
    pub fn error_page(&self, heading: &str, detail: &str) -> Markup {
        base_document(
            &format!("{}|{}", self.manifest.config.site.title, heading),
            &self.css,
            self.assets,
            html! {
                (site_nav(None, self.assets, None))
                main.error-page {
                    h1 { (heading) }
                    p { (detail) }
                    p { a href="/" { "Back home" } }
                }
            },
        )
    }
}

/// Menu for a note: the folders directly inside the note's slug.
pub fn book_menu(manifest: &ProcessedManifest, slug: &str) -> Vec<MenuSection> {
    let dirs: Vec<_> = manifest
        .directories
        .iter()
        .filter(|d| d.relative_directory == slug)
        .cloned()
        .collect();
    menu::order_sections(menu::to_section_menu(&menu::order_directories(dirs)))
}

// ============================================================================
// HTML Components
// ============================================================================

/// Renders the base HTML document structure
fn base_document(title: &str, css: &str, assets: SiteAssets, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                link rel="manifest" href="/manifest.webmanifest";
                @if assets.icon {
                    link rel="icon" href={ "/" (ICON_PATH) };
                }
                style { (PreEscaped(css)) }
            }
            body {
                (content)
            }
        }
    }
}

/// Site navigation bar: brand, section heading, About, Books and the
/// optional login control.
pub fn site_nav(section: Option<&str>, assets: SiteAssets, affordance: Option<Markup>) -> Markup {
    html! {
        nav.navbar {
            a href="/" {
                div.cursorbox.pointer {
                    @if assets.icon {
                        img.brand src={ "/" (ICON_PATH) } alt="banner" width="50" height="50";
                    } @else {
                        span.brand { "⌂" }
                    }
                }
            }
            h1.section.font-xxl { @if let Some(section) = section { (section) } }
            span.filler {}
            ul.section {
                li { a href="/about/" title="About" { "🧑‍💻" } }
                li { a href="/books/" title="Books" { "📚" } }
                @if let Some(affordance) = affordance {
                    li { (affordance) }
                }
            }
        }
    }
}

/// Side menu for wide screens.
pub fn aside(sections: &[MenuSection], slug: &str) -> Markup {
    html! {
        aside {
            p.home { a href="../" title="Back" { "👈" } }
            @for section in sections {
                div.section {
                    ul {
                        @for item in section.menu.iter().filter(|m| !m.name.is_empty()) {
                            li { a href=(menu_href(slug, &item.name)) { (title_case(&item.name)) } }
                        }
                    }
                }
            }
        }
    }
}

/// The same menu laid out as a footer for narrow screens.
pub fn tray(sections: &[MenuSection], slug: &str) -> Markup {
    html! {
        footer.tray {
            div {
                div.tray-back { a href="../" { "👈" } }
                @for section in sections {
                    div.tray-section {
                        @for item in section.menu.iter().filter(|m| !m.name.is_empty()) {
                            div { a href=(menu_href(slug, &item.name)) { (title_case(&item.name)) } }
                        }
                    }
                }
            }
        }
    }
}

fn menu_href(slug: &str, name: &str) -> String {
    format!("/books/{slug}/{name}/")
}

// ============================================================================
// Page Renderers
// ============================================================================

fn render_home(config: &SiteConfig, assets: SiteAssets, nav: Markup) -> Markup {
    let site = &config.site;
    html! {
        div {
            (nav)
            main {
                div.home {
                    div {
                        h1.header { (site.welcome) }
                        h2 {
                            a href="/books/" { (site.title) " " (site.description) " 👉 📚" }
                        }
                        h3 { "by " (site.author) " " (site.copyright) }
                    }
                    @if assets.brand {
                        img.banner src={ "/" (BRAND_PATH) } alt="banner" width="256" height="256";
                    }
                }
            }
        }
    }
}

const ABOUT_SLIDES: [&str; 5] = ["ABOUT", "SKILLS", "WORK", "RESUME", "CONNECT"];

fn render_about(nav: Markup) -> Markup {
    html! {
        div {
            (nav)
            main {
                @for (i, heading) in ABOUT_SLIDES.iter().enumerate() {
                    @let class = match (i, i % 2 == 1) {
                        (0, _) => "slide",
                        (_, true) => "slide slide-opp slide-n",
                        (_, false) => "slide slide-n",
                    };
                    div class=(class) {
                        div.section { h4 { (heading) } }
                        @if i + 1 == ABOUT_SLIDES.len() {
                            p { "Thank you" }
                        } @else {
                            p { "Scroll Down for next slide" }
                        }
                    }
                }
            }
        }
    }
}

fn render_books(cards: &[BookCard], nav: Markup) -> Markup {
    html! {
        div {
            (nav)
            main {
                section {
                    div.books {
                        @if cards.is_empty() {
                            p { (catalog::EMPTY_CATALOG) }
                        } @else {
                            @for card in cards {
                                a href=(book_path(&card.entry.slug)) title=(card.entry.title) {
                                    div.book-wrapper {
                                        div.book {
                                            div class=(card.cover) {
                                                div.book-skin { (card.entry.stack) }
                                            }
                                            div.book-page.ruled {}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn render_book(
    entry: &RenderedEntry,
    sections: &[MenuSection],
    author: &str,
    year: i32,
    nav: Markup,
) -> Markup {
    html! {
        div.site-container {
            (nav)
            div.notebook-content {
                (aside(sections, &entry.slug))
                main {
                    div.book-container {
                        article.book-text {
                            h1 { (entry.title) }
                            cite { (entry.stack) " - " span { (entry.time_to_read) } "min read" }
                            div.toc-mobile {
                                h4 { "In this page" }
                                div { (PreEscaped(&entry.table_of_contents)) }
                            }
                            div.book-body { (PreEscaped(&entry.html)) }
                            footer.book-footer {
                                "© " (year) " " em { (author) } ". Published on " (entry.published_on())
                            }
                        }
                        div.mob {
                            div.toc {
                                h4 title="HeliCoptor View" { "🚁" }
                                div { (PreEscaped(&entry.table_of_contents)) }
                            }
                        }
                    }
                }
            }
            (tray(sections, &entry.slug))
        }
    }
}

// ============================================================================
// Side outputs
// ============================================================================

/// `sitemap.xml` listing every public page. Gated notes and drafts are left
/// out.
pub fn render_sitemap(manifest: &ProcessedManifest, routes: &RouteTable) -> String {
    let base = manifest.config.site.site_url.trim_end_matches('/');
    let listed = routes.routes().iter().filter(|r| match r.page {
        Page::Book(i) => {
            !r.gated
                && manifest
                    .entries
                    .get(i)
                    .map(|e| e.is_published())
                    .unwrap_or(false)
        }
        _ => true,
    });
    let body = html! {
        urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9" {
            @for route in listed {
                url { loc { (base) (route.path) } }
            }
        }
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n",
        body.into_string()
    )
}

/// `manifest.webmanifest` for installing the site.
pub fn render_webmanifest(config: &SiteConfig, assets: SiteAssets) -> serde_json::Value {
    let mut manifest = serde_json::json!({
        "name": format!("{} {}", config.site.title, config.site.description),
        "short_name": config.site.title,
        "start_url": "/",
        "display": "standalone",
        "background_color": config.colors.light.background,
        "theme_color": config.colors.light.accent,
    });
    if assets.icon {
        manifest["icons"] = serde_json::json!([{
            "src": format!("/{ICON_PATH}"),
            "type": "image/png",
        }]);
    }
    manifest
}

// ============================================================================
// Stage entry point
// ============================================================================

/// What was written, for the CLI report.
#[derive(Debug, Default)]
pub struct GenerateReport {
    /// `(route path, output file)` per written page, in route order.
    pub pages: Vec<(String, String)>,
    /// Gated note routes left to `serve`.
    pub gated: usize,
    pub attachments: usize,
    pub assets: usize,
}

pub fn generate(
    manifest_path: &Path,
    output_dir: &Path,
    source_root: &Path,
) -> Result<GenerateReport, GenerateError> {
    let manifest_content = fs::read_to_string(manifest_path)?;
    let manifest: ProcessedManifest = serde_json::from_str(&manifest_content)?;
    generate_site(&manifest, output_dir, source_root)
}

/// Write every public route plus the side outputs.
pub fn generate_site(
    manifest: &ProcessedManifest,
    output_dir: &Path,
    source_root: &Path,
) -> Result<GenerateReport, GenerateError> {
    let assets = SiteAssets::detect(source_root);
    let site = Site::new(manifest, assets);
    let routes = RouteTable::build(manifest);
    let mut report = GenerateReport::default();

    fs::create_dir_all(output_dir)?;

    for route in routes.routes() {
        if route.gated {
            report.gated += 1;
            continue;
        }
        let file = route_file(&route.path);
        let target = output_dir.join(&file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, site.render(route, None)?.into_string())?;
        report
            .pages
            .push((route.path.clone(), file.to_string_lossy().to_string()));
    }

    // Attachments of gated notes stay behind the login too.
    if manifest.config.auth.is_none() {
        for rel in &manifest.attachments {
            let target = output_dir.join("books").join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source_root.join(rel), target)?;
            report.attachments += 1;
        }
    }

    let assets_dir = source_root.join("assets");
    if assets_dir.is_dir() {
        report.assets = copy_dir_recursive(&assets_dir, &output_dir.join("assets"))?;
    }

    fs::write(
        output_dir.join("sitemap.xml"),
        render_sitemap(manifest, &routes),
    )?;
    fs::write(
        output_dir.join("manifest.webmanifest"),
        serde_json::to_string_pretty(&render_webmanifest(&manifest.config, assets))?,
    )?;

    Ok(report)
}

/// Copy a directory tree, returning the number of files copied.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<usize> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copied += copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
            copied += 1;
        }
    }
    Ok(copied)
}

// ============================================================================
// Tests
// ============================================================================
