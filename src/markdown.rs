//! Markdown rendering for note bodies.
//!
//! Wraps `pulldown-cmark` with the event rewrites the reading layout relies
//! on:
//!
//! - every heading gets a slug id (duplicates suffixed `-1`, `-2`, …) and a
//!   `#` permalink anchor
//! - headings are collected into a [`TocEntry`] list and a nested `<ul>`
//! - a fence info string `lang:title=name` emits a `div.code-title` before
//!   the block
//! - inline code `` `youtube:<url>` `` becomes an embedded player
//! - a reading time estimate at 265 words per minute

use crate::types::TocEntry;
use maud::{Markup, html};
use pulldown_cmark::{
    CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html as md_html,
};
use std::collections::HashSet;

/// Reading speed used for the time-to-read estimate.
pub const WORDS_PER_MINUTE: usize = 265;

/// Embedded player size.
pub const YOUTUBE_WIDTH: u32 = 794;
pub const YOUTUBE_HEIGHT: u32 = 447;

const CODE_TITLE_MARKER: &str = ":title=";
const YOUTUBE_PREFIX: &str = "youtube:";

/// A rendered note body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMarkdown {
    pub html: String,
    /// Nested `<ul>` linking to every heading; empty when there are none.
    pub table_of_contents: String,
    pub toc: Vec<TocEntry>,
    pub time_to_read: u32,
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Identifies the renderer configuration. Part of the render cache key, so
/// changing any rewrite rule invalidates cached output.
pub fn params_fingerprint() -> String {
    format!(
        "md-v1|opts={}|wpm={WORDS_PER_MINUTE}|yt={YOUTUBE_WIDTH}x{YOUTUBE_HEIGHT}",
        options().bits()
    )
}

/// Render a markdown body.
pub fn render(markdown: &str) -> RenderedMarkdown {
    let mut parser = Parser::new_ext(markdown, options());
    let mut ids = HeadingIds::default();
    let mut toc = Vec::new();
    let mut plain = String::new();
    let mut events: Vec<Event> = Vec::new();

    while let Some(event) = parser.next() {
        match event {
            Event::Start(Tag::Heading {
                level,
                id: _,
                classes,
                attrs,
            }) => {
                let inner: Vec<Event> = parser
                    .by_ref()
                    .take_while(|ev| !matches!(ev, Event::End(TagEnd::Heading(_))))
                    .collect();
                let title = heading_text(&inner);
                let id = ids.assign(&title);

                plain.push_str(&title);
                plain.push(' ');

                events.push(Event::Start(Tag::Heading {
                    level,
                    id: Some(CowStr::from(id.clone())),
                    classes,
                    attrs,
                }));
                events.push(Event::InlineHtml(CowStr::from(
                    permalink(&id, &title).into_string(),
                )));
                events.extend(inner);
                events.push(Event::End(TagEnd::Heading(level)));

                toc.push(TocEntry {
                    level: heading_level(level),
                    title,
                    id,
                });
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let titled = info
                    .split_once(CODE_TITLE_MARKER)
                    .map(|(lang, title)| (lang.to_string(), title.trim().to_string()));
                match titled {
                    Some((lang, title)) => {
                        events.push(Event::Html(CowStr::from(code_title(&title).into_string())));
                        events.push(Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(
                            CowStr::from(lang),
                        ))));
                    }
                    None => events.push(Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info)))),
                }
            }
            Event::Code(code) => {
                let video = code
                    .strip_prefix(YOUTUBE_PREFIX)
                    .map(|url| youtube_embed(url.trim()).into_string());
                match video {
                    Some(embed) => events.push(Event::InlineHtml(CowStr::from(embed))),
                    None => {
                        plain.push_str(&code);
                        events.push(Event::Code(code));
                    }
                }
            }
            Event::Text(text) => {
                plain.push_str(&text);
                events.push(Event::Text(text));
            }
            Event::SoftBreak | Event::HardBreak | Event::End(_) => {
                plain.push(' ');
                events.push(event);
            }
            other => events.push(other),
        }
    }

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    md_html::push_html(&mut body, events.into_iter());

    RenderedMarkdown {
        html: body,
        table_of_contents: table_of_contents(&toc),
        time_to_read: time_to_read(&plain),
        toc,
    }
}

/// Whole minutes to read `text`, rounded, never below one.
pub fn time_to_read(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    let minutes = (words as f64 / WORDS_PER_MINUTE as f64).round() as u32;
    minutes.max(1)
}

/// Lowercase heading slug: alphanumerics, `-` and `_` are kept, whitespace
/// becomes `-`, everything else is dropped.
pub fn slugify(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .collect()
}

/// Hands out unique heading ids within one document.
#[derive(Default)]
struct HeadingIds {
    used: HashSet<String>,
}

impl HeadingIds {
    fn assign(&mut self, title: &str) -> String {
        let mut base = slugify(title);
        if base.is_empty() {
            base = "section".to_string();
        }
        let mut candidate = base.clone();
        let mut n = 0;
        while self.used.contains(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn heading_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text.trim().to_string()
}

fn permalink(id: &str, title: &str) -> Markup {
    html! {
        a.anchor.before href=(format!("#{id}")) aria-label=(format!("{title} permalink")) { "#" }
    }
}

fn code_title(title: &str) -> Markup {
    html! {
        div.code-title { (title) }
    }
}

fn youtube_embed(url: &str) -> Markup {
    html! {
        iframe.embed-video
            width=(YOUTUBE_WIDTH)
            height=(YOUTUBE_HEIGHT)
            src=(youtube_embed_url(url))
            frameborder="0"
            allow="autoplay; encrypted-media; picture-in-picture"
            allowfullscreen {}
    }
}

/// Normalise watch, short and embed links to the embed form. Anything else is
/// taken as a bare video id.
fn youtube_embed_url(url: &str) -> String {
    let id = if let Some((_, rest)) = url.split_once("youtu.be/") {
        rest
    } else if let Some((_, rest)) = url.split_once("v=") {
        rest
    } else if let Some((_, rest)) = url.split_once("/embed/") {
        rest
    } else {
        url
    };
    let id = id.split(['?', '&', '#']).next().unwrap_or(id);
    format!("https://www.youtube.com/embed/{id}")
}

/// Nested list of heading links. Each heading owns the headings below it
/// with a deeper level, up to the next heading at its level or higher.
pub fn table_of_contents(toc: &[TocEntry]) -> String {
    if toc.is_empty() {
        return String::new();
    }
    toc_list(&toc_tree(toc)).into_string()
}

struct TocNode<'a> {
    entry: &'a TocEntry,
    children: Vec<TocNode<'a>>,
}

fn toc_tree(entries: &[TocEntry]) -> Vec<TocNode<'_>> {
    let mut nodes = Vec::new();
    let mut rest = entries;
    while let Some((first, tail)) = rest.split_first() {
        let end = tail
            .iter()
            .position(|e| e.level <= first.level)
            .unwrap_or(tail.len());
        nodes.push(TocNode {
            entry: first,
            children: toc_tree(&tail[..end]),
        });
        rest = &tail[end..];
    }
    nodes
}

fn toc_list(nodes: &[TocNode]) -> Markup {
    html! {
        ul {
            @for node in nodes {
                li {
                    a href=(format!("#{}", node.entry.id)) { (node.entry.title) }
                    @if !node.children.is_empty() {
                        (toc_list(&node.children))
                    }
                }
            }
        }
    }
}
