//! Turns a generated draft into publish-ready HTML.
//!
//! The draft is free text with light markdown. Processing pulls out a title,
//! converts headings, emphasis and lists, replaces `[Source: URL]` markers with
//! numbered footnote links and appends a bibliography and disclaimer.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::ResearchSource;

/// Opens the appended bibliography and disclaimer. Input that already carries
/// it is a processed body: the HTML before it is kept and the block rebuilt.
pub const ATTRIBUTION_MARKER: &str = "<hr class=\"mednews-sources\">";

pub const DISCLAIMER: &str = "This article is for informational purposes only and does not \
constitute medical advice. Always consult a qualified healthcare professional about your health \
and before making any medical decisions.";

/// Lines longer than this are prose, never titles.
const MAX_TITLE_CHARS: usize = 150;
const MIN_BOLD_TITLE_CHARS: usize = 20;
const BOLD_HEADING_CHARS: usize = 20;

const SECTION_KEYWORDS: &[&str] = &[
    "background",
    "findings",
    "conclusion",
    "results",
    "methods",
    "introduction",
    "summary",
    "implications",
    "key points",
    "what this means",
    "expert",
    "context",
    "next steps",
];

static HEADLINE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*\*\s*(?:headline|title)\s*:\s*(?:\*\*\s*(.+)|(.+?)\*\*)$")
        .expect("valid headline marker regex")
});
static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").expect("valid header regex"));
static BOLD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*([^*]+)\*\*:?$").expect("valid bold line regex"));
static INLINE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid bold regex"));
static INLINE_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("valid emphasis regex"));
static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*•]\s+(.+)$").expect("valid bullet regex"));
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+(.+)$").expect("valid numbered item regex"));
static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[Source:\s*([^\]]+?)\s*\]").expect("valid citation regex"));
static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a\s[^>]*>.*?</a>").expect("valid anchor regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContent {
    pub title: Option<String>,
    pub html: String,
}

/// Runs the full post-processing chain over a generated draft.
pub fn process(raw: &str, sources: &[ResearchSource]) -> ProcessedContent {
    let catalog = SourceCatalog::new(sources);
    if let Some(pos) = raw.find(ATTRIBUTION_MARKER) {
        let mut html = raw[..pos].trim_end().to_string();
        html.push_str(&attribution_block(&catalog));
        return ProcessedContent { title: None, html };
    }

    let lines: Vec<&str> = raw.lines().map(str::trim).collect();

    let title = locate_title(&lines);
    let title_line = title.as_ref().map(|t| t.line);

    let body: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != title_line)
        .map(|(_, line)| *line)
        .take_while(|line| !is_disclaimer_heading(line))
        .collect();

    let mut html = Renderer::new(&catalog).render(&body);
    html.push_str(&attribution_block(&catalog));

    ProcessedContent {
        title: title.map(|t| t.text),
        html,
    }
}

/// Title of a generated draft, if one can be recognised.
pub fn extract_title(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    locate_title(&lines).map(|t| t.text)
}

struct TitleLine {
    line: usize,
    text: String,
}

fn locate_title(lines: &[&str]) -> Option<TitleLine> {
    // Only lines before the first prose line are candidates.
    let window: Vec<(usize, &str)> = lines
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .take_while(|(_, line)| !is_prose(line))
        .filter(|(_, line)| !line.starts_with('<'))
        .collect();

    let matchers: [fn(&str) -> Option<String>; 4] =
        [headline_marker, markdown_header, bold_phrase, short_line];

    matchers.iter().find_map(|matcher| {
        window.iter().find_map(|(i, line)| {
            matcher(line)
                .filter(|text| !text.is_empty())
                .map(|text| TitleLine { line: *i, text })
        })
    })
}

fn is_prose(line: &str) -> bool {
    line.chars().count() > MAX_TITLE_CHARS || line.contains(". ")
}

fn headline_marker(line: &str) -> Option<String> {
    HEADLINE_MARKER.captures(line).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| strip_markup(m.as_str()))
    })
}

fn markdown_header(line: &str) -> Option<String> {
    MARKDOWN_HEADER
        .captures(line)
        .map(|caps| strip_markup(&caps[2]))
}

fn bold_phrase(line: &str) -> Option<String> {
    let caps = BOLD_LINE.captures(line)?;
    let text = caps[1].trim().trim_end_matches(':').trim();
    let len = text.chars().count();
    (MIN_BOLD_TITLE_CHARS..=MAX_TITLE_CHARS)
        .contains(&len)
        .then(|| text.to_string())
}

fn short_line(line: &str) -> Option<String> {
    (line.chars().count() < MAX_TITLE_CHARS && !line.ends_with('.')).then(|| strip_markup(line))
}

fn strip_markup(text: &str) -> String {
    text.trim()
        .trim_start_matches('#')
        .replace("**", "")
        .trim_matches(|c: char| c == '*' || c.is_whitespace())
        .to_string()
}

fn is_disclaimer_heading(line: &str) -> bool {
    let stripped = line.trim_matches(|c: char| c == '#' || c == '*' || c == ':' || c.is_whitespace());
    if !stripped.to_lowercase().starts_with("medical disclaimer") {
        return false;
    }
    line.starts_with('#') || line.starts_with("**") || stripped.chars().count() <= 40
}

/// URL-bearing sources, deduplicated, numbered by first appearance.
struct SourceCatalog {
    entries: Vec<CatalogEntry>,
}

struct CatalogEntry {
    url: String,
    escaped_url: String,
    label: String,
}

impl SourceCatalog {
    fn new(sources: &[ResearchSource]) -> Self {
        let mut entries: Vec<CatalogEntry> = Vec::new();
        for source in sources {
            let url = source.url.trim();
            if url.is_empty() || entries.iter().any(|e| e.url == url) {
                continue;
            }
            entries.push(CatalogEntry {
                url: url.to_string(),
                escaped_url: escape_html(url),
                label: source.label().to_string(),
            });
        }
        Self { entries }
    }

    fn number(&self, url: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.url == url).map(|i| i + 1)
    }
}

struct Renderer<'a> {
    catalog: &'a SourceCatalog,
    blocks: Vec<String>,
    paragraph: Vec<String>,
    list: Option<(ListKind, Vec<String>)>,
}

#[derive(Clone, Copy, PartialEq)]
enum ListKind {
    Bulleted,
    Numbered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Bulleted => "ul",
            ListKind::Numbered => "ol",
        }
    }
}

impl<'a> Renderer<'a> {
    fn new(catalog: &'a SourceCatalog) -> Self {
        Self {
            catalog,
            blocks: Vec::new(),
            paragraph: Vec::new(),
            list: None,
        }
    }

    fn render(mut self, lines: &[&str]) -> String {
        for line in lines {
            self.line(line);
        }
        self.flush_paragraph();
        self.flush_list();
        self.blocks.join("\n")
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.flush_paragraph();
            self.flush_list();
        } else if let Some(caps) = MARKDOWN_HEADER.captures(line) {
            self.flush_paragraph();
            self.flush_list();
            // Body headings sit below the document title, so `#` becomes h2.
            let level = (caps[1].len() + 1).min(4);
            let text = self.inline(&strip_markup(&caps[2]));
            self.blocks.push(format!("<h{level}>{text}</h{level}>"));
        } else if let Some(caps) = BOLD_LINE.captures(line) {
            self.flush_paragraph();
            self.flush_list();
            let text = caps[1].trim().trim_end_matches(':').trim();
            let rendered = self.inline(text);
            if looks_like_section(text) {
                self.blocks.push(format!("<h3>{}</h3>", rendered));
            } else {
                self.blocks
                    .push(format!("<p><strong>{}</strong></p>", rendered));
            }
        } else if let Some(caps) = BULLET_ITEM.captures(line) {
            self.list_item(ListKind::Bulleted, &caps[1]);
        } else if let Some(caps) = NUMBERED_ITEM.captures(line) {
            self.list_item(ListKind::Numbered, &caps[1]);
        } else {
            self.flush_list();
            let text = self.inline(line);
            self.paragraph.push(text);
        }
    }

    fn list_item(&mut self, kind: ListKind, text: &str) {
        self.flush_paragraph();
        if self.list.as_ref().is_some_and(|(k, _)| *k != kind) {
            self.flush_list();
        }
        let item = self.inline(text);
        self.list
            .get_or_insert_with(|| (kind, Vec::new()))
            .1
            .push(item);
    }

    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            self.blocks
                .push(format!("<p>{}</p>", self.paragraph.join(" ")));
            self.paragraph.clear();
        }
    }

    fn flush_list(&mut self) {
        if let Some((kind, items)) = self.list.take() {
            let items: String = items
                .iter()
                .map(|item| format!("<li>{}</li>\n", item))
                .collect();
            self.blocks
                .push(format!("<{tag}>\n{items}</{tag}>", tag = kind.tag()));
        }
    }

    fn inline(&self, text: &str) -> String {
        let escaped = escape_html(text);
        let bolded = INLINE_BOLD.replace_all(&escaped, "<strong>$1</strong>");
        let emphasised = INLINE_EMPHASIS.replace_all(&bolded, "<em>$1</em>");
        let cited = link_citations(&emphasised, self.catalog);
        link_bare_urls(&cited, self.catalog)
    }
}

fn looks_like_section(text: &str) -> bool {
    let lower = text.to_lowercase();
    SECTION_KEYWORDS.iter().any(|k| lower.contains(k))
        || text.chars().count() > BOLD_HEADING_CHARS
}

fn link_citations(text: &str, catalog: &SourceCatalog) -> String {
    CITATION
        .replace_all(text, |caps: &Captures| {
            let url = unescape_html(&caps[1]);
            match catalog.number(&url) {
                Some(n) => footnote_link(&url, &format!("[{}]", n)),
                None if url.starts_with("http://") || url.starts_with("https://") => {
                    footnote_link(&url, "[source]")
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn footnote_link(url: &str, label: &str) -> String {
    format!(
        "<sup><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></sup>",
        escape_attr(url),
        label
    )
}

/// Links known source URLs that appear outside existing anchors.
fn link_bare_urls(text: &str, catalog: &SourceCatalog) -> String {
    if catalog.entries.is_empty() {
        return text.to_string();
    }

    let mut known: Vec<&CatalogEntry> = catalog.entries.iter().collect();
    known.sort_by(|a, b| b.escaped_url.len().cmp(&a.escaped_url.len()));

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for anchor in ANCHOR.find_iter(text) {
        out.push_str(&link_segment(&text[last..anchor.start()], &known));
        out.push_str(anchor.as_str());
        last = anchor.end();
    }
    out.push_str(&link_segment(&text[last..], &known));
    out
}

fn link_segment(segment: &str, known: &[&CatalogEntry]) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut pos = 0;
    let mut prev: Option<char> = None;

    while pos < segment.len() {
        let rest = &segment[pos..];
        let starts_cleanly = !prev.is_some_and(|c| c.is_alphanumeric() || c == '/');
        let hit = starts_cleanly
            .then(|| {
                known.iter().find(|entry| {
                    rest.starts_with(entry.escaped_url.as_str())
                        && ends_at_boundary(&rest[entry.escaped_url.len()..])
                })
            })
            .flatten();

        match hit {
            Some(entry) => {
                out.push_str(&format!(
                    "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                    escape_attr(&entry.url),
                    entry.escaped_url
                ));
                pos += entry.escaped_url.len();
                prev = entry.escaped_url.chars().last();
            }
            None => {
                let Some(c) = rest.chars().next() else { break };
                out.push(c);
                pos += c.len_utf8();
                prev = Some(c);
            }
        }
    }
    out
}

fn ends_at_boundary(after: &str) -> bool {
    let mut chars = after.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_alphanumeric() || "/-_%=?#&~+".contains(c) => false,
        Some('.') | Some(',') => !chars.next().is_some_and(|c| c.is_alphanumeric()),
        Some(_) => true,
    }
}

fn attribution_block(catalog: &SourceCatalog) -> String {
    let mut block = format!("\n{}", ATTRIBUTION_MARKER);
    if !catalog.entries.is_empty() {
        block.push_str("\n<h4>Sources</h4>\n<ol>\n");
        for entry in &catalog.entries {
            block.push_str(&format!(
                "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></li>\n",
                escape_attr(&entry.url),
                escape_html(&entry.label)
            ));
        }
        block.push_str("</ol>");
    }
    block.push_str(&format!(
        "\n<p class=\"medical-disclaimer\"><em>{}</em></p>\n",
        DISCLAIMER
    ));
    block
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
