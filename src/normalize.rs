use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::models::{ExtractedImage, NormalizedDescription};

// ── Lazy statics ─────────────────────────────────────────────────────────────

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[Image (\d+)\]").unwrap());

static ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("th").unwrap());
static DATA_CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static CAPTION_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("caption").unwrap());
static IMG_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "aside", "main", "nav",
    "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "figure", "figcaption",
    "dl", "dt", "dd", "details", "summary", "hr", "caption",
];

// ── Public API ───────────────────────────────────────────────────────────────

/// Convert a problem description from HTML into markdown-ish text.
///
/// Images become `[Image n]` placeholders (see [`expand`]), tables become
/// markdown tables, inline code is backticked and lists become bullet lines.
/// Malformed markup degrades to whatever text the parser recovers.
pub fn normalize(html: &str) -> NormalizedDescription {
    let fragment = Html::parse_fragment(html);
    let mut walker = Walker::default();
    let raw = walker.walk_children(fragment.root_element(), false);

    NormalizedDescription {
        text: collapse_blank_lines(&raw),
        images: walker.images,
    }
}

/// Substitute every placeholder with a markdown image tag in a single pass.
/// Placeholders without a matching image are left as they are.
pub fn expand(text: &str, images: &[ExtractedImage]) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let image = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| images.get(idx));
            match image {
                Some(image) => format!("\n\n![{}]({})\n\n", image.alt, image.source),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

pub fn placeholder(ordinal: usize) -> String {
    format!("[Image {}]", ordinal)
}

/// Strip every line, fold runs of blank lines into one and trim blank lines
/// at both ends. Running it on its own output is a no-op.
pub fn collapse_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if matches!(lines.last(), Some(prev) if !prev.is_empty()) {
                lines.push("");
            }
            continue;
        }
        lines.push(line);
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

// ── DOM tree walker ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Walker {
    images: Vec<ExtractedImage>,
}

impl Walker {
    fn walk_element(&mut self, el: ElementRef<'_>, preformatted: bool) -> String {
        let name = el.value().name();

        if matches!(name, "script" | "style" | "noscript" | "template" | "head") {
            return String::new();
        }

        match name {
            "img" => self.handle_image(el),
            "br" => "\n".to_string(),
            "table" => block(&self.handle_table(el)),
            "ul" => block(&self.handle_list(el, false)),
            "ol" => block(&self.handle_list(el, true)),
            "pre" => block(&self.walk_children(el, true)),
            "code" if !preformatted => {
                let text = flatten(&self.walk_children(el, false));
                if text.is_empty() {
                    return String::new();
                }
                format!("`{}`", text)
            }
            // Outside a list an item is still its own line.
            "li" => format!("\n{}\n", self.walk_children(el, preformatted)),
            _ if BLOCK_TAGS.contains(&name) => block(&self.walk_children(el, preformatted)),
            _ => self.walk_children(el, preformatted),
        }
    }

    fn walk_children(&mut self, el: ElementRef<'_>, preformatted: bool) -> String {
        let mut result = String::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    if preformatted {
                        result.push_str(&text.text);
                    } else {
                        result.push_str(&WHITESPACE_RE.replace_all(&text.text, " "));
                    }
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        result.push_str(&self.walk_element(child_el, preformatted));
                    }
                }
                _ => {}
            }
        }

        if preformatted {
            result
        } else {
            MULTI_SPACE_RE.replace_all(&result, " ").into_owned()
        }
    }

    // ── Element-specific handlers ────────────────────────────────────────────

    fn handle_image(&mut self, el: ElementRef<'_>) -> String {
        let src = match el.value().attr("src").map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return String::new(),
        };
        let alt = el.value().attr("alt").unwrap_or("").trim().to_string();

        self.images.push(ExtractedImage { source: src, alt });
        placeholder(self.images.len())
    }

    /// The first `<tr>` is always consumed as the header row, whether or not
    /// it holds `<th>` cells. Every `<th>` in the table lands in the header
    /// line, including row headers in later rows. Images that would otherwise
    /// vanish with the skipped row or a `<caption>` are listed after the table.
    fn handle_table(&mut self, table: ElementRef<'_>) -> String {
        let mut lines: Vec<String> = Vec::new();

        let headers: Vec<String> = table
            .select(&HEADER_CELL_SEL)
            .map(|th| self.cell_text(th))
            .collect();

        if !headers.is_empty() {
            lines.push(format!("| {} |", headers.join(" | ")));
            lines.push(format!("| {} |", vec!["---"; headers.len()].join(" | ")));
        }

        let mut rows = table.select(&ROW_SEL);
        let first_row = rows.next();

        for row in rows {
            let cols: Vec<String> = row
                .select(&DATA_CELL_SEL)
                .map(|td| self.cell_text(td))
                .collect();
            if !cols.is_empty() {
                lines.push(format!("| {} |", cols.join(" | ")));
            }
        }

        let mut stray: Vec<String> = Vec::new();
        if let Some(row) = first_row {
            for td in row.select(&DATA_CELL_SEL) {
                stray.extend(td.select(&IMG_SEL).map(|img| self.handle_image(img)));
            }
        }
        for caption in table.select(&CAPTION_SEL) {
            stray.extend(caption.select(&IMG_SEL).map(|img| self.handle_image(img)));
        }
        stray.retain(|p| !p.is_empty());
        if !stray.is_empty() {
            lines.push(String::new());
            lines.push(stray.join(" "));
        }

        lines.join("\n")
    }

    fn cell_text(&mut self, cell: ElementRef<'_>) -> String {
        flatten(&self.walk_children(cell, false))
    }

    fn handle_list(&mut self, el: ElementRef<'_>, ordered: bool) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut idx = 1usize;

        for child in el.children() {
            match child.value() {
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if child_el.value().name() != "li" {
                        // Stray markup inside the list keeps its text (and placeholders).
                        let text = flatten(&self.walk_element(child_el, false));
                        if !text.is_empty() {
                            lines.push(text);
                        }
                        continue;
                    }
                    let item = flatten(&self.walk_children(child_el, false));
                    if item.is_empty() {
                        continue;
                    }
                    if ordered {
                        lines.push(format!("{}. {}", idx, item));
                        idx += 1;
                    } else {
                        lines.push(format!("- {}", item));
                    }
                }
                Node::Text(text) => {
                    let text = flatten(&text.text);
                    if !text.is_empty() {
                        lines.push(text);
                    }
                }
                _ => {}
            }
        }

        lines.join("\n")
    }
}

// ── Text helpers ─────────────────────────────────────────────────────────────

fn block(content: &str) -> String {
    format!("\n\n{}\n\n", content)
}

/// Squash a rendered fragment onto a single line.
fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
