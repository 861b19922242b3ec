//! Readability-style article extraction.
//!
//! A fetched page is parsed once into a [`PageDocument`]. The extractor scores
//! block elements by text and link density, picks the strongest region, merges
//! qualifying siblings and renders a sanitized HTML fragment whose links and
//! image sources are absolute. Title, byline, site name and excerpt come from
//! meta tags with document fallbacks.
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use scraper::node::{Element, Node, Text};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;
use wedwire_common::{ExtractedContent, WedwireError};
use wedwire_http::HttpError;

/// Why content could not be produced for a page.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The page itself could not be retrieved (network, timeout, non-2xx).
    #[error("page fetch failed: {0}")]
    Fetch(#[from] HttpError),
    /// The page was retrieved but no confident content region exists.
    #[error("no readable content: {0}")]
    Parse(String),
}

impl From<ContentError> for WedwireError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::Fetch(e) => WedwireError::Fetch(e.to_string()),
            ContentError::Parse(msg) => WedwireError::Parse(msg),
        }
    }
}

/// A parsed HTML page together with the URL it was served from.
#[derive(Debug)]
pub struct PageDocument {
    html: Html,
    url: Url,
}

impl PageDocument {
    pub fn parse(raw: &str, url: Url) -> Self {
        Self {
            html: Html::parse_document(raw),
            url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// First non-empty `content` of a `<meta>` whose `property`, `name` or
    /// `itemprop` matches one of `keys`. Keys are tried in order.
    pub fn meta(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.html.select(&META).find_map(|m| {
                let el = m.value();
                let named = ["property", "name", "itemprop"]
                    .iter()
                    .filter_map(|attr| el.attr(attr))
                    .any(|v| v.trim().eq_ignore_ascii_case(key));
                if !named {
                    return None;
                }
                el.attr("content")
                    .map(normalize_ws)
                    .filter(|c| !c.is_empty())
            })
        })
    }

    /// Resolve `raw` against the page URL, keeping only http(s) results.
    pub fn absolutize(&self, raw: &str) -> Option<String> {
        absolutize(&self.url, raw)
    }
}

const DEFAULT_MIN_TEXT_LENGTH: usize = 250;
const DEFAULT_EXCERPT_CHARS: usize = 200;
const MIN_PARAGRAPH_CHARS: usize = 25;
const MAX_BYLINE_CHARS: usize = 100;

/// Readability heuristic over a parsed page.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    min_text_length: usize,
    excerpt_chars: usize,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self {
            min_text_length: DEFAULT_MIN_TEXT_LENGTH,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum plain-text length for a region to count as the article body.
    pub fn with_min_text_length(mut self, chars: usize) -> Self {
        self.min_text_length = chars;
        self
    }

    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    /// Parse `html` served from `source_url` and extract the article.
    pub fn extract(&self, html: &str, source_url: &str) -> Result<ExtractedContent, ContentError> {
        let url = Url::parse(source_url)
            .map_err(|e| ContentError::Parse(format!("invalid source url {source_url}: {e}")))?;
        self.extract_document(&PageDocument::parse(html, url))
    }

    pub fn extract_document(&self, doc: &PageDocument) -> Result<ExtractedContent, ContentError> {
        let body = self.main_region(doc).ok_or_else(|| {
            ContentError::Parse(format!(
                "no content region with at least {} characters",
                self.min_text_length
            ))
        })?;

        let excerpt = doc
            .meta(&["og:description", "description", "twitter:description"])
            .or_else(|| excerpt_from(&body.text, self.excerpt_chars));

        Ok(ExtractedContent {
            title: document_title(doc),
            content: body.html,
            excerpt,
            byline: byline(doc),
            site_name: site_name(doc),
            text_length: body.text_length,
        })
    }

    fn main_region(&self, doc: &PageDocument) -> Option<Rendered> {
        if let Some(region) = readable_region(doc.html.root_element(), &doc.url)
            && region.text_length >= self.min_text_length
        {
            return Some(region);
        }
        doc.html
            .select(&FALLBACK_REGIONS)
            .map(|el| render_region(&[el], &doc.url))
            .find(|r| r.text_length >= self.min_text_length)
    }
}

struct Rendered {
    html: String,
    text: String,
    text_length: usize,
}

/// Score paragraph parents, pick the best candidate, merge its siblings.
fn readable_region(root: ElementRef<'_>, base: &Url) -> Option<Rendered> {
    let mut scores = HashMap::new();
    let mut candidates: Vec<ElementRef<'_>> = Vec::new();

    for para in root.select(&SCORED_BLOCKS) {
        if is_excluded(para) {
            continue;
        }
        let text = text_of(para);
        let len = text.chars().count();
        if len < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let score = 1.0 + text.matches(',').count() as f64 + (len / 100).min(3) as f64;

        let parent = para.parent().and_then(ElementRef::wrap);
        let grandparent = parent.and_then(|p| p.parent()).and_then(ElementRef::wrap);
        for (ancestor, share) in [(parent, 1.0), (grandparent, 0.5)] {
            let Some(ancestor) = ancestor else { continue };
            let entry = scores.entry(ancestor.id()).or_insert_with(|| {
                candidates.push(ancestor);
                base_score(ancestor)
            });
            *entry += score * share;
        }
    }

    let adjusted: HashMap<_, f64> = candidates
        .iter()
        .map(|el| {
            let raw = scores.get(&el.id()).copied().unwrap_or(0.0);
            (el.id(), raw * (1.0 - link_density(*el)))
        })
        .collect();

    let (top, top_score) = candidates
        .iter()
        .filter_map(|el| adjusted.get(&el.id()).map(|s| (*el, *s)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let threshold = (top_score * 0.2).max(10.0);
    let parts: Vec<ElementRef<'_>> = match top.parent().and_then(ElementRef::wrap) {
        Some(parent) => parent
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|sib| {
                sib.id() == top.id()
                    || keep_sibling(*sib, adjusted.get(&sib.id()).copied(), threshold)
            })
            .collect(),
        None => vec![top],
    };

    Some(render_region(&parts, base))
}

fn keep_sibling(el: ElementRef<'_>, score: Option<f64>, threshold: f64) -> bool {
    if is_excluded(el) {
        return false;
    }
    if score.is_some_and(|s| s >= threshold) {
        return true;
    }
    if el.value().name() != "p" {
        return false;
    }
    let text = text_of(el);
    let len = text.chars().count();
    let density = link_density(el);
    (len > 80 && density < 0.25) || (len > 0 && density == 0.0 && ends_sentence(&text))
}

fn ends_sentence(text: &str) -> bool {
    text.contains(". ") || text.ends_with('.')
}

fn base_score(el: ElementRef<'_>) -> f64 {
    let tag = match el.value().name() {
        "div" | "article" | "section" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };
    tag + class_weight(el)
}

fn class_weight(el: ElementRef<'_>) -> f64 {
    let v = el.value();
    let mut weight = 0.0;
    for signature in [v.attr("class"), v.id()].into_iter().flatten() {
        if NEGATIVE.is_match(signature) {
            weight -= 25.0;
        }
        if POSITIVE.is_match(signature) {
            weight += 25.0;
        }
    }
    weight
}

fn link_density(el: ElementRef<'_>) -> f64 {
    let total = text_of(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el
        .select(&LINKS)
        .map(|a| text_of(a).chars().count())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

/// The element or one of its ancestors is boilerplate or unlikely content.
fn is_excluded(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| is_boilerplate(e) || is_unlikely(e))
}

fn is_boilerplate(el: ElementRef<'_>) -> bool {
    DROPPED_TAGS.contains(&el.value().name())
}

fn is_unlikely(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if matches!(v.name(), "html" | "body" | "article" | "main" | "a") {
        return false;
    }
    if v
        .attr("role")
        .is_some_and(|r| UNLIKELY_ROLES.contains(&r.trim()))
    {
        return true;
    }
    let signature = format!("{} {}", v.attr("class").unwrap_or(""), v.id().unwrap_or(""));
    if signature.trim().is_empty() {
        return false;
    }
    UNLIKELY.is_match(&signature) && !MAYBE_CANDIDATE.is_match(&signature)
}

fn render_region(parts: &[ElementRef<'_>], base: &Url) -> Rendered {
    let mut r = Renderer {
        base,
        html: String::from("<div>"),
        text: String::new(),
        preformatted: 0,
    };
    for part in parts {
        r.element(*part);
    }
    r.html.push_str("</div>");
    let text = normalize_ws(&r.text);
    Rendered {
        text_length: text.chars().count(),
        html: r.html,
        text,
    }
}

struct Renderer<'u> {
    base: &'u Url,
    html: String,
    text: String,
    preformatted: usize,
}

/// One unit of pending rendering work. The walk keeps its own stack so nesting
/// depth in the page never turns into call-stack depth.
enum Step<'a> {
    Enter(ElementRef<'a>),
    Text(&'a Text),
    Exit(ElementRef<'a>),
}

impl Renderer<'_> {
    fn element(&mut self, root: ElementRef<'_>) {
        let mut pending = vec![Step::Enter(root)];
        while let Some(step) = pending.pop() {
            match step {
                Step::Text(t) => self.text_node(t),
                Step::Enter(el) => {
                    if is_boilerplate(el) || is_unlikely(el) {
                        continue;
                    }
                    let name = el.value().name();
                    if name == "img" {
                        self.image(el.value());
                        continue;
                    }
                    if KEPT_TAGS.contains(&name) {
                        self.open(el.value(), name);
                    }
                    if name == "pre" {
                        self.preformatted += 1;
                    }
                    pending.push(Step::Exit(el));
                    let children: Vec<Step<'_>> = el
                        .children()
                        .filter_map(|child| match child.value() {
                            Node::Text(t) => Some(Step::Text(t)),
                            Node::Element(_) => ElementRef::wrap(child).map(Step::Enter),
                            _ => None,
                        })
                        .collect();
                    pending.extend(children.into_iter().rev());
                }
                Step::Exit(el) => self.close(el.value().name()),
            }
        }
    }

    fn text_node(&mut self, t: &Text) {
        let text = if self.preformatted > 0 {
            (**t).to_string()
        } else {
            collapse_ws(t)
        };
        self.html.push_str(&encode_text(&text));
        self.text.push_str(&text);
    }

    fn close(&mut self, name: &str) {
        if name == "pre" {
            self.preformatted = self.preformatted.saturating_sub(1);
        }
        if KEPT_TAGS.contains(&name) && !VOID_TAGS.contains(&name) {
            self.html.push_str("</");
            self.html.push_str(name);
            self.html.push('>');
        }
        if BLOCK_TAGS.contains(&name) {
            self.text.push(' ');
        }
    }

    fn open(&mut self, el: &Element, name: &str) {
        self.html.push('<');
        self.html.push_str(name);
        if name == "a"
            && let Some(href) = el.attr("href").and_then(|h| link_target(self.base, h))
        {
            self.attr("href", &href);
        }
        self.html.push('>');
    }

    fn image(&mut self, el: &Element) {
        let Some(src) = image_source(el).and_then(|s| absolutize(self.base, s)) else {
            return;
        };
        self.html.push_str("<img");
        self.attr("src", &src);
        for name in ["alt", "width", "height", "class"] {
            if let Some(value) = el.attr(name) {
                self.attr(name, value.trim());
            }
        }
        self.html.push('>');
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.html.push(' ');
        self.html.push_str(name);
        self.html.push_str("=\"");
        self.html.push_str(&encode_double_quoted_attribute(value));
        self.html.push('"');
    }
}

/// Source of an `<img>`, preferring lazy-load attributes over a placeholder `src`.
pub(crate) fn image_source(el: &Element) -> Option<&str> {
    LAZY_SRC_ATTRS
        .iter()
        .chain(std::iter::once(&"src"))
        .filter_map(|attr| el.attr(attr))
        .map(str::trim)
        .find(|s| !s.is_empty() && !s.starts_with("data:"))
}

pub(crate) fn absolutize(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.to_ascii_lowercase().starts_with("javascript:")
    {
        return None;
    }
    base.join(raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(String::from)
}

fn link_target(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with("mailto:") {
        return Some(raw.to_string());
    }
    absolutize(base, raw)
}

fn document_title(doc: &PageDocument) -> String {
    if let Some(title) = doc.meta(&["og:title", "twitter:title"]) {
        return title;
    }
    if let Some(title) = doc
        .html
        .select(&TITLE)
        .map(text_of)
        .find(|t| !t.is_empty())
    {
        return trim_site_suffix(&title);
    }
    doc.html
        .select(&HEADING)
        .map(text_of)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// "Couple ties the knot in Tuscany | Daily Gazette" -> "Couple ties the knot in Tuscany".
fn trim_site_suffix(title: &str) -> String {
    if let Some(sep) = TITLE_SEPARATOR.find_iter(title).last() {
        let head = title[..sep.start()].trim();
        if head.split_whitespace().count() >= 3 {
            return head.to_string();
        }
    }
    title.trim().to_string()
}

fn byline(doc: &PageDocument) -> Option<String> {
    doc.meta(&["author", "article:author", "parsely-author", "dc.creator"])
        .filter(|a| !a.starts_with("http"))
        .or_else(|| {
            doc.html
                .select(&BYLINE)
                .map(text_of)
                .find(|t| !t.is_empty())
        })
        .map(|b| BYLINE_PREFIX.replace(&b, "").trim().to_string())
        .filter(|b| !b.is_empty() && b.chars().count() <= MAX_BYLINE_CHARS)
}

fn site_name(doc: &PageDocument) -> Option<String> {
    doc.meta(&["og:site_name", "application-name"]).or_else(|| {
        doc.url
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_string())
    })
}

fn excerpt_from(text: &str, chars: usize) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(chars).collect::<String>().trim_end().to_string())
}

fn text_of(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace runs to one space, keeping a space at either edge.
fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

const DROPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "nav", "aside", "footer", "header", "button",
    "input", "select", "textarea", "svg", "canvas", "object", "embed", "link", "meta", "template",
    "dialog",
];

const KEPT_TAGS: &[&str] = &[
    "p", "a", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "code", "em",
    "strong", "b", "i", "u", "s", "sub", "sup", "small", "mark", "ul", "ol", "li", "dl", "dt", "dd",
    "figure", "figcaption", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "caption", "cite",
    "q", "abbr", "time",
];

const VOID_TAGS: &[&str] = &["br", "hr"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "tr", "td",
    "th", "figure", "figcaption", "section", "article", "dd", "dt",
];

const LAZY_SRC_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original", "data-url"];

const UNLIKELY_ROLES: &[&str] = &[
    "menu", "menubar", "complementary", "navigation", "alert", "alertdialog", "dialog", "banner",
];

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector parses")
}

fn pattern(re: &'static str) -> Regex {
    Regex::new(re).expect("static pattern compiles")
}

static META: LazyLock<Selector> = LazyLock::new(|| selector("meta"));
static SCORED_BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("p, pre, td, blockquote"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static BYLINE: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"[rel="author"], [itemprop="author"], .byline, .author"#)
});
static FALLBACK_REGIONS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"article, main, [role="main"]"#));

static UNLIKELY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(?i)-ad-|ai2html|banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|yom-remote|newsletter|subscribe|share|promo",
    )
});
static MAYBE_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)and|article|body|column|content|main|shadow"));
static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story")
});
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(?i)-ad-|hidden|^hid$| hid$| hid |^hid |banner|combx|comment|com-|contact|foot|footnote|gdpr|masthead|media|meta|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget",
    )
});
static TITLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s+[|\-–—:»/]\s+"));
static BYLINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)^\s*by\s+"));
