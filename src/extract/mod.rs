//! Content extraction from fetched pages
//!
//! This module handles:
//! - Picking the main content region of an HTML document
//! - Skipping navigation, ads and other boilerplate
//! - Whitespace normalization
//! - Segmenting text into bounded passages

mod segment;

pub use segment::*;

use crate::config::ExtractConfig;
use crate::fetch::{FetchedPage, MediaType};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A bounded span of clean text from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub source_url: String,
    /// Title of the source page, when known
    #[serde(default)]
    pub source_title: Option<String>,
    pub text: String,
    /// 0-based, contiguous within a page
    pub position_index: usize,
}

impl Passage {
    /// Content fingerprint, insensitive to case and spacing
    pub fn fingerprint(&self) -> blake3::Hash {
        let canonical = self
            .text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        blake3::hash(canonical.as_bytes())
    }
}

/// Elements that never hold page content
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "canvas", "iframe", "nav", "header",
    "footer", "aside", "form", "button", "select", "textarea", "head", "input", "label",
];

const SKIP_ROLES: &[&str] = &[
    "navigation",
    "banner",
    "contentinfo",
    "complementary",
    "search",
    "menu",
    "menubar",
    "dialog",
    "alert",
];

/// class/id tokens marking boilerplate containers
const BOILERPLATE_TOKENS: &[&str] = &[
    "nav",
    "navbar",
    "navigation",
    "menu",
    "sidebar",
    "footer",
    "header",
    "cookie",
    "cookies",
    "banner",
    "ad",
    "ads",
    "advert",
    "advertisement",
    "promo",
    "newsletter",
    "share",
    "social",
    "related",
    "comments",
    "pagination",
    "breadcrumb",
    "breadcrumbs",
];

/// Elements that start a new paragraph
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "dl", "dt", "dd", "table", "tr", "td", "th", "blockquote", "pre", "figure",
    "figcaption", "hr", "body", "address", "details", "summary",
];

/// Extract passages from a fetched page.
///
/// Failed fetches and pages without usable text yield no passages.
pub fn extract(page: &FetchedPage, config: &ExtractConfig) -> Vec<Passage> {
    if !page.is_ok() {
        return Vec::new();
    }

    let text = match page.media_type {
        MediaType::Html => extract_text(page.raw_content(), config.min_passage_chars),
        MediaType::PlainText => normalize_whitespace(page.raw_content()),
    };

    let passages: Vec<Passage> =
        segment(&text, config.max_passage_chars, config.min_passage_chars)
            .into_iter()
            .enumerate()
            .map(|(position_index, text)| Passage {
                source_url: page.url.clone(),
                source_title: page.title.clone(),
                text,
                position_index,
            })
            .collect();

    debug!("Extracted {} passages from {}", passages.len(), page.url);
    passages
}

/// Document title, falling back to the first `h1`
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    ["title", "h1"].iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .map(|e| collapse_spaces(&e.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

/// Clean, paragraph-separated text of the main content of an HTML document
pub fn extract_text(html: &str, min_root_chars: usize) -> String {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("main, article, [role=main]") {
        for candidate in document.select(&selector) {
            let text = normalize_whitespace(&collect_text(candidate));
            if text.chars().count() >= min_root_chars.max(1) {
                return text;
            }
        }
    }

    let body = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next());
    match body {
        Some(body) => normalize_whitespace(&collect_text(body)),
        None => normalize_whitespace(&collect_text(document.root_element())),
    }
}

fn collect_text(root: ElementRef) -> String {
    let mut out = String::new();
    walk(root, &mut out);
    out
}

fn walk(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_spaces(text);
                if text.starts_with(char::is_whitespace) {
                    out.push(' ');
                }
                out.push_str(&collapsed);
                if !collapsed.is_empty() && text.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            Node::Element(_) => {
                let Some(el) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_boilerplate(&el) {
                    continue;
                }

                let name = el.value().name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }

                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push_str("\n\n");
                }
                walk(el, out);
                if block {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

fn is_boilerplate(el: &ElementRef) -> bool {
    let element = el.value();

    if SKIP_TAGS.contains(&element.name()) {
        return true;
    }

    if element.attr("hidden").is_some() || element.attr("aria-hidden") == Some("true") {
        return true;
    }

    if let Some(style) = element.attr("style") {
        let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.to_lowercase().contains("display:none") {
            return true;
        }
    }

    if let Some(role) = element.attr("role") {
        if SKIP_ROLES.contains(&role.trim().to_lowercase().as_str()) {
            return true;
        }
    }

    element
        .classes()
        .chain(element.id())
        .any(has_boilerplate_token)
}

/// Match on `-`/`_` delimited tokens, so `site-nav` matches and `shadow` does not
fn has_boilerplate_token(name: &str) -> bool {
    name.split(['-', '_'])
        .any(|token| BOILERPLATE_TOKENS.contains(&token.to_lowercase().as_str()))
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize whitespace: spaces collapsed within lines, blank-line runs
/// collapsed to a single paragraph break
pub fn normalize_whitespace(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = collapse_spaces(line);
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchStatus, PageContentType};
    use std::time::Duration;

    fn html_page(url: &str, html: &str) -> FetchedPage {
        FetchedPage::ok(
            url,
            html.to_string(),
            PageContentType::Static,
            MediaType::Html,
            Duration::ZERO,
        )
        .with_title(page_title(html))
    }

    const ARTICLE: &str = r#"
        <html>
        <head><title>Paris - Encyclopedia</title><style>.x { color: red }</style></head>
        <body>
          <header class="site-header"><a href="/">Home</a> <a href="/about">About us</a></header>
          <nav><ul><li>Geography</li><li>History</li></ul></nav>
          <div class="cookie-banner">We use cookies to improve your experience on this site.</div>
          <main>
            <h1>Paris</h1>
            <p>Paris is the capital and most populous city of France.
               It is located on the Seine river.</p>
            <div class="ad-slot">Buy cheap flights to Paris today with our partner!</div>
            <p>The city is a major centre of finance, diplomacy, commerce, and culture.</p>
            <div aria-hidden="true">Screen reader hidden decorative text goes here.</div>
            <script>trackVisit("paris");</script>
          </main>
          <aside class="sidebar">Related articles: Lyon, Marseille and Nice guides.</aside>
          <footer>Copyright 2024 Encyclopedia Foundation. All rights reserved.</footer>
        </body>
        </html>
    "#;

    #[test]
    fn test_extract_main_content() {
        let text = extract_text(ARTICLE, 20);
        assert!(text.contains("Paris is the capital and most populous city of France."));
        assert!(text.contains("major centre of finance"));
        assert!(!text.contains("cookies"));
        assert!(!text.contains("cheap flights"));
        assert!(!text.contains("Screen reader"));
        assert!(!text.contains("trackVisit"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("Related articles"));
    }

    #[test]
    fn test_block_elements_break_paragraphs() {
        let text = extract_text(ARTICLE, 20);
        let paragraphs: Vec<&str> = text.split("\n\n").collect();
        assert!(paragraphs.contains(&"Paris"));
        assert!(paragraphs
            .iter()
            .any(|p| p.starts_with("Paris is the capital") && p.ends_with("Seine river.")));
    }

    #[test]
    fn test_body_fallback_without_main() {
        let html = "<html><body><nav>Menu</nav><p>Body text that is long enough to keep.</p></body></html>";
        let text = extract_text(html, 20);
        assert_eq!(text, "Body text that is long enough to keep.");
    }

    #[test]
    fn test_tiny_main_falls_back_to_body() {
        let html = "<html><body><main>Hi</main><p>The real content lives outside of main here.</p></body></html>";
        let text = extract_text(html, 20);
        assert!(text.contains("The real content"));
    }

    #[test]
    fn test_token_matching_is_whole_word() {
        assert!(has_boilerplate_token("site-nav"));
        assert!(has_boilerplate_token("ad_slot"));
        assert!(has_boilerplate_token("Sidebar"));
        assert!(!has_boilerplate_token("shadow"));
        assert!(!has_boilerplate_token("download"));
        assert!(!has_boilerplate_token("content"));
        assert!(!has_boilerplate_token("headline"));
    }

    #[test]
    fn test_extract_passages_from_page() {
        let page = html_page("https://example.com/paris", ARTICLE);
        let passages = extract(&page, &ExtractConfig::default());

        assert!(!passages.is_empty());
        for (i, passage) in passages.iter().enumerate() {
            assert_eq!(passage.position_index, i);
            assert_eq!(passage.source_url, "https://example.com/paris");
            assert_eq!(passage.source_title.as_deref(), Some("Paris - Encyclopedia"));
            assert!(!passage.text.trim().is_empty());
            assert!(passage.text.chars().count() <= 700);
        }
    }

    #[test]
    fn test_failed_page_yields_nothing() {
        let page = FetchedPage::failed(
            "https://example.com/down",
            FetchStatus::Timeout,
            None,
            Duration::ZERO,
        );
        assert!(extract(&page, &ExtractConfig::default()).is_empty());
    }

    #[test]
    fn test_plain_text_page() {
        let page = FetchedPage::ok(
            "https://example.com/notes.txt",
            "Paris is the capital of France.\n\n\n   Lyon   is the third largest city.".to_string(),
            PageContentType::Static,
            MediaType::PlainText,
            Duration::ZERO,
        );
        let passages = extract(&page, &ExtractConfig::default());
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[1].text, "Lyon is the third largest city.");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  a   b \n c\n\n\n\n d  "),
            "a b\nc\n\nd"
        );
        assert_eq!(normalize_whitespace(" \n \n"), "");
    }

    #[test]
    fn test_page_title() {
        assert_eq!(
            page_title("<html><head><title> A  Title </title></head></html>").as_deref(),
            Some("A Title")
        );
        assert_eq!(
            page_title("<html><body><h1>Heading</h1></body></html>").as_deref(),
            Some("Heading")
        );
        assert_eq!(page_title("<html><body><p>x</p></body></html>"), None);
    }

    #[test]
    fn test_fingerprint_ignores_case_and_spacing() {
        let a = Passage {
            source_url: "https://a.example".to_string(),
            source_title: None,
            text: "Paris is the capital".to_string(),
            position_index: 0,
        };
        let b = Passage {
            source_url: "https://b.example".to_string(),
            source_title: None,
            text: "paris  is the   Capital".to_string(),
            position_index: 3,
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
