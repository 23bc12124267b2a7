//! HTML normalization for fetched pages
//!
//! This module turns raw markup into the two strings the pipeline consumes:
//! - The page title (from the `<title>` tag)
//! - Readable text content, with non-content structure stripped
//!
//! Stripped subtrees: head, script, style, noscript, template, nav, header, footer
//! and aside.

use scraper::{ElementRef, Html, Node, Selector};

/// Maximum number of characters kept from the extracted text
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Maximum number of characters kept from the raw markup
pub const MAX_HTML_CHARS: usize = 100_000;

/// Elements whose whole subtree is ignored when extracting text
pub const EXCLUDED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "nav", "header", "footer", "aside",
];

/// Title and readable text of one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Trimmed `<title>` text, empty when missing
    pub title: String,

    /// One line per non-empty text node, uncapped
    pub content: String,
}

/// Parses HTML content and extracts title and text
///
/// # Arguments
///
/// * `html` - The HTML content to parse
///
/// # Returns
///
/// The parsed page. Parsing never fails; malformed markup yields whatever text the
/// HTML5 parser recovers.
///
/// # Example
///
/// ```
/// use market_scout::crawler::parse_html;
///
/// let html = r#"<html><head><title>Test</title></head><body><nav>Menu</nav><p>Hello</p></body></html>"#;
/// let parsed = parse_html(html);
/// assert_eq!(parsed.title, "Test");
/// assert_eq!(parsed.content, "Hello");
/// ```
pub fn parse_html(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document).unwrap_or_default(),
        content: extract_text(&document),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collects text nodes outside of excluded subtrees, one trimmed line each
fn extract_text(document: &Html) -> String {
    let mut lines = Vec::new();
    collect_text(document.root_element(), &mut lines);
    lines.join("\n")
}

fn collect_text(element: ElementRef<'_>, lines: &mut Vec<String>) {
    if is_excluded(element.value().name()) {
        return;
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, lines);
        } else if let Node::Text(text) = child.value() {
            for line in text.split('\n') {
                let line = line.trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
            }
        }
    }
}

fn is_excluded(tag: &str) -> bool {
    EXCLUDED_TAGS
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(tag))
}

/// Truncates a string to at most `max_chars` characters
///
/// Counts Unicode scalar values rather than bytes, so multi-byte text is never cut in
/// the middle of a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
