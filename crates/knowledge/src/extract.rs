//! Text extraction from fetched documents.
//!
//! HTML documents are parsed and stripped of navigational boilerplate before
//! the text is collapsed to a single-spaced run. Anything else is treated as
//! UTF-8 text with a best-effort decode.

use scraper::node::{Element, Node};
use scraper::{ElementRef, Html, Selector};

/// Tags whose entire subtree never carries document content.
const EXCLUDED_TAGS: [&str; 10] = [
    "script", "style", "noscript", "svg", "form", "button", "nav", "header", "footer", "aside",
];

/// Substrings in an element's id/class that mark navigation chrome.
const BOILERPLATE_KEYWORDS: [&str; 9] = [
    "nav",
    "menu",
    "breadcrumb",
    "footer",
    "header",
    "search",
    "toolbar",
    "language",
    "skip",
];

/// Extract `(title, text)` from raw fetched bytes.
///
/// HTML is detected from the declared content type or the URI suffix. The
/// title falls back to `"Untitled"` (HTML without a `<title>`) or to the
/// URI's last path segment (plain text). A whitespace-collapse pass is
/// always applied to the text.
pub fn extract_text(uri: &str, raw: &[u8], content_type: &str) -> (String, String) {
    let uri_lower = uri.to_lowercase();
    let is_html = content_type.to_lowercase().contains("html")
        || uri_lower.ends_with(".html")
        || uri_lower.ends_with(".htm");

    let (title, text) = if is_html {
        extract_html(raw)
    } else {
        let title = uri
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("Untitled")
            .to_string();
        // Best-effort decode; replacement characters are dropped.
        let text: String = String::from_utf8_lossy(raw)
            .chars()
            .filter(|c| *c != '\u{FFFD}')
            .collect();
        (title, text)
    };

    (title, collapse_whitespace(&text))
}

fn extract_html(raw: &[u8]) -> (String, String) {
    let html = String::from_utf8_lossy(raw);
    let document = Html::parse_document(&html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let mut text = String::new();
    collect_text(document.root_element(), &mut text);

    (title, text)
}

/// Walk the DOM, skipping boilerplate subtrees, appending text nodes.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if is_boilerplate(element.value()) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(&text.text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}

fn is_boilerplate(element: &Element) -> bool {
    let name = element.name();
    if name == "title" {
        // Handled separately; keep it out of the body text.
        return true;
    }
    if EXCLUDED_TAGS.contains(&name) {
        return true;
    }

    let mut ident = element.id().unwrap_or("").to_lowercase();
    for class in element.classes() {
        ident.push(' ');
        ident.push_str(&class.to_lowercase());
    }

    BOILERPLATE_KEYWORDS.iter().any(|key| ident.contains(key))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
