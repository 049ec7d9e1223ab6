//! Text sanitization passes for rich-text and escaped fields.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Sanitize a rich-text field: null becomes empty, markup is stripped to its
/// text content (entities decoded), line breaks become spaces and whitespace
/// runs collapse to one space.
pub fn clean_text(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let mut result = strip_markup(text);
    result = flatten_line_breaks(&result);
    result = collapse_whitespace(&result);
    result
}

/// Decode HTML entities in an escaped field such as a link (`&amp;` → `&`).
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    fragment_text(text)
}

/// Trim a plain optional field, mapping blank values to `None`.
pub fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

// ---------------------------------------------------------------------------
// Pass 1: Strip markup
// ---------------------------------------------------------------------------

/// Keep only the text content of an HTML fragment.
fn strip_markup(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.to_string();
    }
    fragment_text(text)
}

fn fragment_text(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    fragment.root_element().text().collect()
}

// ---------------------------------------------------------------------------
// Pass 2: Flatten line breaks
// ---------------------------------------------------------------------------

fn flatten_line_breaks(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse whitespace
// ---------------------------------------------------------------------------

/// Collapse whitespace runs (non-breaking spaces included) and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_markup_entities_and_breaks() {
        assert_eq!(clean_text(Some("<p>Hello&nbsp;World</p>\n\n")), "Hello World");
    }

    #[test]
    fn null_summary_is_empty() {
        assert_eq!(clean_text(None), "");
    }

    #[test]
    fn nested_markup_keeps_text_only() {
        let input = "<div><h2>Background</h2>\r\n<p>MS is <em>chronic</em>.</p><ul><li>one</li></ul></div>";
        assert_eq!(clean_text(Some(input)), "Background MS is chronic.one");
    }

    #[test]
    fn plain_text_only_collapses_whitespace() {
        assert_eq!(clean_text(Some("  a \t b\n\nc  ")), "a b c");
    }

    #[test]
    fn unescape_link_entities() {
        assert_eq!(
            unescape_html("https://example.org/search?q=ms&amp;page=2"),
            "https://example.org/search?q=ms&page=2"
        );
        assert_eq!(unescape_html("https://example.org/a"), "https://example.org/a");
    }

    #[test]
    fn non_blank_maps_whitespace_to_none() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" Nature ")), Some("Nature".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
