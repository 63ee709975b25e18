use std::borrow::Cow;

use scraper::Html;

/// Removes control characters from feed-supplied text.
///
/// Tabs, newlines and carriage returns survive; every other C0/C1 control
/// (NUL, BEL, ESC, DEL, ...) is dropped. Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_stripped = |c: char| c.is_control() && !matches!(c, '\t' | '\n' | '\r');

    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|&c| !is_stripped(c)).collect())
}

/// Returns the text before the first line break, trimmed.
///
/// Some feeds emit multi-line titles (title plus byline, or a stray
/// newline from a CMS template); only the first line is the title.
pub fn first_line(s: &str) -> &str {
    s.split(['\n', '\r']).next().unwrap_or_default().trim()
}

/// Renders an HTML fragment as plain text.
///
/// Text nodes are trimmed and joined with single spaces, so
/// `<p>Hello</p><p>world</p>` becomes `Hello world`. Plain text passes
/// through with its whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
