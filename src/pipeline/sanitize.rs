//! Text cleanup applied to every payload before it reaches layout or script.
//!
//! Scraped text arrives with CRLF endings, runs of layout whitespace,
//! zero-width characters copied out of web pages and the odd stray control
//! byte. The renderer chokes on control bytes and draws invisible characters
//! as boxes, so they are removed here; everything else printable, including
//! non-ASCII letters and the list bullet, is kept.
//!
//! Rules are small pure `&str → String` passes, applied in a fixed order by
//! [`clean_flow_text`] (wrapped prose) and [`clean_code_line`] (verbatim code).

use once_cell::sync::Lazy;
use regex::Regex;

/// Spaces per tab when expanding code.
pub const TAB_WIDTH: usize = 4;

/// Clean text that will be re-wrapped: strip invisibles and control
/// characters, then collapse all whitespace runs into single spaces.
pub fn clean_flow_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_control_chars(&s, true);
    collapse_whitespace(&s)
}

/// Clean one physical line of a code block: trailing `\r` removed, tabs
/// expanded, invisibles and control characters stripped. Indentation is kept.
pub fn clean_code_line(input: &str) -> String {
    let s = input.trim_end_matches('\r');
    let s = expand_tabs(s);
    let s = remove_invisible_chars(&s);
    strip_control_chars(&s, false).trim_end().to_string()
}

// ── Invisible Unicode ────────────────────────────────────────────────────

const INVISIBLE: [char; 7] = [
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // BOM
    '\u{00AD}', // soft hyphen
    '\u{180E}', // mongolian vowel separator
];

pub fn remove_invisible_chars(input: &str) -> String {
    input.replace(INVISIBLE, "")
}

// ── Control characters ───────────────────────────────────────────────────

/// Drop control characters. With `keep_breaks`, `\n` and `\t` survive as
/// whitespace (to be collapsed later); otherwise they are removed too.
pub fn strip_control_chars(input: &str, keep_breaks: bool) -> String {
    input
        .chars()
        .filter_map(|c| match c {
            '\n' | '\t' | '\r' if keep_breaks => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// True when `text` contains nothing the renderer cannot decode.
pub fn is_clean(text: &str) -> bool {
    !text.chars().any(|c| c.is_control() || INVISIBLE.contains(&c))
}

// ── Whitespace ───────────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

fn expand_tabs(input: &str) -> String {
    if !input.contains('\t') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len() + TAB_WIDTH * 2);
    let mut col = 0;
    for c in input.chars() {
        if c == '\t' {
            let pad = TAB_WIDTH - (col % TAB_WIDTH);
            out.extend(std::iter::repeat(' ').take(pad));
            col += pad;
        } else {
            out.push(c);
            col += 1;
        }
    }
    out
}

// ── HTML ─────────────────────────────────────────────────────────────────

static RE_SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->")
        .unwrap()
});

static RE_BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|blockquote|pre|section|article|header|footer|hr)\b[^>]*>",
    )
    .unwrap()
});

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Heuristic used for legacy `content` bodies.
pub fn looks_like_html(text: &str) -> bool {
    text.contains('<') && text.contains('>')
}

/// Visible text of an HTML fragment, one paragraph per `\n\n`.
///
/// `script`, `style` and comments are removed with their bodies. Block tags
/// end a line, other tags vanish. Each line is trimmed and split further on
/// runs of two spaces; empty chunks are dropped.
pub fn html_to_text(html: &str) -> String {
    let text = RE_SCRIPT_STYLE.replace_all(html, "");
    let text = RE_BLOCK_TAG.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ── Truncation ───────────────────────────────────────────────────────────

/// First `max_chars` characters of `input`, never splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_scripts_and_tags_removed() {
        let html = "<p>Hello <b>world</b></p><script>evil()</script><style>p{}</style>";
        assert_eq!(html_to_text(html), "Hello world");
    }

    #[test]
    fn html_blocks_become_paragraphs() {
        let html = "<h1>Title</h1>\n<div>First &amp; second</div><!-- note --><p>Third<br>line</p>";
        assert_eq!(html_to_text(html), "Title\n\nFirst & second\n\nThird\n\nline");
        assert_eq!(html_to_text("<span>a  b</span>"), "a\n\nb");
    }

    #[test]
    fn html_detection() {
        assert!(looks_like_html("<p>x</p>"));
        assert!(!looks_like_html("2 < 3"));
    }

    #[test]
    fn flow_text_collapses_whitespace() {
        assert_eq!(clean_flow_text("  a\r\n\tb   c  "), "a b c");
    }

    #[test]
    fn flow_text_drops_invisibles_and_controls() {
        let input = "zero\u{200B}width\u{0007} bell\u{FEFF}";
        assert_eq!(clean_flow_text(input), "zerowidth bell");
    }

    #[test]
    fn non_ascii_is_kept() {
        assert_eq!(clean_flow_text("• café — naïve"), "• café — naïve");
    }

    #[test]
    fn code_line_expands_tabs_and_keeps_indent() {
        assert_eq!(clean_code_line("\tif x {\r"), "    if x {");
        assert_eq!(clean_code_line("ab\tc"), "ab  c");
        assert_eq!(clean_code_line("  keep"), "  keep");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 80), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn clean_detection() {
        assert!(is_clean("plain • text"));
        assert!(!is_clean("tab\there"));
        assert!(!is_clean("soft\u{00AD}hyphen"));
    }
}
