//! Script serializer: draw commands → renderer script text.
//!
//! Every command becomes one `puts "…"` line. Text-bearing payloads sit in a
//! quoted string *inside* that outer string, so they are escaped twice: once
//! for the inner quotes and once more for the outer `puts` string. Both levels
//! backslash-escape `\`, `"`, `$`, `[` and `]`, which is everything the
//! renderer's Tcl-style reader would otherwise interpret.
//!
//! This stage does no I/O and never fails. Identical commands produce
//! byte-identical scripts.

use crate::config::PageGeometry;
use crate::pipeline::layout::{DrawCommand, DrawCommandSequence};
use crate::pipeline::sanitize::{remove_invisible_chars, strip_control_chars};
use std::fmt::Write as _;

const SPECIAL: [char; 5] = ['\\', '"', '$', '[', ']'];

/// Serialize a command sequence into script text.
pub fn serialize(commands: &DrawCommandSequence, geometry: &PageGeometry) -> String {
    let mut out = String::with_capacity(64 + commands.len() * 48);
    out.push_str("# web2ink drawing script\n");
    let _ = writeln!(out, "# pages: {}", commands.page_count);
    out.push_str(&puts(&format!(
        "size {} {}",
        fmt_num(geometry.width),
        fmt_num(geometry.height)
    )));

    for cmd in commands {
        out.push_str(&command_line(cmd));
    }
    out
}

/// Script line for a single command, newline-terminated.
pub fn command_line(cmd: &DrawCommand) -> String {
    let inner = match cmd {
        DrawCommand::SetFont { family, size } => {
            format!("set_font {} {}", quoted(family), fmt_num(*size))
        }
        DrawCommand::SetPen { color } => format!("pen {}", pen_color(color)),
        DrawCommand::Text { x, y, content } => {
            format!("text {} {} {}", fmt_num(*x), fmt_num(*y), quoted(content))
        }
        DrawCommand::Image {
            x,
            y,
            width,
            height,
            path,
        } => format!(
            "image {} {} {} {} {}",
            fmt_num(*x),
            fmt_num(*y),
            fmt_num(*width),
            fmt_num(*height),
            quoted(&path.to_string_lossy())
        ),
        DrawCommand::Line {
            x1,
            y1,
            x2,
            y2,
            width,
        } => format!(
            "line {} {} {} {} {}",
            fmt_num(*x1),
            fmt_num(*y1),
            fmt_num(*x2),
            fmt_num(*y2),
            fmt_num(*width)
        ),
        DrawCommand::Rectangle {
            x,
            y,
            width,
            height,
            line_width,
        } => format!(
            "rectangle {} {} {} {} {}",
            fmt_num(*x),
            fmt_num(*y),
            fmt_num(*width),
            fmt_num(*height),
            fmt_num(*line_width)
        ),
        DrawCommand::PageBreak => "page".to_string(),
    };
    puts(&inner)
}

fn puts(inner: &str) -> String {
    format!("puts \"{}\"\n", escape(inner))
}

/// Payload sanitized, escaped and wrapped in the inner quotes.
fn quoted(payload: &str) -> String {
    format!("\"{}\"", escape(&sanitize_payload(payload)))
}

/// Remove anything the renderer cannot decode: control characters
/// (newlines included) and invisible format characters.
pub fn sanitize_payload(text: &str) -> String {
    strip_control_chars(&remove_invisible_chars(text), false)
}

fn pen_color(color: &str) -> String {
    let c: String = color
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '#')
        .collect();
    if c.is_empty() {
        "black".to_string()
    } else {
        c
    }
}

/// Backslash-escape one quoting level.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Undo one level of [`escape`].
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Recover the payload of a serialized `text` line.
pub fn parse_text_line(line: &str) -> Option<String> {
    let body = line.trim_end().strip_prefix("puts \"")?.strip_suffix('"')?;
    let inner = unescape(body);
    let rest = inner.strip_prefix("text ")?;
    let start = rest.find('"')?;
    let quoted = rest[start + 1..].strip_suffix('"')?;
    Some(unescape(quoted))
}

/// Integers print without a fraction; everything else with at most two
/// decimals and no trailing zeros.
pub fn fmt_num(v: f32) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    let rounded = (v * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        let i = rounded as i64;
        return i.to_string();
    }
    let s = format!("{rounded:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentBlock, ContentDocument};
    use crate::pipeline::layout::layout;
    use crate::pipeline::sanitize::is_clean;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn seq(commands: Vec<DrawCommand>) -> DrawCommandSequence {
        DrawCommandSequence {
            commands,
            page_count: 1,
        }
    }

    #[test]
    fn numbers_format_compactly() {
        assert_eq!(fmt_num(100.0), "100");
        assert_eq!(fmt_num(-0.0), "0");
        assert_eq!(fmt_num(17.5), "17.5");
        assert_eq!(fmt_num(26.25), "26.25");
        assert_eq!(fmt_num(1.0 / 3.0), "0.33");
        assert_eq!(fmt_num(f32::NAN), "0");
    }

    #[test]
    fn every_command_is_one_puts_line() {
        let s = serialize(
            &seq(vec![
                DrawCommand::SetPen { color: "black".into() },
                DrawCommand::SetFont { family: "DejaVu Sans Mono".into(), size: 16.0 },
                DrawCommand::Text { x: 120.0, y: 155.0, content: "hi".into() },
                DrawCommand::Image {
                    x: 1.0,
                    y: 2.0,
                    width: 3.5,
                    height: 4.0,
                    path: PathBuf::from("/tmp/a b.png"),
                },
                DrawCommand::Line { x1: 0.0, y1: 1.0, x2: 2.0, y2: 1.0, width: 1.0 },
                DrawCommand::Rectangle { x: 0.0, y: 0.0, width: 5.0, height: 5.0, line_width: 2.0 },
                DrawCommand::PageBreak,
            ]),
            &PageGeometry::default(),
        );
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# web2ink drawing script",
                "# pages: 1",
                "puts \"size 1872 2404\"",
                "puts \"pen black\"",
                "puts \"set_font \\\"DejaVu Sans Mono\\\" 16\"",
                "puts \"text 120 155 \\\"hi\\\"\"",
                "puts \"image 1 2 3.5 4 \\\"/tmp/a b.png\\\"\"",
                "puts \"line 0 1 2 1 1\"",
                "puts \"rectangle 0 0 5 5 2\"",
                "puts \"page\"",
            ]
        );
    }

    #[test]
    fn quotes_and_backslashes_escaped_twice() {
        let line = command_line(&DrawCommand::Text {
            x: 0.0,
            y: 0.0,
            content: r#"say "hi" \ [x] $y"#.into(),
        });
        assert_eq!(
            line,
            "puts \"text 0 0 \\\"say \\\\\\\"hi\\\\\\\" \\\\\\\\ \\\\\\[x\\\\\\] \\\\\\$y\\\"\"\n"
        );
        assert_eq!(parse_text_line(&line).as_deref(), Some(r#"say "hi" \ [x] $y"#));
    }

    #[test]
    fn control_characters_stripped_from_payloads() {
        let line = command_line(&DrawCommand::Text {
            x: 0.0,
            y: 0.0,
            content: "a\nb\u{0}c\u{200B}d".into(),
        });
        assert_eq!(parse_text_line(&line).as_deref(), Some("abcd"));
    }

    #[test]
    fn hostile_pen_color_neutralised() {
        assert_eq!(
            command_line(&DrawCommand::SetPen { color: "red\"; exec rm".into() }),
            "puts \"pen redexecrm\"\n"
        );
        assert_eq!(
            command_line(&DrawCommand::SetPen { color: "  ".into() }),
            "puts \"pen black\"\n"
        );
    }

    #[test]
    fn serialization_is_idempotent() {
        let doc = ContentDocument::new("Idem \"quoted\"")
            .with_block(ContentBlock::heading(2, "Section"))
            .with_block(ContentBlock::paragraph("Some [bracketed] $text."));
        let commands = layout(&doc, PageGeometry::default());
        let a = serialize(&commands, &PageGeometry::default());
        let b = serialize(&commands, &PageGeometry::default());
        assert_eq!(a, b);
        assert!(a.contains("\\\\\\[bracketed\\\\\\]"));
    }

    proptest! {
        #[test]
        fn escape_round_trips(text in ".{0,200}") {
            prop_assert_eq!(unescape(&escape(&text)), text.clone());
            prop_assert_eq!(unescape(&unescape(&escape(&escape(&text)))), text);
        }

        #[test]
        fn text_line_reconstructs_printable_payload(text in "[ -~]{0,120}") {
            let line = command_line(&DrawCommand::Text { x: 10.0, y: 20.5, content: text.clone() });
            prop_assert_eq!(parse_text_line(&line), Some(text));
        }

        #[test]
        fn sanitized_payload_is_clean(text in "\\PC{0,80}[\\x00-\\x1f\\x{200b}\\x{feff}]{0,10}") {
            prop_assert!(is_clean(&sanitize_payload(&text)));
        }

        #[test]
        fn serialized_lines_never_break_inside_payload(text in ".{0,80}") {
            let s = serialize(
                &seq(vec![DrawCommand::Text { x: 0.0, y: 0.0, content: format!("{text}\n{text}") }]),
                &PageGeometry::default(),
            );
            prop_assert_eq!(s.lines().count(), 4);
        }
    }
}
