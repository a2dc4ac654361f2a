//! Layout engine: content blocks → positioned, paginated draw commands.
//!
//! ## Cursor model
//!
//! A single vertical cursor walks down the page. Every text line claims a
//! *slot*: the cursor advances by the line height and, if that pushes it
//! past `height - margin`, the page is broken first and the line lands at
//! the top margin of the next page. Gaps between blocks (half a line after a
//! paragraph, a header line after a heading) advance the cursor without a
//! check; the next slot catches any overflow.
//!
//! Horizontal measurement uses a character budget per line, not glyph
//! metrics, so wrapping is deterministic and independent of installed fonts.
//!
//! Layout never fails. Empty input still yields the header, and a document
//! whose blocks contribute nothing gets a short placeholder notice.

use crate::config::{LayoutConfig, PageGeometry, PaginationMode};
use crate::document::{ContentBlock, ContentDocument, UNTITLED};
use crate::pipeline::sanitize::{clean_code_line, clean_flow_text, truncate_chars};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PEN_TEXT: &str = "black";
pub const PEN_QUOTE_BAR: &str = "gray";

const PLACEHOLDER_NOTICE: &str = "No readable content could be extracted from this page.";

/// One primitive drawing instruction, in device pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    SetFont {
        family: String,
        size: f32,
    },
    SetPen {
        color: String,
    },
    Text {
        x: f32,
        y: f32,
        content: String,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        path: PathBuf,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
    },
    Rectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        line_width: f32,
    },
    PageBreak,
}

impl DrawCommand {
    /// Vertical position of positioned commands; the lower edge for lines.
    pub fn y(&self) -> Option<f32> {
        match self {
            DrawCommand::Text { y, .. }
            | DrawCommand::Image { y, .. }
            | DrawCommand::Rectangle { y, .. } => Some(*y),
            DrawCommand::Line { y1, y2, .. } => Some(y1.max(*y2)),
            _ => None,
        }
    }
}

/// Ordered draw commands; replay order is render order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawCommandSequence {
    pub commands: Vec<DrawCommand>,
    /// Pages the commands span (1 + number of page breaks).
    pub page_count: usize,
}

impl DrawCommandSequence {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawCommand> {
        self.commands.iter()
    }

    /// Text payloads in order, with their positions.
    pub fn texts(&self) -> impl Iterator<Item = (f32, f32, &str)> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { x, y, content } => Some((*x, *y, content.as_str())),
            _ => None,
        })
    }

    pub fn page_breaks(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::PageBreak))
            .count()
    }
}

impl<'a> IntoIterator for &'a DrawCommandSequence {
    type Item = &'a DrawCommand;
    type IntoIter = std::slice::Iter<'a, DrawCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Mutable layout state, owned by one layout call.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub x: f32,
    pub y: f32,
    /// `None` until a font is set, and again after each page break so the
    /// next text re-establishes it.
    pub font_family: Option<String>,
    pub font_size: f32,
    pub pen: Option<String>,
}

impl Cursor {
    fn at_origin(geometry: &PageGeometry) -> Self {
        Self {
            x: geometry.margin,
            y: geometry.margin,
            font_family: None,
            font_size: 0.0,
            pen: None,
        }
    }
}

/// Lay out `document` with the default typography for `geometry`.
pub fn layout(document: &ContentDocument, geometry: PageGeometry) -> DrawCommandSequence {
    layout_with(document, &LayoutConfig::with_geometry(geometry))
}

/// Lay out `document` with a full layout configuration.
pub fn layout_with(document: &ContentDocument, config: &LayoutConfig) -> DrawCommandSequence {
    let mut engine = LayoutEngine::new(config);
    engine.header(document);

    let body_start = engine.commands.len();
    for block in &document.blocks {
        engine.block(block, document);
    }
    if engine.commands.len() == body_start {
        engine.placeholder();
    }
    if let Some(footer) = &config.footer {
        engine.footer(footer);
    }

    let seq = engine.finish();
    debug!(
        "Layout: {} blocks → {} commands on {} page(s)",
        document.blocks.len(),
        seq.len(),
        seq.page_count
    );
    seq
}

/// Walks one document, appending commands as the cursor moves.
pub struct LayoutEngine<'a> {
    config: &'a LayoutConfig,
    cursor: Cursor,
    commands: Vec<DrawCommand>,
    pages: usize,
    overlap_warned: bool,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self {
            config,
            cursor: Cursor::at_origin(&config.geometry),
            commands: Vec::new(),
            pages: 1,
            overlap_warned: false,
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn finish(self) -> DrawCommandSequence {
        DrawCommandSequence {
            commands: self.commands,
            page_count: self.pages,
        }
    }

    fn g(&self) -> &PageGeometry {
        &self.config.geometry
    }

    // ── Primitives ───────────────────────────────────────────────────────

    fn push(&mut self, cmd: DrawCommand) {
        self.commands.push(cmd);
    }

    fn ensure_font(&mut self, family: &str, size: f32) {
        if self.cursor.font_family.as_deref() == Some(family) && self.cursor.font_size == size {
            return;
        }
        self.cursor.font_family = Some(family.to_string());
        self.cursor.font_size = size;
        self.push(DrawCommand::SetFont {
            family: family.to_string(),
            size,
        });
    }

    fn ensure_pen(&mut self, color: &str) {
        if self.cursor.pen.as_deref() == Some(color) {
            return;
        }
        self.cursor.pen = Some(color.to_string());
        self.push(DrawCommand::SetPen {
            color: color.to_string(),
        });
    }

    fn text(&mut self, x: f32, content: impl Into<String>) {
        let y = self.cursor.y;
        self.push(DrawCommand::Text {
            x,
            y,
            content: content.into(),
        });
    }

    /// Advance by `dy` for a new line, breaking the page first if the line
    /// would fall below the bottom margin.
    fn slot(&mut self, dy: f32) {
        self.cursor.y += dy;
        if self.cursor.y > self.g().bottom() {
            self.break_page();
        }
    }

    /// Advance without an overflow check.
    fn gap(&mut self, dy: f32) {
        self.cursor.y += dy;
    }

    fn break_page(&mut self) {
        match self.config.pagination {
            PaginationMode::PageBreaks => {
                self.push(DrawCommand::PageBreak);
                self.pages += 1;
                self.cursor.font_family = None;
            }
            PaginationMode::Overlap => {
                if !self.overlap_warned {
                    warn!("Content exceeds one page; continuing at the top margin (overlap mode)");
                    self.overlap_warned = true;
                }
            }
        }
        self.cursor.y = self.g().margin;
    }

    // ── Header ───────────────────────────────────────────────────────────

    /// Title, source line, rule and optional reference image.
    fn header(&mut self, doc: &ContentDocument) {
        let g = *self.g();
        let fonts = &self.config.fonts;
        let (title_family, title_size) = (fonts.title_family.clone(), fonts.title_size);
        let (body_family, body_size) = (fonts.body_family.clone(), fonts.body_size);

        self.ensure_pen(PEN_TEXT);

        let cleaned = clean_flow_text(&doc.title);
        let title = if cleaned.is_empty() {
            UNTITLED
        } else {
            truncate_chars(&cleaned, self.config.wrap.title)
        };
        self.ensure_font(&title_family, title_size);
        self.text(g.margin, title);

        self.gap(2.0 * g.line_height);
        let source = doc
            .source_url
            .as_deref()
            .map(clean_flow_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        self.ensure_font(&body_family, body_size);
        self.text(g.margin, format!("Source: {source}"));

        let reference = doc
            .reference_image
            .as_deref()
            .filter(|p| p.is_file())
            .map(Path::to_path_buf);
        let size = self.config.reference_image_size;
        let ref_x = g.width - g.margin - size;

        let rule_y = self.cursor.y + g.line_height;
        let rule_end = if reference.is_some() {
            ref_x - self.config.indent
        } else {
            g.width - g.margin
        };
        self.push(DrawCommand::Line {
            x1: g.margin,
            y1: rule_y,
            x2: rule_end,
            y2: rule_y,
            width: 1.0,
        });

        self.cursor.y = g.margin + 5.0 * g.line_height;

        if let Some(path) = reference {
            self.push(DrawCommand::Image {
                x: ref_x,
                y: g.margin,
                width: size,
                height: size,
                path,
            });
            self.push(DrawCommand::Rectangle {
                x: ref_x,
                y: g.margin,
                width: size,
                height: size,
                line_width: 2.0,
            });
            self.cursor.y = self.cursor.y.max(g.margin + size + g.line_height);
        } else if doc.reference_image.is_some() {
            debug!("Reference image missing on disk; header laid out without it");
        }
    }

    /// Stamp on the bottom margin line of the last page. Never paginates.
    fn footer(&mut self, text: &str) {
        let cleaned = clean_flow_text(text);
        if cleaned.is_empty() {
            return;
        }
        let (x, y) = (self.g().margin, self.g().bottom());
        let fonts = &self.config.fonts;
        let (family, size) = (fonts.emphasis_family.clone(), fonts.caption_size);
        self.ensure_font(&family, size);
        self.push(DrawCommand::Text {
            x,
            y,
            content: truncate_chars(&cleaned, self.config.wrap.title).to_string(),
        });
    }

    fn placeholder(&mut self) {
        let fonts = &self.config.fonts;
        let (family, size) = (fonts.emphasis_family.clone(), fonts.body_size);
        let lh = self.g().line_height;
        let x = self.g().margin;
        self.slot(lh);
        self.ensure_font(&family, size);
        self.text(x, PLACEHOLDER_NOTICE);
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    fn block(&mut self, block: &ContentBlock, doc: &ContentDocument) {
        match block {
            ContentBlock::Heading { level, text } => self.heading(*level, text),
            ContentBlock::Paragraph { text } => self.paragraph(text),
            ContentBlock::List { ordered, items } => self.list(*ordered, items),
            ContentBlock::Blockquote { text } => self.blockquote(text),
            ContentBlock::Code { text } => self.code(text),
            ContentBlock::Image { image_id, alt } => self.image(image_id, alt, doc),
        }
    }

    /// Font size for a heading level; levels outside 1..=6 count as 6.
    pub fn heading_size(&self, level: u8) -> f32 {
        let level = if (1..=6).contains(&level) { level } else { 6 };
        let f = &self.config.fonts;
        (f.h1_size - f32::from(level - 1) * f.heading_step).max(f.body_size)
    }

    fn heading(&mut self, level: u8, text: &str) {
        let lines = wrap(&clean_flow_text(text), self.config.wrap.heading);
        if lines.is_empty() {
            return;
        }
        let family = self.config.fonts.heading_family.clone();
        let size = self.heading_size(level);
        let hlh = self.g().header_line_height;
        let x = self.g().margin;

        for line in lines {
            self.slot(hlh);
            self.ensure_font(&family, size);
            self.text(x, line);
        }
        self.gap(hlh);
    }

    fn paragraph(&mut self, text: &str) {
        let lines = wrap(&clean_flow_text(text), self.config.wrap.paragraph);
        if lines.is_empty() {
            return;
        }
        let f = &self.config.fonts;
        let (family, size) = (f.body_family.clone(), f.body_size);
        let lh = self.g().line_height;
        let x = self.g().margin;

        for line in lines {
            self.slot(lh);
            self.ensure_font(&family, size);
            self.text(x, line);
        }
        self.gap(lh / 2.0);
    }

    fn list(&mut self, ordered: bool, items: &[String]) {
        let f = &self.config.fonts;
        let (family, size) = (f.body_family.clone(), f.body_size);
        let lh = self.g().line_height;
        let x = self.g().margin;
        let indent = self.config.indent;
        let width = self.config.wrap.narrow;

        let mut emitted = false;
        for (i, item) in items.iter().enumerate() {
            let lines = wrap(&clean_flow_text(item), width);
            let prefix = if ordered {
                format!("{}. ", i + 1)
            } else {
                "• ".to_string()
            };
            for (n, line) in lines.into_iter().enumerate() {
                self.slot(lh);
                self.ensure_font(&family, size);
                if n == 0 {
                    self.text(x, format!("{prefix}{line}"));
                } else {
                    self.text(x + indent, line);
                }
                emitted = true;
            }
        }
        if emitted {
            self.gap(lh / 2.0);
        }
    }

    fn blockquote(&mut self, text: &str) {
        let lines = wrap(&clean_flow_text(text), self.config.wrap.narrow);
        if lines.is_empty() {
            return;
        }
        let f = &self.config.fonts;
        let (family, size) = (f.emphasis_family.clone(), f.body_size);
        let lh = self.g().line_height;
        let margin = self.g().margin;
        let indent = self.config.indent;

        for line in lines {
            self.slot(lh);
            let y = self.cursor.y;
            self.ensure_pen(PEN_QUOTE_BAR);
            self.push(DrawCommand::Line {
                x1: margin + indent / 2.0,
                y1: y - lh * 0.75,
                x2: margin + indent / 2.0,
                y2: y + lh * 0.25,
                width: 2.0,
            });
            self.ensure_pen(PEN_TEXT);
            self.ensure_font(&family, size);
            self.text(margin + indent, line);
        }
        self.gap(lh / 2.0);
    }

    fn code(&mut self, text: &str) {
        let lines: Vec<String> = text.split('\n').map(clean_code_line).collect();
        let Some(last) = lines.iter().rposition(|l| !l.is_empty()) else {
            return;
        };
        let first = lines.iter().position(|l| !l.is_empty()).unwrap_or(0);

        let f = &self.config.fonts;
        let (family, size) = (f.code_family.clone(), f.code_size);
        let lh = self.g().line_height;
        let x = self.g().margin + self.config.indent;

        for line in &lines[first..=last] {
            self.slot(lh);
            if line.is_empty() {
                continue;
            }
            self.ensure_font(&family, size);
            self.text(x, line.as_str());
        }
        self.gap(lh / 2.0);
    }

    fn image(&mut self, image_id: &str, alt: &str, doc: &ContentDocument) {
        let Some(path) = doc.images.get(image_id).filter(|p| p.is_file()) else {
            debug!("Skipping image '{image_id}': not resolvable to a local file");
            return;
        };
        let g = *self.g();
        let lh = g.line_height;

        let mut width = self.config.max_image_width.min(g.content_width());
        let mut height = match image::image_dimensions(path) {
            Ok((w, h)) if w > 0 => width * h as f32 / w as f32,
            Ok(_) => width,
            Err(e) => {
                debug!("Cannot read dimensions of {}: {e}; assuming square", path.display());
                width
            }
        };
        // Never taller than a page.
        let usable = g.bottom() - g.margin;
        if height > usable {
            width *= usable / height;
            height = usable;
        }

        self.gap(lh);
        if self.cursor.y + height > g.bottom() {
            self.break_page();
        }
        let top = self.cursor.y;
        self.push(DrawCommand::Image {
            x: g.margin,
            y: top,
            width,
            height,
            path: path.clone(),
        });
        self.gap(height);

        let caption = wrap(&clean_flow_text(alt), self.config.wrap.paragraph);
        if !caption.is_empty() {
            let f = &self.config.fonts;
            let (family, size) = (f.emphasis_family.clone(), f.caption_size);
            for line in caption {
                self.slot(lh);
                self.ensure_font(&family, size);
                self.text(g.margin, line);
            }
        }
        self.gap(lh / 2.0);
    }
}

/// Greedy word wrap bounded by `width` characters.
///
/// Words longer than `width` are split into `width`-sized chunks. Whitespace
/// only separates words; no other character is dropped or added.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word = word;
        let mut word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
            continue;
        }
        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
        }
        while word_len > width {
            let head = truncate_chars(word, width);
            lines.push(head.to_string());
            word = &word[head.len()..];
            word_len -= width;
        }
        current.push_str(word);
        current_len = word_len;
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FontConfig;
    use proptest::prelude::*;

    fn geometry(margin: f32) -> PageGeometry {
        PageGeometry {
            width: 1872.0,
            height: 2404.0,
            margin,
            line_height: 35.0,
            header_line_height: 55.0,
        }
    }

    fn fonts_set(seq: &DrawCommandSequence) -> Vec<(String, f32)> {
        seq.iter()
            .filter_map(|c| match c {
                DrawCommand::SetFont { family, size } => Some((family.clone(), *size)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn wrap_basic() {
        assert_eq!(wrap("the quick brown fox", 9), vec!["the quick", "brown fox"]);
        assert_eq!(wrap("", 10), Vec::<String>::new());
        assert_eq!(wrap("   ", 10), Vec::<String>::new());
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn title_only_document_has_header_and_notice() {
        let seq = layout(&ContentDocument::new("Lonely"), geometry(120.0));
        let texts: Vec<&str> = seq.texts().map(|(_, _, t)| t).collect();
        assert_eq!(texts[0], "Lonely");
        assert_eq!(texts[1], "Source: unknown");
        assert_eq!(texts[2], PLACEHOLDER_NOTICE);
        assert_eq!(seq.page_count, 1);
    }

    #[test]
    fn footer_stamped_on_bottom_margin_without_break() {
        let mut config = LayoutConfig::with_geometry(geometry(120.0));
        config.footer = Some("Generated: 2024-05-01 09:30:00".into());
        let doc = ContentDocument::new("Stamped").with_block(ContentBlock::paragraph("Body."));
        let seq = layout_with(&doc, &config);

        let last = seq.texts().last().unwrap();
        assert_eq!(last, (120.0, 2404.0 - 120.0, "Generated: 2024-05-01 09:30:00"));
        assert_eq!(seq.page_breaks(), 0);
        assert_eq!(seq.page_count, 1);

        let plain = layout(&doc, geometry(120.0));
        assert!(plain.texts().all(|t| !t.2.starts_with("Generated:")));
    }

    #[test]
    fn empty_title_falls_back() {
        let seq = layout(&ContentDocument::new("  \u{200B} "), geometry(120.0));
        assert_eq!(seq.texts().next().map(|t| t.2), Some(UNTITLED));
    }

    #[test]
    fn title_truncated_to_eighty_chars() {
        let long = "x".repeat(200);
        let seq = layout(&ContentDocument::new(long), geometry(120.0));
        let (x, y, title) = seq.texts().next().unwrap();
        assert_eq!((x, y), (120.0, 120.0));
        assert_eq!(title.chars().count(), 80);
    }

    #[test]
    fn intro_scenario_positions_title_and_stays_on_page() {
        let doc = ContentDocument::new("Example")
            .with_block(ContentBlock::heading(1, "Intro"))
            .with_block(ContentBlock::paragraph("Hello world."));
        let g = geometry(100.0);
        let seq = layout(&doc, g);

        let (x, y, title) = seq.texts().next().unwrap();
        assert_eq!((x, y, title), (100.0, 100.0, "Example"));
        let last_y = seq.commands.last().and_then(DrawCommand::y).unwrap();
        assert!(last_y <= 2304.0, "last y {last_y}");

        let texts: Vec<&str> = seq.texts().map(|t| t.2).collect();
        assert_eq!(texts, vec!["Example", "Source: unknown", "Intro", "Hello world."]);
    }

    #[test]
    fn heading_sizes_step_down_and_floor_at_body() {
        let config = LayoutConfig::default();
        let engine = LayoutEngine::new(&config);
        assert_eq!(engine.heading_size(1), 32.0);
        assert_eq!(engine.heading_size(2), 28.0);
        assert_eq!(engine.heading_size(4), 20.0);
        assert_eq!(engine.heading_size(6), 18.0);
        assert_eq!(engine.heading_size(0), engine.heading_size(6));
        assert_eq!(engine.heading_size(42), 18.0);
    }

    #[test]
    fn long_document_breaks_pages_and_resets_cursor() {
        let mut doc = ContentDocument::new("Long");
        for i in 0..120 {
            doc = doc.with_block(ContentBlock::paragraph(format!("Paragraph number {i}.")));
        }
        let seq = layout(&doc, geometry(120.0));
        assert!(seq.page_breaks() >= 1);
        assert_eq!(seq.page_count, seq.page_breaks() + 1);

        let after_break = seq
            .commands
            .windows(3)
            .find(|w| matches!(w[0], DrawCommand::PageBreak))
            .expect("page break");
        // Font re-established, then the first line sits at the top margin.
        assert!(matches!(after_break[1], DrawCommand::SetFont { .. }));
        assert_eq!(after_break[2].y(), Some(120.0));

        for (_, y, _) in seq.texts() {
            assert!(y <= 2404.0 - 120.0, "text at {y} below bottom margin");
        }
    }

    #[test]
    fn overlap_mode_never_emits_page_breaks() {
        let mut doc = ContentDocument::new("Long");
        for i in 0..120 {
            doc = doc.with_block(ContentBlock::paragraph(format!("Line {i}")));
        }
        let config = LayoutConfig {
            pagination: PaginationMode::Overlap,
            ..LayoutConfig::default()
        };
        let seq = layout_with(&doc, &config);
        assert_eq!(seq.page_breaks(), 0);
        assert_eq!(seq.page_count, 1);
        assert_eq!(seq.texts().count(), 122);
    }

    #[test]
    fn fonts_only_emitted_on_change() {
        let doc = ContentDocument::new("T")
            .with_block(ContentBlock::paragraph("one"))
            .with_block(ContentBlock::paragraph("two"))
            .with_block(ContentBlock::Code { text: "x = 1".into() });
        let seq = layout(&doc, geometry(120.0));
        let f = FontConfig::default();
        assert_eq!(
            fonts_set(&seq),
            vec![
                (f.title_family.clone(), f.title_size),
                (f.body_family.clone(), f.body_size),
                (f.code_family.clone(), f.code_size),
            ]
        );
    }

    #[test]
    fn list_prefixes_and_continuation_indent() {
        let long_item = "word ".repeat(30);
        let doc = ContentDocument::new("T").with_block(ContentBlock::List {
            ordered: true,
            items: vec!["first".into(), long_item],
        });
        let seq = layout(&doc, geometry(120.0));
        let body: Vec<(f32, &str)> = seq.texts().skip(2).map(|(x, _, t)| (x, t)).collect();
        assert_eq!(body[0], (120.0, "1. first"));
        assert!(body[1].1.starts_with("2. word"));
        assert_eq!(body[1].0, 120.0);
        assert_eq!(body[2].0, 140.0);
        assert!(!body[2].1.starts_with("2."));
    }

    #[test]
    fn unordered_list_uses_bullets() {
        let doc = ContentDocument::new("T").with_block(ContentBlock::List {
            ordered: false,
            items: vec!["a".into(), "".into(), "b".into()],
        });
        let seq = layout(&doc, geometry(120.0));
        let body: Vec<&str> = seq.texts().skip(2).map(|t| t.2).collect();
        assert_eq!(body, vec!["• a", "• b"]);
    }

    #[test]
    fn blockquote_is_indented_italic_with_bar() {
        let doc = ContentDocument::new("T").with_block(ContentBlock::Blockquote {
            text: "quoted".into(),
        });
        let seq = layout(&doc, geometry(120.0));
        let f = FontConfig::default();
        assert!(fonts_set(&seq).contains(&(f.emphasis_family.clone(), f.body_size)));
        assert!(seq.iter().any(|c| matches!(c, DrawCommand::SetPen { color } if color == PEN_QUOTE_BAR)));
        let (x, _, t) = seq.texts().last().unwrap();
        assert_eq!((x, t), (140.0, "quoted"));
    }

    #[test]
    fn code_is_verbatim_and_blank_lines_advance() {
        let doc = ContentDocument::new("T").with_block(ContentBlock::Code {
            text: "\nfn main() {\r\n\n\tprintln!(\"hi\");\n}\n".into(),
        });
        let seq = layout(&doc, geometry(120.0));
        let body: Vec<(f32, f32, &str)> = seq.texts().skip(2).collect();
        assert_eq!(body.len(), 3);
        assert_eq!(body[0].2, "fn main() {");
        assert_eq!(body[1].2, "    println!(\"hi\");");
        assert_eq!(body[2].2, "}");
        // The blank line between the first two still took a slot.
        assert_eq!(body[1].1 - body[0].1, 70.0);
    }

    #[test]
    fn empty_blocks_contribute_nothing() {
        let doc = ContentDocument::new("T")
            .with_block(ContentBlock::paragraph(""))
            .with_block(ContentBlock::heading(2, "   "))
            .with_block(ContentBlock::Code { text: "\n\n".into() })
            .with_block(ContentBlock::paragraph("real"));
        let seq = layout(&doc, geometry(120.0));
        let body: Vec<(f32, f32, &str)> = seq.texts().skip(2).collect();
        assert_eq!(body.len(), 1);
        // Body starts five lines below the top margin; one slot for the line.
        assert_eq!(body[0].1, 120.0 + 5.0 * 35.0 + 35.0);
    }

    #[test]
    fn unresolvable_image_skipped_with_caption() {
        let doc = ContentDocument::new("T")
            .with_image("gone", "/nonexistent/image.png")
            .with_block(ContentBlock::Image {
                image_id: "gone".into(),
                alt: "caption".into(),
            })
            .with_block(ContentBlock::Image {
                image_id: "unknown".into(),
                alt: "other".into(),
            });
        let seq = layout(&doc, geometry(120.0));
        assert!(!seq.iter().any(|c| matches!(c, DrawCommand::Image { .. })));
        assert!(!seq.texts().any(|t| t.2 == "caption" || t.2 == "other"));
    }

    #[test]
    fn image_keeps_aspect_ratio_and_falls_back_to_square() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("wide.png");
        image::RgbImage::new(200, 100).save(&wide).unwrap();
        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"not an image").unwrap();

        let doc = ContentDocument::new("T")
            .with_image("wide", &wide)
            .with_image("garbage", &garbage)
            .with_block(ContentBlock::Image { image_id: "wide".into(), alt: "Wide".into() })
            .with_block(ContentBlock::Image { image_id: "garbage".into(), alt: String::new() });
        let seq = layout(&doc, geometry(120.0));

        let sizes: Vec<(f32, f32)> = seq
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Image { width, height, .. } => Some((*width, *height)),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![(500.0, 250.0), (500.0, 500.0)]);
        assert!(seq.texts().any(|t| t.2 == "Wide"));
    }

    #[test]
    fn reference_image_framed_in_corner() {
        let dir = tempfile::tempdir().unwrap();
        let qr = dir.path().join("qr.png");
        image::RgbImage::new(10, 10).save(&qr).unwrap();

        let doc = ContentDocument::new("T")
            .with_reference_image(&qr)
            .with_block(ContentBlock::paragraph("body"));
        let seq = layout(&doc, geometry(120.0));

        assert!(seq.iter().any(|c| matches!(
            c,
            DrawCommand::Image { x, y, width, .. } if *x == 1872.0 - 120.0 - 350.0 && *y == 120.0 && *width == 350.0
        )));
        assert!(seq.iter().any(|c| matches!(c, DrawCommand::Rectangle { .. })));
        let (_, y, _) = seq.texts().last().unwrap();
        assert!(y > 120.0 + 350.0, "body starts below the reference image, got {y}");
    }

    proptest! {
        #[test]
        fn wrap_drops_no_characters(text in "[a-z ]{0,300}", width in 1usize..90) {
            let lines = wrap(&text, width);
            let src: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let out: String = lines.concat().chars().filter(|c| !c.is_whitespace()).collect();
            prop_assert_eq!(src, out);
        }

        #[test]
        fn wrap_respects_width(text in "[a-zé ]{0,300}", width in 1usize..90) {
            for line in wrap(&text, width) {
                prop_assert!(line.chars().count() <= width);
                prop_assert!(!line.is_empty());
            }
        }

        #[test]
        fn wrap_preserves_word_order(words in proptest::collection::vec("[a-z]{1,8}", 0..40)) {
            let text = words.join(" ");
            let lines = wrap(&text, 20);
            prop_assert_eq!(lines.join(" "), text);
        }
    }
}
