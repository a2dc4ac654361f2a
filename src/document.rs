//! Content document model and the JSON boundary that produces it.
//!
//! The scraper hands over loosely-shaped records: blocks typed `h2` or
//! `heading`, lists that either embed their items or arrive as a run of
//! separate `bullet` records, images keyed by id in a list or a map.
//! [`RawDocument::normalize`] folds all of that into the closed
//! [`ContentBlock`] type exactly once, so the layout engine only ever sees
//! canonical blocks.

use crate::error::InkError;
use crate::pipeline::sanitize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Title used when the record has none and no URL to derive one from.
pub const UNTITLED: &str = "Untitled Document";

// ── Canonical model ──────────────────────────────────────────────────────

/// One block of readable content, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    List { ordered: bool, items: Vec<String> },
    Blockquote { text: String },
    Code { text: String },
    Image { image_id: String, alt: String },
}

impl ContentBlock {
    /// Heading with its level forced into 1..=6; anything outside becomes 6.
    pub fn heading(level: i64, text: impl Into<String>) -> Self {
        ContentBlock::Heading {
            level: clamp_heading_level(level),
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentBlock::Paragraph { text: text.into() }
    }
}

pub(crate) fn clamp_heading_level(level: i64) -> u8 {
    if (1..=6).contains(&level) {
        level as u8
    } else {
        6
    }
}

/// A normalized, read-only content document.
///
/// `images` maps image ids to local files; a block referencing an id that is
/// absent here (or whose file has vanished) is dropped during layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub title: String,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Square reference image (typically a QR code of the source URL)
    /// placed in the top-right corner of the first page.
    #[serde(default)]
    pub reference_image: Option<PathBuf>,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub images: BTreeMap<String, PathBuf>,
}

impl ContentDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_image(mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.images.insert(id.into(), path.into());
        self
    }

    pub fn with_reference_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_image = Some(path.into());
        self
    }
}

// ── Image sources ────────────────────────────────────────────────────────

/// Where an image's bytes come from before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Local(PathBuf),
    Remote(String),
    /// A `data:` URI carrying base64 bytes.
    Inline(String),
}

impl ImageSource {
    pub fn parse(src: &str) -> Self {
        let src = src.trim();
        if src.starts_with("http://") || src.starts_with("https://") {
            ImageSource::Remote(src.to_string())
        } else if src.starts_with("data:") {
            ImageSource::Inline(src.to_string())
        } else {
            ImageSource::Local(PathBuf::from(src.strip_prefix("file://").unwrap_or(src)))
        }
    }
}

/// A normalized document whose images are still unresolved sources.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    /// Blocks and metadata; `images` is empty until resolution.
    pub document: ContentDocument,
    pub image_sources: BTreeMap<String, ImageSource>,
    pub reference_source: Option<ImageSource>,
}

impl NormalizedDocument {
    /// Treat every source as a local path, without touching the network.
    pub fn into_local(self) -> ContentDocument {
        let mut doc = self.document;
        for (id, source) in self.image_sources {
            if let ImageSource::Local(path) = source {
                doc.images.insert(id, path);
            }
        }
        if let Some(ImageSource::Local(path)) = self.reference_source {
            doc.reference_image = Some(path);
        }
        doc
    }
}

// ── Raw scraper record ───────────────────────────────────────────────────

/// The scraper's JSON record, as loosely typed as it arrives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDocument {
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "qr_code", alias = "qr_path")]
    pub qr_image: Option<String>,
    pub structured_content: Option<Vec<RawBlock>>,
    pub images: Option<RawImages>,
    /// Legacy plain-text body, used when `structured_content` is absent.
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBlock {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(alias = "text")]
    pub content: Option<String>,
    pub level: Option<i64>,
    pub items: Option<Vec<RawListItem>>,
    pub ordered: Option<bool>,
    pub list_type: Option<String>,
    pub image_id: Option<String>,
    pub src: Option<String>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawListItem {
    Text(String),
    Object {
        #[serde(alias = "text")]
        content: String,
    },
}

impl RawListItem {
    fn into_text(self) -> String {
        match self {
            RawListItem::Text(t) | RawListItem::Object { content: t } => t,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawImages {
    List(Vec<RawImage>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImage {
    pub id: String,
    #[serde(default, alias = "url")]
    pub src: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl RawDocument {
    pub fn from_json(json: &str) -> Result<Self, InkError> {
        serde_json::from_str(json).map_err(|e| InkError::InvalidDocument {
            detail: e.to_string(),
        })
    }

    /// Fold the record into canonical blocks plus unresolved image sources.
    pub fn normalize(self) -> NormalizedDocument {
        let title = match self.title.as_deref().map(str::trim) {
            Some(t) if t.chars().count() >= 2 => t.to_string(),
            _ => self
                .url
                .as_deref()
                .map(title_from_url)
                .unwrap_or_else(|| UNTITLED.to_string()),
        };

        let mut image_sources = BTreeMap::new();
        match self.images {
            Some(RawImages::List(list)) => {
                for img in list {
                    if let Some(src) = img.path.or(img.src) {
                        image_sources.insert(img.id, ImageSource::parse(&src));
                    }
                }
            }
            Some(RawImages::Map(map)) => {
                for (id, src) in map {
                    image_sources.insert(id, ImageSource::parse(&src));
                }
            }
            None => {}
        }

        let blocks = match self.structured_content {
            Some(raw) => normalize_blocks(raw, &mut image_sources),
            None => self
                .content
                .as_deref()
                .map(paragraphs_from_text)
                .unwrap_or_default(),
        };

        NormalizedDocument {
            document: ContentDocument {
                title,
                source_url: self.url,
                reference_image: None,
                blocks,
                images: BTreeMap::new(),
            },
            image_sources,
            reference_source: self.qr_image.as_deref().map(ImageSource::parse),
        }
    }
}

impl ContentDocument {
    /// Parse a scraper record, treating image sources as local paths.
    ///
    /// Remote and inline images need the async resolution performed by
    /// [`crate::convert::convert_json`].
    pub fn from_json(json: &str) -> Result<Self, InkError> {
        Ok(RawDocument::from_json(json)?.normalize().into_local())
    }
}

fn normalize_blocks(
    raw: Vec<RawBlock>,
    image_sources: &mut BTreeMap<String, ImageSource>,
) -> Vec<ContentBlock> {
    let mut blocks = Vec::with_capacity(raw.len());
    // Legacy scrapers flatten lists into consecutive bullet records.
    let mut pending_items: Vec<String> = Vec::new();
    let mut pending_ordered = false;

    let flush = |blocks: &mut Vec<ContentBlock>, items: &mut Vec<String>, ordered: bool| {
        if !items.is_empty() {
            blocks.push(ContentBlock::List {
                ordered,
                items: std::mem::take(items),
            });
        }
    };

    for (idx, block) in raw.into_iter().enumerate() {
        let kind = block
            .kind
            .as_deref()
            .unwrap_or("paragraph")
            .trim()
            .to_ascii_lowercase();
        let text = block.content.clone().unwrap_or_default();

        if matches!(kind.as_str(), "bullet" | "list_item" | "li" | "numbered") {
            let ordered = kind == "numbered";
            if !pending_items.is_empty() && ordered != pending_ordered {
                flush(&mut blocks, &mut pending_items, pending_ordered);
            }
            pending_ordered = ordered;
            pending_items.push(text);
            continue;
        }
        flush(&mut blocks, &mut pending_items, pending_ordered);

        let normalized = match kind.as_str() {
            "heading" | "header" => Some(ContentBlock::heading(block.level.unwrap_or(2), text)),
            k if k.len() == 2 && k.starts_with('h') && k.as_bytes()[1].is_ascii_digit() => {
                let level = k[1..].parse::<i64>().unwrap_or(6);
                Some(ContentBlock::heading(level, text))
            }
            "paragraph" | "p" | "text" => Some(ContentBlock::Paragraph { text }),
            "blockquote" | "quote" => Some(ContentBlock::Blockquote { text }),
            "code" | "pre" => Some(ContentBlock::Code { text }),
            "list" | "ul" | "ol" => {
                let ordered = block.ordered.unwrap_or_else(|| {
                    kind == "ol" || block.list_type.as_deref() == Some("ol")
                });
                let items: Vec<String> = block
                    .items
                    .unwrap_or_default()
                    .into_iter()
                    .map(RawListItem::into_text)
                    .collect();
                if items.is_empty() && !text.trim().is_empty() {
                    Some(ContentBlock::List {
                        ordered,
                        items: text.lines().map(str::to_string).collect(),
                    })
                } else {
                    Some(ContentBlock::List { ordered, items })
                }
            }
            "image" | "img" | "figure" => {
                let alt = block.alt.unwrap_or_default();
                match (block.image_id, block.src) {
                    (Some(id), _) => Some(ContentBlock::Image { image_id: id, alt }),
                    (None, Some(src)) => {
                        let id = format!("inline_{idx}");
                        image_sources.insert(id.clone(), ImageSource::parse(&src));
                        Some(ContentBlock::Image { image_id: id, alt })
                    }
                    (None, None) => {
                        debug!("Dropping image block {idx} without id or source");
                        None
                    }
                }
            }
            other if !text.trim().is_empty() => {
                debug!("Unknown block type '{other}' kept as paragraph");
                Some(ContentBlock::Paragraph { text })
            }
            other => {
                debug!("Dropping empty block {idx} of unknown type '{other}'");
                None
            }
        };

        blocks.extend(normalized);
    }
    flush(&mut blocks, &mut pending_items, pending_ordered);
    blocks
}

/// Split a plain-text body into paragraphs on blank lines. Bodies that
/// look like markup are reduced to their visible text first.
fn paragraphs_from_text(text: &str) -> Vec<ContentBlock> {
    let text = if sanitize::looks_like_html(text) {
        sanitize::html_to_text(text)
    } else {
        text.to_string()
    };
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ContentBlock::paragraph)
        .collect()
}

/// `https://www.example.com/blog/my-first_post.html` → `My First Post - example.com`.
pub fn title_from_url(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "Web Page".to_string();
    };
    let domain = parsed
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_string();

    let last = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default();
    let stem = last.split('.').next().unwrap_or_default();
    let words: Vec<String> = stem
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        format!("Page from {domain}")
    } else {
        format!("{} - {}", words.join(" "), domain)
    }
}
