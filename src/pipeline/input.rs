//! Input resolution: turn image sources from the content record into local files.
//!
//! The renderer only reads images from disk. Remote images are downloaded and
//! `data:` URIs decoded into the request [`Workspace`], so they vanish with it.
//! Nothing here is fatal: an image that cannot be fetched or decoded is left
//! out of the document and the layout engine drops its block.

use crate::document::{ContentDocument, ImageSource, NormalizedDocument};
use crate::error::InkError;
use crate::pipeline::workspace::Workspace;
use base64::Engine as _;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve every image source of `normalized` into the workspace.
pub async fn resolve_images(
    normalized: NormalizedDocument,
    workspace: &Workspace,
    timeout_secs: u64,
) -> Result<ContentDocument, InkError> {
    let NormalizedDocument {
        mut document,
        image_sources,
        reference_source,
    } = normalized;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InkError::Internal(format!("HTTP client: {e}")))?;

    // Ids are only unique before sanitizing, so file stems carry the index.
    for (idx, (id, source)) in image_sources.into_iter().enumerate() {
        let stem = format!("img_{idx:03}_{}", safe_stem(&id));
        if let Some(path) = resolve_one(&client, &id, &stem, &source, workspace).await {
            document.images.insert(id, path);
        }
    }
    if let Some(source) = reference_source {
        document.reference_image =
            resolve_one(&client, "reference", "reference", &source, workspace).await;
    }

    debug!("Resolved {} image(s)", document.images.len());
    Ok(document)
}

async fn resolve_one(
    client: &reqwest::Client,
    id: &str,
    stem: &str,
    source: &ImageSource,
    workspace: &Workspace,
) -> Option<PathBuf> {
    let result = match source {
        ImageSource::Local(path) => {
            if path.is_file() {
                Ok(path.clone())
            } else {
                Err(format!("local file '{}' not found", path.display()))
            }
        }
        ImageSource::Remote(url) => download(client, url)
            .await
            .and_then(|bytes| store(workspace, stem, &bytes)),
        ImageSource::Inline(uri) => {
            decode_data_uri(uri).and_then(|bytes| store(workspace, stem, &bytes))
        }
    };
    match result {
        Ok(path) => Some(path),
        Err(reason) => {
            warn!("Image '{}' omitted: {}", id, reason);
            None
        }
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, String> {
    info!("Downloading image from: {}", url);
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            format!("download of {url} timed out")
        } else {
            e.to_string()
        }
    })?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
}

/// Decode a base64 `data:` URI into raw bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI without payload".to_string())?;
    if !meta.ends_with(";base64") {
        return Err("only base64 data URIs are supported".into());
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64: {e}"))
}

/// Id reduced to characters that are safe in a file name.
fn safe_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Write image bytes under a name whose extension matches the sniffed format.
fn store(workspace: &Workspace, stem: &str, bytes: &[u8]) -> Result<PathBuf, String> {
    if bytes.is_empty() {
        return Err("empty image".into());
    }
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("img");
    workspace
        .write(&format!("{stem}.{ext}"), bytes)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawDocument;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        png_sized(4, 2)
    }

    fn png_sized(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn data_uri(bytes: &[u8]) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        format!("data:image/png;base64,{encoded}")
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/a.png"));
        assert!(is_url("http://example.com/a.png"));
        assert!(!is_url("/tmp/a.png"));
        assert!(!is_url("data:image/png;base64,AAAA"));
    }

    #[test]
    fn data_uri_decoding() {
        assert_eq!(decode_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert!(decode_data_uri("data:text/plain,hi").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
        assert!(decode_data_uri("image/png;base64,aGk=").is_err());
    }

    #[tokio::test]
    async fn inline_and_local_images_resolved_missing_dropped() {
        let ws = Workspace::create(None).unwrap();
        let local = ws.write("local.png", &png_bytes()).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes());

        let json = serde_json::json!({
            "title": "Images",
            "qr_image": local.to_string_lossy(),
            "images": {
                "inline": format!("data:image/png;base64,{encoded}"),
                "local": local.to_string_lossy(),
                "gone": "/nonexistent/x.png",
                "bad": "data:image/png;base64,***"
            }
        })
        .to_string();
        let normalized = RawDocument::from_json(&json).unwrap().normalize();
        let doc = resolve_images(normalized, &ws, 5).await.unwrap();

        assert_eq!(doc.images.len(), 2);
        let inline = &doc.images["inline"];
        assert!(inline.starts_with(ws.path()));
        assert_eq!(inline.extension().unwrap(), "png");
        assert_eq!(image::image_dimensions(inline).unwrap(), (4, 2));
        assert_eq!(doc.images["local"], local);
        assert_eq!(doc.reference_image.as_deref(), Some(local.as_path()));
    }

    #[tokio::test]
    async fn ids_that_sanitize_alike_get_distinct_files() {
        let ws = Workspace::create(None).unwrap();
        let json = serde_json::json!({
            "title": "Collide",
            "qr_image": data_uri(&png_sized(7, 7)),
            "images": {
                "img.1": data_uri(&png_sized(10, 10)),
                "img_1": data_uri(&png_sized(40, 20)),
                "reference": data_uri(&png_sized(3, 5))
            }
        })
        .to_string();
        let normalized = RawDocument::from_json(&json).unwrap().normalize();
        let doc = resolve_images(normalized, &ws, 5).await.unwrap();

        assert_eq!(doc.images.len(), 3);
        assert_ne!(doc.images["img.1"], doc.images["img_1"]);
        assert_eq!(image::image_dimensions(&doc.images["img.1"]).unwrap(), (10, 10));
        assert_eq!(image::image_dimensions(&doc.images["img_1"]).unwrap(), (40, 20));
        assert_eq!(image::image_dimensions(&doc.images["reference"]).unwrap(), (3, 5));
        let reference = doc.reference_image.unwrap();
        assert_eq!(image::image_dimensions(&reference).unwrap(), (7, 7));
    }
}
