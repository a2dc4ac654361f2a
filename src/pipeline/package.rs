//! Packaging fallback: wrap a rendered ink fragment into a `.rmdoc` archive.
//!
//! A package is a plain zip with three entries:
//!
//! ```text
//! {document_id}.metadata          display name, timestamps, document type
//! {document_id}.content           page list + layout hints (one page)
//! {document_id}/{page_id}.rm      the ink fragment itself
//! ```
//!
//! The device accepts such a package even when it rejects a bare `.rm`
//! upload, which is why the orchestrator falls back to it.

use crate::config::PageGeometry;
use crate::error::PackagingError;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Identifiers and names of a built package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub document_id: Uuid,
    pub page_id: Uuid,
}

impl PackageLayout {
    pub fn generate() -> Self {
        Self {
            document_id: Uuid::new_v4(),
            page_id: Uuid::new_v4(),
        }
    }

    pub fn metadata_entry(&self) -> String {
        format!("{}.metadata", self.document_id)
    }

    pub fn content_entry(&self) -> String {
        format!("{}.content", self.document_id)
    }

    pub fn page_entry(&self) -> String {
        format!("{}/{}.rm", self.document_id, self.page_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Metadata<'a> {
    created_time: String,
    last_modified: String,
    last_opened: String,
    last_opened_page: u32,
    parent: &'a str,
    pinned: bool,
    #[serde(rename = "type")]
    kind: &'a str,
    visible_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    c_pages: PageIndex,
    cover_page_number: i32,
    custom_zoom_orientation: &'static str,
    custom_zoom_page_height: u32,
    custom_zoom_page_width: u32,
    custom_zoom_scale: u32,
    file_type: &'static str,
    format_version: u32,
    line_height: i32,
    margins: u32,
    orientation: &'static str,
    page_count: u32,
    size_in_bytes: String,
    text_scale: u32,
    zoom_mode: &'static str,
}

#[derive(Debug, Serialize)]
struct PageIndex {
    original: Stamped<i32>,
    pages: Vec<PageEntry>,
}

#[derive(Debug, Serialize)]
struct PageEntry {
    id: String,
    idx: Stamped<&'static str>,
}

#[derive(Debug, Serialize)]
struct Stamped<T> {
    timestamp: &'static str,
    value: T,
}

/// Build a package at `dest` around `fragment`.
///
/// The archive is written to a sibling temp file and renamed into place, so
/// `dest` either holds a complete package or nothing.
pub fn package(
    fragment: &Path,
    title: &str,
    geometry: &PageGeometry,
    dest: &Path,
) -> Result<PathBuf, PackagingError> {
    let bytes = match std::fs::read(fragment) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PackagingError::MissingFragment {
                path: fragment.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(PackagingError::Io {
                path: fragment.to_path_buf(),
                source,
            })
        }
    };
    if bytes.is_empty() {
        return Err(PackagingError::EmptyFragment {
            path: fragment.to_path_buf(),
        });
    }

    let layout = PackageLayout::generate();
    let now = chrono::Utc::now().timestamp_millis().to_string();

    let metadata = Metadata {
        created_time: now.clone(),
        last_modified: now.clone(),
        last_opened: now,
        last_opened_page: 0,
        parent: "",
        pinned: false,
        kind: "DocumentType",
        visible_name: title,
    };
    let content = Content {
        c_pages: PageIndex {
            original: Stamped {
                timestamp: "0:0",
                value: -1,
            },
            pages: vec![PageEntry {
                id: layout.page_id.to_string(),
                idx: Stamped {
                    timestamp: "1:2",
                    value: "ba",
                },
            }],
        },
        cover_page_number: -1,
        custom_zoom_orientation: "portrait",
        custom_zoom_page_height: geometry.height.round() as u32,
        custom_zoom_page_width: geometry.width.round() as u32,
        custom_zoom_scale: 1,
        file_type: "notebook",
        format_version: 2,
        line_height: -1,
        margins: geometry.margin.round() as u32,
        orientation: "portrait",
        page_count: 1,
        size_in_bytes: bytes.len().to_string(),
        text_scale: 1,
        zoom_mode: "bestFit",
    };

    let io_err = |source| PackagingError::Io {
        path: dest.to_path_buf(),
        source,
    };
    let tmp = dest.with_extension("rmdoc.tmp");
    let file = std::fs::File::create(&tmp).map_err(io_err)?;

    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(layout.metadata_entry(), options)?;
    zip.write_all(&serde_json::to_vec_pretty(&metadata)?)
        .map_err(io_err)?;
    zip.start_file(layout.content_entry(), options)?;
    zip.write_all(&serde_json::to_vec_pretty(&content)?)
        .map_err(io_err)?;
    zip.start_file(layout.page_entry(), options)?;
    zip.write_all(&bytes).map_err(io_err)?;
    zip.finish()?;

    std::fs::rename(&tmp, dest).map_err(io_err)?;
    debug!(
        "Package entries: {}, {}, {}",
        layout.metadata_entry(),
        layout.content_entry(),
        layout.page_entry()
    );
    info!(
        "Packaged {} byte fragment as {}",
        bytes.len(),
        dest.display()
    );
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut f = archive.by_index(i).unwrap();
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).unwrap();
                (f.name().to_string(), buf)
            })
            .collect()
    }

    #[test]
    fn builds_three_entry_archive() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = dir.path().join("frag.rm");
        std::fs::write(&fragment, vec![42u8; 300]).unwrap();
        let dest = dir.path().join("doc.rmdoc");

        let out = package(&fragment, "My \"Title\"", &PageGeometry::default(), &dest).unwrap();
        assert_eq!(out, dest);
        assert!(!dir.path().join("doc.rmdoc.tmp").exists());

        let entries = entries(&dest);
        assert_eq!(entries.len(), 3);

        let (meta_name, meta) = &entries[0];
        let doc_id = meta_name.strip_suffix(".metadata").unwrap();
        assert!(Uuid::parse_str(doc_id).is_ok());
        let meta: serde_json::Value = serde_json::from_slice(meta).unwrap();
        assert_eq!(meta["visibleName"], "My \"Title\"");
        assert_eq!(meta["type"], "DocumentType");
        assert_eq!(meta["createdTime"], meta["lastModified"]);

        let (content_name, content) = &entries[1];
        assert_eq!(content_name, &format!("{doc_id}.content"));
        let content: serde_json::Value = serde_json::from_slice(content).unwrap();
        assert_eq!(content["pageCount"], 1);
        assert_eq!(content["customZoomPageWidth"], 1872);
        assert_eq!(content["customZoomPageHeight"], 2404);
        assert_eq!(content["margins"], 120);
        assert_eq!(content["sizeInBytes"], "300");
        let page_id = content["cPages"]["pages"][0]["id"].as_str().unwrap().to_string();

        let (page_name, page) = &entries[2];
        assert_eq!(page_name, &format!("{doc_id}/{page_id}.rm"));
        assert_eq!(page.len(), 300);
    }

    #[test]
    fn missing_fragment_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = package(
            &dir.path().join("nope.rm"),
            "T",
            &PageGeometry::default(),
            &dir.path().join("out.rmdoc"),
        )
        .unwrap_err();
        assert!(matches!(err, PackagingError::MissingFragment { .. }));
    }

    #[test]
    fn empty_fragment_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = dir.path().join("empty.rm");
        std::fs::write(&fragment, b"").unwrap();
        let err = package(
            &fragment,
            "T",
            &PageGeometry::default(),
            &dir.path().join("out.rmdoc"),
        )
        .unwrap_err();
        assert!(matches!(err, PackagingError::EmptyFragment { .. }));
        assert!(!dir.path().join("out.rmdoc").exists());
    }

    #[test]
    fn unwritable_destination_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = dir.path().join("frag.rm");
        std::fs::write(&fragment, b"ink").unwrap();
        let err = package(
            &fragment,
            "T",
            &PageGeometry::default(),
            &dir.path().join("missing-dir/out.rmdoc"),
        )
        .unwrap_err();
        assert!(matches!(err, PackagingError::Io { .. }));
    }
}
