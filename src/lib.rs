//! # web2ink
//!
//! Turn scraped web articles into native handwriting-tablet documents.
//!
//! ## Why this crate?
//!
//! E-ink tablets render their own vector ink format far better than a PDF
//! squeezed onto a 10" screen: text stays crisp, pages turn instantly and the
//! document can be annotated like any notebook. This crate lays an article
//! out on the device's page geometry, describes it in a drawing script, and
//! drives an external renderer (`drawj2d`) to produce the ink file, falling
//! back to a zipped package and finally a PDF when the native path fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! content record (JSON or ContentDocument)
//!  │
//!  ├─ 1. Input     normalize blocks, fetch/decode images into the workspace
//!  ├─ 2. Layout    wrap, paginate and place into draw commands
//!  ├─ 3. Script    serialize commands with two-level escaping
//!  ├─ 4. Convert   renderer methods with retry/backoff (spawn_blocking)
//!  ├─ 5. Fallback  fragment + .rmdoc package, then PDF
//!  └─ 6. Output    artifact + attempt history + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use web2ink::{convert, ContentBlock, ContentDocument, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = ContentDocument::new("Field Notes")
//!         .with_source_url("https://example.com/notes")
//!         .with_block(ContentBlock::heading(1, "Intro"))
//!         .with_block(ContentBlock::paragraph("Hello from the web."));
//!
//!     let config = PipelineConfig::builder()
//!         .renderer_path("/usr/local/bin/drawj2d")
//!         .build()?;
//!     let output = convert(&doc, &config).await?;
//!     output.persist("field-notes.rm")?;
//!     eprintln!("{} attempt(s), {} page(s)",
//!         output.stats.attempt_count,
//!         output.stats.page_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `web2ink` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! web2ink = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod delivery;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionMethod, FontConfig, LayoutConfig, OutputTarget, PageGeometry, PaginationMode,
    PipelineConfig, PipelineConfigBuilder, RetryPolicy, WrapWidths,
};
pub use convert::{convert, convert_json, convert_sync, convert_to_file, render_script};
pub use delivery::{deliver, RmapiUploader, UploadReceipt, Uploader};
pub use document::{ContentBlock, ContentDocument, RawDocument};
pub use error::{AttemptError, InkError, PackagingError};
pub use output::{
    Artifact, ArtifactKind, AttemptOutcome, ConversionAttempt, ConversionStage, ConversionStats,
    PipelineOutput,
};
pub use pipeline::layout::{layout, DrawCommand, DrawCommandSequence};
pub use pipeline::renderer::{CommandRenderer, Invocation, ProcessOutput, Renderer};
pub use pipeline::script::serialize;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
