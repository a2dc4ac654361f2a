//! Conversion entry points.
//!
//! Every entry point runs the same three steps inside a fresh request
//! [`Workspace`]: lay out, serialize, convert. [`convert_json`] adds image
//! resolution in front for records straight from the scraper;
//! [`render_script`] stops after serialization and touches no files.

use crate::config::PipelineConfig;
use crate::document::{ContentDocument, RawDocument, UNTITLED};
use crate::error::InkError;
use crate::output::{ConversionStats, PipelineOutput};
use crate::pipeline::layout::layout_with;
use crate::pipeline::orchestrate::Orchestrator;
use crate::pipeline::sanitize::{clean_flow_text, truncate_chars};
use crate::pipeline::script::serialize;
use crate::pipeline::{input, workspace::Workspace};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Convert a content document into an ink artifact.
///
/// This is the primary entry point for the library. Images referenced by the
/// document must already be local files.
///
/// # Returns
/// `Ok(PipelineOutput)` holding the artifact (native ink, package or PDF,
/// whichever stage succeeded first) and the full attempt history.
///
/// # Errors
/// - [`InkError::Configuration`] when the renderer is missing or not executable
/// - [`InkError::Workspace`] when the temporary directory cannot be used
/// - [`InkError::ConversionExhausted`] when every method and fallback failed
pub async fn convert(
    document: &ContentDocument,
    config: &PipelineConfig,
) -> Result<PipelineOutput, InkError> {
    let workspace = Workspace::create(config.temp_dir.as_deref())?;
    convert_in(document, config, workspace).await
}

/// Parse a scraper JSON record, fetch its images, then [`convert`].
pub async fn convert_json(json: &str, config: &PipelineConfig) -> Result<PipelineOutput, InkError> {
    let normalized = RawDocument::from_json(json)?.normalize();
    let workspace = Workspace::create(config.temp_dir.as_deref())?;
    let document =
        input::resolve_images(normalized, &workspace, config.download_timeout_secs).await?;
    convert_in(&document, config, workspace).await
}

/// Convert and copy the artifact to `output_path`.
///
/// The extension of `output_path` is replaced by the artifact kind's
/// (`rm`, `rmdoc` or `pdf`), since which stage succeeds is only known at the
/// end. Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    document: &ContentDocument,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<(PathBuf, ConversionStats), InkError> {
    let output = convert(document, config).await?;
    let dest = output_path
        .as_ref()
        .with_extension(output.artifact.kind.extension());
    let written = output.persist(&dest)?;
    Ok((written, output.stats))
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    document: &ContentDocument,
    config: &PipelineConfig,
) -> Result<PipelineOutput, InkError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InkError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(document, config))
}

/// Lay out and serialize only. No renderer, no files.
pub fn render_script(document: &ContentDocument, config: &PipelineConfig) -> String {
    let commands = layout_with(document, &config.layout);
    serialize(&commands, &config.layout.geometry)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn convert_in(
    document: &ContentDocument,
    config: &PipelineConfig,
    workspace: Workspace,
) -> Result<PipelineOutput, InkError> {
    let total_start = Instant::now();
    let title = display_title(document, config.layout.wrap.title);
    info!("Starting conversion: {}", title);

    // ── Step 1: Layout ───────────────────────────────────────────────────
    let layout_start = Instant::now();
    let commands = layout_with(document, &config.layout);
    let layout_duration_ms = layout_start.elapsed().as_millis() as u64;
    info!(
        "Laid out {} commands on {} page(s) in {}ms",
        commands.len(),
        commands.page_count,
        layout_duration_ms
    );

    // ── Step 2: Serialize ────────────────────────────────────────────────
    let script = serialize(&commands, &config.layout.geometry);
    debug!("Script is {} bytes", script.len());

    // ── Step 3: Convert ──────────────────────────────────────────────────
    let hint = workspace.file(&Workspace::stem_for(&script));
    let conversion = Orchestrator::new(config)
        .convert(&script, &title, &hint)
        .await?;

    let stats = ConversionStats {
        command_count: commands.len(),
        page_count: commands.page_count,
        script_bytes: script.len(),
        attempt_count: conversion.attempts.len(),
        layout_duration_ms,
        conversion_duration_ms: conversion.duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Conversion complete: {} via '{}', {}ms total",
        conversion.artifact.kind.extension(),
        conversion.artifact.method,
        stats.total_duration_ms
    );

    Ok(PipelineOutput {
        title,
        artifact: conversion.artifact,
        attempts: conversion.attempts,
        stats,
        workspace,
    })
}

/// Title as shown on the device: cleaned, truncated, never empty.
fn display_title(document: &ContentDocument, max_chars: usize) -> String {
    let cleaned = clean_flow_text(&document.title);
    if cleaned.is_empty() {
        UNTITLED.to_string()
    } else {
        truncate_chars(&cleaned, max_chars).to_string()
    }
}
