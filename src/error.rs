//! Error types for the web2ink library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`InkError`]: **Fatal**: the pipeline cannot produce an artifact at all
//!   (renderer missing, malformed content record, every conversion method and
//!   fallback exhausted). Returned as `Err(InkError)` from the top-level
//!   `convert*` functions.
//!
//! * [`AttemptError`]: **Non-fatal**: one conversion attempt failed (non-zero
//!   exit, missing output, near-empty artifact). Stored inside
//!   [`crate::output::ConversionAttempt`] so the attempt history stays
//!   inspectable; the orchestrator escalates to the next method or fallback.
//!
//! * [`PackagingError`]: failure while wrapping a rendered ink fragment into
//!   a document package. Converted into [`AttemptError::Packaging`] by the
//!   orchestrator, which then moves on to the PDF fallback.

use crate::output::{AttemptOutcome, ConversionAttempt};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the web2ink library.
///
/// Per-attempt failures use [`AttemptError`] and are stored in
/// [`crate::output::ConversionAttempt`] rather than propagated here.
#[derive(Debug, Error)]
pub enum InkError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The renderer cannot run, or there is nothing to render. Never retried.
    #[error("Renderer configuration error: {detail}")]
    Configuration { detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The content record could not be parsed.
    #[error("Invalid content document: {detail}")]
    InvalidDocument { detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Every direct method, the packaging fallback and the PDF fallback failed.
    #[error("{}", exhausted_message(.attempts))]
    ConversionExhausted { attempts: Vec<ConversionAttempt> },

    /// An artifact handed to delivery is missing or implausibly small.
    #[error("Artifact '{path}' rejected before delivery: {reason}")]
    ArtifactRejected { path: PathBuf, reason: String },

    // ── Delivery errors ───────────────────────────────────────────────────
    /// The uploader reported failure after all retries.
    #[error("Upload of '{title}' failed after {retries} retries: {message}")]
    UploadFailed {
        title: String,
        retries: u32,
        message: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The scoped working directory could not be created or written.
    #[error("Workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not copy the final artifact to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InkError {
    /// The attempt history carried by a terminal conversion failure.
    pub fn attempts(&self) -> &[ConversionAttempt] {
        match self {
            InkError::ConversionExhausted { attempts } => attempts,
            _ => &[],
        }
    }
}

fn exhausted_message(attempts: &[ConversionAttempt]) -> String {
    let mut msg = format!(
        "All {} conversion attempts failed; no artifact was produced.",
        attempts.len()
    );
    for attempt in attempts {
        if let AttemptOutcome::Failure(err) = &attempt.outcome {
            msg.push_str(&format!(
                "\n  • {} ({} retries): {}",
                attempt.method, attempt.retries, err
            ));
        }
    }
    msg
}

/// A non-fatal error for a single conversion attempt.
///
/// Stored alongside [`crate::output::ConversionAttempt`] when an attempt fails.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AttemptError {
    /// The renderer process could not be started at all.
    #[error("failed to start renderer: {detail}")]
    SpawnFailed { detail: String },

    /// The renderer exited with a non-zero status (or was killed by a signal).
    #[error("renderer exited with {}: {stderr}", exit_label(.exit_code))]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The renderer reported success but the output file does not exist.
    #[error("renderer reported success but '{path}' was not created")]
    MissingArtifact { path: PathBuf },

    /// The output exists but is too small to hold real content.
    #[error("artifact '{path}' is {size_bytes} bytes (minimum {min_bytes})")]
    ArtifactTooSmall {
        path: PathBuf,
        size_bytes: u64,
        min_bytes: u64,
    },

    /// The package archive could not be built.
    #[error("packaging failed: {detail}")]
    Packaging { detail: String },
}

impl AttemptError {
    /// Whether the failure is process-level and worth retrying with the same
    /// invocation profile.
    ///
    /// A renderer that ran cleanly but produced a near-empty file will do so
    /// again, so [`AttemptError::ArtifactTooSmall`] moves straight on to the
    /// next method.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttemptError::SpawnFailed { .. }
                | AttemptError::ProcessFailed { .. }
                | AttemptError::MissingArtifact { .. }
        )
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Errors raised while assembling a document package.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// The rendered fragment to wrap does not exist.
    #[error("ink fragment '{path}' does not exist")]
    MissingFragment { path: PathBuf },

    /// The rendered fragment exists but is empty.
    #[error("ink fragment '{path}' is empty")]
    EmptyFragment { path: PathBuf },

    /// Reading the fragment or writing the archive failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The zip writer rejected an entry.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A metadata record could not be serialised.
    #[error("metadata serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<PackagingError> for AttemptError {
    fn from(e: PackagingError) -> Self {
        AttemptError::Packaging {
            detail: e.to_string(),
        }
    }
}
