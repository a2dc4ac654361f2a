//! Result types: the final artifact, the attempt history and run statistics.

use crate::config::OutputTarget;
use crate::error::AttemptError;
use crate::pipeline::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which kind of file the pipeline finally produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Native ink page written directly by the renderer.
    Ink,
    /// Zip package wrapping an ink fragment plus metadata records.
    Package,
    /// Last-resort PDF rendition.
    Pdf,
}

impl ArtifactKind {
    /// File extension the uploader expects for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Ink => "rm",
            ArtifactKind::Package => "rmdoc",
            ArtifactKind::Pdf => "pdf",
        }
    }
}

impl From<OutputTarget> for ArtifactKind {
    fn from(target: OutputTarget) -> Self {
        match target {
            OutputTarget::Ink => ArtifactKind::Ink,
            OutputTarget::Pdf => ArtifactKind::Pdf,
        }
    }
}

/// A validated file on disk, ready for hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub size_bytes: u64,
    /// Name of the conversion method that produced it.
    pub method: String,
}

/// Pipeline stage an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStage {
    /// One of the configured direct ink methods.
    Direct,
    /// Fragment render + package assembly.
    Package,
    /// PDF fallback.
    Pdf,
}

/// How one conversion method ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { artifact: PathBuf, size_bytes: u64 },
    Failure(AttemptError),
}

/// One entry of the attempt history.
///
/// There is exactly one entry per method tried; `retries` counts how many
/// extra invocations the retry policy spent on it before the outcome was
/// final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionAttempt {
    pub stage: ConversionStage,
    pub method: String,
    /// Arguments of the last invocation, excluding the program itself.
    pub args: Vec<String>,
    pub retries: u32,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
}

impl ConversionAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success { .. })
    }
}

/// Aggregate numbers for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub command_count: usize,
    pub page_count: usize,
    pub script_bytes: usize,
    pub attempt_count: usize,
    pub layout_duration_ms: u64,
    pub conversion_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful run returns.
///
/// The output owns the request workspace: the artifact stays on disk for as
/// long as this value lives and is removed when it drops. Use
/// [`PipelineOutput::persist`] to keep a copy.
#[derive(Debug, Serialize)]
pub struct PipelineOutput {
    pub title: String,
    pub artifact: Artifact,
    pub attempts: Vec<ConversionAttempt>,
    pub stats: ConversionStats,
    #[serde(skip)]
    pub(crate) workspace: Workspace,
}

impl PipelineOutput {
    /// Path of the final artifact inside the workspace.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact.path
    }

    /// Directory holding the script, intermediate files and the artifact.
    pub fn workspace_dir(&self) -> &Path {
        self.workspace.path()
    }

    /// Copy the artifact to `dest` using a temp file + rename so readers never
    /// observe a partial file. Returns the destination path.
    pub fn persist(&self, dest: impl AsRef<Path>) -> Result<PathBuf, crate::error::InkError> {
        let dest = dest.as_ref();
        let write_err = |source| crate::error::InkError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let tmp = dest.with_extension(format!("{}.tmp", self.artifact.kind.extension()));
        std::fs::copy(&self.artifact.path, &tmp).map_err(write_err)?;
        std::fs::rename(&tmp, dest).map_err(write_err)?;
        Ok(dest.to_path_buf())
    }
}
