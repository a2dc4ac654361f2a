//! Conversion orchestrator: drive the renderer through methods and fallbacks.
//!
//! ```text
//!            ┌────────────── retry w/ backoff ──────────────┐
//! script ──▶ │ native ─▶ basic ─▶ … (direct ink methods)    │ ──▶ artifact
//!            └──────────────────────┬───────────────────────┘
//!                                   ▼ all failed
//!                  fragment render + zip package (.rmdoc)
//!                                   ▼ failed
//!                              PDF rendition
//!                                   ▼ failed
//!                     ConversionExhausted { attempts }
//! ```
//!
//! ## Retry Strategy
//!
//! Each method gets `1 + max_retries` invocations with
//! `base_delay_ms * 2^(retry-1)` between them, capped at `max_delay_ms`.
//! Only process-level failures are retried (spawn error, non-zero exit,
//! missing output). A run that exits cleanly but leaves a header-only file
//! behind will do the same thing again, so it moves straight to the next
//! method.
//!
//! Every method tried leaves exactly one [`ConversionAttempt`] in the
//! history, carrying the number of retries it consumed.

use crate::config::{ConversionMethod, PipelineConfig};
use crate::error::{AttemptError, InkError};
use crate::output::{Artifact, ArtifactKind, AttemptOutcome, ConversionAttempt, ConversionStage};
use crate::pipeline::package::package;
use crate::pipeline::renderer::{CommandRenderer, Invocation, Renderer};
use crate::pipeline::sanitize::truncate_chars;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Longest stderr excerpt kept per failed attempt.
const STDERR_EXCERPT_CHARS: usize = 2000;

/// A successful conversion and the history that led to it.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub artifact: Artifact,
    pub attempts: Vec<ConversionAttempt>,
    pub duration_ms: u64,
}

/// Walks the stage plan for one script.
pub struct Orchestrator<'a> {
    config: &'a PipelineConfig,
    renderer: Arc<dyn Renderer>,
    progress: Option<ProgressCallback>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        let renderer = config
            .renderer
            .clone()
            .unwrap_or_else(|| {
                Arc::new(CommandRenderer::new(&config.renderer_path)) as Arc<dyn Renderer>
            });
        Self {
            config,
            renderer,
            progress: config.progress_callback.clone(),
        }
    }

    /// Convert `script` into an artifact.
    ///
    /// `output_hint` names the artifact base: its directory receives the
    /// script and every output, its file name is the stem they share.
    pub async fn convert(
        &self,
        script: &str,
        title: &str,
        output_hint: &Path,
    ) -> Result<Conversion, InkError> {
        let start = Instant::now();

        if script.trim().is_empty() {
            return Err(InkError::Configuration {
                detail: "drawing script is empty".into(),
            });
        }
        self.renderer
            .check_available()
            .map_err(|detail| InkError::Configuration { detail })?;

        let script_path = output_hint.with_extension("hcl");
        std::fs::write(&script_path, script).map_err(|source| InkError::Workspace {
            path: script_path.clone(),
            source,
        })?;

        let stages = self.config.stage_count();
        if let Some(cb) = &self.progress {
            cb.on_conversion_start(stages);
        }
        info!(
            "Converting '{}' ({} bytes of script, {} stage(s))",
            title,
            script.len(),
            stages
        );

        let mut attempts = Vec::with_capacity(stages);
        let min_bytes = self.config.min_artifact_bytes;

        // Direct methods.
        for method in &self.config.methods {
            let output = output_path(output_hint, method);
            let attempt = self
                .run_method(ConversionStage::Direct, method, &script_path, &output, min_bytes)
                .await;
            if let AttemptOutcome::Success { size_bytes, .. } = attempt.outcome {
                let artifact = Artifact {
                    path: output,
                    kind: ArtifactKind::from(method.target),
                    size_bytes,
                    method: method.name.clone(),
                };
                attempts.push(attempt);
                return Ok(self.finish(artifact, attempts, start));
            }
            attempts.push(attempt);
        }

        // Packaging fallback.
        if self.config.enable_packaging {
            info!("Direct methods exhausted; trying package fallback");
            let (attempt, artifact) = self.run_package(&script_path, title, output_hint).await;
            attempts.push(attempt);
            if let Some(artifact) = artifact {
                return Ok(self.finish(artifact, attempts, start));
            }
        }

        // PDF fallback.
        if self.config.enable_pdf_fallback {
            info!("Falling back to PDF rendition");
            let method = &self.config.pdf_method;
            let output = output_path(output_hint, method);
            let attempt = self
                .run_method(ConversionStage::Pdf, method, &script_path, &output, min_bytes)
                .await;
            if let AttemptOutcome::Success { size_bytes, .. } = attempt.outcome {
                let artifact = Artifact {
                    path: output,
                    kind: ArtifactKind::from(method.target),
                    size_bytes,
                    method: method.name.clone(),
                };
                attempts.push(attempt);
                return Ok(self.finish(artifact, attempts, start));
            }
            attempts.push(attempt);
        }

        warn!(
            "All {} conversion attempts for '{}' failed",
            attempts.len(),
            title
        );
        if let Some(cb) = &self.progress {
            cb.on_conversion_complete(attempts.len(), false);
        }
        Err(InkError::ConversionExhausted { attempts })
    }

    fn finish(
        &self,
        artifact: Artifact,
        attempts: Vec<ConversionAttempt>,
        start: Instant,
    ) -> Conversion {
        info!(
            "Produced {} ({} bytes) via '{}' after {} attempt(s)",
            artifact.path.display(),
            artifact.size_bytes,
            artifact.method,
            attempts.len()
        );
        if let Some(cb) = &self.progress {
            cb.on_conversion_complete(attempts.len(), true);
        }
        Conversion {
            artifact,
            attempts,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Render the fragment, then wrap it. Recorded as a single attempt.
    async fn run_package(
        &self,
        script_path: &Path,
        title: &str,
        output_hint: &Path,
    ) -> (ConversionAttempt, Option<Artifact>) {
        let method = &self.config.fragment_method;
        let fragment = output_path(output_hint, method);
        // Any non-empty fragment is worth wrapping.
        let mut attempt = self
            .run_method(ConversionStage::Package, method, script_path, &fragment, 1)
            .await;
        if !attempt.succeeded() {
            return (attempt, None);
        }

        let started = Instant::now();
        let dest = output_hint.with_extension(ArtifactKind::Package.extension());
        let packaged = package(&fragment, title, &self.config.layout.geometry, &dest)
            .map_err(AttemptError::from)
            .and_then(|path| {
                let size = file_size(&path).ok_or_else(|| AttemptError::MissingArtifact {
                    path: path.clone(),
                })?;
                Ok((path, size))
            });
        attempt.duration_ms += started.elapsed().as_millis() as u64;

        match packaged {
            Ok((path, size_bytes)) => {
                attempt.outcome = AttemptOutcome::Success {
                    artifact: path.clone(),
                    size_bytes,
                };
                let artifact = Artifact {
                    path,
                    kind: ArtifactKind::Package,
                    size_bytes,
                    method: method.name.clone(),
                };
                (attempt, Some(artifact))
            }
            Err(e) => {
                warn!("Packaging failed: {}", e);
                if let Some(cb) = &self.progress {
                    cb.on_attempt_error(&method.name, &e.to_string());
                }
                attempt.outcome = AttemptOutcome::Failure(e);
                (attempt, None)
            }
        }
    }

    /// Run one method under the retry policy.
    async fn run_method(
        &self,
        stage: ConversionStage,
        method: &ConversionMethod,
        script_path: &Path,
        output: &Path,
        min_bytes: u64,
    ) -> ConversionAttempt {
        let start = Instant::now();
        let invocation = Invocation::new(method, output, script_path);
        let policy = self.config.retry;

        let mut last_err: Option<AttemptError> = None;
        let mut retries = 0;

        for retry in 0..=policy.max_retries {
            if retry > 0 {
                let delay = policy.delay_for(retry);
                warn!(
                    "Method '{}': retry {}/{} after {}ms",
                    method.name,
                    retry,
                    policy.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            retries = retry;
            if let Some(cb) = &self.progress {
                cb.on_attempt_start(&method.name, retry);
            }

            match self.invoke(&invocation, min_bytes).await {
                Ok(size_bytes) => {
                    debug!("Method '{}' produced {} bytes", method.name, size_bytes);
                    if let Some(cb) = &self.progress {
                        cb.on_attempt_complete(&method.name, output, size_bytes);
                    }
                    return ConversionAttempt {
                        stage,
                        method: method.name.clone(),
                        args: invocation.args,
                        retries,
                        duration_ms: start.elapsed().as_millis() as u64,
                        outcome: AttemptOutcome::Success {
                            artifact: output.to_path_buf(),
                            size_bytes,
                        },
                    };
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        "Method '{}': try {} failed: {}",
                        method.name,
                        retry + 1,
                        e
                    );
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| AttemptError::SpawnFailed {
            detail: "no invocation was made".into(),
        });
        if let Some(cb) = &self.progress {
            cb.on_attempt_error(&method.name, &err.to_string());
        }
        ConversionAttempt {
            stage,
            method: method.name.clone(),
            args: invocation.args,
            retries,
            duration_ms: start.elapsed().as_millis() as u64,
            outcome: AttemptOutcome::Failure(err),
        }
    }

    /// One renderer invocation plus artifact validation. Returns the size.
    async fn invoke(&self, invocation: &Invocation, min_bytes: u64) -> Result<u64, AttemptError> {
        // A stale file from an earlier try must not pass validation.
        if let Err(e) = std::fs::remove_file(&invocation.output) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Cannot clear stale output {}: {}",
                    invocation.output.display(),
                    e
                );
                return Err(AttemptError::SpawnFailed {
                    detail: format!(
                        "cannot clear stale output '{}': {e}",
                        invocation.output.display()
                    ),
                });
            }
        }

        let renderer = Arc::clone(&self.renderer);
        let inv = invocation.clone();
        let result = tokio::task::spawn_blocking(move || renderer.run(&inv))
            .await
            .map_err(|e| AttemptError::SpawnFailed {
                detail: format!("renderer task panicked: {e}"),
            })?;

        let output = result.map_err(|e| AttemptError::SpawnFailed {
            detail: e.to_string(),
        })?;
        if !output.succeeded() {
            return Err(AttemptError::ProcessFailed {
                exit_code: output.exit_code,
                stderr: truncate_chars(output.stderr.trim(), STDERR_EXCERPT_CHARS).to_string(),
            });
        }

        validate_artifact(&invocation.output, min_bytes)
    }
}

/// `{stem}-{method}.{ext}` next to the hint.
fn output_path(hint: &Path, method: &ConversionMethod) -> PathBuf {
    let stem = hint
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    hint.with_file_name(format!("{}-{}.{}", stem, method.name, method.extension))
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

/// An artifact must exist and hold at least `min_bytes`.
pub fn validate_artifact(path: &Path, min_bytes: u64) -> Result<u64, AttemptError> {
    let size = file_size(path).ok_or_else(|| AttemptError::MissingArtifact {
        path: path.to_path_buf(),
    })?;
    if size < min_bytes {
        return Err(AttemptError::ArtifactTooSmall {
            path: path.to_path_buf(),
            size_bytes: size,
            min_bytes,
        });
    }
    Ok(size)
}
