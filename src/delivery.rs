//! Delivery handoff: pass a finished artifact to the upload client.
//!
//! Delivery sits outside the conversion pipeline proper. The contract is the
//! uploader's: `(artifact path, display title) → (success, message)`. Before
//! calling it, [`deliver`] re-checks the artifact so a file cleaned up or
//! truncated after conversion is never handed on.

use crate::config::PipelineConfig;
use crate::error::InkError;
use crate::output::PipelineOutput;
use crate::pipeline::orchestrate::validate_artifact;
use crate::pipeline::renderer::{find_program, is_executable};
use crate::pipeline::sanitize::truncate_chars;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Longest display title the device shows without truncation.
pub const MAX_TITLE_CHARS: usize = 50;

/// What the uploader reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub success: bool,
    pub message: String,
}

impl UploadReceipt {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// The external upload client.
pub trait Uploader: Send + Sync {
    /// Blocking upload of `artifact` under `display_title`.
    fn upload(&self, artifact: &Path, display_title: &str) -> UploadReceipt;
}

/// Uploads with the `rmapi` command line client.
#[derive(Debug, Clone)]
pub struct RmapiUploader {
    program: PathBuf,
    folder: String,
}

impl RmapiUploader {
    pub fn new(program: impl Into<PathBuf>, folder: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            folder: folder.into(),
        }
    }
}

impl Uploader for RmapiUploader {
    fn upload(&self, artifact: &Path, display_title: &str) -> UploadReceipt {
        if !artifact.is_file() {
            return UploadReceipt::failed(format!("Document not found: {}", artifact.display()));
        }
        let Some(program) = find_program(&self.program).filter(|p| is_executable(p)) else {
            return UploadReceipt::failed(format!(
                "rmapi not found at: {}",
                self.program.display()
            ));
        };

        // rmapi names the document after the file, so stage a copy with the
        // display title as its name.
        let staging = match tempfile::Builder::new().prefix("web2ink-upload-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return UploadReceipt::failed(format!("Upload error: {e}")),
        };
        let ext = artifact
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let named = staging.path().join(if ext.is_empty() {
            safe_title(display_title)
        } else {
            format!("{}.{}", safe_title(display_title), ext)
        });
        if let Err(e) = std::fs::copy(artifact, &named) {
            return UploadReceipt::failed(format!("Upload error: {e}"));
        }

        match Command::new(&program)
            .arg("put")
            .arg(&named)
            .arg(&self.folder)
            .output()
        {
            Ok(out) if out.status.success() => UploadReceipt::ok("Upload successful"),
            Ok(out) => UploadReceipt::failed(format!(
                "rmapi error: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => UploadReceipt::failed(format!("Upload error: {e}")),
        }
    }
}

/// A display title safe to use as a file name.
///
/// Alphanumerics, space, `-`, `_` and `.` survive; everything else becomes
/// `_`. The result is trimmed and at most [`MAX_TITLE_CHARS`] long.
pub fn safe_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = truncate_chars(mapped.trim(), MAX_TITLE_CHARS).trim_end();
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hand `output`'s artifact to `uploader`, retrying failures under the
/// configured retry policy.
pub async fn deliver(
    output: &PipelineOutput,
    uploader: Arc<dyn Uploader>,
    config: &PipelineConfig,
) -> Result<UploadReceipt, InkError> {
    let path = output.artifact_path().to_path_buf();
    validate_artifact(&path, config.min_artifact_bytes).map_err(|e| InkError::ArtifactRejected {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let policy = config.retry;
    let title = output.title.clone();
    let mut last = UploadReceipt::failed("no upload attempted");

    for retry in 0..=policy.max_retries {
        if retry > 0 {
            let delay = policy.delay_for(retry);
            warn!(
                "Upload of '{}': retry {}/{} after {}ms",
                title,
                retry,
                policy.max_retries,
                delay.as_millis()
            );
            sleep(delay).await;
        }

        let uploader = Arc::clone(&uploader);
        let (p, t) = (path.clone(), title.clone());
        let receipt = tokio::task::spawn_blocking(move || uploader.upload(&p, &t))
            .await
            .map_err(|e| InkError::Internal(format!("Upload task panicked: {e}")))?;

        if receipt.success {
            info!("Uploaded '{}': {}", title, receipt.message);
            return Ok(receipt);
        }
        warn!("Upload of '{}' failed: {}", title, receipt.message);
        last = receipt;
    }

    Err(InkError::UploadFailed {
        title,
        retries: policy.max_retries,
        message: last.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_title_replaces_and_truncates() {
        assert_eq!(safe_title("Hello: World/2024?"), "Hello_ World_2024_");
        assert_eq!(safe_title("  spaced  "), "spaced");
        assert_eq!(safe_title("???"), "___");
        assert_eq!(safe_title("   "), "Untitled");
        assert_eq!(safe_title("v1.2 - notes_final"), "v1.2 - notes_final");
        assert_eq!(safe_title(&"a".repeat(80)).len(), MAX_TITLE_CHARS);
        assert_eq!(safe_title("Café"), "Café");
    }

    #[test]
    fn rmapi_missing_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("doc.rm");
        std::fs::write(&artifact, vec![0u8; 100]).unwrap();
        let receipt = RmapiUploader::new("/nonexistent/rmapi", "/").upload(&artifact, "T");
        assert!(!receipt.success);
        assert!(receipt.message.contains("rmapi not found"));
    }

    #[test]
    fn missing_document_reports_failure() {
        let receipt =
            RmapiUploader::new("/nonexistent/rmapi", "/").upload(Path::new("/nope.rm"), "T");
        assert!(!receipt.success);
        assert!(receipt.message.contains("Document not found"));
    }

    #[cfg(unix)]
    #[test]
    fn rmapi_receives_titled_copy() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        let rmapi = dir.path().join("rmapi");
        std::fs::write(
            &rmapi,
            format!("#!/bin/sh\necho \"$@\" > '{}'\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&rmapi, std::fs::Permissions::from_mode(0o755)).unwrap();

        let artifact = dir.path().join("doc_abc-native.rm");
        std::fs::write(&artifact, vec![0u8; 100]).unwrap();

        let receipt = RmapiUploader::new(&rmapi, "/Articles").upload(&artifact, "A: B");
        assert!(receipt.success, "{}", receipt.message);
        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.starts_with("put "), "got: {args}");
        assert!(args.contains("A_ B.rm"));
        assert!(args.trim_end().ends_with("/Articles"));
    }
}
