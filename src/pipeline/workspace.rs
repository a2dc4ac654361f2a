//! Scoped working directory for one pipeline run.
//!
//! Several requests may run side by side and share the same temp root, so
//! every file name carries a content hash plus a millisecond timestamp. The
//! directory itself is a [`TempDir`]: when the [`Workspace`] drops, on success,
//! on error or on panic, everything generated for the request goes with it.

use crate::error::InkError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Owns the request's temporary directory.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace, inside `parent` when given, else under the
    /// system temp directory.
    pub fn create(parent: Option<&Path>) -> Result<Self, InkError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("web2ink-");
            b
        };
        let dir = match parent {
            Some(p) => {
                std::fs::create_dir_all(p).map_err(|source| InkError::Workspace {
                    path: p.to_path_buf(),
                    source,
                })?;
                builder.tempdir_in(p)
            }
            None => builder.tempdir(),
        }
        .map_err(|source| InkError::Workspace {
            path: parent
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir),
            source,
        })?;

        debug!("Workspace created at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `name` inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Collision-resistant stem: `doc_{sha256(content)[..16]}_{unix_millis}`.
    pub fn stem_for(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        let hash = hex::encode(digest);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("doc_{}_{}", &hash[..16], millis)
    }

    /// Write `contents` to `name` inside the workspace and return its path.
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf, InkError> {
        let path = self.file(name);
        std::fs::write(&path, contents).map_err(|source| InkError::Workspace {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
