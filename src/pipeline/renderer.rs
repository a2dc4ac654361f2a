//! External renderer seam.
//!
//! The orchestrator never spawns processes itself; it hands an [`Invocation`]
//! to a [`Renderer`]. Production uses [`CommandRenderer`] (drawj2d on disk),
//! tests plug in scripted fakes. Implementations are blocking; the
//! orchestrator calls them from `tokio::task::spawn_blocking` so a slow
//! renderer never stalls the async workers.

use crate::config::ConversionMethod;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// One renderer run: which method, with which arguments, writing where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub method: String,
    /// Full argument list, excluding the program: `flags… -o <output> <script>`.
    pub args: Vec<String>,
    pub output: PathBuf,
    pub script: PathBuf,
}

impl Invocation {
    pub fn new(method: &ConversionMethod, output: &Path, script: &Path) -> Self {
        Self {
            method: method.name.clone(),
            args: method.arguments(output, script),
            output: output.to_path_buf(),
            script: script.to_path_buf(),
        }
    }
}

/// What a finished renderer process reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Something that can turn a script file into an artifact file.
pub trait Renderer: Send + Sync {
    /// Verify the renderer can run at all. The error text ends up in a
    /// configuration error, so it should say what is wrong.
    fn check_available(&self) -> Result<(), String>;

    /// Run one invocation to completion. `Err` means the process could not
    /// be started; a non-zero exit is an `Ok` with that exit code.
    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput>;
}

/// Runs a renderer executable on disk.
#[derive(Clone)]
pub struct CommandRenderer {
    program: PathBuf,
}

impl fmt::Debug for CommandRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRenderer")
            .field("program", &self.program)
            .finish()
    }
}

impl CommandRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The executable that would run: the configured path, or the first
    /// match on `PATH` for a bare program name.
    pub fn resolve(&self) -> Option<PathBuf> {
        find_program(&self.program)
    }
}

impl Renderer for CommandRenderer {
    fn check_available(&self) -> Result<(), String> {
        let Some(path) = self.resolve() else {
            return Err(format!(
                "renderer '{}' not found (set --renderer or WEB2INK_RENDERER)",
                self.program.display()
            ));
        };
        if !is_executable(&path) {
            return Err(format!("renderer '{}' is not executable", path.display()));
        }
        Ok(())
    }

    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        let program = self.resolve().unwrap_or_else(|| self.program.clone());
        debug!(
            "Running {} {}",
            program.display(),
            invocation.args.join(" ")
        );
        let output = Command::new(&program).args(&invocation.args).output()?;
        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locate `program`: used as-is when it has a directory part, otherwise
/// searched on `PATH`.
pub fn find_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_renderer_is_unavailable() {
        let r = CommandRenderer::new("/nonexistent/drawj2d");
        let err = r.check_available().unwrap_err();
        assert!(err.contains("not found"), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawj2d");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let err = CommandRenderer::new(&path).check_available().unwrap_err();
        assert!(err.contains("not executable"), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn runs_script_and_captures_exit_code() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-renderer");
        std::fs::write(&path, "#!/bin/sh\necho \"bad input\" >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let r = CommandRenderer::new(&path);
        r.check_available().unwrap();
        let inv = Invocation::new(
            &ConversionMethod::basic(),
            &dir.path().join("out.rm"),
            &dir.path().join("doc.hcl"),
        );
        let out = r.run(&inv).unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.succeeded());
        assert!(out.stderr.contains("bad input"));
    }

    #[test]
    fn bare_name_resolved_on_path() {
        // `sh` exists on every unix PATH; elsewhere the lookup just yields None.
        let r = CommandRenderer::new("sh");
        if cfg!(unix) {
            assert!(r.resolve().is_some());
        }
        assert!(CommandRenderer::new("definitely-not-a-real-renderer-xyz")
            .resolve()
            .is_none());
    }
}
