//! Renderer backed by an external program.
//!
//! The program is invoked once per diagram kind as
//!
//! ```text
//! <program> <kind> <source_dir> <artifact_dir> [--complete] [--force]
//! ```
//!
//! and reports the artifacts it wrote on stdout, one path per line. A
//! non-zero exit status is a render failure; its stderr becomes the message.

use std::process::Command;

use camino::Utf8PathBuf;
use fw_watcher::{RenderError, RenderRequest, Renderer};

/// Runs an external renderer program.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: Utf8PathBuf,
}

impl CommandRenderer {
    /// Creates a renderer invoking `program`.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Renderer for CommandRenderer {
    fn render(&self, request: &RenderRequest) -> Result<Vec<Utf8PathBuf>, RenderError> {
        let mut command = Command::new(self.program.as_std_path());
        command
            .arg(request.kind.label())
            .arg(request.source_dir.as_std_path())
            .arg(request.artifact_dir.as_std_path());
        if request.whole_tree {
            command.arg("--complete");
        }
        if request.force {
            command.arg("--force");
        }

        let output = command.output().map_err(|e| {
            RenderError::new(request.kind, format!("failed to run {}: {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("{} exited with {}", self.program, output.status),
                detail => detail.to_owned(),
            };
            return Err(RenderError::new(request.kind, message));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Utf8PathBuf::from)
            .collect())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use fw_core::DiagramKind;

    fn request(force: bool) -> RenderRequest {
        RenderRequest {
            source_dir: "/src/models".into(),
            target_dir: "/src".into(),
            artifact_dir: "/src/diagrams".into(),
            kind: DiagramKind::Class,
            whole_tree: true,
            force,
        }
    }

    #[test]
    fn test_arguments_and_stdout_artifacts() {
        let artifacts = CommandRenderer::new("echo").render(&request(true)).unwrap();
        assert_eq!(
            artifacts,
            [Utf8PathBuf::from("class /src/models /src/diagrams --complete --force")]
        );
    }

    #[test]
    fn test_failing_program() {
        let err = CommandRenderer::new("false").render(&request(false)).unwrap_err();
        assert_eq!(err.kind, DiagramKind::Class);
        assert!(err.message.contains("exited with"));
    }

    #[test]
    fn test_missing_program() {
        let err = CommandRenderer::new("/nonexistent/renderer")
            .render(&request(false))
            .unwrap_err();
        assert!(err.message.starts_with("failed to run /nonexistent/renderer"));
    }
}
