//! Hand DOT text to the Graphviz `dot` binary and collect the rendered image.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("graphviz engine not found: {0}")]
    EngineNotFound(String),

    #[error("graphviz rejected the diagram: {stderr}")]
    Rejected { stderr: String },

    #[error("graphviz i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Svg,
    Png,
    Pdf,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
            ImageFormat::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Ok(ImageFormat::Svg),
            "png" => Ok(ImageFormat::Png),
            "pdf" => Ok(ImageFormat::Pdf),
            other => Err(format!("unsupported image format: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphvizEngine {
    binary: PathBuf,
}

impl GraphvizEngine {
    /// Use an explicit binary path without checking that it exists.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve the engine: configured path first, then `dot` on `$PATH`.
    pub fn locate(configured: Option<&str>) -> Result<Self, RenderError> {
        if let Some(path) = configured.filter(|p| !p.trim().is_empty()) {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Ok(Self::with_binary(path));
            }
            return which::which(&path)
                .map(Self::with_binary)
                .map_err(|e| RenderError::EngineNotFound(format!("{}: {e}", path.display())));
        }
        which::which("dot")
            .map(Self::with_binary)
            .map_err(|e| RenderError::EngineNotFound(format!("dot: {e}")))
    }

    /// Render `dot` into `format`. A malformed description comes back as
    /// [`RenderError::Rejected`] with the engine's stderr.
    pub fn render(&self, dot: &str, format: ImageFormat) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.binary)
            .arg(format!("-T{}", format.as_str()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    RenderError::EngineNotFound(self.binary.display().to_string())
                }
                _ => RenderError::Io(e),
            })?;

        // stdin is written on its own thread while stdout and stderr drain.
        let stdin = child.stdin.take();
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                // The engine may exit before reading everything; its status says why.
                Some(mut stdin) => match stdin.write_all(dot.as_bytes()) {
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                    _ => Ok(()),
                },
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output?;
        written?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(status = ?output.status, %stderr, "graphviz render failed");
            return Err(RenderError::Rejected { stderr });
        }

        tracing::debug!(bytes = output.stdout.len(), format = format.as_str(), "rendered diagram");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_missing_binary_is_engine_not_found() {
        let engine = GraphvizEngine::with_binary("/nonexistent/autoergen/dot");
        let err = engine.render("digraph {}", ImageFormat::Svg).unwrap_err();
        assert!(matches!(err, RenderError::EngineNotFound(_)));
    }

    #[test]
    fn test_locate_missing_configured_path() {
        let err = GraphvizEngine::locate(Some("/nonexistent/autoergen/dot")).unwrap_err();
        assert!(matches!(err, RenderError::EngineNotFound(_)));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("SVG".parse::<ImageFormat>().unwrap(), ImageFormat::Svg);
        assert_eq!("png".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[cfg(unix)]
    fn fake_engine(dir: &Path, script: &str) -> GraphvizEngine {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-dot");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        GraphvizEngine::with_binary(path)
    }

    #[cfg(unix)]
    #[test]
    fn test_rejected_markup_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(
            dir.path(),
            "#!/bin/sh\ncat >/dev/null\necho 'syntax error in line 1' >&2\nexit 1\n",
        );
        match engine.render("digraph {", ImageFormat::Svg) {
            Err(RenderError::Rejected { stderr }) => assert!(stderr.contains("syntax error")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_render_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "#!/bin/sh\ncat\n");
        let out = engine.render("digraph { a -> b }", ImageFormat::Svg).unwrap();
        assert_eq!(out, b"digraph { a -> b }");
    }

    #[cfg(unix)]
    #[test]
    fn test_large_output_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "#!/bin/sh\ncat\n");
        let dot = format!("digraph {{ {} }}", "A -> B; ".repeat(256 * 1024));
        assert!(dot.len() > 1024 * 1024);

        let out = engine.render(&dot, ImageFormat::Svg).unwrap();
        assert_eq!(out.len(), dot.len());
    }
}
