//! Artifact files for a run.

use std::path::PathBuf;

use crate::domain::{ArtifactKind, ArtifactRef, ExecOutcome};

/// Writes a run's artifacts under `{root}/{run_id}/`.
///
/// URIs are relative to the artifact root, so the control plane can serve
/// them from wherever it mounts that directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    run_id: String,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.run_id)
    }

    pub fn uri(&self, kind: ArtifactKind) -> String {
        format!("{}/{}", self.run_id, kind.file_name())
    }

    pub async fn write(&self, kind: ArtifactKind, contents: impl AsRef<[u8]>) -> std::io::Result<ArtifactRef> {
        let dir = self.dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(kind.file_name()), contents).await?;
        Ok(ArtifactRef::new(kind, self.uri(kind)))
    }
}

/// An artifact that could not be written is an infrastructure failure.
pub fn write_failed(e: std::io::Error) -> ExecOutcome {
    ExecOutcome::infra(format!("write artifact: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_run_dir() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path(), "run-1");

        let artifact = writer.write(ArtifactKind::Log, "$ echo ok\nok\n").await.unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Log);
        assert_eq!(artifact.uri, "run-1/log.txt");

        let contents = std::fs::read_to_string(temp.path().join("run-1").join("log.txt")).unwrap();
        assert_eq!(contents, "$ echo ok\nok\n");
    }

    #[test]
    fn test_uri_relative_to_root() {
        let writer = ArtifactWriter::new("/var/artifacts", "run-9");
        assert_eq!(writer.uri(ArtifactKind::Report), "run-9/report.json");
        assert_eq!(writer.dir(), PathBuf::from("/var/artifacts/run-9"));
    }
}
