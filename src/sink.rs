//!
//! src/sink.rs  Andrew Belles  Oct 19th, 2026
//!
//! Save primitive for finished exports. The disk sink writes through a
//! temp file and persists it under the export directory
//!

use std::{fs, io::Write, path::{Path, PathBuf}};

use tracing::info;

use crate::errors::SonicError;
use crate::simulator::Artifact;

/// Platform "save bytes as a named file" primitive
pub trait ArtifactSink: Send + Sync {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, SonicError>;
}

impl<T: ArtifactSink + ?Sized> ArtifactSink for std::sync::Arc<T> {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, SonicError> {
        (**self).save(artifact)
    }
}

pub struct DiskSink {
    root: PathBuf,
}

impl DiskSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Keeps names readable ("Artist - Title (FLAC).flac") but strips
    /// path separators and characters filesystems reject
    pub fn sanitize_file_name(name: &str) -> String {
        let cleaned: String = name.chars()
            .map(|c| {
                if c.is_alphanumeric() || " -_().,'&!".contains(c) {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let trimmed = cleaned.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            "export".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl ArtifactSink for DiskSink {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, SonicError> {
        fs::create_dir_all(&self.root).map_err(|e|
            SonicError::Io(std::io::Error::new(
                e.kind(), format!("create dir {}: {e}", self.root.display())
            ))
        )?;

        let path = self.root.join(Self::sanitize_file_name(&artifact.file_name));

        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        temp.write_all(&artifact.bytes)?;
        temp.flush()?;
        temp.persist(&path).map_err(|e| SonicError::Io(e.error))?;

        info!(path = %path.display(), mime = artifact.mime,
              bytes = artifact.bytes.len(), "sink.saved");
        Ok(path)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str) -> Artifact {
        Artifact {
            file_name: name.to_string(),
            mime: "audio/flac",
            bytes: b"placeholder".to_vec(),
        }
    }

    #[test]
    fn sanitize_keeps_readable_names() {
        assert_eq!(
            DiskSink::sanitize_file_name("Tame Impala - Let It Happen (FLAC).flac"),
            "Tame Impala - Let It Happen (FLAC).flac"
        );
        assert_eq!(
            DiskSink::sanitize_file_name("AC/DC - T.N.T: Live? (320kbps).mp3"),
            "AC_DC - T.N.T_ Live_ (320kbps).mp3"
        );
        assert_eq!(DiskSink::sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(DiskSink::sanitize_file_name("   "), "export");
    }

    #[test]
    fn save_writes_into_a_fresh_directory() -> Result<(), SonicError> {
        let dir = tempfile::tempdir()?;
        let sink = DiskSink::new(dir.path().join("exports"));

        let path = sink.save(&artifact("Artist - Song (FLAC).flac"))?;

        assert_eq!(path, dir.path().join("exports").join("Artist - Song (FLAC).flac"));
        assert_eq!(fs::read(&path)?, b"placeholder");
        Ok(())
    }

    #[test]
    fn saving_twice_overwrites() -> Result<(), SonicError> {
        let dir = tempfile::tempdir()?;
        let sink = DiskSink::new(dir.path());

        sink.save(&artifact("a.flac"))?;
        let mut second = artifact("a.flac");
        second.bytes = b"again".to_vec();
        let path = sink.save(&second)?;

        assert_eq!(fs::read(path)?, b"again");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
