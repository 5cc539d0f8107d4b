//! `dist/manifest.json`: what a run produced, for downstream tooling.

use std::fs;
use std::path::{Path, PathBuf};

use ap_dist_schema::{APP_NAME, ArchiveArtifact, ArchiveFormat, ReleaseVersion};
use serde::{Deserialize, Serialize};

use crate::error::ReleaseError;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistManifest {
    pub name: String,
    pub version: ReleaseVersion,
    /// RFC 3339 timestamp of the run.
    pub generated_at: String,
    pub artifacts: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub platform: String,
    pub target: String,
    pub format: ArchiveFormat,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
}

impl DistManifest {
    pub fn new(version: &ReleaseVersion, artifacts: &[ArchiveArtifact]) -> Self {
        Self {
            name: APP_NAME.to_string(),
            version: version.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            artifacts: artifacts
                .iter()
                .map(|a| ManifestEntry {
                    platform: a.platform.clone(),
                    target: a.target.clone(),
                    format: a.format,
                    file_name: a.file_name.clone(),
                    size: a.size,
                    sha256: a.sha256.clone(),
                })
                .collect(),
        }
    }

    /// Write to `{dist_dir}/manifest.json`, replacing any previous one.
    pub fn write(&self, dist_dir: &Path) -> Result<PathBuf, ReleaseError> {
        fs::create_dir_all(dist_dir)?;
        let path = dist_dir.join(MANIFEST_FILE_NAME);
        let partial = dist_dir.join(format!(".{MANIFEST_FILE_NAME}.partial"));

        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        fs::write(&partial, json)?;
        fs::rename(&partial, &path)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self, ReleaseError> {
        let content = fs::read(path)?;
        serde_json::from_slice(&content)
            .map_err(|e| ReleaseError::Config(format!("invalid manifest {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read() {
        let tmp = tempdir().unwrap();
        let version = ReleaseVersion::resolve("1.2.3").unwrap();
        let artifact = ArchiveArtifact {
            platform: "linux".into(),
            target: "x86_64-unknown-linux-gnu".into(),
            format: ArchiveFormat::TarGz,
            file_name: "ap-1.2.3-x86_64-unknown-linux-gnu.tar.gz".into(),
            path: tmp.path().join("ap-1.2.3-x86_64-unknown-linux-gnu.tar.gz"),
            size: 42,
            sha256: "ab".repeat(32),
            checksum_path: None,
        };

        let manifest = DistManifest::new(&version, &[artifact]);
        let path = manifest.write(tmp.path()).unwrap();

        assert_eq!(path, tmp.path().join("manifest.json"));
        assert!(!tmp.path().join(".manifest.json.partial").exists());

        let loaded = DistManifest::read(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.name, "ap");
        assert_eq!(loaded.artifacts[0].size, 42);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"format\": \"tar.gz\""), "{raw}");
    }
}
