//! Artifacts produced by the assembler and assets created by the publisher.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::platform::{ArchiveFormat, PlatformEntry};
use crate::version::ReleaseVersion;

/// Archive base name for a version and target: `ap-{version}-{target}`.
///
/// This is both the staging directory name and the single top-level entry
/// inside the archive.
pub fn archive_base_name(version: &ReleaseVersion, target: &str) -> String {
    format!("{}-{version}-{target}", crate::APP_NAME)
}

/// Archive file name for a version and platform, extension included.
///
/// # Example
///
/// ```
/// use ap_dist_schema::{ReleaseVersion, archive_file_name, default_matrix};
///
/// let version = ReleaseVersion::resolve("2.0.1").unwrap();
/// let linux = default_matrix().into_iter().find(|p| p.id == "linux").unwrap();
/// assert_eq!(
///     archive_file_name(&version, &linux),
///     "ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz"
/// );
/// ```
pub fn archive_file_name(version: &ReleaseVersion, platform: &PlatformEntry) -> String {
    format!(
        "{}.{}",
        archive_base_name(version, &platform.target),
        platform.format.extension()
    )
}

/// A packaged archive on local disk, ready for publishing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveArtifact {
    /// Platform the archive was built for.
    pub platform: String,
    /// Target triple of the packaged binaries.
    pub target: String,
    /// Archive container.
    pub format: ArchiveFormat,
    /// File name, e.g. `ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz`.
    pub file_name: String,
    /// Absolute or dist-relative path of the archive.
    pub path: PathBuf,
    /// Archive size in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the archive.
    pub sha256: String,
    /// Companion `<archive>.sha256` file, when checksums are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_path: Option<PathBuf>,
}

/// Outcome of publishing one file to a release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    /// Uploaded; no asset of that name existed.
    Uploaded,
    /// An existing asset of the same name was deleted and re-uploaded.
    Replaced,
    /// An asset of the same name already existed and was left untouched.
    Skipped,
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Uploaded => "uploaded",
            Self::Replaced => "replaced",
            Self::Skipped => "skipped",
        })
    }
}

/// A file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// Asset name as shown on the release.
    pub name: String,
    /// Version of the release the asset is attached to.
    pub version: ReleaseVersion,
    /// Download URL reported by the hosting service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// What the publish step did.
    pub status: AssetStatus,
}
