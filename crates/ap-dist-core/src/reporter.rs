//! Reporter trait for dependency injection
//!
//! This trait allows the pipeline to report progress and status without
//! being coupled to a specific terminal UI.

use ap_dist_schema::{ArchiveArtifact, PlatformEntry, ReleaseAsset};

pub trait Reporter: Send + Sync {
    /// A new phase of the run has started (e.g. "packaging 2.0.1").
    fn section(&self, title: &str);

    /// The platform's build (including any system package step) has started.
    fn building(&self, platform: &PlatformEntry);

    /// The platform's binaries are being staged and compressed.
    fn assembling(&self, platform: &PlatformEntry);

    /// The platform pipeline finished with an archive.
    fn packaged(&self, artifact: &ArchiveArtifact, elapsed_secs: f64);

    /// The platform pipeline failed; no archive was produced.
    fn platform_failed(&self, platform: &PlatformEntry, reason: &str);

    /// An asset upload has started.
    fn uploading(&self, asset: &str);

    /// An asset was published (uploaded, replaced or skipped).
    fn uploaded(&self, asset: &ReleaseAsset);

    /// An asset upload failed.
    fn upload_failed(&self, asset: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn building(&self, platform: &PlatformEntry) {
        (**self).building(platform);
    }
    fn assembling(&self, platform: &PlatformEntry) {
        (**self).assembling(platform);
    }
    fn packaged(&self, artifact: &ArchiveArtifact, elapsed_secs: f64) {
        (**self).packaged(artifact, elapsed_secs);
    }
    fn platform_failed(&self, platform: &PlatformEntry, reason: &str) {
        (**self).platform_failed(platform, reason);
    }
    fn uploading(&self, asset: &str) {
        (**self).uploading(asset);
    }
    fn uploaded(&self, asset: &ReleaseAsset) {
        (**self).uploaded(asset);
    }
    fn upload_failed(&self, asset: &str, reason: &str) {
        (**self).upload_failed(asset, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn building(&self, _: &PlatformEntry) {}
    fn assembling(&self, _: &PlatformEntry) {}
    fn packaged(&self, _: &ArchiveArtifact, _: f64) {}
    fn platform_failed(&self, _: &PlatformEntry, _: &str) {}
    fn uploading(&self, _: &str) {}
    fn uploaded(&self, _: &ReleaseAsset) {}
    fn upload_failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
