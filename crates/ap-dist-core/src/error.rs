//! Error taxonomy for a release run.
//!
//! `InvalidVersionFormat` aborts the whole run before any platform starts.
//! `BuildFailed`, `MissingBinary` and `Archive` are fatal to a single
//! platform pipeline. `PublishFailed` is fatal to a single asset. Nothing is
//! retried.

use std::path::PathBuf;

use ap_dist_schema::InvalidVersionFormat;
use thiserror::Error;

/// Errors surfaced by the release pipeline.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// The trigger reference is not a `MAJOR.MINOR.PATCH` tag.
    #[error(transparent)]
    InvalidVersionFormat(#[from] InvalidVersionFormat),

    /// System package installation or compilation failed.
    #[error("build failed for {platform}: {source:#}")]
    BuildFailed {
        /// Platform id, e.g. `linux`.
        platform: String,
        /// What the toolchain reported.
        #[source]
        source: anyhow::Error,
    },

    /// The build reported success but an expected binary is absent.
    #[error("missing binary {name} in {}", dir.display())]
    MissingBinary {
        /// File name that was expected, suffix included.
        name: String,
        /// Build output directory that was searched.
        dir: PathBuf,
    },

    /// The written archive does not have the expected layout.
    #[error("archive integrity check failed for {}: {message}", archive.display())]
    Archive {
        /// Archive that failed the check.
        archive: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// Uploading an asset to the release failed.
    #[error("failed to publish {asset}: {source:#}")]
    PublishFailed {
        /// Asset file name.
        asset: String,
        /// Transport or API error.
        #[source]
        source: anyhow::Error,
    },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure while staging or compressing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A platform worker panicked or was cancelled.
    #[error("platform task failed: {0}")]
    Task(String),
}

impl ReleaseError {
    /// Wrap a toolchain error for `platform`.
    pub fn build_failed(platform: &str, source: anyhow::Error) -> Self {
        Self::BuildFailed {
            platform: platform.to_string(),
            source,
        }
    }

    /// Wrap a transport error for `asset`.
    pub fn publish_failed(asset: &str, source: anyhow::Error) -> Self {
        Self::PublishFailed {
            asset: asset.to_string(),
            source,
        }
    }
}

impl From<zip::result::ZipError> for ReleaseError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Io(std::io::Error::other(other)),
        }
    }
}
