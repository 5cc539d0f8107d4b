//! Release publisher.
//!
//! Attaches archives (and their checksum files) to the GitHub release whose
//! tag equals the version. The release itself must already exist. Uploads
//! are independent: a failed upload does not retract assets that already
//! went up, and nothing is retried.

use std::path::Path;

use anyhow::{Context, anyhow};
use ap_dist_schema::{ArchiveArtifact, AssetStatus, ReleaseAsset, ReleaseVersion};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::config::ConflictPolicy;
use crate::error::ReleaseError;
use crate::reporter::Reporter;

/// Content type of `.sha256` files.
pub const CHECKSUM_CONTENT_TYPE: &str = "text/plain";

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload one local file as an asset of the release tagged `version`.
    ///
    /// Every failure is reported as [`ReleaseError::PublishFailed`] naming
    /// the asset.
    async fn upload(
        &self,
        version: &ReleaseVersion,
        path: &Path,
        content_type: &str,
    ) -> Result<ReleaseAsset, ReleaseError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub id: u64,
    pub tag_name: String,
    pub upload_url: String,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub id: u64,
    pub name: String,
    pub browser_download_url: String,
}

/// Publishes to GitHub Releases through the REST API.
#[derive(Debug)]
pub struct GitHubPublisher {
    client: reqwest::Client,
    api_url: String,
    repository: String,
    token: String,
    on_conflict: ConflictPolicy,
    release: OnceCell<GithubRelease>,
}

impl GitHubPublisher {
    /// Create a publisher for `repository` (`OWNER/NAME`).
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] if the HTTP client cannot be built.
    pub fn new(
        api_url: &str,
        repository: &str,
        token: &str,
        on_conflict: ConflictPolicy,
    ) -> Result<Self, ReleaseError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ReleaseError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
            token: token.to_string(),
            on_conflict,
            release: OnceCell::new(),
        })
    }

    /// Look up the release for `version`, once per publisher.
    async fn release(&self, version: &ReleaseVersion) -> anyhow::Result<&GithubRelease> {
        self.release
            .get_or_try_init(|| self.fetch_release(version))
            .await
    }

    async fn fetch_release(&self, version: &ReleaseVersion) -> anyhow::Result<GithubRelease> {
        let url = format!(
            "{}/repos/{}/releases/tags/{version}",
            self.api_url, self.repository
        );
        tracing::debug!("GET {url}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(anyhow!(
                "release {version} does not exist in {}",
                self.repository
            ));
        }

        let release: GithubRelease = response
            .error_for_status()
            .context("release lookup failed")?
            .json()
            .await
            .context("invalid release response")?;

        tracing::debug!(
            "release {} has id {} and {} assets",
            release.tag_name,
            release.id,
            release.assets.len()
        );
        Ok(release)
    }

    async fn delete_asset(&self, asset: &GithubAsset) -> anyhow::Result<()> {
        let url = format!(
            "{}/repos/{}/releases/assets/{}",
            self.api_url, self.repository, asset.id
        );
        tracing::debug!("DELETE {url}");

        self.client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("failed to delete existing asset {}", asset.name))?;
        Ok(())
    }

    async fn upload_inner(
        &self,
        version: &ReleaseVersion,
        path: &Path,
        name: &str,
        content_type: &str,
    ) -> anyhow::Result<ReleaseAsset> {
        let release = self.release(version).await?;

        let mut status = AssetStatus::Uploaded;
        if let Some(existing) = release.assets.iter().find(|a| a.name == name) {
            match self.on_conflict {
                ConflictPolicy::Skip => {
                    tracing::info!("{name} already exists on release {version}, skipping");
                    return Ok(ReleaseAsset {
                        name: name.to_string(),
                        version: version.clone(),
                        url: Some(existing.browser_download_url.clone()),
                        status: AssetStatus::Skipped,
                    });
                }
                ConflictPolicy::Fail => {
                    return Err(anyhow!("asset already exists on release {version}"));
                }
                ConflictPolicy::Overwrite => {
                    self.delete_asset(existing).await?;
                    status = AssetStatus::Replaced;
                }
            }
        }

        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        // upload_url is a URI template: ".../assets{?name,label}"
        let upload_url = release
            .upload_url
            .split('{')
            .next()
            .unwrap_or(&release.upload_url);
        tracing::debug!("POST {upload_url}?name={name} ({} bytes)", body.len());

        let uploaded: GithubAsset = self
            .client
            .post(upload_url)
            .query(&[("name", name)])
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to reach {upload_url}"))?
            .error_for_status()
            .context("upload rejected")?
            .json()
            .await
            .context("invalid upload response")?;

        Ok(ReleaseAsset {
            name: uploaded.name,
            version: version.clone(),
            url: Some(uploaded.browser_download_url),
            status,
        })
    }
}

#[async_trait]
impl Publisher for GitHubPublisher {
    async fn upload(
        &self,
        version: &ReleaseVersion,
        path: &Path,
        content_type: &str,
    ) -> Result<ReleaseAsset, ReleaseError> {
        let name = asset_name(path);
        self.upload_inner(version, path, &name, content_type)
            .await
            .map_err(|e| ReleaseError::publish_failed(&name, e))
    }
}

fn asset_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Upload every archive and its checksum file concurrently.
///
/// Results come back in artifact order, archive before checksum.
pub async fn publish_artifacts<P, R>(
    publisher: &P,
    version: &ReleaseVersion,
    artifacts: &[ArchiveArtifact],
    reporter: &R,
) -> Vec<Result<ReleaseAsset, ReleaseError>>
where
    P: Publisher + ?Sized,
    R: Reporter + ?Sized,
{
    let files: Vec<(&Path, &str)> = artifacts
        .iter()
        .flat_map(|artifact| {
            std::iter::once((artifact.path.as_path(), artifact.format.content_type())).chain(
                artifact
                    .checksum_path
                    .as_deref()
                    .map(|p| (p, CHECKSUM_CONTENT_TYPE)),
            )
        })
        .collect();

    let uploads = files.into_iter().map(|(path, content_type)| async move {
        let name = asset_name(path);
        reporter.uploading(&name);
        let result = publisher.upload(version, path, content_type).await;
        match &result {
            Ok(asset) => reporter.uploaded(asset),
            Err(e) => reporter.upload_failed(&name, &e.to_string()),
        }
        result
    });

    join_all(uploads).await
}
