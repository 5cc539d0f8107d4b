use anyhow::{Context as _, Result};
use ap_dist_core::{ConflictPolicy, GitHubPublisher};
use ap_dist_schema::ReleaseVersion;

use super::{Context, finish};
use crate::BuildArgs;

/// Build, package and publish every selected platform.
///
/// Publishing settings are checked before anything is built. With
/// `--dry-run` the archives are still produced but nothing is uploaded.
pub async fn release(
    ctx: &Context,
    reference: &str,
    args: &BuildArgs,
    on_conflict: Option<ConflictPolicy>,
    token: Option<&str>,
) -> Result<()> {
    // Fail before any platform starts.
    let version = ReleaseVersion::resolve(reference)?;
    let platforms = ctx.platforms(args)?;

    let mut release = ctx.config.release.clone();
    if on_conflict.is_some() {
        release.on_conflict = on_conflict;
    }
    let repository = release.require_repository()?;
    let policy = release.require_conflict_policy()?;
    let token = if ctx.dry_run {
        None
    } else {
        Some(
            token
                .filter(|t| !t.is_empty())
                .context("no API token; set GITHUB_TOKEN or pass --token")?,
        )
    };

    let pipeline = ctx.pipeline(args)?;

    let Some(token) = token else {
        let report = pipeline.package(reference, &platforms).await?;
        for artifact in report.artifacts() {
            ctx.reporter.info(&format!(
                "would upload {} to {repository} release {version} (on conflict: {policy})",
                artifact.file_name
            ));
            if let Some(checksum) = &artifact.checksum_path {
                ctx.reporter
                    .info(&format!("would upload {}", checksum.display()));
            }
        }
        return finish(&report);
    };

    let publisher = GitHubPublisher::new(&release.api_url(), repository, token, policy)?;

    tracing::info!("publishing to {repository} via {}", release.api_url());
    let report = pipeline.release(reference, &platforms, &publisher).await?;
    finish(&report)
}
