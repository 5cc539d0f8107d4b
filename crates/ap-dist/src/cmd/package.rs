use anyhow::Result;
use ap_dist_schema::ReleaseVersion;

use super::{Context, finish};
use crate::BuildArgs;

/// Build and package every selected platform.
pub async fn package(ctx: &Context, reference: &str, args: &BuildArgs) -> Result<()> {
    let platforms = ctx.platforms(args)?;

    if ctx.dry_run {
        let version = ReleaseVersion::resolve(reference)?;
        ctx.print_plan(&version, &platforms);
        return Ok(());
    }

    let report = ctx.pipeline(args)?.package(reference, &platforms).await?;
    finish(&report)
}
