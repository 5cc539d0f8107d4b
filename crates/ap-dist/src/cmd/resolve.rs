use anyhow::Result;
use ap_dist_schema::ReleaseVersion;

/// Print the version a tag resolves to.
pub fn resolve(reference: &str) -> Result<()> {
    let version = ReleaseVersion::resolve(reference)?;
    println!("{version}");
    Ok(())
}
