use anyhow::Result;
use ap_dist_core::DistConfig;
use ap_dist_schema::{PlatformEntry, PlatformSpec, RESERVED_PLATFORMS};

/// List the active platform matrix, optionally with reserved entries.
pub fn platforms(config: &DistConfig, all: bool) -> Result<()> {
    let active = config.platforms();
    for platform in &active {
        print_row(platform, "");
    }

    if all {
        for platform in RESERVED_PLATFORMS.iter().map(PlatformSpec::to_entry) {
            if !active.iter().any(|p| p.id == platform.id) {
                print_row(&platform, " (reserved)");
            }
        }
    }
    Ok(())
}

fn print_row(platform: &PlatformEntry, note: &str) {
    let mut row = format!(
        "  {:<8} {:<26} {:<7} {}",
        platform.id,
        platform.target,
        platform.format,
        platform.binary_file_names().join(" ")
    );
    if !platform.system_packages.is_empty() {
        row.push_str(&format!(" [needs {}]", platform.system_packages.join(" ")));
    }
    println!("{row}{note}");
}
