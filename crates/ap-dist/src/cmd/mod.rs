//! Command implementations.

pub mod completions;
pub mod package;
pub mod platforms;
pub mod release;
pub mod resolve;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ap_dist_core::{
    Assembler, BuildDriver, CargoToolchain, DistConfig, Pipeline, Reporter, RunReport,
};
use ap_dist_schema::{PlatformEntry, ReleaseVersion, archive_file_name};

use crate::BuildArgs;
use crate::ui::ConsoleReporter;

/// State shared by the build commands.
#[derive(Clone)]
pub struct Context {
    pub config: DistConfig,
    pub reporter: Arc<dyn Reporter>,
    pub dry_run: bool,
    pub verbose: bool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Load the config file and apply the environment overlay.
    pub fn load(config: Option<&Path>, dry_run: bool, verbose: bool) -> Result<Self> {
        let mut config = DistConfig::load(config)?;
        config.apply_process_env();
        Ok(Self {
            config,
            reporter: Arc::new(ConsoleReporter::new()),
            dry_run,
            verbose,
        })
    }

    pub fn platforms(&self, args: &BuildArgs) -> Result<Vec<PlatformEntry>> {
        Ok(self.config.select_platforms(&args.platforms)?)
    }

    /// Wire config and flags into a pipeline backed by cargo. With
    /// `--skip-build` cargo is never looked up.
    pub fn pipeline(&self, args: &BuildArgs) -> Result<Pipeline> {
        let project = &self.config.project;
        let driver = if args.skip_build {
            BuildDriver::prebuilt(project.output_root())
        } else {
            let toolchain = CargoToolchain::new(project.dir.clone(), project.log_dir())
                .context("cannot build without cargo")?
                .with_install_command(self.config.install.command.clone())
                .verbose(self.verbose);
            BuildDriver::new(Arc::new(toolchain), project.output_root())
        };
        let assembler = Assembler::new(project.dist_dir())
            .with_checksums(self.config.release.checksums && !args.no_checksums);

        Ok(Pipeline::new(driver, assembler, Arc::clone(&self.reporter))
            .parallel(args.parallel.unwrap_or(project.parallel)))
    }

    /// Print what a run would produce without running it.
    pub fn print_plan(&self, version: &ReleaseVersion, platforms: &[PlatformEntry]) {
        let dist = self.config.project.dist_dir();
        for platform in platforms {
            let steps = if platform.system_packages.is_empty() {
                String::new()
            } else {
                format!(" after installing {}", platform.system_packages.join(" "))
            };
            self.reporter.info(&format!(
                "would build {platform}{steps} -> {}",
                dist.join(archive_file_name(version, platform)).display()
            ));
        }
    }
}

/// Print the closing summary and turn failures into an error (non-zero exit).
pub fn finish(report: &RunReport) -> Result<()> {
    let packaged = report.artifacts().count();
    let failed: Vec<_> = report.failed_platforms().map(|(p, _)| p.id.as_str()).collect();
    let failed_assets = report.failed_assets().count();

    println!();
    println!(
        "  {packaged} of {} platforms packaged for {}",
        report.platforms.len(),
        report.version
    );
    if !report.assets.is_empty() {
        println!(
            "  {} of {} assets published",
            report.assets.len() - failed_assets,
            report.assets.len()
        );
    }
    if let Some(manifest) = &report.manifest {
        println!("  wrote {}", manifest.display());
    }

    if !failed.is_empty() {
        anyhow::bail!("failed platforms: {}", failed.join(", "));
    }
    if failed_assets > 0 {
        anyhow::bail!("{failed_assets} asset(s) failed to upload");
    }
    Ok(())
}
