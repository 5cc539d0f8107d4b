//! ap-dist - build, package and publish ap releases

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ap_dist::cmd;
use ap_dist::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("ap_dist=debug,ap_dist_core=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve { reference } => cmd::resolve::resolve(&reference),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
        Commands::Platforms { all } => {
            let ctx = cmd::Context::load(cli.config.as_deref(), cli.dry_run, cli.verbose)?;
            cmd::platforms::platforms(&ctx.config, all)
        }
        Commands::Package { reference, build } => {
            let ctx = cmd::Context::load(cli.config.as_deref(), cli.dry_run, cli.verbose)?;
            cmd::package::package(&ctx, &reference, &build).await
        }
        Commands::Release {
            reference,
            build,
            on_conflict,
            token,
        } => {
            let ctx = cmd::Context::load(cli.config.as_deref(), cli.dry_run, cli.verbose)?;
            cmd::release::release(&ctx, &reference, &build, on_conflict, token.as_deref()).await
        }
    }
}
