//! ap-dist - release packaging for `ap`
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Builds `ap`, `ap-iced` and `ap-tui` for each platform of the release
//! matrix, packs each platform's binaries into one archive and attaches the
//! archives to the GitHub release named after the version tag.
//!
//! # Output Layout
//!
//! ```text
//! dist/
//! ├── ap-1.2.3-x86_64-pc-windows-msvc.zip
//! ├── ap-1.2.3-x86_64-pc-windows-msvc.zip.sha256
//! ├── ap-1.2.3-x86_64-unknown-linux-gnu.tar.gz
//! ├── ap-1.2.3-x86_64-unknown-linux-gnu.tar.gz.sha256
//! └── manifest.json
//! ```

pub mod cmd;
pub mod ui;

pub use ap_dist_core::USER_AGENT;

use ap_dist_core::ConflictPolicy;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ap-dist")]
#[command(author, version, about = "ap-dist - build, package and publish ap releases")]
pub struct Cli {
    /// Configuration file (default: ./ap-dist.toml when present)
    #[arg(long, short, global = true, env = "AP_DIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the plan only (package), or package without uploading (release)
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Stream compiler output and enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build, package and upload archives to the release for a tag
    Release {
        /// Tag or ref, e.g. 1.2.3 or refs/tags/1.2.3
        #[arg(env = "GITHUB_REF")]
        reference: String,
        #[command(flatten)]
        build: BuildArgs,
        /// What to do when the release already has an asset of the same name
        #[arg(long)]
        on_conflict: Option<ConflictPolicy>,
        /// API token with permission to upload release assets
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Build and package archives without publishing
    Package {
        /// Tag or ref, e.g. 1.2.3 or refs/tags/1.2.3
        #[arg(env = "GITHUB_REF")]
        reference: String,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Print the release version for a tag, or fail if it is malformed
    Resolve {
        /// Tag or ref
        reference: String,
    },
    /// List the platform matrix
    Platforms {
        /// Include reserved platforms that are not built by default
        #[arg(long)]
        all: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Only this platform id (repeatable)
    #[arg(long = "platform", short = 'p', value_name = "ID")]
    pub platforms: Vec<String>,

    /// Package existing build output instead of compiling
    #[arg(long)]
    pub skip_build: bool,

    /// Platform pipelines to run at once
    #[arg(long, short = 'j', value_name = "N")]
    pub parallel: Option<usize>,

    /// Do not write or upload .sha256 files
    #[arg(long)]
    pub no_checksums: bool,
}
