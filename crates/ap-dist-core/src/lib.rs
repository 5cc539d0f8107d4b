pub mod assembler;
pub mod builder;
pub mod config;
pub mod error;
pub mod io;
pub mod manifest;
pub mod pipeline;
pub mod publisher;

pub mod reporter;

pub use assembler::Assembler;
pub use builder::{BuildDriver, BuildOutput, CargoToolchain, Toolchain};
pub use config::{ConflictPolicy, DistConfig};
pub use error::ReleaseError;
pub use pipeline::{Pipeline, PlatformReport, RunReport};
pub use publisher::{GitHubPublisher, Publisher};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for release API calls
pub const USER_AGENT: &str = concat!("ap-dist/", env!("CARGO_PKG_VERSION"));
