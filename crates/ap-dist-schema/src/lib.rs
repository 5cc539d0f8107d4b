//! Shared types for `ap` release packaging.
//!
//! Everything in this crate is plain data: the release version parsed from a
//! tag reference, the static platform matrix, and the artifacts that flow
//! from the assembler to the publisher. No I/O happens here.

pub mod artifact;
pub mod platform;
pub mod version;

// Re-exports
pub use artifact::*;
pub use platform::*;
pub use version::*;

/// Logical name of the application being packaged. Every archive is named
/// `{APP_NAME}-{version}-{target}`.
pub const APP_NAME: &str = "ap";
