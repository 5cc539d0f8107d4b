//! The platform matrix: which targets get built, which binaries each one
//! ships, and how its archive is packed.
//!
//! The matrix is a static table of [`PlatformSpec`] records. Platforms that
//! are not shipped yet live in [`RESERVED_PLATFORMS`] instead of carrying an
//! "enabled" flag, so the active set is simply [`PLATFORMS`].
//!
//! | Platform | Target | Format | System packages |
//! |---|---|---|---|
//! | `windows` | `x86_64-pc-windows-msvc` | `zip` | - |
//! | `linux` | `x86_64-unknown-linux-gnu` | `tar.gz` | `libasound2-dev` |
//! | `macos` (reserved) | `x86_64-apple-darwin` | `tar.gz` | - |

use serde::{Deserialize, Serialize};

/// Binaries produced by every `ap` build, in archive order.
pub const AP_BINARIES: &[&str] = &["ap", "ap-iced", "ap-tui"];

/// Archive container used for a platform's distributable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Zip archive (`.zip`), the native choice on Windows.
    #[serde(rename = "zip")]
    Zip,
    /// Gzip-compressed tar archive (`.tar.gz`).
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    /// MIME type sent when uploading an archive of this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::TarGz => "application/gzip",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            _ => Err(format!("Unknown archive format: {s}")),
        }
    }
}

/// Compile-time description of a platform. See [`PLATFORMS`].
#[derive(Debug, Clone, Copy)]
pub struct PlatformSpec {
    /// Symbolic name, e.g. `linux`.
    pub id: &'static str,
    /// Compiler-facing target triple.
    pub target: &'static str,
    /// Logical binary names, without executable suffix.
    pub binaries: &'static [&'static str],
    /// Archive container for this platform.
    pub format: ArchiveFormat,
    /// System packages installed before compiling.
    pub system_packages: &'static [&'static str],
}

impl PlatformSpec {
    /// Materialize an owned [`PlatformEntry`].
    pub fn to_entry(&self) -> PlatformEntry {
        PlatformEntry {
            id: self.id.to_string(),
            target: self.target.to_string(),
            binaries: self.binaries.iter().map(ToString::to_string).collect(),
            format: self.format,
            system_packages: self
                .system_packages
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Platforms released on every tag.
pub const PLATFORMS: &[PlatformSpec] = &[
    PlatformSpec {
        id: "windows",
        target: "x86_64-pc-windows-msvc",
        binaries: AP_BINARIES,
        format: ArchiveFormat::Zip,
        system_packages: &[],
    },
    PlatformSpec {
        id: "linux",
        target: "x86_64-unknown-linux-gnu",
        binaries: AP_BINARIES,
        format: ArchiveFormat::TarGz,
        // ALSA headers for the audio backend.
        system_packages: &["libasound2-dev"],
    },
];

/// Platforms known to the matrix but not released. They only become active
/// when declared in a config file.
pub const RESERVED_PLATFORMS: &[PlatformSpec] = &[PlatformSpec {
    id: "macos",
    target: "x86_64-apple-darwin",
    binaries: AP_BINARIES,
    format: ArchiveFormat::TarGz,
    system_packages: &[],
}];

/// The active platform set as owned entries.
pub fn default_matrix() -> Vec<PlatformEntry> {
    PLATFORMS.iter().map(PlatformSpec::to_entry).collect()
}

/// One platform of the release matrix.
///
/// Field names match the `[[platform]]` table of the config file:
///
/// ```toml
/// [[platform]]
/// id = "linux"
/// target = "x86_64-unknown-linux-gnu"
/// binaries = ["ap", "ap-iced", "ap-tui"]
/// format = "tar.gz"
/// system_packages = ["libasound2-dev"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformEntry {
    /// Symbolic name, e.g. `windows`.
    pub id: String,
    /// Compiler-facing target triple, e.g. `x86_64-pc-windows-msvc`.
    pub target: String,
    /// Logical binary names in archive order (no `.exe`).
    pub binaries: Vec<String>,
    /// Archive container.
    pub format: ArchiveFormat,
    /// Packages installed before compiling. Empty for most platforms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_packages: Vec<String>,
}

impl PlatformEntry {
    /// Native executable suffix for this target: `.exe` on Windows, empty
    /// everywhere else.
    pub fn exe_suffix(&self) -> &'static str {
        if self.target.contains("windows") {
            ".exe"
        } else {
            ""
        }
    }

    /// On-disk file names of the binaries, suffix applied, in archive order.
    pub fn binary_file_names(&self) -> Vec<String> {
        let suffix = self.exe_suffix();
        self.binaries
            .iter()
            .map(|name| format!("{name}{suffix}"))
            .collect()
    }
}

impl std::fmt::Display for PlatformEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.target)
    }
}
