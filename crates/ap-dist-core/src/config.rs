//! Configuration for a release run.
//!
//! Loaded from an optional `ap-dist.toml`, overlaid with the `GITHUB_*`
//! environment variables that CI runners provide, then overridden by CLI
//! flags. Every field has a default except the asset conflict policy, which
//! must be chosen explicitly before publishing.

use std::path::{Component, Path, PathBuf};

use ap_dist_schema::{PlatformEntry, default_matrix};
use serde::{Deserialize, Serialize};

use crate::error::ReleaseError;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "ap-dist.toml";

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// What to do when the release already has an asset with the same name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Delete the existing asset, then upload.
    Overwrite,
    /// Keep the existing asset and report it as skipped.
    Skip,
    /// Report `PublishFailed` for that asset.
    Fail,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Fail => "fail",
        })
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" | "replace" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            "fail" | "error" => Ok(Self::Fail),
            _ => Err(format!(
                "Unknown conflict policy: {s} (expected overwrite, skip or fail)"
            )),
        }
    }
}

/// `[project]`: where to build and where to put the results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory the compiler runs in.
    pub dir: PathBuf,
    /// Root of the build output; binaries land in `{output_root}/{target}/release`.
    pub output_root: PathBuf,
    /// Staging directories and archives.
    pub dist_dir: PathBuf,
    /// Captured compiler output.
    pub log_dir: PathBuf,
    /// Maximum platform pipelines in flight.
    pub parallel: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            output_root: PathBuf::from("target"),
            dist_dir: PathBuf::from("dist"),
            log_dir: PathBuf::from("target/ap-dist/logs"),
            parallel: 4,
        }
    }
}

impl ProjectConfig {
    /// Resolve a configured path against the project directory. Absolute
    /// paths are returned unchanged.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }

    /// Absolute-or-project-relative build output root.
    pub fn output_root(&self) -> PathBuf {
        self.resolve(&self.output_root)
    }

    /// Absolute-or-project-relative dist directory.
    pub fn dist_dir(&self) -> PathBuf {
        self.resolve(&self.dist_dir)
    }

    /// Absolute-or-project-relative log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }
}

/// `[release]`: where and how assets are published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// `owner/name` of the repository holding the release.
    pub repository: Option<String>,
    /// REST API base URL.
    pub api_url: Option<String>,
    /// Same-name asset policy. Required for publishing.
    pub on_conflict: Option<ConflictPolicy>,
    /// Write and publish `<archive>.sha256` files.
    pub checksums: bool,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            repository: None,
            api_url: None,
            on_conflict: None,
            checksums: true,
        }
    }
}

impl ReleaseConfig {
    /// API base URL without a trailing slash.
    pub fn api_url(&self) -> String {
        self.api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// The repository, or a `Config` error naming how to set it.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] when no repository is configured.
    pub fn require_repository(&self) -> Result<&str, ReleaseError> {
        match self.repository.as_deref() {
            Some(repo) if repo.split('/').filter(|s| !s.is_empty()).count() == 2 => Ok(repo),
            Some(repo) => Err(ReleaseError::Config(format!(
                "repository must be OWNER/NAME, got {repo:?}"
            ))),
            None => Err(ReleaseError::Config(
                "no repository configured; set release.repository or GITHUB_REPOSITORY".into(),
            )),
        }
    }

    /// The conflict policy, or a `Config` error: there is no implicit default.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] when `on_conflict` is unset.
    pub fn require_conflict_policy(&self) -> Result<ConflictPolicy, ReleaseError> {
        self.on_conflict.ok_or_else(|| {
            ReleaseError::Config(
                "no asset conflict policy; set release.on_conflict or pass --on-conflict \
                 (overwrite, skip or fail)"
                    .into(),
            )
        })
    }
}

/// `[install]`: how system packages are installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallConfig {
    /// Command prefix; package names are appended.
    pub command: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            command: ["sudo", "apt-get", "install", "-y"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Complete configuration of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DistConfig {
    /// `[project]`
    pub project: ProjectConfig,
    /// `[release]`
    pub release: ReleaseConfig,
    /// `[install]`
    pub install: InstallConfig,
    /// `[[platform]]` entries. Empty means the built-in matrix.
    #[serde(rename = "platform", skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<PlatformEntry>,
}

impl DistConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `ap-dist.toml` in the
    /// working directory is used when present, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ReleaseError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE_NAME);
                if !default.exists() {
                    tracing::debug!("no {CONFIG_FILE_NAME}, using built-in defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            ReleaseError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        tracing::debug!("loaded config from {}", path.display());
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] for syntax errors, unknown keys, or
    /// an invalid platform table.
    pub fn from_toml(content: &str) -> Result<Self, ReleaseError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ReleaseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill unset release fields from the environment (`GITHUB_REPOSITORY`,
    /// `GITHUB_API_URL`). Values from the file win.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.release.repository.is_none() {
            self.release.repository = lookup("GITHUB_REPOSITORY").filter(|v| !v.is_empty());
        }
        if self.release.api_url.is_none() {
            self.release.api_url = lookup("GITHUB_API_URL").filter(|v| !v.is_empty());
        }
    }

    /// [`apply_env`](Self::apply_env) against the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// The active platform set: the `[[platform]]` table, or the built-in
    /// matrix when the file declares none.
    pub fn platforms(&self) -> Vec<PlatformEntry> {
        if self.platforms.is_empty() {
            default_matrix()
        } else {
            self.platforms.clone()
        }
    }

    /// Restrict the active set to `ids`, keeping matrix order. An empty
    /// selection means every active platform.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] if an id is not in the active set.
    pub fn select_platforms(&self, ids: &[String]) -> Result<Vec<PlatformEntry>, ReleaseError> {
        let active = self.platforms();
        if ids.is_empty() {
            return Ok(active);
        }

        if let Some(unknown) = ids.iter().find(|id| !active.iter().any(|p| &p.id == *id)) {
            let known: Vec<_> = active.iter().map(|p| p.id.as_str()).collect();
            return Err(ReleaseError::Config(format!(
                "unknown platform {unknown:?} (active: {})",
                known.join(", ")
            )));
        }

        Ok(active.into_iter().filter(|p| ids.contains(&p.id)).collect())
    }

    fn validate(&self) -> Result<(), ReleaseError> {
        if self.project.parallel == 0 {
            return Err(ReleaseError::Config(
                "project.parallel must be at least 1".into(),
            ));
        }

        for (i, platform) in self.platforms.iter().enumerate() {
            if platform.binaries.is_empty() {
                return Err(ReleaseError::Config(format!(
                    "platform {:?} declares no binaries",
                    platform.id
                )));
            }
            // Ids, targets and binaries all end up as path components.
            if let Some(bad) = [&platform.id, &platform.target]
                .into_iter()
                .chain(&platform.binaries)
                .find(|name| !is_plain_name(name))
            {
                return Err(ReleaseError::Config(format!(
                    "platform {:?}: {bad:?} is not a plain file name",
                    platform.id
                )));
            }
            if let Some((_, dup)) = platform
                .binaries
                .iter()
                .enumerate()
                .find(|(j, name)| platform.binaries[..*j].contains(name))
            {
                return Err(ReleaseError::Config(format!(
                    "platform {:?} lists binary {dup:?} more than once",
                    platform.id
                )));
            }
            // Distinct targets keep staging directories and archive names apart.
            if let Some(dup) = self.platforms[..i]
                .iter()
                .find(|p| p.id == platform.id || p.target == platform.target)
            {
                return Err(ReleaseError::Config(format!(
                    "platforms {:?} and {:?} collide on id or target",
                    dup.id, platform.id
                )));
            }
        }
        Ok(())
    }
}

/// True when `name` is exactly one ordinary path component, so joining it
/// onto a directory can never leave that directory.
pub(crate) fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}
