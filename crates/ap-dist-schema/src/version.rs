//! Release version resolution from tag references.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace prefix git uses for tag references (`refs/tags/1.2.3`).
pub const TAG_REF_PREFIX: &str = "refs/tags/";

// ASCII digits only: `\d` would also accept other Unicode decimal digits.
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("version pattern is a valid regex")
});

/// The triggering reference did not name a `MAJOR.MINOR.PATCH` tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version format: {0:?} (expected MAJOR.MINOR.PATCH, e.g. 1.2.3)")]
pub struct InvalidVersionFormat(pub String);

/// A validated release version such as `2.0.1`.
///
/// Resolved once per run and passed by reference into every platform
/// pipeline; it is never mutated afterwards.
///
/// # Example
///
/// ```
/// use ap_dist_schema::ReleaseVersion;
///
/// let version = ReleaseVersion::resolve("refs/tags/2.0.1").unwrap();
/// assert_eq!(version.as_str(), "2.0.1");
/// assert!(ReleaseVersion::resolve("v2.0").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Resolve a version from a tag reference.
    ///
    /// A leading `refs/tags/` is stripped, then the remainder must match
    /// `MAJOR.MINOR.PATCH`. Resolving an already-resolved version returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidVersionFormat`] if the remainder has a leading `v`,
    /// a missing segment, or a non-numeric segment.
    pub fn resolve(reference: &str) -> Result<Self, InvalidVersionFormat> {
        let candidate = reference.strip_prefix(TAG_REF_PREFIX).unwrap_or(reference);
        if VERSION_PATTERN.is_match(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(InvalidVersionFormat(reference.to_string()))
        }
    }

    /// The version string, e.g. `2.0.1`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ReleaseVersion {
    type Err = InvalidVersionFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl TryFrom<String> for ReleaseVersion {
    type Error = InvalidVersionFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::resolve(&value)
    }
}

impl From<ReleaseVersion> for String {
    fn from(version: ReleaseVersion) -> Self {
        version.0
    }
}

impl AsRef<str> for ReleaseVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_tag() {
        let v = ReleaseVersion::resolve("1.2.3").unwrap();
        assert_eq!(v.as_str(), "1.2.3");
    }

    #[test]
    fn test_resolve_strips_ref_prefix() {
        let v = ReleaseVersion::resolve("refs/tags/10.0.42").unwrap();
        assert_eq!(v.as_str(), "10.0.42");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        for tag in ["0.0.0", "2.0.1", "refs/tags/3.14.159"] {
            let once = ReleaseVersion::resolve(tag).unwrap();
            let twice = ReleaseVersion::resolve(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_resolve_rejects_malformed() {
        for tag in [
            "v1.2.3",
            "refs/tags/v1.2.3",
            "v2.0",
            "1.2",
            "1.2.3.4",
            "1.x.3",
            "1.2.3-beta",
            "",
            "refs/heads/1.2.3",
            "refs/tags/refs/tags/1.2.3",
            " 1.2.3",
            "١.٢.٣",
        ] {
            let err = ReleaseVersion::resolve(tag).unwrap_err();
            assert_eq!(err, InvalidVersionFormat(tag.to_string()), "{tag:?}");
        }
    }

    #[test]
    fn test_serde_validates() {
        let v: ReleaseVersion = serde_json::from_str("\"4.5.6\"").unwrap();
        assert_eq!(v.to_string(), "4.5.6");
        assert!(serde_json::from_str::<ReleaseVersion>("\"v4.5.6\"").is_err());
    }
}
