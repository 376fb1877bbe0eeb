//! Semantic version helpers: lenient parsing, bump kinds and increments.

use std::fmt;
use std::str::FromStr;

use semver::{Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parses a version the way git tags spell them: surrounding whitespace and a
/// leading `v` or `=` are tolerated.
pub fn parse_version(text: &str) -> Option<Version> {
    let trimmed = text.trim();
    let stripped = trimmed
        .strip_prefix('=')
        .unwrap_or(trimmed)
        .trim_start();
    let stripped = stripped.strip_prefix('v').unwrap_or(stripped);
    Version::parse(stripped).ok()
}

/// Returns true if a commit title is itself a version (a release marker commit).
pub fn is_release_marker(title: &str) -> bool {
    parse_version(title).is_some()
}

/// Kind of version increment between two releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bump {
    Major,
    Minor,
    Patch,
    Premajor,
    Preminor,
    Prepatch,
    Prerelease,
}

impl Bump {
    /// Computes the bump kind separating two versions, `None` if they are equal.
    pub fn between(target: &Version, previous: &Version) -> Option<Bump> {
        if target == previous {
            return None;
        }

        let pre = !target.pre.is_empty() || !previous.pre.is_empty();
        let kind = if target.major != previous.major {
            Some((Bump::Premajor, Bump::Major))
        } else if target.minor != previous.minor {
            Some((Bump::Preminor, Bump::Minor))
        } else if target.patch != previous.patch {
            Some((Bump::Prepatch, Bump::Patch))
        } else {
            None
        };

        match (kind, pre) {
            (Some((pre_kind, _)), true) => Some(pre_kind),
            (Some((_, kind)), false) => Some(kind),
            (None, _) => Some(Bump::Prerelease),
        }
    }

    /// Returns the version that follows `current` for this bump kind.
    pub fn apply(self, current: &Version) -> Result<Version> {
        let mut next = current.clone();
        let had_pre = !current.pre.is_empty();
        next.build = semver::BuildMetadata::EMPTY;

        match self {
            Bump::Major => {
                if !(had_pre && current.minor == 0 && current.patch == 0) {
                    next.major += 1;
                }
                next.minor = 0;
                next.patch = 0;
                next.pre = Prerelease::EMPTY;
            }
            Bump::Minor => {
                if !(had_pre && current.patch == 0) {
                    next.minor += 1;
                }
                next.patch = 0;
                next.pre = Prerelease::EMPTY;
            }
            Bump::Patch => {
                if !had_pre {
                    next.patch += 1;
                }
                next.pre = Prerelease::EMPTY;
            }
            Bump::Premajor => {
                next.major += 1;
                next.minor = 0;
                next.patch = 0;
                next.pre = first_prerelease()?;
            }
            Bump::Preminor => {
                next.minor += 1;
                next.patch = 0;
                next.pre = first_prerelease()?;
            }
            Bump::Prepatch => {
                next.patch += 1;
                next.pre = first_prerelease()?;
            }
            Bump::Prerelease => {
                if had_pre {
                    next.pre = increment_prerelease(&current.pre)?;
                } else {
                    return Bump::Prepatch.apply(current);
                }
            }
        }

        Ok(next)
    }
}

fn first_prerelease() -> Result<Prerelease> {
    Prerelease::new("0").map_err(|e| Error::Config(format!("invalid prerelease: {}", e)))
}

fn increment_prerelease(pre: &Prerelease) -> Result<Prerelease> {
    let mut parts: Vec<String> = pre.as_str().split('.').map(str::to_string).collect();
    let numeric = parts
        .iter()
        .rposition(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));

    match numeric {
        Some(index) => {
            let value: u64 = parts[index]
                .parse()
                .map_err(|_| Error::Config(format!("invalid prerelease: {}", pre)))?;
            parts[index] = (value + 1).to_string();
        }
        None => parts.push("0".to_string()),
    }

    Prerelease::new(&parts.join("."))
        .map_err(|e| Error::Config(format!("invalid prerelease: {}", e)))
}

impl fmt::Display for Bump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bump::Major => "major",
            Bump::Minor => "minor",
            Bump::Patch => "patch",
            Bump::Premajor => "premajor",
            Bump::Preminor => "preminor",
            Bump::Prepatch => "prepatch",
            Bump::Prerelease => "prerelease",
        };
        f.write_str(name)
    }
}

impl FromStr for Bump {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "major" => Ok(Bump::Major),
            "minor" => Ok(Bump::Minor),
            "patch" => Ok(Bump::Patch),
            "premajor" => Ok(Bump::Premajor),
            "preminor" => Ok(Bump::Preminor),
            "prepatch" => Ok(Bump::Prepatch),
            "prerelease" => Ok(Bump::Prerelease),
            other => Err(Error::Config(format!("unknown bump kind '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn parse_version_accepts_tag_spellings() {
        assert_eq!(parse_version("v1.2.3"), Some(v("1.2.3")));
        assert_eq!(parse_version("=1.2.3"), Some(v("1.2.3")));
        assert_eq!(parse_version("  1.2.3-beta.1 "), Some(v("1.2.3-beta.1")));
        assert_eq!(parse_version("release 1.2.3"), None);
        assert_eq!(parse_version("1.2"), None);
    }

    #[test]
    fn release_markers_are_version_titles() {
        assert!(is_release_marker("1.0.1"));
        assert!(is_release_marker("v2.0.0"));
        assert!(!is_release_marker("Fix 1.0.1 regression"));
    }

    #[test]
    fn bump_between_versions() {
        assert_eq!(Bump::between(&v("2.1.1"), &v("2.1.0")), Some(Bump::Patch));
        assert_eq!(Bump::between(&v("2.2.0"), &v("2.1.0")), Some(Bump::Minor));
        assert_eq!(Bump::between(&v("3.0.0"), &v("2.1.0")), Some(Bump::Major));
        assert_eq!(Bump::between(&v("3.0.0-0"), &v("2.1.0")), Some(Bump::Premajor));
        assert_eq!(Bump::between(&v("1.0.0-1"), &v("1.0.0-0")), Some(Bump::Prerelease));
        assert_eq!(Bump::between(&v("1.0.0"), &v("1.0.0")), None);
    }

    #[test]
    fn apply_increments_like_npm() {
        assert_eq!(Bump::Major.apply(&v("1.2.3")).unwrap(), v("2.0.0"));
        assert_eq!(Bump::Major.apply(&v("2.0.0-1")).unwrap(), v("2.0.0"));
        assert_eq!(Bump::Minor.apply(&v("1.2.3")).unwrap(), v("1.3.0"));
        assert_eq!(Bump::Patch.apply(&v("1.2.3")).unwrap(), v("1.2.4"));
        assert_eq!(Bump::Patch.apply(&v("1.2.4-0")).unwrap(), v("1.2.4"));
        assert_eq!(Bump::Premajor.apply(&v("1.2.3")).unwrap(), v("2.0.0-0"));
        assert_eq!(Bump::Prepatch.apply(&v("1.2.3")).unwrap(), v("1.2.4-0"));
        assert_eq!(Bump::Prerelease.apply(&v("1.2.3")).unwrap(), v("1.2.4-0"));
        assert_eq!(Bump::Prerelease.apply(&v("1.2.4-beta.1")).unwrap(), v("1.2.4-beta.2"));
        assert_eq!(Bump::Prerelease.apply(&v("1.2.4-beta")).unwrap(), v("1.2.4-beta.0"));
    }

    #[test]
    fn bump_round_trips_through_text() {
        for kind in ["major", "minor", "patch", "premajor", "preminor", "prepatch", "prerelease"] {
            assert_eq!(kind.parse::<Bump>().unwrap().to_string(), kind);
        }
        assert!("huge".parse::<Bump>().is_err());
    }
}
