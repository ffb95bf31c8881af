use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for version and constraint parsing
#[derive(Debug, Clone, Error)]
pub enum VersionError {
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Unsupported version constraint '{constraint}'")]
    UnsupportedConstraint { constraint: String },
}

/// Comparison operators accepted by the constraint grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintOp {
    Any,
    Exact,
    GreaterEq,
    LessEq,
    Greater,
    Less,
    /// `~X.Y.Z`: `>=X.Y.Z, <X.(Y+1).0`
    CompatibleRelease,
    /// `^X.Y.Z`: `>=X.Y.Z, <(X+1).0.0`
    Caret,
}

/// A version requirement in the engine's constraint grammar.
///
/// Supported forms: `*`, exact `X.Y.Z`, `>=`/`<=`/`>`/`<` comparisons,
/// `~X.Y.Z` (compatible release), `^X.Y.Z` (caret range). A bare version is
/// an exact match, not semver's default caret. Anything else fails at
/// construction.
#[derive(Debug, Clone)]
pub struct VersionRange {
    /// The original constraint string (e.g., "^1.2.3", ">=2.0.0")
    constraint: String,
    /// The parsed semver requirement
    req: VersionReq,
}

impl VersionRange {
    /// Parse a constraint string, rejecting anything outside the grammar.
    pub fn from_constraint(constraint: &str) -> Result<Self, VersionError> {
        let trimmed = constraint.trim();
        let (op, rest) = if trimmed == "*" {
            (ConstraintOp::Any, "")
        } else if let Some(rest) = trimmed.strip_prefix(">=") {
            (ConstraintOp::GreaterEq, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (ConstraintOp::LessEq, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (ConstraintOp::Greater, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (ConstraintOp::Less, rest)
        } else if let Some(rest) = trimmed.strip_prefix('~') {
            (ConstraintOp::CompatibleRelease, rest)
        } else if let Some(rest) = trimmed.strip_prefix('^') {
            (ConstraintOp::Caret, rest)
        } else {
            (ConstraintOp::Exact, trimmed)
        };

        let req = match op {
            ConstraintOp::Any => VersionReq::STAR,
            _ => {
                let version = parse_version(rest.trim()).map_err(|_| {
                    VersionError::UnsupportedConstraint {
                        constraint: constraint.to_string(),
                    }
                })?;
                let req_str = match op {
                    ConstraintOp::Exact => format!("={}", version),
                    ConstraintOp::GreaterEq => format!(">={}", version),
                    ConstraintOp::LessEq => format!("<={}", version),
                    ConstraintOp::Greater => format!(">{}", version),
                    ConstraintOp::Less => format!("<{}", version),
                    ConstraintOp::CompatibleRelease => format!(
                        ">={}, <{}.{}.0",
                        version,
                        version.major,
                        version.minor + 1
                    ),
                    ConstraintOp::Caret => {
                        format!(">={}, <{}.0.0", version, version.major + 1)
                    }
                    ConstraintOp::Any => unreachable!(),
                };
                VersionReq::parse(&req_str).map_err(|_| VersionError::UnsupportedConstraint {
                    constraint: constraint.to_string(),
                })?
            }
        };

        Ok(Self {
            constraint: trimmed.to_string(),
            req,
        })
    }

    /// Checks if a specific `semver::Version` satisfies this range.
    pub fn includes(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// Checks a version string; unparsable versions never satisfy a range.
    pub fn includes_str(&self, version: &str) -> bool {
        match Version::parse(version) {
            Ok(v) => self.includes(&v),
            Err(_) => false,
        }
    }

    /// Returns the original constraint string.
    pub fn constraint_string(&self) -> &str {
        &self.constraint
    }

    /// Returns a reference to the underlying `semver::VersionReq`.
    pub fn semver_req(&self) -> &VersionReq {
        &self.req
    }
}

/// The grammar accepts `MAJOR.MINOR.PATCH` only, no pre-release or build tags.
fn parse_version(s: &str) -> Result<Version, VersionError> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return Err(VersionError::InvalidVersion {
            version: s.to_string(),
            reason: "expected MAJOR.MINOR.PATCH".to_string(),
        });
    }
    Version::parse(s).map_err(|e| VersionError::InvalidVersion {
        version: s.to_string(),
        reason: e.to_string(),
    })
}

/// Implement Display to show the original constraint string.
impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constraint)
    }
}

/// Allow parsing directly from a string slice.
impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::from_constraint(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.constraint)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionRange::from_constraint(&raw).map_err(serde::de::Error::custom)
    }
}
