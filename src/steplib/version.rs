//! Version-locked step version selection
//!
//! Constraints lock a step to a version prefix:
//!
//! | Constraint | Selects |
//! |---|---|
//! | `1`, `1.x`, `1.x.x` | highest published `1.*.*` |
//! | `2.3`, `2.3.x` | highest published `2.3.*` |
//! | `2.3.2` | exactly `2.3.2` |
//!
//! An empty constraint, `latest`, or an all-wildcard constraint would mean
//! "latest published version", which is not supported: steps have to be
//! version-locked.

use crate::error::{ErrorCode, StepLineError};
use semver::Version;
use std::fmt;
use thiserror::Error;

const LATEST: &str = "latest";
const MAX_COMPONENTS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version constraint {0:?} selects the latest version, which is not supported; lock the step to a major, minor or exact version")]
    LatestUnsupported(String),

    #[error("invalid version constraint {constraint:?}: {reason}")]
    Invalid { constraint: String, reason: String },

    #[error("no published version of {step_id} matches {constraint}")]
    NoMatch { step_id: String, constraint: String },
}

impl VersionError {
    fn invalid(constraint: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            constraint: constraint.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<VersionError> for StepLineError {
    fn from(err: VersionError) -> Self {
        let code = match &err {
            VersionError::LatestUnsupported(_) => ErrorCode::STEPLIB_UNSUPPORTED_CONSTRAINT,
            VersionError::Invalid { .. } => ErrorCode::STEPLIB_INVALID_CONSTRAINT,
            VersionError::NoMatch { .. } => ErrorCode::STEPLIB_VERSION_NOT_FOUND,
        };
        let step_id = match &err {
            VersionError::NoMatch { step_id, .. } => Some(step_id.clone()),
            _ => None,
        };
        StepLineError::steplib_with_code(code, err.to_string(), step_id).with_source(err)
    }
}

/// A parsed version lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Major(u64),
    Minor(u64, u64),
    Exact(Version),
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(LATEST) {
            return Err(VersionError::LatestUnsupported(raw.to_string()));
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > MAX_COMPONENTS {
            return Err(VersionError::invalid(
                raw,
                format!("expected at most {} components, found {}", MAX_COMPONENTS, parts.len()),
            ));
        }

        let mut numbers = Vec::with_capacity(parts.len());
        let mut wildcard_seen = false;
        for part in &parts {
            if part.eq_ignore_ascii_case("x") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                return Err(VersionError::invalid(
                    raw,
                    "wildcards may only appear in trailing positions",
                ));
            }
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::invalid(
                    raw,
                    format!("component {:?} is not a number", part),
                ));
            }
            let number = part
                .parse::<u64>()
                .map_err(|e| VersionError::invalid(raw, e.to_string()))?;
            numbers.push(number);
        }

        match numbers.as_slice() {
            [] => Err(VersionError::LatestUnsupported(raw.to_string())),
            [major] => Ok(Self::Major(*major)),
            [major, minor] => Ok(Self::Minor(*major, *minor)),
            [major, minor, patch] => Ok(Self::Exact(Version::new(*major, *minor, *patch))),
            _ => Err(VersionError::invalid(raw, "too many components")),
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        if !version.pre.is_empty() {
            return false;
        }
        match self {
            Self::Major(major) => version.major == *major,
            Self::Minor(major, minor) => version.major == *major && version.minor == *minor,
            Self::Exact(exact) => {
                version.major == exact.major
                    && version.minor == exact.minor
                    && version.patch == exact.patch
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major(major) => write!(f, "{}.x.x", major),
            Self::Minor(major, minor) => write!(f, "{}.{}.x", major, minor),
            Self::Exact(exact) => write!(f, "{}", exact),
        }
    }
}

/// Select the highest published version satisfying `constraint`
pub fn resolve_version(
    step_id: &str,
    constraint: &str,
    published: &[Version],
) -> Result<Version, VersionError> {
    let lock = VersionConstraint::parse(constraint)?;
    published
        .iter()
        .filter(|version| lock.matches(version))
        .max()
        .cloned()
        .ok_or_else(|| VersionError::NoMatch {
            step_id: step_id.to_string(),
            constraint: lock.to_string(),
        })
}
