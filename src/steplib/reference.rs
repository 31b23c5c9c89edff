//! Step references
//!
//! A step is referenced in a workflow by a composite identifier:
//!
//! | Form | Meaning |
//! |---|---|
//! | `script` | built-in inline script step |
//! | `xcode-archive@2.3` | step from the default library, version-locked |
//! | `my-lib::xcode-archive@1` | step from an explicit library |
//! | `path::./steps/lint` | step staged from a local directory |
//! | `git::https://host/step.git@main` | git-hosted step (recognised, not retrievable) |

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::{ErrorCode, StepLineError};

pub const BUILTIN_SOURCE: &str = "builtin";
pub const PATH_SOURCE: &str = "path";
pub const GIT_SOURCE: &str = "git";
pub const SCRIPT_STEP_ID: &str = "script";

const SOURCE_SEPARATOR: &str = "::";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("step reference is empty")]
    Empty,

    #[error("step reference {0:?} has no step id")]
    MissingId(String),

    #[error("step reference {0:?} has more than one version separator")]
    MultipleVersions(String),
}

impl From<ReferenceError> for StepLineError {
    fn from(err: ReferenceError) -> Self {
        StepLineError::steplib_with_code(ErrorCode::STEPLIB_INVALID_REFERENCE, err.to_string(), None)
            .with_source(err)
    }
}

/// How a referenced step is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSource {
    /// Inline script executed without activation
    Builtin,
    /// Directory on the local filesystem
    Local(PathBuf),
    /// Git repository; retrieval is not supported
    Git,
    /// Versioned step library
    Library,
}

/// Identifies a step and how strictly its version is pinned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReference {
    pub library_source: String,
    pub id_or_uri: String,
    pub version_constraint: String,
}

impl StepReference {
    /// Parse a composite identifier, falling back to `default_source` when
    /// no library is named
    pub fn parse(composite: &str, default_source: &str) -> Result<Self, ReferenceError> {
        let composite = composite.trim();
        if composite.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (explicit_source, rest) = match composite.split_once(SOURCE_SEPARATOR) {
            Some((source, rest)) => (Some(source.trim()), rest.trim()),
            None => (None, composite),
        };

        let reference = match explicit_source {
            Some(PATH_SOURCE) => Self {
                library_source: PATH_SOURCE.to_string(),
                id_or_uri: rest.to_string(),
                version_constraint: String::new(),
            },
            Some(GIT_SOURCE) => {
                let (uri, git_ref) = split_git_ref(rest);
                Self {
                    library_source: GIT_SOURCE.to_string(),
                    id_or_uri: uri.to_string(),
                    version_constraint: git_ref.to_string(),
                }
            }
            source => {
                let (id, version) = split_version(composite, rest)?;
                let library_source = match source {
                    Some(source) => source.to_string(),
                    None if id == SCRIPT_STEP_ID => BUILTIN_SOURCE.to_string(),
                    None => default_source.to_string(),
                };
                Self {
                    library_source,
                    id_or_uri: id.to_string(),
                    version_constraint: version.to_string(),
                }
            }
        };

        if reference.id_or_uri.is_empty() {
            return Err(ReferenceError::MissingId(composite.to_string()));
        }
        Ok(reference)
    }

    pub fn source(&self) -> StepSource {
        match self.library_source.as_str() {
            BUILTIN_SOURCE => StepSource::Builtin,
            PATH_SOURCE => StepSource::Local(PathBuf::from(&self.id_or_uri)),
            GIT_SOURCE => StepSource::Git,
            _ => StepSource::Library,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.library_source == BUILTIN_SOURCE
    }
}

impl fmt::Display for StepReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_builtin() {
            write!(f, "{}{}", self.library_source, SOURCE_SEPARATOR)?;
        }
        write!(f, "{}", self.id_or_uri)?;
        if !self.version_constraint.is_empty() {
            write!(f, "@{}", self.version_constraint)?;
        }
        Ok(())
    }
}

fn split_version<'a>(composite: &str, rest: &'a str) -> Result<(&'a str, &'a str), ReferenceError> {
    let mut parts = rest.split('@');
    let id = parts.next().unwrap_or_default().trim();
    let version = parts.next().unwrap_or_default().trim();
    if parts.next().is_some() {
        return Err(ReferenceError::MultipleVersions(composite.to_string()));
    }
    Ok((id, version))
}

/// Split `uri@ref`; the URI itself may contain '@' (`git@host:org/repo.git`)
fn split_git_ref(rest: &str) -> (&str, &str) {
    if let Some((uri, git_ref)) = rest.rsplit_once('@') {
        let host_part = uri.split_once("://").map(|(_, tail)| tail);
        let uri_complete = match host_part {
            Some(tail) => tail.contains('/'),
            None => uri.contains(':'),
        };
        if uri_complete && !git_ref.is_empty() && !git_ref.contains(':') {
            return (uri, git_ref);
        }
    }
    (rest, "")
}
