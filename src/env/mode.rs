//! Run mode resolution
//!
//! Three independent booleans decide how a run behaves: whether step output is
//! redacted (secret filtering), whether the run is a CI run, and whether it
//! builds a pull request. Each follows the same precedence:
//!
//! 1. an explicit flag always wins;
//! 2. otherwise the declared environment, expanded on top of the host
//!    environment, is consulted;
//! 3. otherwise a default applies.

use super::entry::EnvironmentEntry;
use super::expand::{expand, EnvironmentSnapshot};
use super::reader::EnvReader;
use crate::error::{ErrorCode, StepLineError};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const SECRET_FILTERING_KEY: &str = "STEPLINE_SECRET_FILTERING";
pub const CI_MODE_KEY: &str = "CI";
pub const PR_MODE_KEY: &str = "PR";
pub const PULL_REQUEST_ID_KEY: &str = "PULL_REQUEST_ID";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("{key} must be a boolean, got {value:?}")]
    InvalidBool { key: String, value: String },
}

impl From<ModeError> for StepLineError {
    fn from(err: ModeError) -> Self {
        let ModeError::InvalidBool { key, .. } = &err;
        StepLineError::environment_with_code(
            ErrorCode::ENV_INVALID_BOOL,
            err.to_string(),
            Some(key.clone()),
        )
        .with_source(err)
    }
}

/// Parse a boolean-typed value; blank means "not set"
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(key: &str, value: &str) -> Result<Option<bool>, ModeError> {
    match value.trim() {
        "" => Ok(None),
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(Some(true)),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(Some(false)),
        other => Err(ModeError::InvalidBool {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Explicit overrides, typically from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFlags {
    pub secret_filtering: Option<bool>,
    pub ci: Option<bool>,
    pub pr: Option<bool>,
}

/// Defaults used when neither a flag nor an environment value decides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    pub default_secret_filtering: bool,
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self {
            default_secret_filtering: true,
        }
    }
}

/// Resolved modes of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunModes {
    pub secret_filtering: bool,
    pub ci: bool,
    pub pr: bool,
}

impl RunModes {
    /// Implicit entries exposing the modes to steps
    pub fn as_entries(&self) -> Vec<EnvironmentEntry> {
        vec![
            EnvironmentEntry::new(CI_MODE_KEY, self.ci.to_string()).literal(),
            EnvironmentEntry::new(PR_MODE_KEY, self.pr.to_string()).literal(),
            EnvironmentEntry::new(SECRET_FILTERING_KEY, self.secret_filtering.to_string())
                .literal(),
        ]
    }
}

/// Resolves run modes against declared entries and the host environment
pub struct ModeResolver<'a> {
    reader: &'a dyn EnvReader,
    policy: ModePolicy,
}

impl<'a> ModeResolver<'a> {
    pub fn new(reader: &'a dyn EnvReader, policy: ModePolicy) -> Self {
        Self { reader, policy }
    }

    /// Resolve all three modes with a single expansion of `declared`
    pub fn resolve(
        &self,
        flags: ModeFlags,
        declared: &[EnvironmentEntry],
    ) -> Result<RunModes, ModeError> {
        let snapshot = self.snapshot(declared);
        let modes = RunModes {
            secret_filtering: self.secret_filtering_from(flags.secret_filtering, &snapshot)?,
            ci: self.ci_mode_from(flags.ci, &snapshot)?,
            pr: self.pr_mode_from(flags.pr, &snapshot)?,
        };
        debug!(
            "Resolved run modes: secret_filtering={} ci={} pr={}",
            modes.secret_filtering, modes.ci, modes.pr
        );
        Ok(modes)
    }

    pub fn secret_filtering(
        &self,
        flag: Option<bool>,
        declared: &[EnvironmentEntry],
    ) -> Result<bool, ModeError> {
        self.secret_filtering_from(flag, &self.snapshot(declared))
    }

    pub fn ci_mode(&self, flag: Option<bool>, declared: &[EnvironmentEntry]) -> Result<bool, ModeError> {
        self.ci_mode_from(flag, &self.snapshot(declared))
    }

    pub fn pr_mode(&self, flag: Option<bool>, declared: &[EnvironmentEntry]) -> Result<bool, ModeError> {
        self.pr_mode_from(flag, &self.snapshot(declared))
    }

    fn snapshot(&self, declared: &[EnvironmentEntry]) -> EnvironmentSnapshot {
        expand(declared, self.reader.vars())
    }

    fn secret_filtering_from(
        &self,
        flag: Option<bool>,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool, ModeError> {
        if let Some(explicit) = flag {
            return Ok(explicit);
        }
        let declared = parse_bool(
            SECRET_FILTERING_KEY,
            snapshot.get(SECRET_FILTERING_KEY).unwrap_or_default(),
        )?;
        Ok(declared.unwrap_or(self.policy.default_secret_filtering))
    }

    fn ci_mode_from(&self, flag: Option<bool>, snapshot: &EnvironmentSnapshot) -> Result<bool, ModeError> {
        if let Some(explicit) = flag {
            return Ok(explicit);
        }
        self.is_true(CI_MODE_KEY, snapshot)
    }

    fn pr_mode_from(&self, flag: Option<bool>, snapshot: &EnvironmentSnapshot) -> Result<bool, ModeError> {
        if let Some(explicit) = flag {
            return Ok(explicit);
        }
        let pr_flag = self.is_true(PR_MODE_KEY, snapshot)?;
        let has_pull_request_id = !snapshot
            .get(PULL_REQUEST_ID_KEY)
            .unwrap_or_default()
            .trim()
            .is_empty()
            || !self
                .reader
                .var(PULL_REQUEST_ID_KEY)
                .unwrap_or_default()
                .trim()
                .is_empty();
        Ok(pr_flag || has_pull_request_id)
    }

    /// True when either the declared value or the host value is true
    fn is_true(&self, key: &str, snapshot: &EnvironmentSnapshot) -> Result<bool, ModeError> {
        let declared = parse_bool(key, snapshot.get(key).unwrap_or_default())?;
        let host = parse_bool(key, &self.reader.var(key).unwrap_or_default())?;
        Ok(declared == Some(true) || host == Some(true))
    }
}
