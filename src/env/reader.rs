//! Host process environment access
//!
//! Expansion and mode resolution read the host environment through
//! [`EnvReader`] instead of `std::env` directly, so tests never have to mutate
//! process-global state.
//!
//! ```
//! use stepline::env::{EnvReader, MockEnvReader};
//!
//! let reader = MockEnvReader::new().with_env("CI", "true");
//! assert_eq!(reader.var("CI").as_deref(), Ok("true"));
//! assert!(reader.var("PR").is_err());
//! ```

use indexmap::IndexMap;
use std::env::VarError;

/// Trait for reading the host process environment
pub trait EnvReader: Send + Sync {
    /// Read a single variable
    ///
    /// # Errors
    ///
    /// Returns `VarError::NotPresent` if the variable is not set,
    /// or `VarError::NotUnicode` if the value contains invalid UTF-8.
    fn var(&self, key: &str) -> Result<String, VarError>;

    /// All variables with valid UTF-8 names and values
    fn vars(&self) -> Vec<(String, String)>;
}

/// Production implementation that reads from `std::env`
#[derive(Clone, Default, Debug)]
pub struct RealEnvReader;

impl EnvReader for RealEnvReader {
    fn var(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }
}

/// In-memory environment for tests and embedding
#[derive(Clone, Default, Debug)]
pub struct MockEnvReader {
    vars: IndexMap<String, String>,
}

impl MockEnvReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvReader for MockEnvReader {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.vars.get(key).cloned().ok_or(VarError::NotPresent)
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
