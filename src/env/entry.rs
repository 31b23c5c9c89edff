//! Environment entries and their typed options
//!
//! An entry is one `KEY: value` declaration plus its options. In documents an
//! entry is written as a single-key map with an optional `opts` map:
//!
//! ```yaml
//! - SIMULATOR_OS_VERSION: "13.3"
//! - API_TOKEN: $SECRET_TOKEN
//!   opts:
//!     is_expand: true
//!     is_sensitive: true
//! ```

use crate::error::{ErrorCode, StepLineError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

const OPTIONS_KEY: &str = "opts";

/// Errors raised while converting a document map into an entry
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("environment entry must declare exactly one key besides `opts`, found {0}")]
    KeyCount(usize),

    #[error("environment entry key must not be empty")]
    EmptyKey,

    #[error("value of `{0}` must be a scalar")]
    NotScalar(String),

    #[error("invalid options for `{key}`: {source}")]
    InvalidOptions {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl From<EntryError> for StepLineError {
    fn from(err: EntryError) -> Self {
        StepLineError::config_with_code(ErrorCode::CONFIG_INVALID_ENTRY, err.to_string(), None)
            .with_source(err)
    }
}

/// Per-entry options
///
/// Missing options default to `is_expand = true` and everything else off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvOptions {
    /// Substitute `$NAME` references in the value
    pub is_expand: bool,
    /// Keep the value out of every externally visible view
    pub is_sensitive: bool,
    /// An empty resolved value leaves any previous value of the key untouched
    pub skip_if_empty: bool,
    /// Step inputs only: an empty resolved value fails the step
    pub is_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            is_expand: true,
            is_sensitive: false,
            skip_if_empty: false,
            is_required: false,
            title: None,
            summary: None,
            description: None,
        }
    }
}

/// One ordered key/value declaration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "IndexMap<String, Value>")]
pub struct EnvironmentEntry {
    pub key: String,
    pub value: String,
    pub options: EnvOptions,
}

impl EnvironmentEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            options: EnvOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EnvOptions) -> Self {
        self.options = options;
        self
    }

    /// Mark the entry as sensitive
    pub fn sensitive(mut self) -> Self {
        self.options.is_sensitive = true;
        self
    }

    /// Disable reference expansion for the entry
    pub fn literal(mut self) -> Self {
        self.options.is_expand = false;
        self
    }

    pub fn skip_if_empty(mut self) -> Self {
        self.options.skip_if_empty = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.options.is_required = true;
        self
    }
}

impl TryFrom<IndexMap<String, Value>> for EnvironmentEntry {
    type Error = EntryError;

    fn try_from(mut map: IndexMap<String, Value>) -> Result<Self, Self::Error> {
        let raw_options = map.shift_remove(OPTIONS_KEY);

        if map.len() != 1 {
            return Err(EntryError::KeyCount(map.len()));
        }
        let Some((key, raw_value)) = map.into_iter().next() else {
            return Err(EntryError::KeyCount(0));
        };
        if key.trim().is_empty() {
            return Err(EntryError::EmptyKey);
        }

        let value = scalar_to_string(&raw_value).ok_or_else(|| EntryError::NotScalar(key.clone()))?;

        let options = match raw_options {
            None | Some(Value::Null) => EnvOptions::default(),
            Some(raw) => serde_yaml::from_value(raw).map_err(|source| EntryError::InvalidOptions {
                key: key.clone(),
                source,
            })?,
        };

        Ok(Self {
            key,
            value,
            options,
        })
    }
}

/// Render a YAML scalar as entry text; null becomes the empty string
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}
