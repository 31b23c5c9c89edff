use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for the entire Stepline application
#[derive(Error, Debug)]
pub enum StepLineError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Environment error: {message}")]
    Environment {
        code: u16,
        message: String,
        key: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Step library error: {message}")]
    StepLib {
        code: u16,
        message: String,
        step_id: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Workflow error: {message}")]
    Workflow {
        code: u16,
        message: String,
        workflow_name: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StepLineError {
    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create an environment error with specific code and key
    pub fn environment_with_code(
        code: u16,
        message: impl Into<String>,
        key: Option<String>,
    ) -> Self {
        Self::Environment {
            code,
            message: message.into(),
            key,
            source: None,
        }
    }

    /// Create a step library error with specific code and step id
    pub fn steplib_with_code(
        code: u16,
        message: impl Into<String>,
        step_id: Option<String>,
    ) -> Self {
        Self::StepLib {
            code,
            message: message.into(),
            step_id,
            source: None,
        }
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(code: u16, message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            exit_code,
            source: None,
        }
    }

    /// Create a workflow error with specific code
    pub fn workflow_with_code(
        code: u16,
        message: impl Into<String>,
        workflow_name: Option<String>,
    ) -> Self {
        Self::Workflow {
            code,
            message: message.into(),
            workflow_name,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Environment { source: src, .. }
            | Self::StepLib { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Workflow { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Environment { message, .. }
            | Self::StepLib { message, .. }
            | Self::Execution { message, .. }
            | Self::Workflow { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Environment { .. } => 3,
            Self::StepLib { .. } => 4,
            Self::Execution { .. } => 5,
            Self::Workflow { .. } => 6,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Environment { code, .. }
            | Self::StepLib { code, .. }
            | Self::Execution { code, .. }
            | Self::Workflow { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, path, .. } => match path {
                Some(p) => format!("Configuration problem in {}: {}", p.display(), message),
                None => format!("Configuration problem: {}", message),
            },
            Self::Environment { message, key, .. } => match key {
                Some(k) => format!("Environment value {} is invalid: {}", k, message),
                None => format!("Environment error: {}", message),
            },
            Self::StepLib {
                message, step_id, ..
            } => match step_id {
                Some(id) => format!("Step {} could not be activated: {}", id, message),
                None => format!("Step library error: {}", message),
            },
            Self::Execution {
                message, exit_code, ..
            } => match exit_code {
                Some(code) => format!("Execution failed (exit code {}): {}", code, message),
                None => format!("Execution failed: {}", message),
            },
            Self::Workflow {
                message,
                workflow_name,
                ..
            } => match workflow_name {
                Some(name) => format!("Workflow {} failed: {}", name, message),
                None => format!("Workflow failed: {}", message),
            },
            Self::Other { message, .. } => message.clone(),
        }
    }
}

/// Type alias for Results using StepLineError
pub type LibResult<T> = std::result::Result<T, StepLineError>;
