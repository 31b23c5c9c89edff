use crate::error::{ErrorCode, StepLineError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read step outputs from {path}: {source}")]
    OutputFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl From<ProcessError> for StepLineError {
    fn from(err: ProcessError) -> Self {
        let code = match &err {
            ProcessError::CommandNotFound(_) => ErrorCode::EXEC_COMMAND_NOT_FOUND,
            ProcessError::Timeout(_) => ErrorCode::EXEC_TIMEOUT,
            ProcessError::SpawnFailed { .. } | ProcessError::Io(_) => ErrorCode::EXEC_SPAWN_FAILED,
            ProcessError::OutputFile { .. } => ErrorCode::EXEC_OUTPUT_ERROR,
            ProcessError::MockExpectationNotMet(_) => ErrorCode::EXEC_GENERIC,
        };
        StepLineError::execution_with_code(code, err.to_string(), None).with_source(err)
    }
}
