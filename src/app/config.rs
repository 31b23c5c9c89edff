//! Application configuration
//!
//! Settings shared by every command, assembled from the command line.

use crate::env::ModePolicy;
use crate::error::{LibResult, StepLineError};
use std::path::PathBuf;
use std::time::Duration;

/// Directory under the working directory holding local step libraries
pub const DEFAULT_STEPLIB_DIR: &str = ".stepline/steplib";

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Directory steps run in
    pub working_dir: PathBuf,
    /// Root of the local step libraries
    pub steplib_root: PathBuf,
    /// Where steps are staged; a temporary directory when unset
    pub work_dir: Option<PathBuf>,
    /// Secret filtering when neither a flag nor the environment decides
    pub default_secret_filtering: bool,
    /// Per-step time limit
    pub step_timeout: Option<Duration>,
}

impl AppConfig {
    /// Create a configuration rooted at the current directory
    pub fn new(verbose: u8) -> LibResult<Self> {
        let working_dir = std::env::current_dir().map_err(|e| {
            StepLineError::other("Failed to get current directory").with_source(e)
        })?;

        Ok(Self {
            verbose,
            steplib_root: working_dir.join(DEFAULT_STEPLIB_DIR),
            working_dir,
            ..Self::default()
        })
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_steplib_root(mut self, root: PathBuf) -> Self {
        self.steplib_root = root;
        self
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_default_secret_filtering(mut self, enabled: bool) -> Self {
        self.default_secret_filtering = enabled;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn mode_policy(&self) -> ModePolicy {
        ModePolicy {
            default_secret_filtering: self.default_secret_filtering,
        }
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            working_dir: PathBuf::from("."),
            steplib_root: PathBuf::from(DEFAULT_STEPLIB_DIR),
            work_dir: None,
            default_secret_filtering: ModePolicy::default().default_secret_filtering,
            step_timeout: None,
        }
    }
}
