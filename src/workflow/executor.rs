//! Step execution through a [`ProcessRunner`]
//!
//! Every execution gets a fresh output file announced through
//! `STEPLINE_OUTPUT_FILE`. Lines of the form `KEY=VALUE` written there become
//! the step's output entries.

use crate::env::EnvironmentEntry;
use crate::subprocess::{ExitStatus, ProcessCommandBuilder, ProcessError, ProcessRunner};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const OUTPUT_FILE_KEY: &str = "STEPLINE_OUTPUT_FILE";
const SHELL: &str = "bash";

static OUTPUT_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Valid regex pattern"));

/// What a step runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEntry {
    /// Script source passed to the shell directly
    Inline(String),
    /// Script file of an activated step
    Script(PathBuf),
}

#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub entry: StepEntry,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StepExecution {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub outputs: Vec<EnvironmentEntry>,
    pub duration: Duration,
}

#[derive(Clone)]
pub struct StepExecutor {
    runner: Arc<dyn ProcessRunner>,
    timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn execute(&self, invocation: StepInvocation) -> Result<StepExecution, ProcessError> {
        let output_file = tempfile::NamedTempFile::new()?;
        let output_path = output_file.path().to_path_buf();

        let mut env = invocation.env;
        env.insert(
            OUTPUT_FILE_KEY.to_string(),
            output_path.to_string_lossy().into_owned(),
        );

        let builder = match &invocation.entry {
            StepEntry::Inline(content) => {
                ProcessCommandBuilder::new(SHELL).args(["-c", content.as_str()])
            }
            StepEntry::Script(path) => {
                ProcessCommandBuilder::new(SHELL).arg(path.to_string_lossy())
            }
        };
        let command = builder
            .environment(env)
            .current_dir(&invocation.working_dir)
            .maybe_timeout(self.timeout)
            .build();

        let output = self.runner.run(command).await?;
        let content =
            std::fs::read_to_string(&output_path).map_err(|source| ProcessError::OutputFile {
                path: output_path.clone(),
                source,
            })?;
        let outputs = parse_outputs(&content);
        debug!("Step reported {} outputs", outputs.len());

        Ok(StepExecution {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
            outputs,
            duration: output.duration,
        })
    }
}

/// Parse `KEY=VALUE` lines; blank lines and `#` comments are ignored
pub fn parse_outputs(content: &str) -> Vec<EnvironmentEntry> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .filter_map(|line| {
            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring step output line without '=': {:?}", line);
                return None;
            };
            let key = key.trim();
            if !OUTPUT_KEY_REGEX.is_match(key) {
                warn!("Ignoring step output with invalid key {:?}", key);
                return None;
            }
            Some(EnvironmentEntry::new(key, value).literal())
        })
        .collect()
}
