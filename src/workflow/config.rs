//! Workflow documents
//!
//! A document declares app-level environment entries and named workflows.
//! Each workflow has its own entries, an ordered step list and optional
//! `before_run` / `after_run` workflow chains:
//!
//! ```yaml
//! format_version: 1.3.0
//! default_step_lib_source: main
//!
//! app:
//!   envs:
//!   - PROJECT: demo
//!
//! workflows:
//!   prepare:
//!     steps:
//!     - script:
//!         inputs:
//!         - content: echo preparing
//!   test:
//!     before_run:
//!     - prepare
//!     envs:
//!     - ENV0: "Hello"
//!     steps:
//!     - xcode-test@2.3:
//!         is_skippable: true
//!         inputs:
//!         - scheme: $PROJECT
//! ```

use crate::env::EnvironmentEntry;
use crate::error::{ErrorCode, StepLineError};
use crate::steplib::{ReferenceError, StepReference};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Library used for step ids that name no library
pub const DEFAULT_STEP_LIB_SOURCE: &str = "main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid document{}: {source}", .path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("workflow {0:?} is not defined")]
    WorkflowNotFound(String),

    #[error("workflows reference each other in a cycle: {}", .0.join(" -> "))]
    CircularWorkflow(Vec<String>),

    #[error("step {index} of workflow {workflow:?} is invalid: {source}")]
    InvalidStep {
        workflow: String,
        index: usize,
        #[source]
        source: ReferenceError,
    },
}

impl From<ConfigError> for StepLineError {
    fn from(err: ConfigError) -> Self {
        let (code, path) = match &err {
            ConfigError::Read { path, .. } => (ErrorCode::CONFIG_NOT_FOUND, Some(path.clone())),
            ConfigError::Parse { path, .. } => (ErrorCode::CONFIG_INVALID_YAML, path.clone()),
            ConfigError::WorkflowNotFound(_) => (ErrorCode::CONFIG_WORKFLOW_NOT_FOUND, None),
            ConfigError::CircularWorkflow(_) => (ErrorCode::CONFIG_CIRCULAR_WORKFLOW, None),
            ConfigError::InvalidStep { .. } => (ErrorCode::CONFIG_INVALID_STEP, None),
        };
        StepLineError::config_with_code(code, err.to_string(), path).with_source(err)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowDocument {
    pub format_version: Option<String>,
    pub default_step_lib_source: Option<String>,
    pub app: AppSection,
    pub workflows: IndexMap<String, WorkflowDeclaration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub envs: Vec<EnvironmentEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowDeclaration {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub before_run: Vec<String>,
    pub after_run: Vec<String>,
    pub envs: Vec<EnvironmentEntry>,
    pub steps: Vec<StepDeclaration>,
}

/// One step list item: `- <step-id>: { title, inputs, ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDeclaration {
    pub id: String,
    pub title: Option<String>,
    pub inputs: Vec<EnvironmentEntry>,
    pub is_skippable: Option<bool>,
    pub is_always_run: Option<bool>,
}

impl<'de> Deserialize<'de> for StepDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct StepBody {
            title: Option<String>,
            inputs: Vec<EnvironmentEntry>,
            is_skippable: Option<bool>,
            is_always_run: Option<bool>,
        }

        let map = IndexMap::<String, Option<StepBody>>::deserialize(deserializer)?;
        if map.len() != 1 {
            return Err(serde::de::Error::custom(format!(
                "a step must be a map with exactly one step id, found {} keys",
                map.len()
            )));
        }
        let Some((id, body)) = map.into_iter().next() else {
            return Err(serde::de::Error::custom("a step must name a step id"));
        };
        let body = body.unwrap_or_default();

        Ok(StepDeclaration {
            id,
            title: body.title,
            inputs: body.inputs,
            is_skippable: body.is_skippable,
            is_always_run: body.is_always_run,
        })
    }
}

/// A step of a run plan with its parsed reference
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub reference: StepReference,
    pub declaration: StepDeclaration,
}

/// Consecutive steps of one workflow together with that workflow's entries
#[derive(Debug, Clone)]
pub struct PlanSegment {
    pub workflow: String,
    pub envs: Vec<EnvironmentEntry>,
    pub steps: Vec<PlannedStep>,
}

/// A target workflow flattened with its before/after chains
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub workflow: String,
    pub title: Option<String>,
    pub app_envs: Vec<EnvironmentEntry>,
    pub segments: Vec<PlanSegment>,
}

impl RunPlan {
    pub fn step_count(&self) -> usize {
        self.segments.iter().map(|s| s.steps.len()).sum()
    }

    /// Entries of every segment, in plan order
    pub fn declared_envs(&self) -> Vec<EnvironmentEntry> {
        self.app_envs
            .iter()
            .chain(self.segments.iter().flat_map(|s| s.envs.iter()))
            .cloned()
            .collect()
    }
}

impl WorkflowDocument {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse { path: None, source })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })?;
        debug!(
            "Loaded {} workflows from {}",
            document.workflows.len(),
            path.display()
        );
        Ok(document)
    }

    pub fn default_source(&self) -> &str {
        self.default_step_lib_source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_STEP_LIB_SOURCE)
    }

    /// Flatten `target` and its `before_run` / `after_run` chains
    pub fn plan(&self, target: &str) -> Result<RunPlan, ConfigError> {
        let declaration = self
            .workflows
            .get(target)
            .ok_or_else(|| ConfigError::WorkflowNotFound(target.to_string()))?;

        let mut segments = Vec::new();
        let mut chain = Vec::new();
        self.collect_segments(target, &mut chain, &mut segments)?;

        Ok(RunPlan {
            workflow: target.to_string(),
            title: declaration.title.clone(),
            app_envs: self.app.envs.clone(),
            segments,
        })
    }

    fn collect_segments(
        &self,
        name: &str,
        chain: &mut Vec<String>,
        segments: &mut Vec<PlanSegment>,
    ) -> Result<(), ConfigError> {
        if chain.iter().any(|n| n == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(ConfigError::CircularWorkflow(cycle));
        }
        let workflow = self
            .workflows
            .get(name)
            .ok_or_else(|| ConfigError::WorkflowNotFound(name.to_string()))?;

        chain.push(name.to_string());
        for before in &workflow.before_run {
            self.collect_segments(before, chain, segments)?;
        }

        let steps = workflow
            .steps
            .iter()
            .enumerate()
            .map(|(index, declaration)| {
                StepReference::parse(&declaration.id, self.default_source())
                    .map(|reference| PlannedStep {
                        reference,
                        declaration: declaration.clone(),
                    })
                    .map_err(|source| ConfigError::InvalidStep {
                        workflow: name.to_string(),
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        segments.push(PlanSegment {
            workflow: name.to_string(),
            envs: workflow.envs.clone(),
            steps,
        });

        for after in &workflow.after_run {
            self.collect_segments(after, chain, segments)?;
        }
        chain.pop();
        Ok(())
    }
}

/// Secrets document: `envs:` entries that are always sensitive
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub envs: Vec<EnvironmentEntry>,
}

impl Inventory {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let inventory: Self = serde_yaml::from_str(content)
            .map_err(|source| ConfigError::Parse { path: None, source })?;
        Ok(inventory.into_sensitive())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let inventory: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })?;
        Ok(inventory.into_sensitive())
    }

    fn into_sensitive(self) -> Self {
        Self {
            envs: self.envs.into_iter().map(EnvironmentEntry::sensitive).collect(),
        }
    }
}
