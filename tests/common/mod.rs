//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepline::env::MockEnvReader;
use stepline::steplib::{LocalStepLibrary, StepActivator};
use stepline::subprocess::TokioProcessRunner;
use stepline::workflow::{RunEngine, RunRequest, RunResultLedger, StepExecutor, WorkflowDocument};
use tempfile::TempDir;

/// Project directory with a workflow configuration and a local step library
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn steplib_root(&self) -> PathBuf {
        self.path().join("steplib")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path().join("work")
    }

    /// Write `stepline.yml` and return its path
    pub fn write_config(&self, yaml: &str) -> Result<PathBuf> {
        self.write_file("stepline.yml", yaml)
    }

    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Publish `step_id` at `version` in the `main` library
    pub fn publish_step(
        &self,
        step_id: &str,
        version: &str,
        metadata: &str,
        script: &str,
    ) -> Result<PathBuf> {
        self.publish_in("main", step_id, version, metadata, script)
    }

    pub fn publish_in(
        &self,
        library: &str,
        step_id: &str,
        version: &str,
        metadata: &str,
        script: &str,
    ) -> Result<PathBuf> {
        let dir = self
            .steplib_root()
            .join(library)
            .join("steps")
            .join(step_id)
            .join(version);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("step.yml"), metadata)?;
        fs::write(dir.join("step.sh"), script)?;
        Ok(dir)
    }

    /// Engine running real bash processes against an empty host environment
    pub fn engine(&self) -> RunEngine {
        let library = LocalStepLibrary::new(self.steplib_root());
        let activator = StepActivator::new(Arc::new(library), self.path());
        let executor = StepExecutor::new(Arc::new(TokioProcessRunner));
        RunEngine::new(
            activator,
            executor,
            Arc::new(MockEnvReader::new()),
            self.path(),
            self.work_dir(),
        )
    }

    pub async fn run(&self, yaml: &str, workflow: &str) -> Result<RunResultLedger> {
        self.run_with(yaml, workflow, RunRequest::default()).await
    }

    pub async fn run_with(
        &self,
        yaml: &str,
        workflow: &str,
        request: RunRequest,
    ) -> Result<RunResultLedger> {
        let plan = WorkflowDocument::from_yaml_str(yaml)?.plan(workflow)?;
        Ok(self.engine().run(&plan, &request).await?)
    }
}
