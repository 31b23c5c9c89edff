//! Workflow run engine
//!
//! One call to [`RunEngine::run`] executes a [`RunPlan`] strictly in order.
//! Per step the engine goes through
//! `Pending -> Activating -> Expanding -> Executing -> outcome`, where the
//! outcome is one of [`StepOutcome`]. The cumulative environment grows as the
//! run proceeds: host environment, resolved modes, secrets, app entries, each
//! workflow segment's entries right before its steps, and the outputs of every
//! executed step.
//!
//! A non-skippable failure aborts the run: later steps are recorded as
//! skipped without being activated, except steps declared `is_always_run`.
//! Cancellation is observed between steps and halts the run, leaving the
//! remaining steps unrecorded.

use super::cancel::CancellationFlag;
use super::config::{PlannedStep, RunPlan};
use super::executor::{StepEntry, StepExecutor, StepInvocation};
use super::ledger::{RunResultLedger, StepOutcome, StepRecord};
use super::test_results::{
    finalize_test_result_dir, prepare_test_result_dir, TestResultStepInfo, TEST_RESULT_DIR_KEY,
};
use crate::env::{
    expand_step_inputs, EnvReader, EnvironmentEntry, EnvironmentSnapshot, ModeFlags, ModePolicy,
    ModeResolver, RunModes, SecretMask,
};
use crate::error::{ErrorCode, LibResult, StepLineError};
use crate::steplib::{ActivatedStep, StepActivator};
use chrono::Utc;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Input of the built-in `script` step holding the script source
pub const SCRIPT_CONTENT_INPUT: &str = "content";

const STEPS_DIR: &str = "steps";
const METADATA_DIR: &str = "step-metadata";
const TEST_RESULTS_DIR: &str = "test-results";

/// Per-run inputs supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub flags: ModeFlags,
    /// Inventory entries, applied as sensitive
    pub secrets: Vec<EnvironmentEntry>,
}

pub struct RunEngine {
    activator: StepActivator,
    executor: StepExecutor,
    env_reader: Arc<dyn EnvReader>,
    policy: ModePolicy,
    working_dir: PathBuf,
    work_dir: PathBuf,
    cancellation: CancellationFlag,
}

/// Mutable state owned by a single run
struct RunState {
    environment: EnvironmentSnapshot,
    ledger: RunResultLedger,
    modes: RunModes,
    aborted: bool,
}

impl RunEngine {
    /// `working_dir` is where steps run, `work_dir` holds staged steps
    pub fn new(
        activator: StepActivator,
        executor: StepExecutor,
        env_reader: Arc<dyn EnvReader>,
        working_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            activator,
            executor,
            env_reader,
            policy: ModePolicy::default(),
            working_dir: working_dir.into(),
            work_dir: work_dir.into(),
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_policy(mut self, policy: ModePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Resolve the run modes for `plan` without running it
    pub fn resolve_modes(&self, plan: &RunPlan, request: &RunRequest) -> LibResult<RunModes> {
        let mut declared = request.secrets.clone();
        declared.extend(plan.declared_envs());
        let resolver = ModeResolver::new(self.env_reader.as_ref(), self.policy);
        Ok(resolver.resolve(request.flags, &declared)?)
    }

    /// Execute every step of `plan` and return the ledger
    ///
    /// Step failures are reported through the ledger. An error is returned
    /// only when the run cannot start: an unparsable mode value or an
    /// unusable work directory.
    pub async fn run(&self, plan: &RunPlan, request: &RunRequest) -> LibResult<RunResultLedger> {
        let modes = self.resolve_modes(plan, request)?;
        std::fs::create_dir_all(&self.work_dir).map_err(|e| {
            StepLineError::workflow_with_code(
                ErrorCode::WORKFLOW_GENERIC,
                format!("failed to create work directory {}", self.work_dir.display()),
                Some(plan.workflow.clone()),
            )
            .with_source(e)
        })?;

        let mut environment = EnvironmentSnapshot::from_base(self.env_reader.vars());
        environment.apply(&modes.as_entries());
        let secrets: Vec<EnvironmentEntry> = request
            .secrets
            .iter()
            .cloned()
            .map(EnvironmentEntry::sensitive)
            .collect();
        environment.apply(&secrets);
        environment.apply(&plan.app_envs);

        let mut state = RunState {
            environment,
            ledger: RunResultLedger::new(plan.workflow.clone()),
            modes,
            aborted: false,
        };

        info!(
            "Running workflow {} ({} steps)",
            plan.workflow,
            plan.step_count()
        );

        let mut index = 0;
        'segments: for segment in &plan.segments {
            debug!(
                "Applying {} entries of workflow {}",
                segment.envs.len(),
                segment.workflow
            );
            state.environment.apply(&segment.envs);

            for step in &segment.steps {
                if self.cancellation.is_cancelled() {
                    warn!(
                        "Run cancelled, {} steps not executed",
                        plan.step_count() - index
                    );
                    state.ledger.halt();
                    break 'segments;
                }
                let record = self.run_step(index, step, &mut state).await;
                if record.outcome == StepOutcome::Failed && !state.aborted {
                    error!("Step {} failed, aborting remaining steps", record.step_id);
                    state.aborted = true;
                }
                state.ledger.record(record);
                index += 1;
            }
        }

        state.ledger.finish();
        info!("{}", state.ledger.summary());
        Ok(state.ledger)
    }

    async fn run_step(&self, index: usize, step: &PlannedStep, state: &mut RunState) -> StepRecord {
        let started_at = Utc::now();
        let clock = Instant::now();
        let declaration = &step.declaration;
        let step_id = step.reference.to_string();

        let mut record = StepRecord {
            index,
            step_id: step_id.clone(),
            title: declaration
                .title
                .clone()
                .unwrap_or_else(|| step.reference.id_or_uri.clone()),
            version: None,
            outcome: StepOutcome::Success,
            reason: None,
            duration: Default::default(),
            started_at,
            finished_at: started_at,
        };

        let always_run = declaration.is_always_run.unwrap_or(false);
        if state.aborted && !always_run {
            info!("Skipping step {}", step_id);
            record.outcome = StepOutcome::Skipped;
            record.reason = Some("an earlier step failed".to_string());
            return record;
        }

        info!("Activating step {} ({})", record.title, step_id);
        let destination = self.work_dir.join(STEPS_DIR).join(index.to_string());
        let metadata_copy = self
            .work_dir
            .join(METADATA_DIR)
            .join(index.to_string())
            .join("step.yml");

        let activated = match self
            .activator
            .activate(&step.reference, &destination, &metadata_copy)
        {
            Ok(activated) => activated,
            Err(err) => {
                if err.is_recoverable() {
                    warn!("Step {} cannot be resolved: {}", step_id, err);
                    state.ledger.advise(step_id.clone(), err.to_string());
                } else {
                    error!("Failed to activate step {}: {}", step_id, err);
                }
                let skippable = declaration.is_skippable.unwrap_or(false);
                return finish(record, failure_outcome(skippable), Some(err.to_string()), clock);
            }
        };

        if declaration.title.is_none() {
            if let Some(title) = &activated.metadata.title {
                record.title = title.clone();
            }
        }
        record.version = activated.version.as_ref().map(|v| v.to_string());
        let skippable = declaration
            .is_skippable
            .or(activated.metadata.is_skippable)
            .unwrap_or(false);

        let inputs = merge_inputs(&activated.metadata.inputs, &declaration.inputs);
        let step_inputs = expand_step_inputs(&inputs, &state.environment);
        let mask = SecretMask::new(
            &step_inputs.environment().sensitive_values(),
            state.modes.secret_filtering,
        );
        let shown_inputs: IndexMap<String, String> = step_inputs
            .visible()
            .into_iter()
            .map(|(key, value)| (key, mask.apply(&value)))
            .collect();
        debug!("Inputs of {}: {:?}", step_id, shown_inputs);

        let missing = step_inputs.missing_required(&inputs);
        if !missing.is_empty() {
            let reason = format!("required inputs are empty: {}", missing.join(", "));
            error!("Step {}: {}", step_id, reason);
            return finish(record, failure_outcome(skippable), Some(reason), clock);
        }

        let entry = match step_entry(&activated, step_inputs.get(SCRIPT_CONTENT_INPUT)) {
            Ok(entry) => entry,
            Err(reason) => {
                error!("Step {}: {}", step_id, reason);
                return finish(record, failure_outcome(skippable), Some(reason), clock);
            }
        };

        let mut process_env = step_inputs.environment().to_process_env();
        let test_result_dir = match prepare_test_result_dir(
            &self.work_dir.join(TEST_RESULTS_DIR),
            index,
        ) {
            Ok(dir) => {
                process_env.insert(
                    TEST_RESULT_DIR_KEY.to_string(),
                    dir.to_string_lossy().into_owned(),
                );
                Some(dir)
            }
            Err(e) => {
                warn!("Could not create test result directory: {}", e);
                None
            }
        };

        info!("Executing step {}", record.title);
        let result = self
            .executor
            .execute(StepInvocation {
                entry,
                env: process_env,
                working_dir: self.working_dir.clone(),
            })
            .await;

        if let Some(dir) = &test_result_dir {
            let info = TestResultStepInfo {
                id: step.reference.id_or_uri.clone(),
                title: record.title.clone(),
                version: record.version.clone(),
                number: index,
            };
            if let Err(e) = finalize_test_result_dir(dir, &info) {
                warn!("Could not finalize test results of {}: {}", step_id, e);
            }
        }

        match result {
            Ok(execution) => {
                if !execution.stdout.trim().is_empty() {
                    info!("{}", mask.apply(execution.stdout.trim_end()));
                }
                if !execution.stderr.trim().is_empty() {
                    warn!("{}", mask.apply(execution.stderr.trim_end()));
                }

                if !execution.outputs.is_empty() {
                    debug!(
                        "Merging {} outputs of {} into the run environment",
                        execution.outputs.len(),
                        step_id
                    );
                    state.environment.apply(&execution.outputs);
                }

                if execution.status.success() {
                    info!("Step {} succeeded in {:?}", record.title, clock.elapsed());
                    finish(record, StepOutcome::Success, None, clock)
                } else {
                    let reason = format!("step exited with {}", execution.status);
                    error!("Step {} failed: {}", record.title, reason);
                    finish(record, failure_outcome(skippable), Some(reason), clock)
                }
            }
            Err(err) => {
                let reason = mask.apply(&err.to_string());
                error!("Step {} could not be executed: {}", record.title, reason);
                finish(record, failure_outcome(skippable), Some(reason), clock)
            }
        }
    }
}

fn failure_outcome(skippable: bool) -> StepOutcome {
    if skippable {
        StepOutcome::FailedSkippable
    } else {
        StepOutcome::Failed
    }
}

fn finish(
    mut record: StepRecord,
    outcome: StepOutcome,
    reason: Option<String>,
    clock: Instant,
) -> StepRecord {
    record.outcome = outcome;
    record.reason = reason;
    record.duration = clock.elapsed();
    record.finished_at = Utc::now();
    record
}

fn step_entry(activated: &ActivatedStep, content: Option<&str>) -> Result<StepEntry, String> {
    if activated.reference.is_builtin() {
        return Ok(StepEntry::Inline(content.unwrap_or_default().to_string()));
    }
    let entry_point = activated.entry_point();
    if entry_point.is_file() {
        Ok(StepEntry::Script(entry_point))
    } else {
        Err(format!(
            "entry file {} does not exist",
            entry_point.display()
        ))
    }
}

/// Declared inputs replace same-key defaults in place; new keys are appended
pub fn merge_inputs(
    defaults: &[EnvironmentEntry],
    declared: &[EnvironmentEntry],
) -> Vec<EnvironmentEntry> {
    let mut merged: Vec<EnvironmentEntry> = defaults.to_vec();
    for entry in declared {
        match merged.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => {
                let mut replacement = entry.clone();
                // Sensitivity and requiredness belong to the step definition
                replacement.options.is_sensitive |= existing.options.is_sensitive;
                replacement.options.is_required |= existing.options.is_required;
                *existing = replacement;
            }
            None => merged.push(entry.clone()),
        }
    }
    merged
}
