use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failed,
    /// Failed, but the step is skippable so the run continues
    FailedSkippable,
    /// Not executed because an earlier step aborted the run
    Skipped,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepOutcome::Success => "success",
            StepOutcome::Failed => "failed",
            StepOutcome::FailedSkippable => "failed (skippable)",
            StepOutcome::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub step_id: String,
    pub title: String,
    /// Activated version, when the step came from a library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A step that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationAdvisory {
    pub step_id: String,
    pub message: String,
}

/// Ordered outcome of every step in a run
///
/// Each step appears at most once, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct RunResultLedger {
    pub workflow: String,
    pub records: Vec<StepRecord>,
    pub advisories: Vec<ActivationAdvisory>,
    /// The run was cancelled before every step got a record
    pub halted: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunResultLedger {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            records: Vec::new(),
            advisories: Vec::new(),
            halted: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn advise(&mut self, step_id: impl Into<String>, message: impl Into<String>) {
        self.advisories.push(ActivationAdvisory {
            step_id: step_id.into(),
            message: message.into(),
        });
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn with_outcome(&self, outcome: StepOutcome) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter(move |r| r.outcome == outcome)
    }

    pub fn success_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcome::Success).collect()
    }

    pub fn failed_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcome::Failed).collect()
    }

    pub fn failed_skippable_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcome::FailedSkippable).collect()
    }

    pub fn skipped_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcome::Skipped).collect()
    }

    pub fn is_success(&self) -> bool {
        self.with_outcome(StepOutcome::Failed).next().is_none()
    }

    /// 1 when a non-skippable step failed, else 0
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} steps: {} succeeded, {} failed, {} failed (skippable), {} skipped",
            self.records.len(),
            self.with_outcome(StepOutcome::Success).count(),
            self.with_outcome(StepOutcome::Failed).count(),
            self.with_outcome(StepOutcome::FailedSkippable).count(),
            self.with_outcome(StepOutcome::Skipped).count(),
        );
        if !self.advisories.is_empty() {
            summary.push_str(&format!(", {} advisories", self.advisories.len()));
        }
        if self.halted {
            summary.push_str(" (halted)");
        }
        summary
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, outcome: StepOutcome) -> StepRecord {
        let now = Utc::now();
        StepRecord {
            index,
            step_id: format!("step-{}", index),
            title: format!("Step {}", index),
            version: None,
            outcome,
            reason: None,
            duration: Duration::from_millis(1500),
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_empty_ledger_succeeds() {
        let ledger = RunResultLedger::new("test");
        assert!(ledger.is_success());
        assert_eq!(ledger.exit_code(), 0);
        assert_eq!(
            ledger.summary(),
            "0 steps: 0 succeeded, 0 failed, 0 failed (skippable), 0 skipped"
        );
    }

    #[test]
    fn test_failed_skippable_does_not_fail_the_run() {
        let mut ledger = RunResultLedger::new("test");
        ledger.record(record(0, StepOutcome::Success));
        ledger.record(record(1, StepOutcome::FailedSkippable));
        assert_eq!(ledger.exit_code(), 0);
        assert_eq!(ledger.success_steps().len(), 1);
        assert_eq!(ledger.failed_skippable_steps().len(), 1);
    }

    #[test]
    fn test_failed_step_fails_the_run() {
        let mut ledger = RunResultLedger::new("test");
        ledger.record(record(0, StepOutcome::Failed));
        ledger.record(record(1, StepOutcome::Skipped));
        ledger.advise("step-0", "step not found");
        ledger.halt();

        assert_eq!(ledger.exit_code(), 1);
        assert_eq!(ledger.failed_steps().len(), 1);
        assert_eq!(ledger.skipped_steps().len(), 1);
        assert_eq!(
            ledger.summary(),
            "2 steps: 0 succeeded, 1 failed, 0 failed (skippable), 1 skipped, 1 advisories (halted)"
        );
    }

    #[test]
    fn test_serializes_outcomes_and_durations() {
        let mut ledger = RunResultLedger::new("test");
        ledger.record(record(0, StepOutcome::FailedSkippable));
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["records"][0]["outcome"], "failed_skippable");
        assert_eq!(json["records"][0]["duration"], 1500);
        assert!(json["records"][0].get("reason").is_none());
        assert_eq!(json["halted"], false);
    }
}
