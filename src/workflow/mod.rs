//! Workflow documents, the run engine and its result ledger

pub mod cancel;
pub mod config;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod test_results;

pub use cancel::{setup_interrupt_handlers, CancellationFlag};
pub use config::{
    ConfigError, Inventory, PlanSegment, PlannedStep, RunPlan, StepDeclaration, WorkflowDeclaration,
    WorkflowDocument,
};
pub use engine::{merge_inputs, RunEngine, RunRequest};
pub use executor::{StepEntry, StepExecution, StepExecutor, StepInvocation, OUTPUT_FILE_KEY};
pub use ledger::{ActivationAdvisory, RunResultLedger, StepOutcome, StepRecord};
