//! Environment declarations, expansion and run modes
//!
//! - [`entry`] - typed environment entries and their document form
//! - [`expand`] - single-pass, order-sensitive expansion of entry batches
//! - [`reader`] - host process environment access
//! - [`mode`] - secret filtering, CI and PR mode resolution
//! - [`redact`] - masking of sensitive values in step output

pub mod entry;
pub mod expand;
pub mod mode;
pub mod reader;
pub mod redact;

pub use entry::{EntryError, EnvOptions, EnvironmentEntry};
pub use expand::{expand, expand_step_inputs, expand_value, EnvironmentSnapshot, StepInputs};
pub use mode::{ModeError, ModeFlags, ModePolicy, ModeResolver, RunModes};
pub use reader::{EnvReader, MockEnvReader, RealEnvReader};
pub use redact::{redact_secrets, SecretMask, REDACTED};
