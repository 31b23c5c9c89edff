//! Process runner used to execute steps
//!
//! [`ProcessRunner`] is the seam between the run engine and the operating
//! system. [`TokioProcessRunner`] spawns real processes, [`MockProcessRunner`]
//! replays scripted results in tests.

pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
