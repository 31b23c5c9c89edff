//! # Stepline
//!
//! Runs CI workflows made of versioned, reusable steps.
//!
//! ## Usage
//!
//! ```bash
//! stepline run primary [-c stepline.yml] [--inventory secrets.yml] [--ci] [--pr]
//! ```
//!
//! ## Modules
//!
//! - `app` - Application configuration, logging and fatal error reporting
//! - `env` - Environment entries, expansion, run modes and secret redaction
//! - `error` - Unified error type with stable error codes
//! - `steplib` - Step references, version locks and step activation
//! - `subprocess` - Process runner abstraction used to execute steps
//! - `workflow` - Workflow documents, the run engine and its result ledger
pub mod app;
pub mod env;
pub mod error;
pub mod steplib;
pub mod subprocess;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{LibResult, StepLineError};
