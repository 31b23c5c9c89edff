//! Per-step test result directories
//!
//! Each step gets an empty directory, announced through
//! `STEPLINE_TEST_RESULT_DIR`, to drop test reports into. After the step an
//! empty directory is removed; a non-empty one receives a `step-info.json`
//! describing the step that produced it.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const TEST_RESULT_DIR_KEY: &str = "STEPLINE_TEST_RESULT_DIR";
pub const STEP_INFO_FILE: &str = "step-info.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestResultStepInfo {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub number: usize,
}

/// Create a fresh, empty directory for step `index` under `root`
pub fn prepare_test_result_dir(root: &Path, index: usize) -> io::Result<PathBuf> {
    let dir = root.join(index.to_string());
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Drop `dir` when the step left it empty, otherwise describe the step in it
pub fn finalize_test_result_dir(dir: &Path, info: &TestResultStepInfo) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    if fs::read_dir(dir)?.next().is_none() {
        return fs::remove_dir(dir);
    }
    let json = serde_json::to_string_pretty(info).map_err(io::Error::other)?;
    fs::write(dir.join(STEP_INFO_FILE), json)
}
