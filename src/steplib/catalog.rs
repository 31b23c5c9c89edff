//! Step library catalogs
//!
//! A catalog answers two questions about a step: which versions are published,
//! and where the files of one version can be read from. [`LocalStepLibrary`]
//! serves libraries laid out on disk:
//!
//! ```text
//! <root>/
//!   main/
//!     steps/
//!       xcode-archive/
//!         1.10.1/
//!           step.yml
//!           step.sh
//!         2.3.7/
//!           ...
//! ```
//!
//! The library source named in a step reference selects the directory under
//! the root, either through an explicit alias or by its plain name.

use crate::env::EnvironmentEntry;
use crate::error::{ErrorCode, StepLineError};
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const METADATA_FILE: &str = "step.yml";
pub const DEFAULT_ENTRY_FILE: &str = "step.sh";
const STEPS_DIR: &str = "steps";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown step library {0:?}")]
    UnknownLibrary(String),

    #[error("step {step_id:?} is not published in library {library:?}")]
    StepNotFound { library: String, step_id: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid step metadata in {path}: {source}")]
    InvalidMetadata {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl CatalogError {
    /// The step or its library does not exist, as opposed to a read failure
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::UnknownLibrary(_) | Self::StepNotFound { .. })
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<CatalogError> for StepLineError {
    fn from(err: CatalogError) -> Self {
        let (code, step_id) = match &err {
            CatalogError::UnknownLibrary(_) => (ErrorCode::STEPLIB_UNKNOWN_LIBRARY, None),
            CatalogError::StepNotFound { step_id, .. } => {
                (ErrorCode::STEPLIB_STEP_NOT_FOUND, Some(step_id.clone()))
            }
            CatalogError::Io { .. } => (ErrorCode::STEPLIB_STAGING_FAILED, None),
            CatalogError::InvalidMetadata { .. } => (ErrorCode::STEPLIB_INVALID_METADATA, None),
        };
        StepLineError::steplib_with_code(code, err.to_string(), step_id).with_source(err)
    }
}

/// Declarative description of a step (`step.yml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StepMetadata {
    pub title: Option<String>,
    pub summary: Option<String>,
    /// Script run by `bash`, relative to the staged step directory
    pub entry_file: Option<String>,
    pub is_skippable: Option<bool>,
    /// Default inputs, overridden by the workflow declaration
    pub inputs: Vec<EnvironmentEntry>,
    pub outputs: Vec<EnvironmentEntry>,
}

impl StepMetadata {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        Self::from_yaml(&content, path)
    }

    fn from_yaml(content: &str, path: &Path) -> Result<Self, CatalogError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| CatalogError::InvalidMetadata {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn entry_file(&self) -> &str {
        self.entry_file.as_deref().unwrap_or(DEFAULT_ENTRY_FILE)
    }
}

/// Readable files of one published step version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub root: PathBuf,
    pub metadata_path: PathBuf,
}

/// Source of published step versions and their files
pub trait ArtifactCatalog: Send + Sync {
    /// Published 3-component versions of a step
    fn published_versions(&self, library: &str, step_id: &str)
        -> Result<Vec<Version>, CatalogError>;

    /// Files of one published version
    fn open(
        &self,
        library: &str,
        step_id: &str,
        version: &Version,
    ) -> Result<ArtifactBundle, CatalogError>;
}

/// Step libraries stored in directories under a common root
#[derive(Debug, Clone)]
pub struct LocalStepLibrary {
    root: PathBuf,
    aliases: HashMap<String, String>,
}

impl LocalStepLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            aliases: HashMap::new(),
        }
    }

    /// Map a library source (for example a URL) onto a directory name
    pub fn with_alias(mut self, source: impl Into<String>, directory: impl Into<String>) -> Self {
        self.aliases.insert(source.into(), directory.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn library_dir(&self, library: &str) -> Result<PathBuf, CatalogError> {
        let name = self
            .aliases
            .get(library)
            .map(String::as_str)
            .unwrap_or(library);

        let is_plain_name = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', ':']);
        if !is_plain_name {
            return Err(CatalogError::UnknownLibrary(library.to_string()));
        }

        let dir = self.root.join(name);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(CatalogError::UnknownLibrary(library.to_string()))
        }
    }

    fn step_dir(&self, library: &str, step_id: &str) -> Result<PathBuf, CatalogError> {
        let not_found = || CatalogError::StepNotFound {
            library: library.to_string(),
            step_id: step_id.to_string(),
        };
        if step_id.contains(['/', '\\']) || step_id == "." || step_id == ".." {
            return Err(not_found());
        }
        let dir = self.library_dir(library)?.join(STEPS_DIR).join(step_id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(not_found())
        }
    }
}

impl ArtifactCatalog for LocalStepLibrary {
    fn published_versions(
        &self,
        library: &str,
        step_id: &str,
    ) -> Result<Vec<Version>, CatalogError> {
        let step_dir = self.step_dir(library, step_id)?;
        let entries = std::fs::read_dir(&step_dir).map_err(|e| CatalogError::io(&step_dir, e))?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CatalogError::io(&step_dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match Version::parse(&name) {
                Ok(version) if version.pre.is_empty() && version.build.is_empty() => {
                    versions.push(version)
                }
                _ => warn!(
                    "Ignoring {} in {}: not a major.minor.patch version",
                    name,
                    step_dir.display()
                ),
            }
        }

        versions.sort();
        debug!(
            "Step {} in library {} has {} published versions",
            step_id,
            library,
            versions.len()
        );
        Ok(versions)
    }

    fn open(
        &self,
        library: &str,
        step_id: &str,
        version: &Version,
    ) -> Result<ArtifactBundle, CatalogError> {
        let root = self.step_dir(library, step_id)?.join(version.to_string());
        if !root.is_dir() {
            return Err(CatalogError::StepNotFound {
                library: library.to_string(),
                step_id: format!("{}@{}", step_id, version),
            });
        }
        let metadata_path = root.join(METADATA_FILE);
        Ok(ArtifactBundle {
            root,
            metadata_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library_with(versions: &[&str]) -> (TempDir, LocalStepLibrary) {
        let temp = TempDir::new().unwrap();
        for version in versions {
            let dir = temp.path().join("main/steps/xcode-archive").join(version);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(METADATA_FILE), "title: Xcode Archive\n").unwrap();
        }
        let library = LocalStepLibrary::new(temp.path());
        (temp, library)
    }

    #[test]
    fn test_published_versions_sorted() {
        let (_temp, library) = library_with(&["2.3.7", "1.10.1", "2.3.2"]);
        let versions = library.published_versions("main", "xcode-archive").unwrap();
        let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(rendered, vec!["1.10.1", "2.3.2", "2.3.7"]);
    }

    #[test]
    fn test_non_version_directories_ignored() {
        let (_temp, library) = library_with(&["1.0.0", "1.1", "assets", "2.0.0-rc.1"]);
        let versions = library.published_versions("main", "xcode-archive").unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0)]);
    }

    #[test]
    fn test_unknown_library_and_step() {
        let (_temp, library) = library_with(&["1.0.0"]);

        let err = library.published_versions("other", "xcode-archive").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownLibrary(_)));
        assert!(err.is_unresolvable());

        let err = library.published_versions("main", "invalid-step").unwrap_err();
        assert!(matches!(err, CatalogError::StepNotFound { .. }));
        assert!(err.is_unresolvable());

        let err = library.published_versions("../main", "xcode-archive").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownLibrary(_)));
    }

    #[test]
    fn test_alias_maps_url_to_directory() {
        let (_temp, library) = library_with(&["1.0.0"]);
        let library = library.with_alias("https://example.com/steplib.git", "main");
        let versions = library
            .published_versions("https://example.com/steplib.git", "xcode-archive")
            .unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[test]
    fn test_open_returns_bundle() {
        let (temp, library) = library_with(&["1.0.0"]);
        let bundle = library
            .open("main", "xcode-archive", &Version::new(1, 0, 0))
            .unwrap();
        assert_eq!(bundle.root, temp.path().join("main/steps/xcode-archive/1.0.0"));
        assert!(bundle.metadata_path.ends_with(METADATA_FILE));

        let err = library
            .open("main", "xcode-archive", &Version::new(9, 0, 0))
            .unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_metadata_parsing() {
        let yaml = r#"
title: Xcode Archive
entry_file: run.sh
is_skippable: true
inputs:
  - scheme: App
  - configuration: Release
    opts:
      is_required: true
"#;
        let metadata = StepMetadata::from_yaml(yaml, Path::new("step.yml")).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Xcode Archive"));
        assert_eq!(metadata.entry_file(), "run.sh");
        assert_eq!(metadata.is_skippable, Some(true));
        assert_eq!(metadata.inputs.len(), 2);
        assert!(metadata.inputs[1].options.is_required);
    }

    #[test]
    fn test_empty_metadata_uses_defaults() {
        let metadata = StepMetadata::from_yaml("\n", Path::new("step.yml")).unwrap();
        assert_eq!(metadata.entry_file(), DEFAULT_ENTRY_FILE);
        assert!(metadata.inputs.is_empty());
    }

    #[test]
    fn test_invalid_metadata() {
        let err = StepMetadata::from_yaml("inputs: 3", Path::new("step.yml")).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidMetadata { .. }));
        assert!(!err.is_unresolvable());
    }
}
