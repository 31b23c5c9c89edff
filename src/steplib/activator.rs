//! Step activation
//!
//! Activation turns a [`StepReference`] into a staged, runnable step: the
//! version lock is resolved against the catalog, the selected bundle is copied
//! into a destination directory and its metadata document is copied to a
//! location chosen by the caller. Activating into a destination that was used
//! before replaces everything staged there previously.

use super::catalog::{ArtifactCatalog, CatalogError, StepMetadata, METADATA_FILE};
use super::reference::{StepReference, StepSource};
use super::version::{resolve_version, VersionError};
use crate::error::{ErrorCode, StepLineError};
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{source_kind} steps cannot be retrieved: {uri}")]
    UnsupportedSource { source_kind: String, uri: String },

    #[error("local step directory {0} does not exist")]
    LocalStepMissing(PathBuf),

    #[error("failed to stage step files into {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ActivationError {
    /// Whether the failure is an unresolvable step, recorded as an advisory
    ///
    /// Malformed constraints and I/O failures are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Version(VersionError::NoMatch { .. }) => true,
            Self::Version(_) => false,
            Self::Catalog(err) => err.is_unresolvable(),
            Self::UnsupportedSource { .. } | Self::LocalStepMissing(_) => true,
            Self::Staging { .. } => false,
        }
    }

    fn staging(path: &Path, source: std::io::Error) -> Self {
        Self::Staging {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ActivationError> for StepLineError {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::Version(e) => e.into(),
            ActivationError::Catalog(e) => e.into(),
            other => {
                let code = match &other {
                    ActivationError::Staging { .. } => ErrorCode::STEPLIB_STAGING_FAILED,
                    _ => ErrorCode::STEPLIB_STEP_NOT_FOUND,
                };
                StepLineError::steplib_with_code(code, other.to_string(), None).with_source(other)
            }
        }
    }
}

/// A step ready to run
#[derive(Debug, Clone)]
pub struct ActivatedStep {
    pub reference: StepReference,
    /// Selected version; `None` for built-in and local steps
    pub version: Option<Version>,
    pub step_dir: PathBuf,
    pub metadata: StepMetadata,
    /// Where the metadata document was copied to, if the step has one
    pub metadata_path: Option<PathBuf>,
}

impl ActivatedStep {
    pub fn entry_point(&self) -> PathBuf {
        self.step_dir.join(self.metadata.entry_file())
    }
}

/// Resolves and stages steps from a catalog
#[derive(Clone)]
pub struct StepActivator {
    catalog: Arc<dyn ArtifactCatalog>,
    base_dir: PathBuf,
}

impl StepActivator {
    /// `base_dir` anchors relative `path::` references
    pub fn new(catalog: Arc<dyn ArtifactCatalog>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            base_dir: base_dir.into(),
        }
    }

    pub fn activate(
        &self,
        reference: &StepReference,
        destination: &Path,
        metadata_copy_path: &Path,
    ) -> Result<ActivatedStep, ActivationError> {
        match reference.source() {
            StepSource::Builtin => {
                reset_dir(destination)?;
                remove_stale_file(metadata_copy_path)?;
                Ok(ActivatedStep {
                    reference: reference.clone(),
                    version: None,
                    step_dir: destination.to_path_buf(),
                    metadata: StepMetadata::default(),
                    metadata_path: None,
                })
            }
            StepSource::Git => Err(ActivationError::UnsupportedSource {
                source_kind: reference.library_source.clone(),
                uri: reference.id_or_uri.clone(),
            }),
            StepSource::Local(dir) => {
                let source_dir = if dir.is_absolute() {
                    dir
                } else {
                    self.base_dir.join(dir)
                };
                if !source_dir.is_dir() {
                    return Err(ActivationError::LocalStepMissing(source_dir));
                }
                let metadata_source = source_dir.join(METADATA_FILE);
                self.stage(
                    reference,
                    None,
                    &source_dir,
                    &metadata_source,
                    destination,
                    metadata_copy_path,
                )
            }
            StepSource::Library => {
                let versions = self
                    .catalog
                    .published_versions(&reference.library_source, &reference.id_or_uri)?;
                let version = resolve_version(
                    &reference.id_or_uri,
                    &reference.version_constraint,
                    &versions,
                )?;
                debug!("Resolved {} to version {}", reference, version);
                let bundle = self.catalog.open(
                    &reference.library_source,
                    &reference.id_or_uri,
                    &version,
                )?;
                self.stage(
                    reference,
                    Some(version),
                    &bundle.root,
                    &bundle.metadata_path,
                    destination,
                    metadata_copy_path,
                )
            }
        }
    }

    fn stage(
        &self,
        reference: &StepReference,
        version: Option<Version>,
        source_dir: &Path,
        metadata_source: &Path,
        destination: &Path,
        metadata_copy_path: &Path,
    ) -> Result<ActivatedStep, ActivationError> {
        if destination.starts_with(source_dir) || source_dir.starts_with(destination) {
            return Err(ActivationError::staging(
                destination,
                std::io::Error::other(format!(
                    "destination overlaps the step source {}",
                    source_dir.display()
                )),
            ));
        }
        reset_dir(destination)?;
        copy_tree(source_dir, destination)?;

        // Metadata comes from the source, never from a previously staged copy
        let (metadata, metadata_path) = if metadata_source.is_file() {
            let metadata = StepMetadata::load(metadata_source)?;
            if let Some(parent) = metadata_copy_path.parent() {
                fs::create_dir_all(parent).map_err(|e| ActivationError::staging(parent, e))?;
            }
            fs::copy(metadata_source, metadata_copy_path)
                .map_err(|e| ActivationError::staging(metadata_copy_path, e))?;
            (metadata, Some(metadata_copy_path.to_path_buf()))
        } else {
            remove_stale_file(metadata_copy_path)?;
            (StepMetadata::default(), None)
        };

        info!(
            "Activated {}{} into {}",
            reference,
            version
                .as_ref()
                .map(|v| format!(" ({})", v))
                .unwrap_or_default(),
            destination.display()
        );

        Ok(ActivatedStep {
            reference: reference.clone(),
            version,
            step_dir: destination.to_path_buf(),
            metadata,
            metadata_path,
        })
    }
}

/// Leave `dir` existing and empty
fn reset_dir(dir: &Path) -> Result<(), ActivationError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| ActivationError::staging(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| ActivationError::staging(dir, e))
}

fn remove_stale_file(path: &Path) -> Result<(), ActivationError> {
    if path.is_file() {
        fs::remove_file(path).map_err(|e| ActivationError::staging(path, e))?;
    }
    Ok(())
}

/// Copy every file under `from` into `to`
fn copy_tree(from: &Path, to: &Path) -> Result<(), ActivationError> {
    fs::create_dir_all(to).map_err(|e| ActivationError::staging(to, e))?;

    for entry in WalkDir::new(from).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            ActivationError::staging(&path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ActivationError::staging(entry.path(), std::io::Error::other(e)))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ActivationError::staging(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| ActivationError::staging(&target, e))?;
        }
    }

    debug!("Staged {} into {}", from.display(), to.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steplib::catalog::LocalStepLibrary;
    use tempfile::TempDir;

    const DEFAULT: &str = "main";

    struct Fixture {
        temp: TempDir,
        activator: StepActivator,
    }

    impl Fixture {
        fn new(versions: &[&str]) -> Self {
            let temp = TempDir::new().unwrap();
            for version in versions {
                let dir = temp
                    .path()
                    .join("lib/main/steps/xcode-archive")
                    .join(version);
                fs::create_dir_all(dir.join("lib")).unwrap();
                fs::write(
                    dir.join(METADATA_FILE),
                    format!("title: Xcode Archive {}\nis_skippable: true\n", version),
                )
                .unwrap();
                fs::write(dir.join("step.sh"), format!("echo {}\n", version)).unwrap();
                fs::write(dir.join("lib/helper.sh"), "true\n").unwrap();
            }
            let catalog = LocalStepLibrary::new(temp.path().join("lib"));
            let activator = StepActivator::new(Arc::new(catalog), temp.path());
            Self { temp, activator }
        }

        fn activate(&self, composite: &str) -> Result<ActivatedStep, ActivationError> {
            let reference = StepReference::parse(composite, DEFAULT).unwrap();
            self.activator.activate(
                &reference,
                &self.temp.path().join("stage"),
                &self.temp.path().join("meta/nested/step.yml"),
            )
        }
    }

    #[test]
    fn test_activate_version_locks() {
        let fixture = Fixture::new(&["2.3.2", "1.10.1", "2.3.7"]);

        let cases = [
            ("xcode-archive@1", "1.10.1"),
            ("xcode-archive@1.x.x", "1.10.1"),
            ("xcode-archive@2.3", "2.3.7"),
            ("xcode-archive@2.3.x", "2.3.7"),
            ("xcode-archive@2.3.2", "2.3.2"),
        ];
        for (composite, expected) in cases {
            let step = fixture.activate(composite).unwrap();
            assert_eq!(step.version.unwrap().to_string(), expected, "{}", composite);
            assert_eq!(
                step.metadata.title,
                Some(format!("Xcode Archive {}", expected))
            );
        }
    }

    #[test]
    fn test_activate_stages_files_and_copies_metadata() {
        let fixture = Fixture::new(&["1.0.0"]);
        let step = fixture.activate("xcode-archive@1").unwrap();

        let stage = fixture.temp.path().join("stage");
        assert_eq!(step.step_dir, stage);
        assert_eq!(step.entry_point(), stage.join("step.sh"));
        assert!(stage.join("lib/helper.sh").is_file());

        let copied = fixture.temp.path().join("meta/nested/step.yml");
        assert_eq!(step.metadata_path.as_deref(), Some(copied.as_path()));
        assert!(fs::read_to_string(copied).unwrap().contains("Xcode Archive"));
        assert_eq!(step.metadata.is_skippable, Some(true));
    }

    #[test]
    fn test_activate_twice_overwrites() {
        let fixture = Fixture::new(&["1.0.0", "1.1.0"]);
        fixture.activate("xcode-archive@1.0.0").unwrap();
        fixture.activate("xcode-archive@1.1.0").unwrap();

        let script = fs::read_to_string(fixture.temp.path().join("stage/step.sh")).unwrap();
        assert_eq!(script, "echo 1.1.0\n");
    }

    #[test]
    fn test_reused_destination_keeps_nothing_from_previous_step() {
        let fixture = Fixture::new(&["1.0.0"]);
        fixture.activate("xcode-archive@1").unwrap();

        let local = fixture.temp.path().join("steps/lint");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("step.sh"), "echo lint\n").unwrap();

        let step = fixture.activate("path::steps/lint").unwrap();
        assert_eq!(step.metadata, StepMetadata::default());
        assert!(step.metadata_path.is_none());
        assert_eq!(step.entry_point(), fixture.temp.path().join("stage/step.sh"));

        let stage = fixture.temp.path().join("stage");
        assert!(!stage.join(METADATA_FILE).exists());
        assert!(!stage.join("lib/helper.sh").exists());
        assert!(!fixture.temp.path().join("meta/nested/step.yml").exists());
    }

    #[test]
    fn test_unresolvable_steps_are_recoverable() {
        let fixture = Fixture::new(&["1.0.0"]);

        let err = fixture.activate("invalid-step@1").unwrap_err();
        assert!(err.is_recoverable());

        let err = fixture.activate("other-lib::xcode-archive@1").unwrap_err();
        assert!(err.is_recoverable());

        let err = fixture.activate("xcode-archive@3").unwrap_err();
        assert!(matches!(err, ActivationError::Version(VersionError::NoMatch { .. })));
        assert!(err.is_recoverable());

        let err = fixture
            .activate("git::https://example.com/step.git@main")
            .unwrap_err();
        assert!(err.is_recoverable());

        let err = fixture.activate("path::./missing").unwrap_err();
        assert!(matches!(err, ActivationError::LocalStepMissing(_)));
    }

    #[test]
    fn test_malformed_constraints_are_fatal() {
        let fixture = Fixture::new(&["1.0.0"]);

        let err = fixture.activate("xcode-archive").unwrap_err();
        assert!(matches!(
            err,
            ActivationError::Version(VersionError::LatestUnsupported(_))
        ));
        assert!(!err.is_recoverable());

        let err = fixture.activate("xcode-archive@1.0.0.0").unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_activate_local_step() {
        let fixture = Fixture::new(&[]);
        let local = fixture.temp.path().join("steps/lint");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("step.sh"), "echo lint\n").unwrap();

        let step = fixture.activate("path::steps/lint").unwrap();
        assert!(step.version.is_none());
        assert!(step.metadata_path.is_none());
        assert!(step.entry_point().is_file());
    }

    #[test]
    fn test_activate_builtin_creates_destination() {
        let fixture = Fixture::new(&[]);
        let step = fixture.activate("script@1").unwrap();
        assert!(step.step_dir.is_dir());
        assert!(step.version.is_none());
    }
}
