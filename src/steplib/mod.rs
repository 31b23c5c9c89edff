//! Step library access: references, version locking, catalogs and activation

pub mod activator;
pub mod catalog;
pub mod reference;
pub mod version;

pub use activator::{ActivatedStep, ActivationError, StepActivator};
pub use catalog::{ArtifactBundle, ArtifactCatalog, CatalogError, LocalStepLibrary, StepMetadata};
pub use reference::{ReferenceError, StepReference, StepSource};
pub use version::{resolve_version, VersionConstraint, VersionError};
