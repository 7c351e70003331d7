pub mod model;
pub mod project;

pub use model::{LoaderType, Manifest, ModRecord, Platform, ProjectTarget, Side};
pub use project::{OperationGuard, Project, SharedManifest, MANIFEST_FILE};
