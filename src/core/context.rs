use std::sync::Arc;

use crate::core::cache::ArtifactStore;
use crate::core::manifest::Project;
use crate::core::platform::Platforms;
use crate::core::pool::WorkerPool;

/// Everything a batch operation needs. Cheap to clone into worker tasks.
#[derive(Clone)]
pub struct SyncContext {
    pub project: Project,
    pub platforms: Platforms,
    pub store: Arc<dyn ArtifactStore>,
    pub pool: WorkerPool,
}
