use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::settings::{default_data_dir, logs_dir_in, Settings};
use crate::core::cache::{ArtifactStore, HttpArtifactStore};
use crate::core::context::SyncContext;
use crate::core::error::PacksmithResult;
use crate::core::http::build_http_client;
use crate::core::manifest::Project;
use crate::core::platform::Platforms;
use crate::core::pool::WorkerPool;

/// Builds the artifact store for a given project.
pub type StoreFactory = Arc<dyn Fn(&Project) -> Arc<dyn ArtifactStore> + Send + Sync>;

pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: Settings,
    pub platforms: Platforms,
    /// Fired on Ctrl-C; every batch started from this state observes it.
    pub cancel: CancellationToken,
    store_factory: StoreFactory,
}

impl AppState {
    pub fn new(settings: Settings) -> PacksmithResult<Self> {
        let http_client = build_http_client(Duration::from_secs(settings.http_timeout_secs))?;
        let platforms = Platforms::from_settings(http_client.clone(), &settings);

        let store_factory: StoreFactory = Arc::new(move |project: &Project| {
            Arc::new(HttpArtifactStore::new(http_client.clone(), project.cache_dir()))
                as Arc<dyn ArtifactStore>
        });

        Ok(Self {
            data_dir: default_data_dir(),
            settings,
            platforms,
            cancel: CancellationToken::new(),
            store_factory,
        })
    }

    /// Swap the platform clients and artifact store, keeping everything else.
    pub fn with_collaborators(mut self, platforms: Platforms, store_factory: StoreFactory) -> Self {
        self.platforms = platforms;
        self.store_factory = store_factory;
        self
    }

    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.settings.max_concurrency).with_cancellation(self.cancel.clone())
    }

    pub fn artifact_store(&self, project: &Project) -> Arc<dyn ArtifactStore> {
        (self.store_factory)(project)
    }

    pub fn context(&self, project: &Project) -> SyncContext {
        SyncContext {
            project: project.clone(),
            platforms: self.platforms.clone(),
            store: self.artifact_store(project),
            pool: self.pool(),
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        logs_dir_in(&self.data_dir)
    }
}
