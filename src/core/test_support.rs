//! In-memory collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::cache::ArtifactStore;
use crate::core::context::SyncContext;
use crate::core::error::{PacksmithError, PacksmithResult};
use crate::core::manifest::{LoaderType, Manifest, ModRecord, Platform, Project, ProjectTarget, Side};
use crate::core::platform::{ModSearchHit, PlatformClient, Platforms};
use crate::core::pool::WorkerPool;

pub fn artifact_url(mod_id: &str, version: &str) -> String {
    format!("https://cdn.example/{mod_id}/{mod_id}-{version}.jar")
}

pub fn artifact_name(mod_id: &str, version: &str) -> String {
    format!("{mod_id}-{version}.jar")
}

pub fn record(mod_id: &str, version: &str, side: Side) -> ModRecord {
    ModRecord {
        source: Platform::Modrinth.project_page(mod_id),
        platform: Platform::Modrinth,
        side,
        version: version.to_string(),
        url: artifact_url(mod_id, version),
        filename: artifact_name(mod_id, version),
        locked: false,
    }
}

pub fn project(root: &Path, mods: Vec<(&str, ModRecord)>) -> Project {
    let mut manifest = Manifest::new("test".into(), "1.20.1".into(), LoaderType::Fabric);
    for (id, record) in mods {
        manifest.mods.insert(id.to_string(), record);
    }
    Project::from_manifest(root, manifest)
}

pub fn context(
    project: &Project,
    platform: Arc<FakePlatform>,
    store: Arc<FakeStore>,
    workers: usize,
) -> SyncContext {
    SyncContext {
        project: project.clone(),
        platforms: Platforms::new(platform.clone(), platform),
        store,
        pool: WorkerPool::new(workers),
    }
}

/// Scripted platform: fixed version lists per mod, optional failures.
#[derive(Default)]
pub struct FakePlatform {
    versions: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    delay: Duration,
    queried: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mod(mut self, mod_id: &str, versions: &[&str]) -> Self {
        self.versions.insert(
            mod_id.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn with_failure(mut self, mod_id: &str) -> Self {
        self.failing.insert(mod_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every mod id passed to `list_versions`, in call order.
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    fn versions_of(&self, mod_id: &str) -> PacksmithResult<Vec<String>> {
        if self.failing.contains(mod_id) {
            return Err(PacksmithError::platform("fake", "scripted failure"));
        }
        self.versions
            .get(mod_id)
            .cloned()
            .ok_or_else(|| PacksmithError::ModNotFound(mod_id.to_string()))
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    fn platform(&self) -> Platform {
        Platform::Modrinth
    }

    async fn search(
        &self,
        query: &str,
        _target: &ProjectTarget,
    ) -> PacksmithResult<Vec<ModSearchHit>> {
        let mut ids: Vec<&String> = self.versions.keys().chain(self.failing.iter()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter(|id| id.contains(query))
            .map(|id| ModSearchHit {
                id: id.clone(),
                name: id.clone(),
                description: String::new(),
                downloads: "0".into(),
                url: Platform::Modrinth.project_page(id),
                client_side: "required".into(),
                server_side: "optional".into(),
                versions: Vec::new(),
            })
            .collect())
    }

    async fn list_versions(
        &self,
        mod_id: &str,
        _target: &ProjectTarget,
    ) -> PacksmithResult<Vec<String>> {
        self.queried.lock().unwrap().push(mod_id.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.versions_of(mod_id)
    }

    async fn resolve_download_url(
        &self,
        mod_id: &str,
        version: &str,
        _target: &ProjectTarget,
    ) -> PacksmithResult<String> {
        if self.versions_of(mod_id)?.iter().any(|v| v == version) {
            Ok(artifact_url(mod_id, version))
        } else {
            Err(PacksmithError::VersionNotFound {
                mod_id: mod_id.to_string(),
                version: version.to_string(),
            })
        }
    }
}

/// Cache that "downloads" by remembering names; copies write real files.
#[derive(Default)]
pub struct FakeStore {
    cached: Mutex<HashSet<String>>,
    evicted: Mutex<Vec<String>>,
    downloads: AtomicUsize,
    failing_urls: HashSet<String>,
    failing_copies: HashSet<String>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cached(self, filename: &str) -> Self {
        self.cached.lock().unwrap().insert(filename.to_string());
        self
    }

    pub fn with_failing_url(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub fn with_failing_copy(mut self, filename: &str) -> Self {
        self.failing_copies.insert(filename.to_string());
        self
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn evicted(&self) -> Vec<String> {
        self.evicted.lock().unwrap().clone()
    }

    pub fn is_cached(&self, filename: &str) -> bool {
        self.cached.lock().unwrap().contains(filename)
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn contains(&self, filename: &str) -> bool {
        self.is_cached(filename)
    }

    async fn ensure_cached(&self, url: &str, _version_hint: &str) -> PacksmithResult<String> {
        if self.failing_urls.contains(url) {
            return Err(PacksmithError::DownloadFailed {
                url: url.to_string(),
                status: 500,
            });
        }
        let filename = url.rsplit('/').next().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(PacksmithError::UndeterminedFilename {
                url: url.to_string(),
            });
        }

        let mut cached = self.cached.lock().unwrap();
        if cached.insert(filename.clone()) {
            self.downloads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(filename)
    }

    async fn evict(&self, filename: &str) -> PacksmithResult<()> {
        if filename.is_empty() {
            return Ok(());
        }
        self.cached.lock().unwrap().remove(filename);
        self.evicted.lock().unwrap().push(filename.to_string());
        Ok(())
    }

    async fn copy_into(&self, filename: &str, destination: &Path) -> PacksmithResult<()> {
        if self.failing_copies.contains(filename) || !self.is_cached(filename) {
            return Err(PacksmithError::io(
                destination,
                std::io::Error::new(std::io::ErrorKind::NotFound, filename.to_string()),
            ));
        }
        tokio::fs::write(destination, filename.as_bytes())
            .await
            .map_err(|source| PacksmithError::io(destination, source))
    }
}
