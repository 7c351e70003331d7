use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::model::{LoaderType, Manifest, ProjectTarget};
use crate::core::error::{PacksmithError, PacksmithResult};

pub const MANIFEST_FILE: &str = "packsmith.json";

const CACHE_DIR: &str = "cache";
const CLIENT_DIR: &str = "client";
const SERVER_DIR: &str = "server";

/// Manifest shared by every worker of a batch. Writes hold the lock only for
/// the field assignment itself.
pub type SharedManifest = Arc<Mutex<Manifest>>;

/// Held for the duration of one engine operation on a project.
pub type OperationGuard = OwnedMutexGuard<()>;

/// An open modpack project: its root directory plus the in-memory manifest.
///
/// Layout:
/// - `packsmith.json` : the manifest
/// - `cache/`         : downloaded artifacts, keyed by file name
/// - `client/`        : derived client mods folder
/// - `server/`        : derived server mods folder
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    manifest: SharedManifest,
    operation: Arc<Mutex<()>>,
}

impl Project {
    /// Write an empty manifest into `root` and open it.
    pub async fn init(
        root: &Path,
        name: String,
        minecraft_version: String,
        loader: LoaderType,
    ) -> PacksmithResult<Self> {
        info!(
            "Initializing project '{}' for Minecraft {} ({})",
            name, minecraft_version, loader
        );

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| PacksmithError::io(root, source))?;

        let project = Self::from_manifest(root, Manifest::new(name, minecraft_version, loader));
        project.save().await?;
        Ok(project)
    }

    /// Load `packsmith.json` from `root`.
    pub async fn open(root: &Path) -> PacksmithResult<Self> {
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PacksmithError::ProjectNotInitialized(root.to_path_buf()));
        }

        let json = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|source| PacksmithError::io(&manifest_path, source))?;

        let manifest: Manifest = serde_json::from_str(&json)?;
        manifest.validate()?;

        debug!(
            "Loaded project '{}' with {} mods from {:?}",
            manifest.name,
            manifest.mods.len(),
            root
        );
        Ok(Self::from_manifest(root, manifest))
    }

    pub fn from_manifest(root: &Path, manifest: Manifest) -> Self {
        Self {
            root: root.to_path_buf(),
            manifest: Arc::new(Mutex::new(manifest)),
            operation: Arc::new(Mutex::new(())),
        }
    }

    /// Persist the current manifest. The lock is released before any I/O.
    pub async fn save(&self) -> PacksmithResult<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;

        let manifest_path = self.manifest_path();
        let staging = self.root.join(format!("{MANIFEST_FILE}.tmp"));

        tokio::fs::write(&staging, json)
            .await
            .map_err(|source| PacksmithError::io(&staging, source))?;
        tokio::fs::rename(&staging, &manifest_path)
            .await
            .map_err(|source| PacksmithError::io(&manifest_path, source))?;

        debug!("Saved manifest {:?}", manifest_path);
        Ok(())
    }

    /// Claim exclusive use of this project for one engine operation. A second
    /// caller waits until the first operation has finished.
    pub async fn begin_operation(&self) -> OperationGuard {
        self.operation.clone().lock_owned().await
    }

    pub fn manifest(&self) -> &SharedManifest {
        &self.manifest
    }

    pub async fn snapshot(&self) -> Manifest {
        self.manifest.lock().await.clone()
    }

    pub async fn target(&self) -> ProjectTarget {
        self.manifest.lock().await.target()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn client_dir(&self) -> PathBuf {
        self.root.join(CLIENT_DIR)
    }

    pub fn server_dir(&self) -> PathBuf {
        self.root.join(SERVER_DIR)
    }
}
