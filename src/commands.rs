use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::PacksmithError;
use crate::core::install::{self, InstallReport};
use crate::core::manifest::{LoaderType, ModRecord, Platform, Project, Side};
use crate::core::platform::{self, ModSearchHit};
use crate::core::state::AppState;
use crate::core::updater::{self, UpdateCandidate, UpdateCheck, UpdateReport};

#[derive(Debug, Serialize)]
pub struct ModInfo {
    pub id: String,
    pub platform: Platform,
    pub side: Side,
    pub version: String,
    pub filename: String,
    pub locked: bool,
    pub source: String,
}

impl ModInfo {
    fn from_record(id: &str, record: &ModRecord) -> Self {
        Self {
            id: id.to_string(),
            platform: record.platform,
            side: record.side,
            version: record.version.clone(),
            filename: record.filename.clone(),
            locked: record.locked,
            source: record.source.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
    pub minecraft_version: String,
    pub loader: LoaderType,
    pub mods: Vec<ModInfo>,
}

impl ProjectInfo {
    async fn from_project(project: &Project) -> Self {
        let manifest = project.snapshot().await;
        Self {
            name: manifest.name,
            path: project.root().to_string_lossy().to_string(),
            minecraft_version: manifest.minecraft,
            loader: manifest.loader,
            mods: manifest
                .mods
                .iter()
                .map(|(id, record)| ModInfo::from_record(id, record))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InitProjectPayload {
    pub root: PathBuf,
    pub name: String,
    pub minecraft_version: String,
    pub loader: LoaderType,
}

#[derive(Debug, Deserialize)]
pub struct SearchModsPayload {
    pub query: String,
    pub platform: Platform,
}

#[derive(Debug, Deserialize)]
pub struct AddModPayload {
    pub mod_id: String,
    pub platform: Platform,
    /// Project page; defaults to the platform's page for `mod_id`.
    pub source_url: Option<String>,
    #[serde(default)]
    pub side: Side,
    /// Latest compatible version when absent.
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogFile {
    pub path: String,
    pub contents: String,
}

/// Newest file in `logs_dir`. Daily log names sort by date.
pub async fn get_logs(logs_dir: &Path) -> Result<LogFile, PacksmithError> {
    let mut entries = tokio::fs::read_dir(logs_dir)
        .await
        .map_err(|source| PacksmithError::io(logs_dir, source))?;

    let mut newest: Option<PathBuf> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| PacksmithError::io(logs_dir, source))?
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if newest.as_ref().map_or(true, |current| path.file_name() > current.file_name()) {
            newest = Some(path);
        }
    }

    let path = newest
        .ok_or_else(|| PacksmithError::Other(format!("No log files in {}", logs_dir.display())))?;
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| PacksmithError::io(&path, source))?;
    Ok(LogFile {
        path: path.to_string_lossy().to_string(),
        contents,
    })
}

pub async fn initialize_project(payload: InitProjectPayload) -> Result<ProjectInfo, PacksmithError> {
    let project = Project::init(
        &payload.root,
        payload.name,
        payload.minecraft_version,
        payload.loader,
    )
    .await?;
    Ok(ProjectInfo::from_project(&project).await)
}

pub async fn open_project(root: &Path) -> Result<ProjectInfo, PacksmithError> {
    let project = Project::open(root).await?;
    Ok(ProjectInfo::from_project(&project).await)
}

pub async fn search_mods(
    state: &AppState,
    project: &Project,
    payload: SearchModsPayload,
) -> Result<Vec<ModSearchHit>, PacksmithError> {
    let target = project.target().await;
    platform::search_mods(
        state.platforms.client(payload.platform),
        &state.pool(),
        &payload.query,
        &target,
    )
    .await
}

pub async fn add_mod(
    state: &AppState,
    project: &Project,
    payload: AddModPayload,
) -> Result<ModInfo, PacksmithError> {
    // The id becomes a manifest key; a blank key makes the manifest unloadable.
    if payload.mod_id.trim().is_empty() {
        return Err(PacksmithError::InvalidModId(payload.mod_id));
    }

    let _operation = project.begin_operation().await;
    let target = project.target().await;
    let client = state.platforms.client(payload.platform);

    let version = match payload.version {
        Some(version) => version,
        None => client.latest_version(&payload.mod_id, &target).await?,
    };
    let url = client
        .resolve_download_url(&payload.mod_id, &version, &target)
        .await?;

    let store = state.artifact_store(project);
    let filename = store.ensure_cached(&url, &version).await?;

    let record = ModRecord {
        source: payload
            .source_url
            .unwrap_or_else(|| payload.platform.project_page(&payload.mod_id)),
        platform: payload.platform,
        side: payload.side,
        version,
        url,
        filename,
        locked: false,
    };
    let info = ModInfo::from_record(&payload.mod_id, &record);

    let replaced = project
        .manifest()
        .lock()
        .await
        .mods
        .insert(payload.mod_id.clone(), record);
    if let Some(previous) = replaced.filter(|p| p.filename != info.filename) {
        store.evict(&previous.filename).await?;
    }
    project.save().await?;

    info!("Added {} {} ({})", payload.mod_id, info.version, info.platform);
    Ok(info)
}

pub async fn remove_mod(
    state: &AppState,
    project: &Project,
    mod_id: &str,
) -> Result<(), PacksmithError> {
    let _operation = project.begin_operation().await;
    let filename = match project.manifest().lock().await.mods.get(mod_id) {
        Some(record) => record.filename.clone(),
        None => {
            debug!("Remove of untracked mod {} ignored", mod_id);
            return Ok(());
        }
    };

    state.artifact_store(project).evict(&filename).await?;
    project.manifest().lock().await.mods.remove(mod_id);
    project.save().await?;

    info!("Removed {}", mod_id);
    Ok(())
}

pub async fn change_mod_side(
    project: &Project,
    mod_id: &str,
    side: Side,
) -> Result<(), PacksmithError> {
    let _operation = project.begin_operation().await;
    let changed = match project.manifest().lock().await.mods.get_mut(mod_id) {
        Some(record) => {
            record.side = side;
            true
        }
        None => false,
    };
    if changed {
        project.save().await?;
    }
    Ok(())
}

pub async fn change_mod_locked(
    project: &Project,
    mod_id: &str,
    locked: bool,
) -> Result<(), PacksmithError> {
    let _operation = project.begin_operation().await;
    let changed = match project.manifest().lock().await.mods.get_mut(mod_id) {
        Some(record) => {
            record.locked = locked;
            true
        }
        None => false,
    };
    if changed {
        project.save().await?;
    }
    Ok(())
}

pub async fn get_mod_versions(
    state: &AppState,
    project: &Project,
    mod_id: &str,
) -> Result<Vec<String>, PacksmithError> {
    let (platform, target) = {
        let manifest = project.manifest().lock().await;
        let record = manifest
            .mods
            .get(mod_id)
            .ok_or_else(|| PacksmithError::ModNotFound(mod_id.to_string()))?;
        (record.platform, manifest.target())
    };
    state
        .platforms
        .client(platform)
        .list_versions(mod_id, &target)
        .await
}

pub async fn change_mod_version(
    state: &AppState,
    project: &Project,
    mod_id: &str,
    version: &str,
) -> Result<ModInfo, PacksmithError> {
    let _operation = project.begin_operation().await;
    let (platform, previous, target) = {
        let manifest = project.manifest().lock().await;
        let record = manifest
            .mods
            .get(mod_id)
            .ok_or_else(|| PacksmithError::ModNotFound(mod_id.to_string()))?;
        (record.platform, record.filename.clone(), manifest.target())
    };

    let url = state
        .platforms
        .client(platform)
        .resolve_download_url(mod_id, version, &target)
        .await?;
    let store = state.artifact_store(project);
    let filename = store.ensure_cached(&url, version).await?;
    if !previous.is_empty() && previous != filename {
        store.evict(&previous).await?;
    }

    let info = {
        let mut manifest = project.manifest().lock().await;
        let record = manifest
            .mods
            .get_mut(mod_id)
            .ok_or_else(|| PacksmithError::ModNotFound(mod_id.to_string()))?;
        record.version = version.to_string();
        record.url = url;
        record.filename = filename;
        ModInfo::from_record(mod_id, record)
    };
    project.save().await?;

    info!("Pinned {} to {}", mod_id, version);
    Ok(info)
}

/// Check the given mods, or every tracked mod when `mod_ids` is `None`.
pub async fn check_mods_updates(
    state: &AppState,
    project: &Project,
    mod_ids: Option<Vec<String>>,
) -> Result<UpdateCheck, PacksmithError> {
    let mod_ids = match mod_ids {
        Some(ids) => ids,
        None => project.snapshot().await.mods.into_keys().collect(),
    };
    updater::check_updates(&state.context(project), &mod_ids).await
}

pub async fn update_mods(
    state: &AppState,
    project: &Project,
    candidates: Vec<UpdateCandidate>,
) -> Result<UpdateReport, PacksmithError> {
    updater::apply_updates(&state.context(project), candidates).await
}

pub async fn install_mods(
    state: &AppState,
    project: &Project,
) -> Result<InstallReport, PacksmithError> {
    install::install_mods(&state.context(project)).await
}
