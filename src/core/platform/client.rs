use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CurseForgeClient, ModrinthClient};
use crate::core::error::{PacksmithError, PacksmithResult};
use crate::core::manifest::{Platform, ProjectTarget};
use crate::core::state::Settings;

/// One search result, already filtered to the project's runtime + loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModSearchHit {
    pub id: String,
    pub name: String,
    pub description: String,
    pub downloads: String,
    /// Project page; recorded as the mod's source when added.
    pub url: String,
    pub client_side: String,
    pub server_side: String,
    /// Compatible versions, newest first. Filled by the search fan-out.
    pub versions: Vec<String>,
}

/// Query surface of one mod hosting platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Search hits without their version lists.
    async fn search(&self, query: &str, target: &ProjectTarget)
        -> PacksmithResult<Vec<ModSearchHit>>;

    /// Versions compatible with `target`, newest first.
    async fn list_versions(&self, mod_id: &str, target: &ProjectTarget)
        -> PacksmithResult<Vec<String>>;

    async fn latest_version(&self, mod_id: &str, target: &ProjectTarget) -> PacksmithResult<String> {
        self.list_versions(mod_id, target)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PacksmithError::VersionNotFound {
                mod_id: mod_id.to_string(),
                version: "latest".into(),
            })
    }

    /// Download URL of `version`; `VersionNotFound` when no compatible file matches.
    async fn resolve_download_url(
        &self,
        mod_id: &str,
        version: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<String>;
}

/// Dispatch from a record's platform tag to its client.
#[derive(Clone)]
pub struct Platforms {
    modrinth: Arc<dyn PlatformClient>,
    curseforge: Arc<dyn PlatformClient>,
}

impl Platforms {
    pub fn new(modrinth: Arc<dyn PlatformClient>, curseforge: Arc<dyn PlatformClient>) -> Self {
        Self {
            modrinth,
            curseforge,
        }
    }

    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Self {
        Self::new(
            Arc::new(ModrinthClient::new(
                client.clone(),
                settings.modrinth_api_base.clone(),
            )),
            Arc::new(CurseForgeClient::new(
                client,
                settings.curseforge_api_base.clone(),
                settings.curseforge_api_key.clone(),
            )),
        )
    }

    pub fn client(&self, platform: Platform) -> Arc<dyn PlatformClient> {
        match platform {
            Platform::Modrinth => Arc::clone(&self.modrinth),
            Platform::CurseForge => Arc::clone(&self.curseforge),
        }
    }
}
