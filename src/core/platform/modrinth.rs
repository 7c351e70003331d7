use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::client::{ModSearchHit, PlatformClient};
use crate::core::error::{PacksmithError, PacksmithResult};
use crate::core::manifest::{Platform, ProjectTarget};

pub const MODRINTH_API_BASE: &str = "https://api.modrinth.com/v2";

const SEARCH_LIMIT: &str = "5";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    slug: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    client_side: String,
    #[serde(default)]
    server_side: String,
    #[serde(default)]
    downloads: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectVersion {
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    pub version_number: String,
    #[serde(default)]
    pub files: Vec<VersionFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionFile {
    pub url: String,
    #[serde(default)]
    pub primary: bool,
}

impl ProjectVersion {
    pub fn is_compatible(&self, target: &ProjectTarget) -> bool {
        let loader = target.loader.to_string();
        self.game_versions.iter().any(|v| v == &target.minecraft_version)
            && self.loaders.iter().any(|l| l == &loader)
    }

    /// Primary file URL, falling back to the first file.
    pub fn download_url(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
            .map(|f| f.url.as_str())
    }
}

pub struct ModrinthClient {
    client: reqwest::Client,
    base_url: String,
}

impl ModrinthClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/project/{mod_id}/version`, with `mod_id` escaped as a single segment.
    fn project_versions_url(&self, mod_id: &str) -> PacksmithResult<Url> {
        let invalid = |reason: String| PacksmithError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["project", mod_id, "version"]);
        Ok(url)
    }

    async fn fetch_versions(&self, mod_id: &str) -> PacksmithResult<Vec<ProjectVersion>> {
        let url = self.project_versions_url(mod_id)?;
        debug!("Fetching Modrinth versions: {}", url);

        let resp = self.client.get(url.clone()).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PacksmithError::ModNotFound(mod_id.to_string()));
        }
        if !resp.status().is_success() {
            return Err(PacksmithError::platform(
                Platform::Modrinth,
                format!("{} returned {}", url, resp.status()),
            ));
        }

        let versions = resp
            .json::<Vec<ProjectVersion>>()
            .await
            .map_err(|e| PacksmithError::platform(Platform::Modrinth, e.to_string()))?;
        Ok(versions)
    }
}

#[async_trait]
impl PlatformClient for ModrinthClient {
    fn platform(&self) -> Platform {
        Platform::Modrinth
    }

    async fn search(
        &self,
        query: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<Vec<ModSearchHit>> {
        info!("Searching Modrinth for '{}'", query);

        let facets = format!(
            r#"[["project_type:mod"],["versions:{}"],["categories:{}"]]"#,
            target.minecraft_version, target.loader
        );
        let url = format!("{}/search", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("query", query), ("limit", SEARCH_LIMIT), ("facets", facets.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PacksmithError::platform(
                Platform::Modrinth,
                format!("search returned {}", resp.status()),
            ));
        }

        let data = resp
            .json::<SearchResponse>()
            .await
            .map_err(|e| PacksmithError::platform(Platform::Modrinth, e.to_string()))?;

        Ok(data
            .hits
            .into_iter()
            .map(|hit| ModSearchHit {
                url: Platform::Modrinth.project_page(&hit.slug),
                id: hit.slug,
                name: hit.title,
                description: hit.description,
                downloads: hit.downloads.to_string(),
                client_side: hit.client_side,
                server_side: hit.server_side,
                versions: Vec::new(),
            })
            .collect())
    }

    async fn list_versions(
        &self,
        mod_id: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<Vec<String>> {
        let versions: Vec<String> = self
            .fetch_versions(mod_id)
            .await?
            .into_iter()
            .filter(|v| v.is_compatible(target))
            .map(|v| v.version_number)
            .collect();

        debug!("{} compatible Modrinth versions for {}", versions.len(), mod_id);
        Ok(versions)
    }

    async fn resolve_download_url(
        &self,
        mod_id: &str,
        version: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<String> {
        let versions = self.fetch_versions(mod_id).await?;

        versions
            .iter()
            .filter(|v| v.version_number == version && v.is_compatible(target))
            .find_map(|v| v.download_url())
            .map(str::to_string)
            .ok_or_else(|| PacksmithError::VersionNotFound {
                mod_id: mod_id.to_string(),
                version: version.to_string(),
            })
    }
}
