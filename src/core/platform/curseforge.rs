use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::client::{ModSearchHit, PlatformClient};
use crate::core::error::{PacksmithError, PacksmithResult};
use crate::core::manifest::{LoaderType, Platform, ProjectTarget};

pub const CURSEFORGE_API_BASE: &str = "https://api.curseforge.com/v1";

const MINECRAFT_GAME_ID: &str = "432";
const MC_MODS_CLASS_ID: &str = "6";
const SEARCH_PAGE_SIZE: &str = "5";
const FILES_PAGE_SIZE: &str = "20";
const ALPHA_RELEASE: u8 = 3;

/// CurseForge `modLoaderType` ids.
fn loader_type_id(loader: LoaderType) -> &'static str {
    match loader {
        LoaderType::Forge => "1",
        LoaderType::Fabric => "4",
        LoaderType::Quilt => "5",
        LoaderType::NeoForge => "6",
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurseMod {
    id: u64,
    name: String,
    slug: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    download_count: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseFile {
    pub id: u64,
    pub file_name: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub release_type: u8,
}

pub struct CurseForgeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CurseForgeClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> PacksmithResult<T> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PacksmithError::platform(Platform::CurseForge, "API key is not configured")
        })?;

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .query(query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PacksmithError::platform(
                Platform::CurseForge,
                format!("{} returned {}", url, resp.status()),
            ));
        }

        let body = resp
            .json::<Envelope<T>>()
            .await
            .map_err(|e| PacksmithError::platform(Platform::CurseForge, e.to_string()))?;
        Ok(body.data)
    }

    /// Mod ids are slugs; the API wants the numeric project id.
    async fn project_id(&self, slug: &str) -> PacksmithResult<u64> {
        let mods: Vec<CurseMod> = self
            .get(
                "/mods/search",
                &[
                    ("gameId", MINECRAFT_GAME_ID),
                    ("classId", MC_MODS_CLASS_ID),
                    ("slug", slug),
                ],
            )
            .await?;

        mods.into_iter()
            .find(|m| m.slug == slug)
            .map(|m| m.id)
            .ok_or_else(|| PacksmithError::ModNotFound(slug.to_string()))
    }

    async fn files(&self, project_id: u64, target: &ProjectTarget) -> PacksmithResult<Vec<CurseFile>> {
        let files: Vec<CurseFile> = self
            .get(
                &format!("/mods/{project_id}/files"),
                &[
                    ("gameVersion", target.minecraft_version.as_str()),
                    ("modLoaderType", loader_type_id(target.loader)),
                    ("pageSize", FILES_PAGE_SIZE),
                ],
            )
            .await?;

        Ok(files
            .into_iter()
            .filter(|f| f.release_type != ALPHA_RELEASE)
            .collect())
    }
}

/// Files with distribution disabled carry no `downloadUrl`; the site endpoint still serves them.
fn file_download_url(project_id: u64, file: &CurseFile) -> String {
    match &file.download_url {
        Some(url) if !url.is_empty() => url.clone(),
        _ => format!(
            "https://www.curseforge.com/api/v1/mods/{}/files/{}/download",
            project_id, file.id
        ),
    }
}

#[async_trait]
impl PlatformClient for CurseForgeClient {
    fn platform(&self) -> Platform {
        Platform::CurseForge
    }

    async fn search(
        &self,
        query: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<Vec<ModSearchHit>> {
        info!("Searching CurseForge for '{}'", query);

        let mods: Vec<CurseMod> = self
            .get(
                "/mods/search",
                &[
                    ("gameId", MINECRAFT_GAME_ID),
                    ("classId", MC_MODS_CLASS_ID),
                    ("searchFilter", query),
                    ("gameVersion", target.minecraft_version.as_str()),
                    ("modLoaderType", loader_type_id(target.loader)),
                    ("pageSize", SEARCH_PAGE_SIZE),
                ],
            )
            .await?;

        Ok(mods
            .into_iter()
            .map(|m| ModSearchHit {
                url: Platform::CurseForge.project_page(&m.slug),
                id: m.slug,
                name: m.name,
                description: m.summary,
                downloads: format!("{}", m.download_count as u64),
                client_side: String::new(),
                server_side: String::new(),
                versions: Vec::new(),
            })
            .collect())
    }

    async fn list_versions(
        &self,
        mod_id: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<Vec<String>> {
        let project_id = self.project_id(mod_id).await?;
        let versions: Vec<String> = self
            .files(project_id, target)
            .await?
            .into_iter()
            .map(|f| f.file_name)
            .collect();

        debug!("{} compatible CurseForge files for {}", versions.len(), mod_id);
        Ok(versions)
    }

    async fn resolve_download_url(
        &self,
        mod_id: &str,
        version: &str,
        target: &ProjectTarget,
    ) -> PacksmithResult<String> {
        let project_id = self.project_id(mod_id).await?;

        self.files(project_id, target)
            .await?
            .iter()
            .find(|f| f.file_name == version)
            .map(|f| file_download_url(project_id, f))
            .ok_or_else(|| PacksmithError::VersionNotFound {
                mod_id: mod_id.to_string(),
                version: version.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target() -> ProjectTarget {
        ProjectTarget {
            minecraft_version: "1.20.1".into(),
            loader: LoaderType::Forge,
        }
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mods/search"))
            .and(query_param("slug", "jei"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": 238222, "name": "JEI", "slug": "jei", "summary": "", "downloadCount": 10.0 }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mods/238222/files"))
            .and(query_param("modLoaderType", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": 3, "fileName": "jei-15.3.0-alpha.jar", "downloadUrl": null, "releaseType": 3 },
                    { "id": 2, "fileName": "jei-15.2.0.27.jar", "downloadUrl": "https://edge.forgecdn.net/files/2/jei-15.2.0.27.jar", "releaseType": 1 },
                    { "id": 1, "fileName": "jei-15.1.0.jar", "downloadUrl": null, "releaseType": 2 }
                ]
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn alpha_files_are_hidden_and_file_names_are_versions() {
        let server = server().await;
        let client = CurseForgeClient::new(reqwest::Client::new(), server.uri(), Some("secret".into()));

        let versions = client.list_versions("jei", &target()).await.unwrap();

        assert_eq!(versions, vec!["jei-15.2.0.27.jar", "jei-15.1.0.jar"]);
    }

    #[tokio::test]
    async fn download_url_falls_back_to_site_endpoint() {
        let server = server().await;
        let client = CurseForgeClient::new(reqwest::Client::new(), server.uri(), Some("secret".into()));

        let direct = client
            .resolve_download_url("jei", "jei-15.2.0.27.jar", &target())
            .await
            .unwrap();
        assert_eq!(direct, "https://edge.forgecdn.net/files/2/jei-15.2.0.27.jar");

        let fallback = client
            .resolve_download_url("jei", "jei-15.1.0.jar", &target())
            .await
            .unwrap();
        assert_eq!(
            fallback,
            "https://www.curseforge.com/api/v1/mods/238222/files/1/download"
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_a_platform_error() {
        let client = CurseForgeClient::new(reqwest::Client::new(), "http://127.0.0.1:9".into(), None);

        let err = client.list_versions("jei", &target()).await.unwrap_err();

        assert!(matches!(err, PacksmithError::Platform { .. }));
    }
}
