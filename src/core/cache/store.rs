use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::error::{PacksmithError, PacksmithResult};

/// Project-local artifact cache, keyed by file name.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether `filename` is present in the cache.
    async fn contains(&self, filename: &str) -> bool;

    /// Make sure the artifact behind `url` is cached and return its file name.
    async fn ensure_cached(&self, url: &str, version_hint: &str) -> PacksmithResult<String>;

    /// Remove a cached artifact. A missing file is not an error.
    async fn evict(&self, filename: &str) -> PacksmithResult<()>;

    /// Copy a cached artifact to `destination`, flushed to disk.
    async fn copy_into(&self, filename: &str, destination: &Path) -> PacksmithResult<()>;
}

/// Cache directory populated over HTTP.
pub struct HttpArtifactStore {
    client: Client,
    cache_dir: PathBuf,
}

impl HttpArtifactStore {
    pub fn new(client: Client, cache_dir: PathBuf) -> Self {
        Self { client, cache_dir }
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(filename)
    }

    async fn fetch(&self, url: &str, version_hint: &str) -> PacksmithResult<String> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|source| PacksmithError::io(&self.cache_dir, source))?;

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PacksmithError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let name = resolve_filename(response.url(), version_hint).ok_or_else(|| {
            PacksmithError::UndeterminedFilename {
                url: url.to_string(),
            }
        })?;

        let dest = self.path(&name);
        let partial = self.path(&format!("{name}.part"));

        if let Err(e) = stream_to_file(response, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|source| PacksmithError::io(&dest, source))?;

        info!("Downloaded {} -> {:?}", url, dest);
        Ok(name)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn contains(&self, filename: &str) -> bool {
        if filename.is_empty() {
            return false;
        }
        tokio::fs::try_exists(self.path(filename))
            .await
            .unwrap_or(false)
    }

    async fn ensure_cached(&self, url: &str, version_hint: &str) -> PacksmithResult<String> {
        let parsed = Url::parse(url).map_err(|e| PacksmithError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(name) = filename_from_url(&parsed) {
            if self.contains(&name).await {
                debug!("Cache hit for {} ({})", url, name);
                return Ok(name);
            }
        }

        self.fetch(url, version_hint).await
    }

    async fn evict(&self, filename: &str) -> PacksmithResult<()> {
        // An empty name would resolve to the cache directory itself.
        if filename.is_empty() {
            return Ok(());
        }

        let path = self.path(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Evicted {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PacksmithError::io(path, source)),
        }
    }

    async fn copy_into(&self, filename: &str, destination: &Path) -> PacksmithResult<()> {
        let source_path = self.path(filename);

        tokio::fs::copy(&source_path, destination)
            .await
            .map_err(|source| PacksmithError::io(&source_path, source))?;

        // Durability flush; handle dropped right after.
        {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(destination)
                .await
                .map_err(|source| PacksmithError::io(destination, source))?;
            file.sync_all()
                .await
                .map_err(|source| PacksmithError::io(destination, source))?;
        }

        debug!("Copied {:?} -> {:?}", source_path, destination);
        Ok(())
    }
}

async fn stream_to_file(response: reqwest::Response, dest: &Path) -> PacksmithResult<()> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|source| PacksmithError::io(dest, source))?;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|source| PacksmithError::io(dest, source))?;
    }

    file.flush()
        .await
        .map_err(|source| PacksmithError::io(dest, source))?;
    Ok(())
}

/// Last path segment of `url`, unless it is the generic `download` endpoint.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() || segment == "download" {
        return None;
    }
    sanitize(segment)
}

/// File name for a finished response: the final URL first, then a `.jar` version hint.
pub fn resolve_filename(final_url: &Url, version_hint: &str) -> Option<String> {
    if let Some(name) = filename_from_url(final_url) {
        return Some(name);
    }

    if version_hint.ends_with(".jar") {
        return sanitize(version_hint);
    }

    warn!("Could not determine filename for {}", final_url);
    None
}

fn sanitize(name: &str) -> Option<String> {
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(dir: &Path) -> HttpArtifactStore {
        HttpArtifactStore::new(Client::new(), dir.join("cache"))
    }

    #[test]
    fn filename_resolution_rules() {
        let direct = Url::parse("https://cdn.modrinth.com/data/AANobbMI/versions/x/sodium-0.5.3.jar")
            .unwrap();
        assert_eq!(resolve_filename(&direct, "0.5.3").as_deref(), Some("sodium-0.5.3.jar"));

        let endpoint = Url::parse("https://www.curseforge.com/api/v1/mods/1/files/2/download").unwrap();
        assert_eq!(resolve_filename(&endpoint, "jei-15.2.jar").as_deref(), Some("jei-15.2.jar"));
        assert_eq!(resolve_filename(&endpoint, "15.2"), None);
        assert_eq!(resolve_filename(&endpoint, "../evil.jar"), None);
    }

    #[tokio::test]
    async fn downloads_into_cache_under_url_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/sodium-0.5.3.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let name = store
            .ensure_cached(&format!("{}/files/sodium-0.5.3.jar", server.uri()), "0.5.3")
            .await
            .unwrap();

        assert_eq!(name, "sodium-0.5.3.jar");
        let bytes = tokio::fs::read(store.path(&name)).await.unwrap();
        assert_eq!(bytes, b"jar-bytes");
        assert!(!store.path("sodium-0.5.3.jar.part").exists());
    }

    #[tokio::test]
    async fn download_endpoint_falls_back_to_version_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/mods/238222/files/5/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jei".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let url = format!("{}/api/v1/mods/238222/files/5/download", server.uri());

        let name = store.ensure_cached(&url, "jei-15.2.0.27.jar").await.unwrap();
        assert_eq!(name, "jei-15.2.0.27.jar");

        let err = store.ensure_cached(&url, "15.2.0.27").await.unwrap_err();
        assert!(matches!(err, PacksmithError::UndeterminedFilename { .. }));
    }

    #[tokio::test]
    async fn redirect_target_names_the_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/7/download"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/cdn/create-0.5.1.jar", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cdn/create-0.5.1.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"create".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let name = store
            .ensure_cached(&format!("{}/files/7/download", server.uri()), "")
            .await
            .unwrap();
        assert_eq!(name, "create-0.5.1.jar");
    }

    #[tokio::test]
    async fn non_success_status_is_a_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path())
            .ensure_cached(&format!("{}/missing.jar", server.uri()), "1.0")
            .await
            .unwrap_err();

        assert!(matches!(err, PacksmithError::DownloadFailed { status: 404, .. }));
    }

    #[tokio::test]
    async fn cached_artifact_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        tokio::fs::create_dir_all(dir.path().join("cache")).await.unwrap();
        tokio::fs::write(store.path("lithium.jar"), b"cached").await.unwrap();

        let name = store
            .ensure_cached(&format!("{}/lithium.jar", server.uri()), "")
            .await
            .unwrap();
        assert_eq!(name, "lithium.jar");
    }

    #[tokio::test]
    async fn evict_tolerates_missing_and_empty_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        tokio::fs::create_dir_all(dir.path().join("cache")).await.unwrap();
        tokio::fs::write(store.path("old.jar"), b"old").await.unwrap();

        store.evict("old.jar").await.unwrap();
        store.evict("old.jar").await.unwrap();
        store.evict("").await.unwrap();

        assert!(!store.path("old.jar").exists());
        assert!(dir.path().join("cache").is_dir());
    }

    #[tokio::test]
    async fn copy_into_duplicates_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        tokio::fs::create_dir_all(dir.path().join("cache")).await.unwrap();
        tokio::fs::write(store.path("a.jar"), b"payload").await.unwrap();

        let dest = dir.path().join("a-copy.jar");
        store.copy_into("a.jar", &dest).await.unwrap();

        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
    }
}
