use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::error::{PacksmithError, PacksmithResult};

const CURSEFORGE_SITE: &str = "https://www.curseforge.com";

/// Supported mod loaders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Forge,
    Fabric,
    NeoForge,
    Quilt,
}

impl std::fmt::Display for LoaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::Fabric => write!(f, "fabric"),
            LoaderType::NeoForge => write!(f, "neoforge"),
            LoaderType::Quilt => write!(f, "quilt"),
        }
    }
}

impl FromStr for LoaderType {
    type Err = PacksmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forge" => Ok(LoaderType::Forge),
            "fabric" => Ok(LoaderType::Fabric),
            "neoforge" => Ok(LoaderType::NeoForge),
            "quilt" => Ok(LoaderType::Quilt),
            other => Err(PacksmithError::InvalidLoader(other.to_string())),
        }
    }
}

/// Where an installed mod ends up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
    #[default]
    Both,
}

impl Side {
    pub fn on_client(self) -> bool {
        matches!(self, Side::Client | Side::Both)
    }

    pub fn on_server(self) -> bool {
        matches!(self, Side::Server | Side::Both)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Server => write!(f, "server"),
            Side::Both => write!(f, "both"),
        }
    }
}

impl FromStr for Side {
    type Err = PacksmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Side::Client),
            "server" => Ok(Side::Server),
            "both" => Ok(Side::Both),
            other => Err(PacksmithError::InvalidSide(other.to_string())),
        }
    }
}

/// Mod hosting platform a record was added from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Modrinth,
    CurseForge,
}

impl Platform {
    /// Derive the platform from a project page URL. Only used for records
    /// written before the platform was stored explicitly.
    pub fn from_source(source: &str) -> Self {
        if source.starts_with(CURSEFORGE_SITE) {
            Platform::CurseForge
        } else {
            Platform::Modrinth
        }
    }

    /// Public project page for a mod id on this platform.
    pub fn project_page(self, mod_id: &str) -> String {
        match self {
            Platform::Modrinth => format!("https://modrinth.com/mod/{mod_id}"),
            Platform::CurseForge => format!("{CURSEFORGE_SITE}/minecraft/mc-mods/{mod_id}"),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Modrinth => write!(f, "modrinth"),
            Platform::CurseForge => write!(f, "curseforge"),
        }
    }
}

impl FromStr for Platform {
    type Err = PacksmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modrinth" => Ok(Platform::Modrinth),
            "curseforge" => Ok(Platform::CurseForge),
            other => Err(PacksmithError::UnknownPlatform(other.to_string())),
        }
    }
}

/// One tracked mod inside `packsmith.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "StoredModRecord")]
pub struct ModRecord {
    /// Project page the mod was added from.
    pub source: String,
    pub platform: Platform,
    pub side: Side,
    pub version: String,
    /// Resolved download URL of `version`.
    pub url: String,
    /// Artifact name inside the project cache.
    pub filename: String,
    /// Locked mods are never checked for updates.
    pub locked: bool,
}

/// On-disk shape; older manifests carry no `platform`.
#[derive(Deserialize)]
struct StoredModRecord {
    #[serde(default)]
    source: String,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default)]
    side: Side,
    #[serde(default)]
    version: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    locked: bool,
}

impl From<StoredModRecord> for ModRecord {
    fn from(stored: StoredModRecord) -> Self {
        let platform = stored
            .platform
            .unwrap_or_else(|| Platform::from_source(&stored.source));
        Self {
            source: stored.source,
            platform,
            side: stored.side,
            version: stored.version,
            url: stored.url,
            filename: stored.filename,
            locked: stored.locked,
        }
    }
}

/// Runtime version + loader every platform query is filtered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTarget {
    pub minecraft_version: String,
    pub loader: LoaderType,
}

/// Project manifest persisted as `packsmith.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub minecraft: String,
    pub loader: LoaderType,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mods: BTreeMap<String, ModRecord>,
}

impl Manifest {
    pub fn new(name: String, minecraft: String, loader: LoaderType) -> Self {
        Self {
            name,
            minecraft,
            loader,
            mods: BTreeMap::new(),
        }
    }

    pub fn target(&self) -> ProjectTarget {
        ProjectTarget {
            minecraft_version: self.minecraft.clone(),
            loader: self.loader,
        }
    }

    /// Reject manifests whose keys break the non-empty id invariant.
    pub fn validate(&self) -> PacksmithResult<()> {
        if self.mods.keys().any(|id| id.trim().is_empty()) {
            return Err(PacksmithError::Other(
                "Manifest contains a mod with an empty id".into(),
            ));
        }
        Ok(())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, ModRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, ModRecord>>::deserialize(deserializer)?.unwrap_or_default())
}
